/// Incremental decoder for the server-sent-events wire format.
///
/// Fed raw transport chunks, yields complete `data` payloads. Chunk
/// boundaries may fall anywhere, including inside a line. `event:`, `id:`,
/// `retry:` and comment lines are ignored; reconnection timing is owned by
/// the connector's retry policy, not by the server's `retry:` hint.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a transport chunk and returns every event payload completed
    /// by it. Multi-line data fields are joined with `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line) = self.take_line() {
            if line.is_empty() {
                // Blank line dispatches the accumulated event
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        let mut line = String::from_utf8_lossy(&line).into_owned();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }
}
