use super::types::ChatCompletionChunk;

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Content fragment to append to the session.
    Delta(String),
    /// The `[DONE]` sentinel was seen; nothing after it is decoded.
    Done,
}

/// Incremental decoder for `data: `-framed chat completion streams.
///
/// - Buffers raw bytes until a full `\n`-terminated line is available
/// - Skips blank lines and lines without the data prefix
/// - Stops for good at the sentinel line
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and return the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buf.extend_from_slice(chunk);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == DONE_LINE {
                self.done = true;
                self.buf.clear();
                out.push(StreamEvent::Done);
                break;
            }

            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                // event:, id:, retry: and comments carry nothing we render.
                continue;
            };

            match serde_json::from_str::<ChatCompletionChunk>(payload) {
                Ok(chunk) => {
                    if let Some(delta) = chunk.into_delta() {
                        out.push(StreamEvent::Delta(delta));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, line = %payload, "skipping malformed stream line");
                }
            }
        }

        out
    }

    /// End of input. An unterminated trailing fragment is dropped, never decoded.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            tracing::debug!(bytes = self.buf.len(), "discarding incomplete trailing line");
        }
        self.buf.clear();
        self.done = true;
    }
}
