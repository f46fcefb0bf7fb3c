use crate::provider::Usage;

/// Events emitted during an LLM streaming response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental answer text from the model.
    Text { text: String },

    /// Incremental reasoning content, for providers that expose it on a
    /// side channel (Qwen, GLM, MiniMax, DeepSeek reasoner). Never emitted
    /// by providers without the channel.
    Thinking { text: String },

    /// Stream completed successfully.
    End { usage: Option<Usage> },

    /// Error during streaming. `kind` is the common provider kind string.
    Error { kind: String, message: String },
}

/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Reassembles complete lines from a byte-chunked HTTP stream.
///
/// Chunk boundaries do not align with SSE line boundaries; the trailing
/// partial line is buffered until the next chunk arrives.
#[derive(Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the complete lines it closed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines: Vec<String> = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}
