//! Pull-based tagged streaming of generator output.
//!
//! Generation services deliver chunked output where each chunk is narrative
//! text, program text, or a terminal marker. [`SolutionStream`] wraps such a
//! raw chunk iterator into a lazy, finite, non-restartable sequence of
//! [`StreamEvent`]s on two channels: "reasoning" (free narrative) and "code"
//! (content heuristically identified as code while still streaming).
//!
//! Stream lifecycle is a single owned state value with controlled
//! transitions `Open -> Closing -> Closed`. Aborting stops forwarding and
//! releases the upstream iterator without panicking; malformed chunks are
//! skipped, never fatal to the stream.

use std::collections::VecDeque;

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::types::Language;

/// One chunk as delivered by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChunk {
    /// Free-form narrative content.
    Narrative(String),
    /// Content the service already identified as program text.
    Code(String),
    /// Terminal marker: no further chunks follow.
    Done,
}

/// One event forwarded to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Reasoning(String),
    Code(String),
}

/// Lifecycle of a [`SolutionStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closing,
    Closed,
}

/// Boxed upstream chunk iterator as produced by a generator backend.
pub type RawChunkIter = Box<dyn Iterator<Item = Result<RawChunk>> + Send>;

/// Tagged, pull-based view over a raw chunk stream.
pub struct SolutionStream {
    upstream: Option<RawChunkIter>,
    state: StreamState,
    language: Language,
    pending: VecDeque<StreamEvent>,
}

impl SolutionStream {
    pub fn new(upstream: RawChunkIter, language: Language) -> Self {
        Self {
            upstream: Some(upstream),
            state: StreamState::Open,
            language,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Request the stream to stop. Forwarding ceases on the next pull; the
    /// upstream iterator is dropped there, releasing the connection. Safe to
    /// call in any state and never raises.
    pub fn abort(&mut self) {
        if self.state == StreamState::Open {
            debug!("stream abort requested");
            self.state = StreamState::Closing;
        }
    }

    fn close(&mut self) {
        self.upstream = None;
        self.pending.clear();
        self.state = StreamState::Closed;
    }

    /// Split one narrative chunk into channel events.
    ///
    /// Contiguous lines of the same classification are grouped so consumers
    /// see coherent blocks rather than single lines.
    fn route_narrative(&mut self, text: &str) {
        let mut block = String::new();
        let mut block_is_code: Option<bool> = None;
        for line in text.lines() {
            let code = looks_like_code(line, self.language);
            if block_is_code != Some(code) && !block.is_empty() {
                self.flush_block(&mut block, block_is_code == Some(true));
            }
            block_is_code = Some(code);
            block.push_str(line);
            block.push('\n');
        }
        if !block.is_empty() {
            self.flush_block(&mut block, block_is_code == Some(true));
        }
    }

    fn flush_block(&mut self, block: &mut String, is_code: bool) {
        let text = std::mem::take(block);
        if is_code {
            self.pending.push_back(StreamEvent::Code(text));
        } else if !text.trim().is_empty() {
            self.pending.push_back(StreamEvent::Reasoning(text));
        }
        // Blank prose-side blocks are dropped: they carry no signal.
    }
}

impl Iterator for SolutionStream {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            match self.state {
                StreamState::Closed => return None,
                StreamState::Closing => {
                    self.close();
                    return None;
                }
                StreamState::Open => {}
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let Some(upstream) = self.upstream.as_mut() else {
                self.state = StreamState::Closed;
                return None;
            };
            match upstream.next() {
                Some(Ok(RawChunk::Narrative(text))) => self.route_narrative(&text),
                Some(Ok(RawChunk::Code(text))) => {
                    self.pending.push_back(StreamEvent::Code(text));
                }
                Some(Ok(RawChunk::Done)) | None => {
                    self.close();
                    return None;
                }
                Some(Err(err)) => {
                    // Malformed or partial chunk: skip and continue.
                    warn!(error = %err, "skipping malformed stream chunk");
                }
            }
        }
    }
}

/// Best-effort line classifier for the streaming code channel.
///
/// Passes through ambiguous lines; only lines that clearly read as prose are
/// suppressed from the code channel.
pub fn looks_like_code(line: &str, language: Language) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    // Deep indentation is a strong code signal in every supported language.
    if line.starts_with("    ") || line.starts_with('\t') {
        return true;
    }
    if code_keywords(language)
        .iter()
        .any(|keyword| trimmed.starts_with(keyword))
    {
        return true;
    }
    let trailing_code = trimmed.ends_with(';')
        || trimmed.ends_with('{')
        || trimmed.ends_with('}')
        || trimmed.ends_with(':') && !trimmed.contains(' ');
    if trailing_code {
        return true;
    }
    if trimmed.contains(" = ") && !trimmed.ends_with('.') {
        return true;
    }
    false
}

fn code_keywords(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &[
            "def ", "class ", "import ", "from ", "return ", "if ", "elif ", "else:", "for ",
            "while ", "with ", "try:", "except", "print(", "@",
        ],
        Language::JavaScript => &[
            "function ", "class ", "const ", "let ", "var ", "return ", "if (", "for (",
            "while (", "import ", "export ", "=>",
        ],
        Language::Java => &[
            "public ", "private ", "protected ", "class ", "import ", "return ", "if (", "for (",
            "while (", "static ", "void ", "int ", "new ",
        ],
        Language::Cpp => &[
            "#include", "using ", "class ", "struct ", "return ", "if (", "for (", "while (",
            "int ", "void ", "auto ", "std::", "template",
        ],
    }
}

/// Drain a stream to completion, concatenating channels.
///
/// Returns `(reasoning, code)`. Used by the pipeline's blocking path to turn
/// a streamed generation into a single blob pair.
pub fn drain(stream: &mut SolutionStream) -> (String, String) {
    let mut reasoning = String::new();
    let mut code = String::new();
    for event in stream {
        match event {
            StreamEvent::Reasoning(text) => reasoning.push_str(&text),
            StreamEvent::Code(text) => code.push_str(&text),
        }
    }
    (reasoning, code)
}
