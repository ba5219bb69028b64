//! Applying [`TagBuffer`] to upstream response payloads
//!
//! Handles the two payload shapes (generate puts text in `response`, chat
//! puts it in `message.content`) and the two response modes (one JSON
//! document, or one JSON object per streamed line).

use serde_json::Value;

use crate::config::ThinkingConfig;

use super::tag_buffer::{Segment, TagBuffer};

/// Which upstream endpoint a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Single-turn generation: text in `response`
    Generate,
    /// Multi-turn chat: text in `message.content`
    Chat,
}

impl PayloadKind {
    /// Upstream path for this kind of request
    pub fn endpoint(&self) -> &'static str {
        match self {
            PayloadKind::Generate => "api/generate",
            PayloadKind::Chat => "api/chat",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Generate => "generate",
            PayloadKind::Chat => "chat",
        }
    }

    /// Text fragment carried by an upstream chunk or document
    pub fn text<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        match self {
            PayloadKind::Generate => payload.get("response")?.as_str(),
            PayloadKind::Chat => payload.get("message")?.get("content")?.as_str(),
        }
    }

    fn set_text(&self, payload: &mut Value, text: String) {
        let slot = match self {
            PayloadKind::Generate => payload.get_mut("response"),
            PayloadKind::Chat => payload
                .get_mut("message")
                .and_then(|message| message.get_mut("content")),
        };
        if let Some(slot) = slot {
            *slot = Value::String(text);
        }
    }

    fn set_thinking(&self, payload: &mut Value, thinking: String) {
        let target = match self {
            PayloadKind::Generate => Some(payload),
            PayloadKind::Chat => payload.get_mut("message"),
        };
        if let Some(Value::Object(map)) = target {
            map.insert("thinking".to_string(), Value::String(thinking));
        }
    }
}

/// Result of stripping a complete text in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub visible: String,
    pub hidden: Option<String>,
}

/// Decides which models get their output filtered, and how
#[derive(Debug, Clone)]
pub struct ThinkingFilter {
    open_tag: String,
    close_tag: String,
    patterns: Vec<String>,
    show_thinking: bool,
}

impl ThinkingFilter {
    pub fn new(config: &ThinkingConfig) -> Self {
        Self {
            open_tag: config.open_tag.clone(),
            close_tag: config.close_tag.clone(),
            patterns: config
                .model_patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            show_thinking: config.show_thinking,
        }
    }

    /// Whether hidden content is surfaced to callers
    pub fn show_thinking(&self) -> bool {
        self.show_thinking
    }

    /// Return a copy with a different surfacing policy
    pub fn with_show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    /// Case-insensitive substring match of the model name against the
    /// configured reasoning model patterns
    pub fn applies_to(&self, model: &str) -> bool {
        let model = model.to_lowercase();
        self.patterns.iter().any(|p| model.contains(p.as_str()))
    }

    pub fn tag_buffer(&self) -> TagBuffer {
        TagBuffer::new(self.open_tag.clone(), self.close_tag.clone())
    }

    /// Strip every region from a complete text
    pub fn strip(&self, text: &str) -> Stripped {
        let mut buffer = self.tag_buffer();
        let mut segment = buffer.push(text);
        segment.extend(buffer.finish());

        let hidden = segment.hidden_text();
        Stripped {
            visible: segment.visible,
            hidden,
        }
    }
}

/// Per-response transformer for upstream payloads
#[derive(Debug)]
pub struct ResponseTransform {
    kind: PayloadKind,
    buffer: TagBuffer,
    show_thinking: bool,
    last_chunk: Option<Value>,
    finished: bool,
}

impl ResponseTransform {
    pub fn new(kind: PayloadKind, filter: &ThinkingFilter) -> Self {
        Self {
            kind,
            buffer: filter.tag_buffer(),
            show_thinking: filter.show_thinking(),
            last_chunk: None,
            finished: false,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Transform a complete (non-streamed) response document in place
    pub fn transform_document(&mut self, document: &mut Value) {
        let Some(text) = self.kind.text(document).map(str::to_owned) else {
            return;
        };

        let mut segment = self.buffer.push(&text);
        segment.extend(self.buffer.finish());
        self.apply(document, segment);
    }

    /// Transform one streamed chunk.
    ///
    /// Returns `None` when the chunk's whole fragment was absorbed into a
    /// region (or held back) and the chunk carries nothing else worth
    /// forwarding. Completion chunks, error chunks and chunks without a
    /// text field are always forwarded.
    pub fn transform_chunk(&mut self, mut chunk: Value) -> Option<Value> {
        let done = chunk.get("done").and_then(Value::as_bool).unwrap_or(false);
        let has_error = chunk.get("error").is_some();
        let text = self.kind.text(&chunk).map(str::to_owned);

        let mut segment = match &text {
            Some(fragment) => self.buffer.push(fragment),
            None => Segment::default(),
        };
        if done {
            segment.extend(self.buffer.finish());
            self.finished = true;
        }

        self.last_chunk = Some(chunk.clone());

        let surfaced = self.show_thinking && !segment.hidden.is_empty();
        let always_forward = done || has_error || text.is_none();
        if segment.visible.is_empty() && !surfaced && !always_forward {
            return None;
        }

        self.apply(&mut chunk, segment);
        Some(chunk)
    }

    /// Drive the buffer to end of input once the upstream stream is over.
    ///
    /// Only produces a chunk when the stream ended without a completion
    /// chunk and held-back visible text remains.
    pub fn finish(&mut self) -> Option<Value> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let segment = self.buffer.finish();
        if segment.visible.is_empty() {
            return None;
        }

        let mut chunk = self.last_chunk.take()?;
        if self.kind.text(&chunk).is_none() {
            return None;
        }
        self.apply(&mut chunk, segment);
        Some(chunk)
    }

    fn apply(&self, payload: &mut Value, segment: Segment) {
        let hidden = segment.hidden_text();
        self.kind.set_text(payload, segment.visible);
        if self.show_thinking {
            if let Some(hidden) = hidden {
                self.kind.set_thinking(payload, hidden);
            }
        }
    }
}
