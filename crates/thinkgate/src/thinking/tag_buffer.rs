//! Incremental removal of delimited reasoning regions
//!
//! Reasoning models interleave a hidden region (`<think>...</think>` by
//! default) with their visible answer, and a streaming transport can split
//! either marker across any number of fragments. [`TagBuffer`] consumes
//! fragments one at a time and only releases text once it is known to lie
//! outside every region.
//!
//! Two pieces of state carry over between fragments:
//! - in [`BufferMode::Normal`], a tail that could still be the start of the
//!   open marker is held back;
//! - in [`BufferMode::Buffering`], everything after the open marker is held
//!   until the close marker shows up.
//!
//! An unterminated region is dropped at end of input, never emitted.

/// Which side of a region boundary the buffer is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Text is visible output
    Normal,
    /// Inside a region, waiting for the close marker
    Buffering,
}

/// Output of a single [`TagBuffer`] step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    /// Text that is safe to emit downstream
    pub visible: String,
    /// Contents of every region that closed during this step, in order
    pub hidden: Vec<String>,
}

impl Segment {
    /// True when the step produced neither visible nor hidden content
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.hidden.is_empty()
    }

    /// Hidden regions joined with newlines, or `None` if there were none
    pub fn hidden_text(&self) -> Option<String> {
        if self.hidden.is_empty() {
            None
        } else {
            Some(self.hidden.join("\n"))
        }
    }

    /// Append another step's output to this one
    pub fn extend(&mut self, other: Segment) {
        self.visible.push_str(&other.visible);
        self.hidden.extend(other.hidden);
    }
}

/// Streaming state machine that strips open/close delimited regions
#[derive(Debug, Clone)]
pub struct TagBuffer {
    open: String,
    close: String,
    mode: BufferMode,
    pending: String,
    /// Offset in `pending` before which the close marker cannot start
    scanned: usize,
}

impl TagBuffer {
    /// Create a buffer for the given marker pair.
    ///
    /// Both markers must be non-empty; configuration validation rejects
    /// empty markers before a buffer is ever built.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        let open = open.into();
        let close = close.into();
        debug_assert!(!open.is_empty() && !close.is_empty());

        Self {
            open,
            close,
            mode: BufferMode::Normal,
            pending: String::new(),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Number of bytes currently held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one fragment and return whatever became safe to emit
    pub fn push(&mut self, fragment: &str) -> Segment {
        let mut out = Segment::default();
        self.pending.push_str(fragment);
        self.drain(&mut out);
        out
    }

    /// Signal end of input.
    ///
    /// A held-back partial open marker is released as visible text. An
    /// unterminated region is discarded. The buffer is reset to
    /// [`BufferMode::Normal`] and can be reused.
    pub fn finish(&mut self) -> Segment {
        let mut out = Segment::default();

        match self.mode {
            BufferMode::Normal => {
                out.visible = std::mem::take(&mut self.pending);
            }
            BufferMode::Buffering => {
                if !self.pending.is_empty() {
                    tracing::debug!(
                        discarded_bytes = self.pending.len(),
                        "Input ended inside an unterminated reasoning region, discarding it"
                    );
                }
                self.pending.clear();
            }
        }

        self.mode = BufferMode::Normal;
        self.scanned = 0;
        out
    }

    fn drain(&mut self, out: &mut Segment) {
        loop {
            match self.mode {
                BufferMode::Normal => match self.pending.find(&self.open) {
                    Some(idx) => {
                        out.visible.push_str(&self.pending[..idx]);
                        self.pending.drain(..idx + self.open.len());
                        self.mode = BufferMode::Buffering;
                        self.scanned = 0;
                    }
                    None => {
                        let keep = partial_marker_len(&self.pending, &self.open);
                        let emit = self.pending.len() - keep;
                        out.visible.push_str(&self.pending[..emit]);
                        self.pending.drain(..emit);
                        return;
                    }
                },
                BufferMode::Buffering => {
                    let from = self.scanned;
                    match self.pending[from..].find(&self.close) {
                        Some(rel) => {
                            let idx = from + rel;
                            out.hidden.push(self.pending[..idx].to_string());
                            self.pending.drain(..idx + self.close.len());
                            self.mode = BufferMode::Normal;
                            self.scanned = 0;
                        }
                        None => {
                            // The close marker may still start in the last
                            // `close.len() - 1` bytes once more input arrives.
                            let mut next = self
                                .pending
                                .len()
                                .saturating_sub(self.close.len().saturating_sub(1));
                            while !self.pending.is_char_boundary(next) {
                                next -= 1;
                            }
                            self.scanned = next;
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| marker.is_char_boundary(len) && text.ends_with(&marker[..len]))
        .unwrap_or(0)
}
