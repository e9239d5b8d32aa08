use crate::error::Result;
use std::sync::mpsc::Sender;

mod transcriber;
pub use transcriber::{Transcriber, TranscriberConfig};

#[cfg(feature = "whisper")]
mod whisper;
#[cfg(feature = "whisper")]
pub use whisper::{WhisperConfig, WhisperEngine};

/// A timestamped span of recognized speech text, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f32,
    pub end: f32,
    pub text: String,
}

impl Segment {
    pub fn new(start: f32, end: f32, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Where engines deliver recognized segments.
///
/// Backed by a channel so an engine may emit from a callback thread while the
/// feeding loop keeps advancing; the adapter drains the receiving end.
#[derive(Clone)]
pub struct SegmentSink {
    tx: Sender<Segment>,
}

impl SegmentSink {
    pub(crate) fn new(tx: Sender<Segment>) -> Self {
        Self { tx }
    }

    pub fn push(&self, segment: Segment) {
        // The adapter may already have stopped collecting; late emissions are
        // dropped rather than treated as an error.
        let _ = self.tx.send(segment);
    }
}

/// A stateful speech-to-text engine fed with fixed-duration chunks of
/// 16 kHz mono 16-bit PCM.
pub trait SpeechEngine: Send {
    /// Load the model. Expensive; called once per adapter lifetime.
    fn init(&mut self) -> Result<()>;

    /// Feed one chunk of audio. Segments may be delivered to `sink` during
    /// this call or asynchronously afterwards.
    fn feed(&mut self, samples: &[i16], sink: &SegmentSink) -> Result<()>;

    /// Signal end of input. Returns `true` if the engine guarantees that all
    /// pending segments reached the sink before returning; engines without
    /// such a guarantee return `false` and the adapter waits out a fixed
    /// settle delay instead.
    fn finish(&mut self, _sink: &SegmentSink) -> Result<bool> {
        Ok(false)
    }
}
