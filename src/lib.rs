pub mod audio;
pub mod cancel;
pub mod config;
pub mod error;
pub mod job;
pub mod srt;
pub mod stt;

// Re-export main types for convenience
pub use audio::AudioExtractor;
pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Result, SubGenError};
pub use job::{JobController, JobStatus, JobStore, SubtitleJob, WorkRecord};
pub use srt::{SrtFile, SubtitleEntry};
#[cfg(feature = "whisper")]
pub use stt::{WhisperConfig, WhisperEngine};
pub use stt::{Segment, SegmentSink, SpeechEngine, Transcriber, TranscriberConfig};
