use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubGenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no audio track found in container")]
    NoAudioTrack,

    #[error("audio decode failed: {0}")]
    DecodeFailed(String),

    #[error("speech engine initialization failed: {0}")]
    EngineInitFailed(String),

    #[error("speech engine failed: {0}")]
    EngineFailed(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("a job is already active on this controller")]
    JobActive,

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, SubGenError>;
