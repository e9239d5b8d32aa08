use crate::audio::TARGET_SAMPLE_RATE;
use crate::error::{Result, SubGenError};
use crate::stt::{Segment, SegmentSink, SpeechEngine};
use log::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperError,
};

pub struct WhisperConfig {
    pub model_path: String,
    pub threads: u8,
    pub language: String,
    pub use_gpu: bool,
    pub gpu_device: i32,
    pub flash_attn: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            threads: 8,
            language: "auto".to_string(),
            use_gpu: false,
            gpu_device: 0,
            flash_attn: false,
        }
    }
}

impl WhisperConfig {
    pub fn new(model_path: String) -> Self {
        Self {
            model_path,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, threads: u8) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_language(mut self, language: String) -> Self {
        self.language = language;
        self
    }

    pub fn with_use_gpu(mut self, enabled: bool) -> Self {
        self.use_gpu = enabled;
        self
    }

    pub fn with_gpu_device(mut self, device: i32) -> Self {
        self.gpu_device = device;
        self
    }

    pub fn with_flash_attn(mut self, enabled: bool) -> Self {
        self.flash_attn = enabled;
        self
    }
}

/// whisper.cpp speech engine.
///
/// Inference is synchronous: each fed chunk is fully transcribed before
/// `feed` returns, with segment timestamps offset by the running input
/// cursor, so `finish` can acknowledge drain completion.
pub struct WhisperEngine {
    config: WhisperConfig,
    ctx: Option<WhisperContext>,
    cursor_samples: u64,
}

impl WhisperEngine {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            config,
            ctx: None,
            cursor_samples: 0,
        }
    }

    fn build_params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
        params.set_n_threads(self.config.threads as i32);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);
        params.set_no_timestamps(false);
        params.set_translate(false);

        if self.config.language.trim().eq_ignore_ascii_case("auto") {
            params.set_detect_language(true);
            params.set_language(None);
        } else {
            params.set_detect_language(false);
            params.set_language(Some(self.config.language.as_str()));
        }

        params
    }
}

impl SpeechEngine for WhisperEngine {
    fn init(&mut self) -> Result<()> {
        if self.ctx.is_some() {
            return Ok(());
        }

        if self.config.model_path.trim().is_empty() {
            return Err(SubGenError::EngineInitFailed(
                "model path is empty".to_string(),
            ));
        }

        let mut params = WhisperContextParameters::default();
        params
            .use_gpu(self.config.use_gpu)
            .gpu_device(self.config.gpu_device)
            .flash_attn(self.config.flash_attn);

        info!("Loading whisper model from {}", self.config.model_path);
        let ctx = WhisperContext::new_with_params(&self.config.model_path, params)
            .map_err(|e| init_error("failed to load model", e))?;
        self.ctx = Some(ctx);
        self.cursor_samples = 0;
        Ok(())
    }

    fn feed(&mut self, samples: &[i16], sink: &SegmentSink) -> Result<()> {
        let ctx = self.ctx.as_ref().ok_or_else(|| {
            SubGenError::EngineFailed("whisper context not initialized".to_string())
        })?;

        let mut audio = vec![0.0f32; samples.len()];
        whisper_rs::convert_integer_to_float_audio(samples, &mut audio)
            .map_err(|e| run_error("failed to convert audio", e))?;

        let mut state = ctx
            .create_state()
            .map_err(|e| run_error("failed to create state", e))?;
        state
            .full(self.build_params(), &audio)
            .map_err(|e| run_error("whisper inference failed", e))?;

        let offset_secs = self.cursor_samples as f32 / TARGET_SAMPLE_RATE as f32;
        let mut emitted = 0usize;
        for segment in state.as_iter() {
            let start = offset_secs + centiseconds_to_secs(segment.start_timestamp());
            let end = offset_secs + centiseconds_to_secs(segment.end_timestamp());
            if end <= start {
                continue;
            }
            let text = segment
                .to_str_lossy()
                .map_err(|e| run_error("failed to read segment text", e))?
                .trim()
                .to_string();
            if text.is_empty() {
                continue;
            }
            sink.push(Segment::new(start, end, text));
            emitted += 1;
        }

        self.cursor_samples += samples.len() as u64;
        debug!(
            "Whisper chunk done: {} segment(s), cursor at {:.1}s",
            emitted,
            self.cursor_samples as f32 / TARGET_SAMPLE_RATE as f32
        );
        Ok(())
    }

    fn finish(&mut self, _sink: &SegmentSink) -> Result<bool> {
        // Synchronous inference; everything was pushed during feed.
        Ok(true)
    }
}

fn centiseconds_to_secs(timestamp_cs: i64) -> f32 {
    (timestamp_cs.max(0) as f32) / 100.0
}

fn init_error(context: &str, err: WhisperError) -> SubGenError {
    SubGenError::EngineInitFailed(format!("{context}: {err}"))
}

fn run_error(context: &str, err: WhisperError) -> SubGenError {
    SubGenError::EngineFailed(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_config_builder() {
        let config = WhisperConfig::new("/path/to/model".to_string())
            .with_threads(4)
            .with_language("en".to_string())
            .with_gpu_device(1)
            .with_flash_attn(true);

        assert_eq!(config.model_path, "/path/to/model");
        assert_eq!(config.threads, 4);
        assert_eq!(config.language, "en");
        assert_eq!(config.gpu_device, 1);
        assert!(config.flash_attn);
    }

    #[test]
    fn test_init_requires_model_path() {
        let mut engine = WhisperEngine::new(WhisperConfig::default());
        let err = engine.init().unwrap_err();
        assert!(matches!(err, SubGenError::EngineInitFailed(_)));
    }

    #[test]
    fn test_timestamp_conversion() {
        assert_eq!(centiseconds_to_secs(0), 0.0);
        assert_eq!(centiseconds_to_secs(250), 2.5);
        assert_eq!(centiseconds_to_secs(-5), 0.0);
    }
}
