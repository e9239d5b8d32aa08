use directories::BaseDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::stt::TranscriberConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the speech model file (whisper backend).
    pub model_path: String,
    pub threads: u8,
    pub language: String,

    /// Audio fed to the engine per call, in milliseconds.
    pub chunk_ms: u64,
    /// Wait after the last chunk before assuming all engine callbacks flushed.
    /// Only applies to engines that cannot acknowledge drain completion.
    pub settle_delay_ms: u64,

    /// Directory for the scratch WAV and the durable job record.
    /// Defaults to the system temp directory when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: "ggml-base.bin".to_string(),
            threads: 8,
            language: "auto".to_string(),
            chunk_ms: 30_000,
            settle_delay_ms: 500,
            work_dir: None,
        }
    }
}

impl Config {
    pub fn default_config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("subgen").join("subgen.toml"))
    }

    pub fn config_path_from_env() -> Option<PathBuf> {
        std::env::var_os("SUBGEN_CONFIG").map(PathBuf::from)
    }

    pub fn load() -> Self {
        let config_path = Self::config_path_from_env().or_else(Self::default_config_path);

        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = config_path.as_ref() {
            figment = figment.merge(Toml::file(path));
        }

        // Env should take precedence over file/defaults.
        figment = figment.merge(Env::prefixed("SUBGEN_"));

        match figment.extract::<Config>() {
            Ok(cfg) => cfg,
            Err(err) => {
                // Logging might not be initialized yet; fall back silently.
                warn!("Failed to load config, using defaults: {err}");
                Config::default()
            }
        }
    }

    pub fn transcriber(&self) -> TranscriberConfig {
        TranscriberConfig::default()
            .with_chunk_ms(self.chunk_ms)
            .with_settle_delay_ms(self.settle_delay_ms)
    }

    #[cfg(feature = "whisper")]
    pub fn whisper(&self) -> crate::stt::WhisperConfig {
        crate::stt::WhisperConfig::new(self.model_path.clone())
            .with_threads(self.threads)
            .with_language(self.language.clone())
    }

    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.chunk_ms, 30_000);
        assert_eq!(cfg.settle_delay_ms, 500);
        assert!(cfg.work_dir.is_none());
    }

    #[test]
    fn test_transcriber_config_from_config() {
        let mut cfg = Config::default();
        cfg.chunk_ms = 10_000;
        cfg.settle_delay_ms = 250;
        let tc = cfg.transcriber();
        assert_eq!(tc.chunk_ms, 10_000);
        assert_eq!(tc.settle_delay_ms, 250);
    }
}
