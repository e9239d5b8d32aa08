use crate::audio::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::cancel::CancelToken;
use crate::error::{Result, SubGenError};
use crate::stt::{Segment, SegmentSink, SpeechEngine};
use hound::{SampleFormat, WavReader};
use log::{debug, trace};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Audio fed to the engine per call, in milliseconds.
    pub chunk_ms: u64,
    /// Wait after the last chunk for engines that cannot acknowledge drain
    /// completion. Known soft race: a loaded engine may still emit after the
    /// delay and those segments are lost.
    pub settle_delay_ms: u64,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 30_000,
            settle_delay_ms: 500,
        }
    }
}

impl TranscriberConfig {
    pub fn with_chunk_ms(mut self, chunk_ms: u64) -> Self {
        self.chunk_ms = chunk_ms;
        self
    }

    pub fn with_settle_delay_ms(mut self, settle_delay_ms: u64) -> Self {
        self.settle_delay_ms = settle_delay_ms;
        self
    }
}

/// Adapter between a WAV file and a [`SpeechEngine`].
///
/// Owns the engine instance, initializes it lazily exactly once, feeds audio
/// in fixed-size chunks to bound peak memory, and collects segments emitted
/// through the sink channel. Returned segments are blank-filtered and sorted
/// ascending by start time regardless of emission order.
pub struct Transcriber<E: SpeechEngine> {
    engine: E,
    config: TranscriberConfig,
    initialized: bool,
}

impl<E: SpeechEngine> Transcriber<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, TranscriberConfig::default())
    }

    pub fn with_config(engine: E, config: TranscriberConfig) -> Self {
        Self {
            engine,
            config,
            initialized: false,
        }
    }

    fn ensure_engine(&mut self) -> Result<()> {
        if !self.initialized {
            self.engine.init()?;
            self.initialized = true;
        }
        Ok(())
    }

    /// Transcribe a 16 kHz mono 16-bit WAV file.
    ///
    /// `on_progress` receives the fraction of chunks fed so far in (0, 1].
    pub fn transcribe<P: AsRef<Path>>(
        &mut self,
        wav_path: P,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(f32),
    ) -> Result<Vec<Segment>> {
        self.ensure_engine()?;

        let samples = load_wav_samples(wav_path.as_ref())?;
        let chunk_samples =
            ((TARGET_SAMPLE_RATE as u64 * self.config.chunk_ms) / 1000).max(1) as usize;

        let (tx, rx) = mpsc::channel();
        let sink = SegmentSink::new(tx);

        let total_chunks = samples.chunks(chunk_samples).count().max(1);
        trace!(
            "Feeding {} samples in {} chunk(s) of up to {} samples",
            samples.len(),
            total_chunks,
            chunk_samples
        );

        for (i, chunk) in samples.chunks(chunk_samples).enumerate() {
            cancel.check()?;
            self.engine.feed(chunk, &sink)?;
            on_progress((i + 1) as f32 / total_chunks as f32);
        }

        cancel.check()?;
        let drained = self.engine.finish(&sink)?;
        if !drained && self.config.settle_delay_ms > 0 {
            // No drain acknowledgement from the engine; wait for straggling
            // callback emissions.
            trace!("Settling for {}ms", self.config.settle_delay_ms);
            std::thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
        }
        drop(sink);

        let mut segments: Vec<Segment> = rx
            .try_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        debug!("Transcription produced {} segment(s)", segments.len());
        Ok(segments)
    }
}

fn load_wav_samples(wav_path: &Path) -> Result<Vec<i16>> {
    let mut reader = WavReader::open(wav_path)?;
    let spec = reader.spec();

    if spec.channels != TARGET_CHANNELS
        || spec.sample_rate != TARGET_SAMPLE_RATE
        || spec.bits_per_sample != 16
        || spec.sample_format != SampleFormat::Int
    {
        return Err(SubGenError::EngineFailed(format!(
            "unexpected WAV format: channels={}, sample_rate={}, bits_per_sample={}, format={:?}",
            spec.channels, spec.sample_rate, spec.bits_per_sample, spec.sample_format
        )));
    }

    reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(SubGenError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn write_silence_wav(path: &Path, sample_rate: u32, secs: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(sample_rate as f32 * secs) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Engine that emits a scripted set of segments from a spawned thread,
    /// mimicking an asynchronous result callback.
    struct ScriptedEngine {
        per_feed: Vec<Segment>,
        init_calls: Arc<AtomicUsize>,
        feed_calls: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn new(per_feed: Vec<Segment>) -> Self {
            Self {
                per_feed,
                init_calls: Arc::new(AtomicUsize::new(0)),
                feed_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SpeechEngine for ScriptedEngine {
        fn init(&mut self) -> Result<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn feed(&mut self, _samples: &[i16], sink: &SegmentSink) -> Result<()> {
            self.feed_calls.fetch_add(1, Ordering::SeqCst);
            let sink = sink.clone();
            let segments = self.per_feed.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                for segment in segments {
                    sink.push(segment);
                }
            });
            Ok(())
        }
    }

    fn transcriber_for_test(engine: ScriptedEngine) -> Transcriber<ScriptedEngine> {
        // Long settle so the emission threads always beat the drain.
        let config = TranscriberConfig::default()
            .with_chunk_ms(1_000)
            .with_settle_delay_ms(300);
        Transcriber::with_config(engine, config)
    }

    #[test]
    fn test_segments_sorted_and_blank_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        write_silence_wav(&wav, 16_000, 0.5);

        let engine = ScriptedEngine::new(vec![
            Segment::new(4.0, 5.0, "later"),
            Segment::new(0.5, 1.0, "   "),
            Segment::new(1.0, 2.0, "earlier"),
        ]);
        let mut transcriber = transcriber_for_test(engine);

        let segments = transcriber
            .transcribe(&wav, &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "earlier");
        assert_eq!(segments[1].text, "later");
        assert!(segments[0].start <= segments[1].start);
    }

    #[test]
    fn test_engine_initialized_once() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        write_silence_wav(&wav, 16_000, 0.2);

        let engine = ScriptedEngine::new(vec![]);
        let init_calls = engine.init_calls.clone();
        let mut transcriber = transcriber_for_test(engine);

        transcriber
            .transcribe(&wav, &CancelToken::new(), |_| {})
            .unwrap();
        transcriber
            .transcribe(&wav, &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_audio_is_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        write_silence_wav(&wav, 16_000, 3.0);

        let engine = ScriptedEngine::new(vec![]);
        let feed_calls = engine.feed_calls.clone();
        let mut transcriber = transcriber_for_test(engine);

        let mut progress = Vec::new();
        transcriber
            .transcribe(&wav, &CancelToken::new(), |p| progress.push(p))
            .unwrap();

        // 3 seconds of audio in 1-second chunks.
        assert_eq!(feed_calls.load(Ordering::SeqCst), 3);
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*progress.last().unwrap(), 1.0);
    }

    #[test]
    fn test_cancellation_before_feeding() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        write_silence_wav(&wav, 16_000, 0.5);

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut transcriber = transcriber_for_test(ScriptedEngine::new(vec![]));
        let err = transcriber.transcribe(&wav, &cancel, |_| {}).unwrap_err();
        assert!(matches!(err, SubGenError::Cancelled));
    }

    #[test]
    fn test_rejects_wrong_wav_format() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        write_silence_wav(&wav, 8_000, 0.2);

        let mut transcriber = transcriber_for_test(ScriptedEngine::new(vec![]));
        let err = transcriber
            .transcribe(&wav, &CancelToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, SubGenError::EngineFailed(_)));
    }
}
