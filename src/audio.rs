use crate::cancel::CancelToken;
use crate::error::{Result, SubGenError};
use log::{debug, trace};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;

/// Extracts the audio track of a media container into a mono 16 kHz 16-bit
/// PCM WAV file, the fixed input format expected by the speech engines.
pub struct AudioExtractor {
    target_sample_rate: u32,
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl AudioExtractor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode the first audio track of `media_path` and stream it into a WAV
    /// file at `wav_path`.
    ///
    /// The container is decoded packet by packet; each decoded buffer is
    /// downmixed to mono by per-frame channel averaging and resampled with
    /// nearest-neighbor index selection. Nearest-neighbor is lossy but cheap,
    /// which is acceptable for speech recognition input.
    ///
    /// Any container or codec error aborts the extraction; a partial output
    /// file may remain and must be treated as invalid by the caller.
    pub fn extract_to_wav<P: AsRef<Path>>(
        &self,
        media_path: P,
        wav_path: P,
        cancel: &CancelToken,
    ) -> Result<()> {
        let media_path = media_path.as_ref();
        trace!(
            "Extracting audio: {} -> {}",
            media_path.display(),
            wav_path.as_ref().display()
        );

        let file = File::open(media_path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = media_path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SubGenError::DecodeFailed(format!("probe failed: {e}")))?;
        let mut format = probed.format;

        let track = select_audio_track(format.tracks())?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| SubGenError::DecodeFailed(format!("decoder creation failed: {e}")))?;

        let spec = hound::WavSpec {
            channels: TARGET_CHANNELS,
            sample_rate: self.target_sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // hound writes the 44-byte header with placeholder sizes up front and
        // patches the RIFF/data length fields on finalize.
        let mut writer = hound::WavWriter::create(wav_path, spec)?;

        let mut written_frames = 0u64;

        loop {
            cancel.check()?;

            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(SubGenError::DecodeFailed(format!("demux failed: {e}")));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| SubGenError::DecodeFailed(format!("decode failed: {e}")))?;

            let sig_spec = *decoded.spec();
            let channels = sig_spec.channels.count();
            let src_rate = sig_spec.rate;

            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, sig_spec);
            sample_buf.copy_interleaved_ref(decoded);
            let samples = sample_buf.samples();
            if samples.is_empty() {
                continue;
            }

            let mono = downmix_to_mono(samples, channels);
            let resampled = resample_nearest(&mono, src_rate, self.target_sample_rate);

            for sample in &resampled {
                writer.write_sample(*sample)?;
            }
            written_frames += resampled.len() as u64;
        }

        cancel.check()?;
        writer.finalize()?;

        debug!(
            "Audio extraction completed: {} frames at {} Hz",
            written_frames, self.target_sample_rate
        );
        Ok(())
    }
}

/// First track with a decodable codec; containers may carry metadata-only
/// tracks with a null codec type.
fn select_audio_track(tracks: &[Track]) -> Result<&Track> {
    tracks
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SubGenError::NoAudioTrack)
}

/// Average all channels per frame, truncating toward zero.
fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut sum = 0i32;
        for ch in 0..channels {
            sum += samples[frame * channels + ch] as i32;
        }
        mono.push((sum / channels as i32) as i16);
    }
    mono
}

/// Nearest-neighbor resample by index selection scaled with the rate ratio.
fn resample_nearest(samples: &[i16], src_rate: u32, dst_rate: u32) -> Vec<i16> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = src_rate as f64 / dst_rate as f64;
    let target_len = (samples.len() as f64 / ratio) as usize;
    let mut out = Vec::with_capacity(target_len);
    for i in 0..target_len {
        let index = (i as f64 * ratio) as usize;
        out.push(if index < samples.len() {
            samples[index]
        } else {
            0
        });
    }
    out
}
