use crate::error::Result;
use crate::stt::Segment;
use log::{debug, trace};
use srtlib::Timestamp;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SubtitleEntry {
    pub index: u32,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub text: String,
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}",
            self.index, self.start_time, self.end_time, self.text
        )
    }
}

/// A subtitle track in the numbered-cue SRT format.
///
/// Serialization is pure and stateless; the only failure mode is the
/// underlying file write.
pub struct SrtFile {
    pub entries: Vec<SubtitleEntry>,
}

impl SrtFile {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build cues from recognized segments.
    ///
    /// Segments are sorted ascending by start time first, since engines that
    /// buffer or overlap chunks do not guarantee temporal emission order.
    /// Indices are sequential and 1-based.
    pub fn from_segments(segments: &[Segment]) -> Self {
        let mut sorted: Vec<&Segment> = segments.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        let entries = sorted
            .into_iter()
            .enumerate()
            .map(|(i, segment)| SubtitleEntry {
                index: (i + 1) as u32,
                start_time: Timestamp::from_milliseconds(secs_to_millis(segment.start)),
                end_time: Timestamp::from_milliseconds(secs_to_millis(segment.end)),
                text: segment.text.trim().to_string(),
            })
            .collect();

        Self { entries }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        trace!("Saving SRT file to: {}", path.as_ref().display());
        fs::write(path, self.to_string())?;
        debug!("Saved SRT file with {} entries", self.entries.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SrtFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SrtFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // An empty entry list renders as an empty (but valid) subtitle file.
        for entry in &self.entries {
            write!(f, "{}\n\n", entry)?;
        }
        Ok(())
    }
}

fn secs_to_millis(secs: f32) -> u32 {
    if secs <= 0.0 {
        return 0;
    }
    (secs as f64 * 1000.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_formatting() {
        let srt = SrtFile::from_segments(&[Segment::new(2.0, 4.5, "hello world")]);
        assert_eq!(
            srt.to_string(),
            "1\n00:00:02,000 --> 00:00:04,500\nhello world\n\n"
        );
    }

    #[test]
    fn test_segments_reordered_and_reindexed() {
        let srt = SrtFile::from_segments(&[
            Segment::new(60.0, 61.0, "third"),
            Segment::new(0.5, 1.0, "first"),
            Segment::new(30.0, 32.0, "second"),
        ]);

        assert_eq!(srt.len(), 3);
        let indices: Vec<u32> = srt.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let texts: Vec<&str> = srt.entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        for pair in srt.entries.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let segments = [
            Segment::new(1.0, 2.0, "one"),
            Segment::new(3.0, 4.0, "two"),
        ];
        let first = SrtFile::from_segments(&segments).to_string();
        let second = SrtFile::from_segments(&segments).to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_segment_list_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.srt");

        let srt = SrtFile::from_segments(&[]);
        assert!(srt.is_empty());
        srt.save(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_text_is_trimmed() {
        let srt = SrtFile::from_segments(&[Segment::new(0.0, 1.0, "  padded  ")]);
        assert_eq!(srt.entries[0].text, "padded");
    }

    #[test]
    fn test_hour_scale_timestamps() {
        let srt = SrtFile::from_segments(&[Segment::new(3723.456, 3725.0, "late")]);
        assert_eq!(srt.entries[0].start_time.to_string(), "01:02:03,456");
    }
}
