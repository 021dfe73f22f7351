use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, VidscribeError};
use crate::transcribe::Transcript;

/// Subtitle file written into the workspace for the burn stage.
#[derive(Debug, Clone)]
pub struct SubtitleFile {
    pub path: PathBuf,
    pub content: String,
}

impl SubtitleFile {
    /// Render `transcript` and write it to `output_path`, replacing any previous file.
    pub async fn write<P: AsRef<Path>>(transcript: &Transcript, output_path: P) -> Result<Self> {
        let path = output_path.as_ref().to_path_buf();
        let content = render_cues(transcript);

        fs::write(&path, &content).await.map_err(|e| {
            VidscribeError::Format(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(
            "Wrote {} cues to {}",
            transcript.segments.len(),
            path.display()
        );
        Ok(Self { path, content })
    }

    /// Path as it must appear inside an ffmpeg filter expression.
    pub fn filter_path(&self) -> String {
        escape_filter_path(&self.path.to_string_lossy())
    }
}

/// Render cues in the order the transcript gives them.
pub fn render_cues(transcript: &Transcript) -> String {
    let mut content = String::new();

    for (index, segment) in transcript.segments.iter().enumerate() {
        content.push_str(&format!(
            "{}\n{} --> {}\n- {}\n\n",
            index + 1,
            format_timestamp(segment.start),
            format_timestamp(segment.end),
            segment.text
        ));
    }

    content
}

/// Format seconds as `HH:MM:SS,mmm`.
///
/// Sub-millisecond remainders are truncated, never rounded up into the next
/// second. Minutes and seconds roll over at 60; hours keep counting. Negative
/// and non-finite input is clamped to zero.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_millis = (seconds * 1000.0).floor() as u64;

    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1_000) % 60;
    let millis = total_millis % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Escape a path for the `subtitles=` filter, where `:` separates options and
/// `\` escapes. Backslashes go first so the colon escapes are not doubled.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\").replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::Segment;

    fn segment(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(186.4), "00:03:06,400");
        assert_eq!(format_timestamp(65.123), "00:01:05,123");
        assert_eq!(format_timestamp(3661.999), "01:01:01,999");
        assert_eq!(format_timestamp(36000.0), "10:00:00,000");
        assert_eq!(format_timestamp(-2.0), "00:00:00,000");
    }

    #[test]
    fn sub_millisecond_remainder_is_truncated() {
        assert_eq!(format_timestamp(1.9996), "00:00:01,999");
        assert_eq!(format_timestamp(59.9999), "00:00:59,999");
        assert_eq!(format_timestamp(3599.9995), "00:59:59,999");
        assert_eq!(format_timestamp(2.3), "00:00:02,300");
    }

    #[test]
    fn long_durations_keep_two_digit_minutes() {
        let formatted = format_timestamp(3661.999);
        let (clock, millis) = formatted.split_once(',').unwrap();
        let fields: Vec<&str> = clock.split(':').collect();

        assert_eq!(fields.len(), 3);
        assert!(fields.iter().all(|f| f.len() == 2));
        assert_eq!(millis.len(), 3);
        assert!(fields[0].parse::<u32>().unwrap() >= 1);
    }

    #[test]
    fn escapes_backslash_before_colon() {
        assert_eq!(escape_filter_path(r"C:\clips\a.srt"), r"C\:\\clips\\a.srt");
    }

    #[test]
    fn plain_paths_are_unchanged() {
        for path in ["/tmp/vidscribe-x/0001_a.mp4_subs.srt", "subs.srt", "with space/a b.srt"] {
            assert_eq!(escape_filter_path(path), path);
        }
    }

    #[test]
    fn renders_cues_in_given_order() {
        let transcript = Transcript {
            language: "en".to_string(),
            segments: vec![
                segment(2.5, 4.0, "second line"),
                segment(0.0, 1.25, "first line"),
            ],
        };

        assert_eq!(
            render_cues(&transcript),
            "1\n00:00:02,500 --> 00:00:04,000\n- second line\n\n\
             2\n00:00:00,000 --> 00:00:01,250\n- first line\n\n"
        );
    }

    #[test]
    fn cue_text_is_written_unchanged() {
        let transcript = Transcript {
            language: "en".to_string(),
            segments: vec![segment(0.0, 1.0, "  spaced out ")],
        };

        assert_eq!(
            render_cues(&transcript),
            "1\n00:00:00,000 --> 00:00:01,000\n-   spaced out \n\n"
        );
    }

    #[test]
    fn empty_transcript_renders_nothing() {
        let transcript = Transcript {
            language: "en".to_string(),
            segments: Vec::new(),
        };
        assert_eq!(render_cues(&transcript), "");
    }

    #[tokio::test]
    async fn write_overwrites_and_exposes_filter_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0000_a.mp4_subs.srt");
        std::fs::write(&path, "stale").unwrap();

        let transcript = Transcript {
            language: "en".to_string(),
            segments: vec![segment(0.0, 1.0, "hi")],
        };
        let file = SubtitleFile::write(&transcript, &path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), file.content);
        assert!(file.content.starts_with("1\n00:00:00,000 --> 00:00:01,000\n- hi"));
        assert_eq!(file.filter_path(), escape_filter_path(&path.to_string_lossy()));
    }
}
