// Transcription service abstraction
//
// The pipeline only sees `TranscriberTrait`; the Gemini implementation lives
// in `gemini`. Every implementation must hand back a validated `Transcript`.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub use gemini::GeminiTranscriber;

use crate::config::TranscriberConfig;
use crate::error::{Result, VidscribeError};

/// One transcribed unit, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Transcription result. Segment order is presentation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// Parse a service payload of the shape
    /// `{language, segments: [{start, end, text}]}`; every field is required.
    pub fn from_json(payload: &str) -> Result<Self> {
        let transcript: Transcript = serde_json::from_str(payload).map_err(|e| {
            VidscribeError::Transcription(format!(
                "response does not match the transcript schema: {}",
                e
            ))
        })?;
        transcript.validate()?;
        Ok(transcript)
    }

    pub fn validate(&self) -> Result<()> {
        for (index, segment) in self.segments.iter().enumerate() {
            if !segment.start.is_finite() || !segment.end.is_finite() {
                return Err(VidscribeError::Transcription(format!(
                    "segment {} has a non-finite timestamp",
                    index + 1
                )));
            }
            if segment.start < 0.0 || segment.start > segment.end {
                return Err(VidscribeError::Transcription(format!(
                    "segment {} has an invalid time range {} -> {}",
                    index + 1,
                    segment.start,
                    segment.end
                )));
            }
        }
        Ok(())
    }
}

/// Which model tier to transcribe with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Faster and cheaper
    #[default]
    Flash,
    Pro,
}

impl ModelVariant {
    pub fn model_id<'a>(&self, config: &'a TranscriberConfig) -> &'a str {
        match self {
            ModelVariant::Flash => &config.flash_model,
            ModelVariant::Pro => &config.pro_model,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Flash => write!(f, "flash"),
            ModelVariant::Pro => write!(f, "pro"),
        }
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flash" => Ok(ModelVariant::Flash),
            "pro" => Ok(ModelVariant::Pro),
            _ => Err(format!("{} is not a valid model. Valid models: flash, pro", s)),
        }
    }
}

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriberTrait: Send + Sync {
    /// Transcribe an audio file into timed segments
    async fn transcribe(&self, audio_path: &Path, model: ModelVariant) -> Result<Transcript>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_default(
        config: TranscriberConfig,
        api_key: String,
    ) -> Result<Arc<dyn TranscriberTrait>> {
        Ok(Arc::new(GeminiTranscriber::new(config, api_key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schema_conforming_payload() {
        let transcript = Transcript::from_json(
            r#"{"language":"en","segments":[{"start":0.0,"end":1.5,"text":"hello"},{"start":1.5,"end":3,"text":"world"}]}"#,
        )
        .unwrap();

        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].end, 3.0);
    }

    #[test]
    fn missing_segment_field_is_a_schema_violation() {
        let err = Transcript::from_json(
            r#"{"language":"en","segments":[{"start":0.0,"text":"no end"}]}"#,
        )
        .unwrap_err();

        match err {
            VidscribeError::Transcription(message) => assert!(message.contains("end")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_language_is_a_schema_violation() {
        assert!(Transcript::from_json(r#"{"segments":[]}"#).is_err());
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = Transcript::from_json(
            r#"{"language":"en","segments":[{"start":4.0,"end":2.0,"text":"backwards"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, VidscribeError::Transcription(_)));
    }

    #[test]
    fn unsorted_segments_are_kept_in_given_order() {
        let transcript = Transcript::from_json(
            r#"{"language":"ja","segments":[{"start":5,"end":6,"text":"b"},{"start":1,"end":2,"text":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(transcript.segments[0].text, "b");
    }

    #[test]
    fn model_variant_parsing() {
        assert_eq!("flash".parse::<ModelVariant>().unwrap(), ModelVariant::Flash);
        assert_eq!("PRO".parse::<ModelVariant>().unwrap(), ModelVariant::Pro);
        assert!("ultra".parse::<ModelVariant>().is_err());
        assert_eq!(ModelVariant::default(), ModelVariant::Flash);

        let config = TranscriberConfig::default();
        assert_eq!(ModelVariant::Pro.model_id(&config), "gemini-3-pro-preview");
        assert_eq!(ModelVariant::Flash.to_string(), "flash");
    }
}
