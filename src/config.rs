use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VidscribeError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media: MediaConfig,
    pub transcriber: TranscriberConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Extra encoder arguments appended to the subtitle burn command
    /// Common options: ["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"]
    pub burn_options: Vec<String>,
    /// Container used for the extracted audio track
    pub audio_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Base URL of the Gemini API
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model id used for `--model flash`
    pub flash_model: String,
    /// Model id used for `--model pro`
    pub pro_model: String,
    /// Instruction sent alongside the uploaded audio
    pub prompt: String,
    pub request_timeout_secs: u64,
    /// How often to poll an uploaded file that is still being processed;
    /// 0 accepts only files that are active right after upload
    pub upload_poll_attempts: u32,
    pub upload_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Video extensions picked up by the resolver (compared lower-cased, without dot)
    pub supported_extensions: Vec<String>,
    /// Upper bound on videos processed at the same time
    pub max_concurrent: usize,
    /// Destination root; videos are placed next to their source when unset
    pub output_dir: Option<PathBuf>,
    pub output_prefix: String,
    /// Skip files that already carry the output prefix when walking a directory
    pub skip_processed: bool,
    /// Stop remaining videos once one fails with a rejected credential
    pub cancel_on_fatal: bool,
    /// Upper bound for each external stage call; unbounded when unset
    pub stage_timeout_secs: Option<u64>,
    /// Parent directory for the scratch workspace; the system temp dir when unset
    pub workspace_root: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            burn_options: vec![
                // Example encoding options users can customize:
                // "-preset".to_string(), "medium".to_string(),
                // "-crf".to_string(), "23".to_string(),
            ],
            audio_extension: "mp3".to_string(),
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            flash_model: "gemini-3-flash-preview".to_string(),
            pro_model: "gemini-3-pro-preview".to_string(),
            prompt: "Generate a transcript of the audio.".to_string(),
            request_timeout_secs: 300,
            upload_poll_attempts: 30,
            upload_poll_interval_ms: 2000,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            supported_extensions: ["mp4", "mov", "mkv", "webm", "avi"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_concurrent: 4,
            output_dir: None,
            output_prefix: "transcribed_".to_string(),
            skip_processed: true,
            cancel_on_fatal: true,
            stage_timeout_secs: None,
            workspace_root: None,
        }
    }
}

impl BatchConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidscribeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| VidscribeError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.max_concurrent == 0 {
            return Err(VidscribeError::Config(
                "batch.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.batch.supported_extensions.is_empty() {
            return Err(VidscribeError::Config(
                "batch.supported_extensions must not be empty".to_string(),
            ));
        }
        if self.batch.output_prefix.is_empty() {
            return Err(VidscribeError::Config(
                "batch.output_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
