// Media processing on top of the external ffmpeg binary
//
// - Commands: argument builders and async execution
// - Processor: the ffmpeg-backed `MediaProcessorTrait` implementation

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Extract the audio track, overwriting `audio_path` if it exists
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Render subtitles into the frames of `video_path`, writing `output_path`.
    /// `filter_path` is the subtitle file path, already filter-escaped.
    async fn burn_subtitles(
        &self,
        video_path: &Path,
        filter_path: &str,
        output_path: &Path,
    ) -> Result<()>;

    /// Check if media processor is available
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Arc<dyn MediaProcessorTrait> {
        Arc::new(processor::MediaProcessorImpl::new(config))
    }
}
