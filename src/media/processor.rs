use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{MediaCommandBuilder, MediaProcessorTrait};
use crate::config::MediaConfig;
use crate::error::{Result, VidscribeError};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(video_path, audio_path);
        command.execute().await?;

        debug!("Audio extraction completed for {}", video_path.display());
        Ok(())
    }

    async fn burn_subtitles(
        &self,
        video_path: &Path,
        filter_path: &str,
        output_path: &Path,
    ) -> Result<()> {
        info!("Burning subtitles into {} -> {}", video_path.display(), output_path.display());

        let command = self.command_builder.burn_subtitles(
            video_path,
            filter_path,
            output_path,
            &self.config.burn_options,
        );
        command.execute().await?;

        debug!("Subtitle burn completed for {}", video_path.display());
        Ok(())
    }

    /// Runs `<binary> -version` and returns the first line of its output
    async fn check_availability(&self) -> Result<String> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                VidscribeError::Setup(format!(
                    "{} is required but was not found ({}).\n\n\
                     Install it with:\n  \
                     macOS:    brew install ffmpeg\n  \
                     Ubuntu:   sudo apt install ffmpeg\n  \
                     Arch:     sudo pacman -S ffmpeg\n  \
                     Windows:  winget install ffmpeg",
                    self.config.binary_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidscribeError::Setup(format!(
                "{} version check failed: {}",
                self.config.binary_path, stderr
            )));
        }

        let version_info = String::from_utf8_lossy(&output.stdout);
        let first_line = version_info.lines().next().unwrap_or("Unknown version");
        info!("Media processor is available: {}", first_line);
        Ok(first_line.to_string())
    }
}
