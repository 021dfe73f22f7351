use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::batch::{BatchCoordinator, BatchResult};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::error::Result;
use crate::media::MediaProcessorTrait;
use crate::pipeline::{Destination, PipelineSettings, VideoPipeline};
use crate::resolver::PathResolver;
use crate::transcribe::{ModelVariant, TranscriberTrait};
use crate::workspace::Workspace;

/// What one invocation produced.
#[derive(Debug)]
pub struct RunReport {
    pub directory_mode: bool,
    pub result: BatchResult,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self) -> String {
        self.result.summary(self.elapsed)
    }
}

pub struct Workflow {
    config: Config,
    media: Arc<dyn MediaProcessorTrait>,
    transcriber: Arc<dyn TranscriberTrait>,
    show_progress: bool,
}

impl Workflow {
    pub fn new(
        config: Config,
        media: Arc<dyn MediaProcessorTrait>,
        transcriber: Arc<dyn TranscriberTrait>,
    ) -> Self {
        Self {
            config,
            media,
            transcriber,
            show_progress: false,
        }
    }

    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Process a single video or every supported video under a directory.
    ///
    /// In single-file mode a failed task is returned as `VidscribeError::Task`;
    /// in directory mode failures are collected in the report.
    pub async fn run<P: AsRef<Path>>(
        &self,
        input: P,
        model: ModelVariant,
        cancel: CancelSignal,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let input = input.as_ref();

        let job = PathResolver::from_config(&self.config.batch).resolve(input)?;
        if job.directory_mode {
            info!("Found {} videos under {}", job.len(), job.root.display());
        } else {
            info!("Processing single file: {}", input.display());
        }

        let workspace = Workspace::create(self.config.batch.workspace_root.as_deref())?;
        let settings = self.pipeline_settings(model, &job.root);
        let pipeline = Arc::new(VideoPipeline::new(
            Arc::clone(&self.media),
            Arc::clone(&self.transcriber),
            workspace.path().to_path_buf(),
            settings,
            cancel,
        ));

        let mut result = BatchCoordinator::new(pipeline, self.config.batch.max_concurrent)
            .cancel_on_fatal(self.config.batch.cancel_on_fatal)
            .show_progress(self.show_progress && job.directory_mode)
            .run(&job)
            .await;

        if let Err(e) = workspace.close() {
            warn!("Workspace cleanup failed: {}", e);
        }

        if !job.directory_mode {
            if let Some(failure) = result.failures.pop() {
                return Err(failure.into_error());
            }
        }

        Ok(RunReport {
            directory_mode: job.directory_mode,
            result,
            elapsed: started.elapsed(),
        })
    }

    fn pipeline_settings(&self, model: ModelVariant, input_root: &Path) -> PipelineSettings {
        let destination = match &self.config.batch.output_dir {
            Some(output_root) => Destination::Directory {
                output_root: output_root.clone(),
                input_root: input_root.to_path_buf(),
            },
            None => Destination::AlongsideSource,
        };

        PipelineSettings {
            model,
            output_prefix: self.config.batch.output_prefix.clone(),
            audio_extension: self.config.media.audio_extension.clone(),
            stage_timeout: self.config.batch.stage_timeout(),
            destination,
        }
    }
}
