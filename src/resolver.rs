//! Input path resolution.
//!
//! Turns the `--input` argument into the ordered list of videos a batch will
//! process. Directories are walked recursively; results are sorted by path so
//! the same tree always yields the same job.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::BatchConfig;
use crate::error::{Result, VidscribeError};

#[derive(Debug, Clone)]
pub struct PathResolver {
    extensions: Vec<String>,
    skip_prefix: Option<String>,
}

/// The resolved, immutable set of videos for one invocation.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub root: PathBuf,
    pub sources: Vec<PathBuf>,
    pub directory_mode: bool,
}

impl BatchJob {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl PathResolver {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            skip_prefix: None,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        let resolver = Self::new(&config.supported_extensions);
        if config.skip_processed {
            resolver.skip_prefix(config.output_prefix.clone())
        } else {
            resolver
        }
    }

    /// Ignore files whose name starts with `prefix` while walking directories,
    /// so re-running over a directory does not transcribe its own outputs.
    pub fn skip_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.skip_prefix = Some(prefix.into());
        self
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|known| *known == ext.to_lowercase()))
            .unwrap_or(false)
    }

    fn is_processed_output(&self, path: &Path) -> bool {
        match (&self.skip_prefix, path.file_name().and_then(|n| n.to_str())) {
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            _ => false,
        }
    }

    pub fn resolve<P: AsRef<Path>>(&self, input: P) -> Result<BatchJob> {
        let input = input.as_ref();
        let metadata = std::fs::metadata(input).map_err(|e| VidscribeError::Path {
            path: input.to_path_buf(),
            message: e.to_string(),
        })?;

        if metadata.is_dir() {
            let sources = self.walk(input)?;
            info!("Found {} video files under {}", sources.len(), input.display());
            return Ok(BatchJob {
                root: input.to_path_buf(),
                sources,
                directory_mode: true,
            });
        }

        if !self.is_supported(input) {
            return Err(VidscribeError::UnsupportedFormat(format!(
                "{} (supported: {})",
                input.display(),
                self.extensions.join(", ")
            )));
        }

        Ok(BatchJob {
            root: input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            sources: vec![input.to_path_buf()],
            directory_mode: false,
        })
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut sources = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| VidscribeError::Path {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                message: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.is_supported(path) {
                continue;
            }
            if self.is_processed_output(path) {
                debug!("Skipping previously processed file {}", path.display());
                continue;
            }
            sources.push(path.to_path_buf());
        }

        sources.sort();
        Ok(sources)
    }
}
