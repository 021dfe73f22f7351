use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, VidscribeError};
use crate::media::MediaProcessorTrait;

/// Everything the run needs from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Startup checks that must pass before any video is touched.
pub struct SetupManager<'a> {
    config: &'a Config,
}

impl<'a> SetupManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Verify ffmpeg is runnable and the API key is present.
    pub async fn initialize(&self, media: &dyn MediaProcessorTrait) -> Result<Credentials> {
        info!("Checking for {}...", self.config.media.binary_path);
        let version = media.check_availability().await?;
        info!("Using {}", version);

        self.credentials_from(|name| std::env::var(name).ok())
    }

    fn credentials_from<F>(&self, lookup: F) -> Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = &self.config.transcriber.api_key_env;
        match lookup(name).map(|value| value.trim().to_string()) {
            Some(api_key) if !api_key.is_empty() => {
                debug!("Read API key from {}", name);
                Ok(Credentials { api_key })
            }
            _ => Err(VidscribeError::Setup(format!(
                "{} is not set.\n\n\
                 Create an API key at https://aistudio.google.com/apikey and export it:\n  \
                 export {}=<your key>",
                name, name
            ))),
        }
    }
}
