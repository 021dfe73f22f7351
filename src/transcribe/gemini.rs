// Gemini transcription backend
//
// Uploads the extracted audio through the Files API (resumable protocol),
// waits for the file to become ACTIVE, then asks `generateContent` for a JSON
// transcript constrained by a response schema. Nothing here retries.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ModelVariant, Transcript, TranscriberTrait};
use crate::config::TranscriberConfig;
use crate::error::{Result, VidscribeError};

/// File resource returned by the Files API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

pub struct GeminiTranscriber {
    client: Client,
    config: TranscriberConfig,
    api_key: String,
}

impl GeminiTranscriber {
    pub fn new(config: TranscriberConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vidscribe/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn upload(&self, audio_path: &Path) -> Result<UploadedFile> {
        let bytes = tokio::fs::read(audio_path).await.map_err(|e| {
            VidscribeError::Transcription(format!(
                "Failed to read audio {}: {}",
                audio_path.display(),
                e
            ))
        })?;
        let mime_type = audio_mime_type(audio_path);
        let display_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        debug!("Starting upload of {} ({} bytes)", display_name, bytes.len());

        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| request_failed("Upload start", e))?;
        let start = check_status(start, "Upload start").await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                VidscribeError::Transcription("Upload start returned no upload URL".to_string())
            })?;

        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| request_failed("Upload", e))?;
        let finish = check_status(finish, "Upload").await?;

        let uploaded: UploadResponse = finish.json().await.map_err(|e| {
            VidscribeError::Transcription(format!("Failed to parse upload response: {}", e))
        })?;

        debug!("Uploaded {} as {}", display_name, uploaded.file.name);
        Ok(uploaded.file)
    }

    /// Audio is usually ACTIVE straight away; larger files pass through
    /// PROCESSING first. The state is checked before every poll and after the
    /// last one, so `upload_poll_attempts = 0` only accepts an already active file.
    async fn wait_until_active(&self, mut file: UploadedFile) -> Result<UploadedFile> {
        let interval = Duration::from_millis(self.config.upload_poll_interval_ms);
        let mut polls = 0;

        loop {
            match file.state.as_deref() {
                None | Some("ACTIVE") => return Ok(file),
                Some("PROCESSING") | Some("STATE_UNSPECIFIED") => {}
                Some(other) => {
                    return Err(VidscribeError::Transcription(format!(
                        "Uploaded file {} entered state {}",
                        file.name, other
                    )));
                }
            }

            if polls >= self.config.upload_poll_attempts {
                return Err(VidscribeError::Transcription(format!(
                    "Uploaded file {} was still processing after {} checks",
                    file.name, polls
                )));
            }
            polls += 1;

            tokio::time::sleep(interval).await;
            let response = self
                .client
                .get(self.url(&format!("v1beta/{}", file.name)))
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
                .map_err(|e| request_failed("File status", e))?;
            let response = check_status(response, "File status").await?;
            file = response.json().await.map_err(|e| {
                VidscribeError::Transcription(format!("Failed to parse file status: {}", e))
            })?;
            debug!("{} is {:?} after {} checks", file.name, file.state, polls);
        }
    }

    async fn generate(&self, file: &UploadedFile, model: ModelVariant) -> Result<String> {
        let model_id = model.model_id(&self.config);
        let request = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": self.config.prompt },
                    { "fileData": { "mimeType": file.mime_type, "fileUri": file.uri } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": transcript_schema()
            }
        });

        debug!("Requesting transcript from {}", model_id);

        let response = self
            .client
            .post(self.url(&format!("v1beta/models/{}:generateContent", model_id)))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed("generateContent", e))?;
        let response = check_status(response, "generateContent").await?;

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            VidscribeError::Transcription(format!("Failed to parse generateContent response: {}", e))
        })?;

        response_text(body)
    }

    async fn delete(&self, file: &UploadedFile) {
        let result = self
            .client
            .delete(self.url(&format!("v1beta/{}", file.name)))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Deleted uploaded file {}", file.name)
            }
            Ok(response) => warn!(
                "Failed to delete uploaded file {}: HTTP {}",
                file.name,
                response.status()
            ),
            Err(e) => warn!("Failed to delete uploaded file {}: {}", file.name, e),
        }
    }
}

#[async_trait]
impl TranscriberTrait for GeminiTranscriber {
    async fn transcribe(&self, audio_path: &Path, model: ModelVariant) -> Result<Transcript> {
        info!("Transcribing {} with {}", audio_path.display(), model);

        let file = self.upload(audio_path).await?;
        let result = match self.wait_until_active(file.clone()).await {
            Ok(active) => self.generate(&active, model).await,
            Err(e) => Err(e),
        };
        self.delete(&file).await;

        let transcript = Transcript::from_json(&result?)?;
        info!(
            "Transcript for {}: language {}, {} segments",
            audio_path.display(),
            transcript.language,
            transcript.segments.len()
        );
        Ok(transcript)
    }
}

/// Response schema enforcing `{language, segments: [{start, end, text}]}`.
pub fn transcript_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "language": { "type": "STRING" },
            "segments": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "start": { "type": "NUMBER" },
                        "end": { "type": "NUMBER" },
                        "text": { "type": "STRING" }
                    },
                    "required": ["start", "end", "text"]
                }
            }
        },
        "required": ["language", "segments"]
    })
}

fn response_text(body: GenerateContentResponse) -> Result<String> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(VidscribeError::Transcription(
            "Empty transcript received".to_string(),
        ));
    }
    Ok(text)
}

fn audio_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") | Some("aac") => "audio/aac",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn request_failed(what: &str, e: reqwest::Error) -> VidscribeError {
    VidscribeError::Transcription(format!("{} request failed: {}", what, e))
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, what, &body))
}

fn status_error(status: StatusCode, what: &str, body: &str) -> VidscribeError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VidscribeError::Credential(format!("{} returned {}: {}", what, status, body))
        }
        _ => VidscribeError::Transcription(format!("{} returned {}: {}", what, status, body)),
    }
}
