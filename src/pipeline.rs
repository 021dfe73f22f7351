//! Per-video processing.
//!
//! A `VideoTask` walks `Pending → Extracting → Transcribing → Formatting →
//! Burning → Placing → Done`. The first failing stage ends the task; later
//! stages never run and nothing reaches the destination unless every earlier
//! stage succeeded.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{Result, VidscribeError};
use crate::media::MediaProcessorTrait;
use crate::subtitle::SubtitleFile;
use crate::transcribe::{ModelVariant, TranscriberTrait};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pending,
    Extracting,
    Transcribing,
    Formatting,
    Burning,
    Placing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "Pending",
            Stage::Extracting => "Extracting",
            Stage::Transcribing => "Transcribing",
            Stage::Formatting => "Formatting",
            Stage::Burning => "Burning",
            Stage::Placing => "Placing",
            Stage::Done => "Done",
        };
        f.write_str(name)
    }
}

impl Stage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Stage::Extracting,
            2 => Stage::Transcribing,
            3 => Stage::Formatting,
            4 => Stage::Burning,
            5 => Stage::Placing,
            6 => Stage::Done,
            _ => Stage::Pending,
        }
    }
}

/// Last stage a task entered, readable after the task itself is gone
/// (e.g. it panicked).
#[derive(Debug, Clone, Default)]
pub struct StageTracker(Arc<AtomicU8>);

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Stage {
        Stage::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::SeqCst);
    }
}

/// Where finished videos go.
#[derive(Debug, Clone, Default)]
pub enum Destination {
    /// Next to the source file
    #[default]
    AlongsideSource,
    /// Under `output_root`, mirroring the source's directory relative to `input_root`
    Directory {
        output_root: PathBuf,
        input_root: PathBuf,
    },
}

impl Destination {
    pub fn path_for(&self, source: &Path, file_name: &str) -> PathBuf {
        let source_dir = source.parent().unwrap_or_else(|| Path::new(""));
        match self {
            Destination::AlongsideSource => source_dir.join(file_name),
            Destination::Directory {
                output_root,
                input_root,
            } => {
                let relative = pathdiff::diff_paths(source_dir, input_root)
                    .filter(|rel| !rel.starts_with(".."))
                    .unwrap_or_default();
                output_root.join(relative).join(file_name)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: ModelVariant,
    pub output_prefix: String,
    pub audio_extension: String,
    pub stage_timeout: Option<Duration>,
    pub destination: Destination,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: ModelVariant::default(),
            output_prefix: "transcribed_".to_string(),
            audio_extension: "mp3".to_string(),
            stage_timeout: None,
            destination: Destination::default(),
        }
    }
}

/// Workspace and destination file names for one task.
///
/// Workspace names carry the task index and source basename so concurrent
/// tasks never write to the same file, even for equal basenames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub audio: String,
    pub subtitles: String,
    pub burned: String,
    pub output: String,
}

impl ArtifactNames {
    pub fn new(index: usize, source: &Path, settings: &PipelineSettings) -> Result<Self> {
        let basename = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                VidscribeError::Extraction(format!("{} has no file name", source.display()))
            })?;
        let namespace = format!("{:04}_{}", index, basename);
        let output = format!("{}{}", settings.output_prefix, basename);

        Ok(Self {
            audio: format!("{}_audio.{}", namespace, settings.audio_extension),
            subtitles: format!("{}_subs.srt", namespace),
            burned: format!("{}_{}", namespace, output),
            output,
        })
    }
}

/// One source video moving through the stages.
#[derive(Debug)]
pub struct VideoTask {
    pub index: usize,
    pub source: PathBuf,
    stage: Stage,
    tracker: StageTracker,
}

impl VideoTask {
    pub fn new(index: usize, source: PathBuf) -> Self {
        Self::tracked(index, source, StageTracker::new())
    }

    pub fn tracked(index: usize, source: PathBuf, tracker: StageTracker) -> Self {
        tracker.set(Stage::Pending);
        Self {
            index,
            source,
            stage: Stage::Pending,
            tracker,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug!("{}: {} -> {}", self.source.display(), self.stage, next);
        self.stage = next;
        self.tracker.set(next);
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    Done { output: PathBuf },
    Failed { stage: Stage, error: VidscribeError },
}

/// Terminal report of one task, sent to the coordinator exactly once.
#[derive(Debug)]
pub struct TaskReport {
    pub index: usize,
    pub source: PathBuf,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Done { .. })
    }

    /// Wrap a failure with its stage and source path.
    pub fn into_result(self) -> Result<PathBuf> {
        match self.outcome {
            TaskOutcome::Done { output } => Ok(output),
            TaskOutcome::Failed { stage, error } => Err(VidscribeError::Task {
                path: self.source,
                stage,
                source: Box::new(error),
            }),
        }
    }
}

pub struct VideoPipeline {
    media: Arc<dyn MediaProcessorTrait>,
    transcriber: Arc<dyn TranscriberTrait>,
    workspace: PathBuf,
    settings: PipelineSettings,
    cancel: CancelSignal,
}

impl VideoPipeline {
    pub fn new(
        media: Arc<dyn MediaProcessorTrait>,
        transcriber: Arc<dyn TranscriberTrait>,
        workspace: PathBuf,
        settings: PipelineSettings,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            media,
            transcriber,
            workspace,
            settings,
            cancel,
        }
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Drive one source to a terminal state.
    pub async fn run(&self, index: usize, source: PathBuf) -> TaskReport {
        self.run_tracked(index, source, StageTracker::new()).await
    }

    /// Like `run`, publishing every stage transition to `tracker`.
    pub async fn run_tracked(
        &self,
        index: usize,
        source: PathBuf,
        tracker: StageTracker,
    ) -> TaskReport {
        let mut task = VideoTask::tracked(index, source, tracker);

        let outcome = match self.drive(&mut task).await {
            Ok(output) => {
                task.advance(Stage::Done);
                info!("Finished {} -> {}", task.source.display(), output.display());
                TaskOutcome::Done { output }
            }
            Err(error) => {
                warn!("{} failed at {}: {}", task.source.display(), task.stage(), error);
                TaskOutcome::Failed {
                    stage: task.stage(),
                    error,
                }
            }
        };

        TaskReport {
            index: task.index,
            source: task.source,
            outcome,
        }
    }

    async fn drive(&self, task: &mut VideoTask) -> Result<PathBuf> {
        self.enter(task, Stage::Extracting)?;
        let names = ArtifactNames::new(task.index, &task.source, &self.settings)?;
        let audio_path = self.workspace.join(&names.audio);
        self.guarded(
            Stage::Extracting,
            self.media.extract_audio(&task.source, &audio_path),
        )
        .await?;

        self.enter(task, Stage::Transcribing)?;
        let transcript = self
            .guarded(
                Stage::Transcribing,
                self.transcriber.transcribe(&audio_path, self.settings.model),
            )
            .await?;

        self.enter(task, Stage::Formatting)?;
        let subtitles =
            SubtitleFile::write(&transcript, self.workspace.join(&names.subtitles)).await?;

        self.enter(task, Stage::Burning)?;
        let burned_path = self.workspace.join(&names.burned);
        let filter_path = subtitles.filter_path();
        self.guarded(
            Stage::Burning,
            self.media
                .burn_subtitles(&task.source, &filter_path, &burned_path),
        )
        .await?;

        self.enter(task, Stage::Placing)?;
        let destination = self
            .settings
            .destination
            .path_for(&task.source, &names.output);
        place(&burned_path, &destination).await?;

        Ok(destination)
    }

    fn enter(&self, task: &mut VideoTask, stage: Stage) -> Result<()> {
        task.advance(stage);
        self.cancel.checkpoint()
    }

    /// Run an external stage call, bounded by the stage timeout and
    /// abandoned as soon as the batch is cancelled.
    async fn guarded<T, F>(&self, stage: Stage, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.settings.stage_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(VidscribeError::TimedOut(format!("{} after {:?}", stage, limit))),
                },
                None => work.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = self.cancel.cancelled() => Err(self.cancel.error()),
        }
    }
}

/// Move a finished artifact to its destination, replacing an earlier result.
///
/// Falls back to copying through a hidden staging file when a rename is not
/// possible (e.g. the workspace is on another filesystem), so a failed copy
/// never leaves a truncated video at the destination.
pub async fn place(artifact: &Path, destination: &Path) -> Result<()> {
    let failed = |what: &str, e: std::io::Error| {
        VidscribeError::Placement(format!("{} {}: {}", what, destination.display(), e))
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| failed("Cannot create directory for", e))?;
    }

    match fs::symlink_metadata(destination).await {
        Ok(meta) if meta.is_dir() => {
            return Err(VidscribeError::Placement(format!(
                "{} is a directory",
                destination.display()
            )));
        }
        Ok(_) => fs::remove_file(destination)
            .await
            .map_err(|e| failed("Cannot replace", e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(failed("Cannot inspect", e)),
    }

    if let Err(e) = fs::rename(artifact, destination).await {
        debug!("Rename into {} failed ({}), copying instead", destination.display(), e);

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let staging = destination.with_file_name(format!(".{}.partial", file_name));

        if let Err(e) = fs::copy(artifact, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(failed("Cannot write", e));
        }
        if let Err(e) = fs::rename(&staging, destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(failed("Cannot write", e));
        }
        if let Err(e) = fs::remove_file(artifact).await {
            debug!("Leaving {} for workspace cleanup: {}", artifact.display(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaProcessorTrait;
    use crate::transcribe::{MockTranscriberTrait, Segment, Transcript};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn transcript() -> Transcript {
        Transcript {
            language: "en".to_string(),
            segments: vec![Segment {
                start: 0.0,
                end: 1.5,
                text: "hello".to_string(),
            }],
        }
    }

    fn working_media() -> MockMediaProcessorTrait {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().returning(|_, audio| {
            std::fs::write(audio, b"audio")?;
            Ok(())
        });
        media.expect_burn_subtitles().returning(|_, _, output| {
            std::fs::write(output, b"burned video")?;
            Ok(())
        });
        media
    }

    fn working_transcriber() -> MockTranscriberTrait {
        let mut transcriber = MockTranscriberTrait::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _| Ok(transcript()));
        transcriber
    }

    fn pipeline(
        media: impl MediaProcessorTrait + 'static,
        transcriber: impl TranscriberTrait + 'static,
        workspace: &Path,
        settings: PipelineSettings,
    ) -> VideoPipeline {
        VideoPipeline::new(
            Arc::new(media),
            Arc::new(transcriber),
            workspace.to_path_buf(),
            settings,
            CancelSignal::new(),
        )
    }

    fn source_in(dir: &Path, name: &str) -> PathBuf {
        let source = dir.join(name);
        std::fs::write(&source, b"source video").unwrap();
        source
    }

    #[test]
    fn tracker_follows_stage_transitions() {
        let tracker = StageTracker::new();
        let mut task = VideoTask::tracked(0, PathBuf::from("a.mp4"), tracker.clone());
        assert_eq!(tracker.get(), Stage::Pending);

        task.advance(Stage::Burning);
        assert_eq!(tracker.get(), Stage::Burning);
        task.advance(Stage::Done);
        assert_eq!(tracker.get(), Stage::Done);
    }

    #[test]
    fn artifact_names_are_namespaced() {
        let names =
            ArtifactNames::new(3, Path::new("/videos/talk.mp4"), &PipelineSettings::default())
                .unwrap();

        assert_eq!(names.audio, "0003_talk.mp4_audio.mp3");
        assert_eq!(names.subtitles, "0003_talk.mp4_subs.srt");
        assert_eq!(names.burned, "0003_talk.mp4_transcribed_talk.mp4");
        assert_eq!(names.output, "transcribed_talk.mp4");
    }

    #[test]
    fn destination_mirrors_relative_directory() {
        let destination = Destination::Directory {
            output_root: PathBuf::from("/out"),
            input_root: PathBuf::from("/videos"),
        };
        assert_eq!(
            destination.path_for(Path::new("/videos/day1/a.mp4"), "transcribed_a.mp4"),
            PathBuf::from("/out/day1/transcribed_a.mp4")
        );
        assert_eq!(
            destination.path_for(Path::new("/elsewhere/a.mp4"), "transcribed_a.mp4"),
            PathBuf::from("/out/transcribed_a.mp4")
        );
        assert_eq!(
            Destination::AlongsideSource.path_for(Path::new("/videos/a.mp4"), "transcribed_a.mp4"),
            PathBuf::from("/videos/transcribed_a.mp4")
        );
    }

    #[tokio::test]
    async fn happy_path_places_output_and_passes_escaped_subtitles() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_extract_audio()
            .withf(|_, audio| audio.file_name().unwrap() == "0000_a.mp4_audio.mp3")
            .times(1)
            .returning(|_, audio| {
                std::fs::write(audio, b"audio")?;
                Ok(())
            });
        media
            .expect_burn_subtitles()
            .withf(|_, filter_path, _| filter_path.ends_with("0000_a.mp4_subs.srt"))
            .times(1)
            .returning(|_, _, output| {
                std::fs::write(output, b"burned video")?;
                Ok(())
            });

        let pipeline = pipeline(
            media,
            working_transcriber(),
            workspace.path(),
            PipelineSettings::default(),
        );
        let report = pipeline.run(0, source.clone()).await;

        let output = report.into_result().unwrap();
        assert_eq!(output, videos.path().join("transcribed_a.mp4"));
        assert_eq!(std::fs::read(&output).unwrap(), b"burned video");
        let subs = std::fs::read_to_string(workspace.path().join("0000_a.mp4_subs.srt")).unwrap();
        assert_eq!(subs, "1\n00:00:00,000 --> 00:00:01,500\n- hello\n\n");
    }

    #[tokio::test]
    async fn extraction_failure_stops_before_transcription() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_extract_audio()
            .returning(|_, _| Err(VidscribeError::Extraction("exit status: 1".into())));
        media.expect_burn_subtitles().never();
        let mut transcriber = MockTranscriberTrait::new();
        transcriber.expect_transcribe().never();

        let report = pipeline(media, transcriber, workspace.path(), PipelineSettings::default())
            .run(0, source)
            .await;

        match report.outcome {
            TaskOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Extracting);
                assert!(matches!(error, VidscribeError::Extraction(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!videos.path().join("transcribed_a.mp4").exists());
    }

    #[tokio::test]
    async fn transcription_failure_never_burns_or_places() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().returning(|_, _| Ok(()));
        media.expect_burn_subtitles().never();
        let mut transcriber = MockTranscriberTrait::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _| Err(VidscribeError::Transcription("HTTP 500".into())));

        let report = pipeline(media, transcriber, workspace.path(), PipelineSettings::default())
            .run(0, source.clone())
            .await;

        let err = report.into_result().unwrap_err();
        match err {
            VidscribeError::Task { path, stage, .. } => {
                assert_eq!(path, source);
                assert_eq!(stage, Stage::Transcribing);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!videos.path().join("transcribed_a.mp4").exists());
    }

    #[tokio::test]
    async fn burn_failure_places_nothing() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().returning(|_, _| Ok(()));
        media.expect_burn_subtitles().returning(|_, _, output| {
            std::fs::write(output, b"half a video")?;
            Err(VidscribeError::Burn("exit status: 1".into()))
        });

        let report = pipeline(
            media,
            working_transcriber(),
            workspace.path(),
            PipelineSettings::default(),
        )
        .run(0, source)
        .await;

        assert!(matches!(
            report.outcome,
            TaskOutcome::Failed {
                stage: Stage::Burning,
                ..
            }
        ));
        assert!(!videos.path().join("transcribed_a.mp4").exists());
    }

    #[tokio::test]
    async fn rerun_replaces_previous_output() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");
        let pipeline = pipeline(
            working_media(),
            working_transcriber(),
            workspace.path(),
            PipelineSettings::default(),
        );

        let first = pipeline.run(0, source.clone()).await.into_result().unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        let second = pipeline.run(0, source).await.into_result().unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), first_bytes);
    }

    #[tokio::test]
    async fn cancelled_batch_skips_every_stage() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media.expect_extract_audio().never();
        let pipeline = pipeline(
            media,
            MockTranscriberTrait::new(),
            workspace.path(),
            PipelineSettings::default(),
        );
        pipeline.cancel_signal().cancel("interrupted");

        let report = pipeline.run(0, source).await;
        match report.outcome {
            TaskOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Extracting);
                assert!(matches!(error, VidscribeError::Cancelled(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    struct HangingTranscriber {
        started: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TranscriberTrait for HangingTranscriber {
        async fn transcribe(&self, _audio: &Path, _model: ModelVariant) -> Result<Transcript> {
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_hung_stage() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");
        let started = Arc::new(AtomicBool::new(false));

        let pipeline = Arc::new(pipeline(
            working_media(),
            HangingTranscriber {
                started: started.clone(),
            },
            workspace.path(),
            PipelineSettings::default(),
        ));

        let run = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(0, source).await })
        };
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        pipeline.cancel_signal().cancel("credential rejected");

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        match report.outcome {
            TaskOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Transcribing);
                assert!(error.to_string().contains("credential rejected"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stage_timeout_fails_the_stage() {
        let videos = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let source = source_in(videos.path(), "a.mp4");

        let settings = PipelineSettings {
            stage_timeout: Some(Duration::from_millis(20)),
            ..PipelineSettings::default()
        };
        let report = pipeline(
            working_media(),
            HangingTranscriber {
                started: Arc::new(AtomicBool::new(false)),
            },
            workspace.path(),
            settings,
        )
        .run(0, source)
        .await;

        match report.outcome {
            TaskOutcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Transcribing);
                assert!(matches!(error, VidscribeError::TimedOut(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn place_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("artifact.mp4");
        let destination = dir.path().join("out/transcribed_a.mp4");
        std::fs::write(&artifact, b"new").unwrap();
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, b"old").unwrap();

        place(&artifact, &destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn place_refuses_directory_destination() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("artifact.mp4");
        std::fs::write(&artifact, b"new").unwrap();
        let destination = dir.path().join("transcribed_a.mp4");
        std::fs::create_dir(&destination).unwrap();

        let err = place(&artifact, &destination).await.unwrap_err();
        assert!(matches!(err, VidscribeError::Placement(_)));
        assert!(artifact.exists());
    }
}
