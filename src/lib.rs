//! vidscribe - batch video transcription with burned-in subtitles
//!
//! Turns a video, or a directory of videos, into copies with subtitles
//! rendered into the frames, using ffmpeg for media work and Gemini for
//! speech-to-text.

pub mod batch;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod resolver;
pub mod setup;
pub mod subtitle;
pub mod transcribe;
pub mod workflow;
pub mod workspace;
