use clap::Parser;
use std::path::PathBuf;

use crate::transcribe::ModelVariant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video file or directory of videos to transcribe
    #[arg(short, long)]
    pub input: PathBuf,

    /// Transcription model: flash or pro
    #[arg(short, long, default_value = "flash")]
    pub model: ModelVariant,

    /// Write results here instead of next to each source video
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of videos processed at the same time
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
