use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use beatshade::config::{
    DEFAULT_CODEC, DEFAULT_CRF, DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_PIX_FMT, DEFAULT_WIDTH,
};

#[derive(Parser, Debug)]
#[command(
    name = "beatshade",
    about = "Audio-driven shader visuals for live preview and video export"
)]
pub struct Cli {
    /// Config file (defaults to ./beatshade.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a video from an analysis file and the source track
    Render(RenderArgs),
    /// Drive the interactive path with a simulated playback clock
    Preview(PreviewArgs),
    /// Validate a shader file without a GPU
    Check(CheckArgs),
    /// List the built-in fallback shaders
    Fallbacks,
}

/// Inputs shared by `render` and `preview`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Source audio file (WAV, MP3, FLAC, OGG)
    pub audio: PathBuf,

    /// Analysis JSON produced for the track
    #[arg(short, long)]
    pub analysis: PathBuf,

    /// Fragment shader defining mainImage(out vec4, in vec2). Uses a fallback when omitted.
    #[arg(short, long)]
    pub shader: Option<PathBuf>,

    /// Keyword hint for picking the fallback shader
    #[arg(long)]
    pub description: Option<String>,

    /// Force a specific fallback shader by name
    #[arg(long)]
    pub fallback: Option<String>,

    /// Video width in pixels
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// Write a JSON-lines trace of every frame's uniforms
    #[arg(long)]
    pub trace: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub show: ShowArgs,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = DEFAULT_CRF)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = DEFAULT_CODEC)]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = DEFAULT_PIX_FMT)]
    pub pix_fmt: String,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub show: ShowArgs,

    /// Stop after this many seconds of playback
    #[arg(long)]
    pub seconds: Option<f64>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Shader file to validate
    pub shader: PathBuf,

    /// Print the wrapped source that was validated
    #[arg(long)]
    pub print_wrapped: bool,
}
