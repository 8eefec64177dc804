use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// How much of ffmpeg's stderr to report when it fails.
const STDERR_TAIL_BYTES: u64 = 2000;

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    /// When set, `-b:v` is used instead of `-crf`.
    pub bitrate: Option<String>,
}

/// Raw RGBA frames in on stdin, audio muxed from the source track.
///
/// stderr goes to an anonymous temp file rather than a pipe so a chatty
/// ffmpeg can never block on a full pipe while we are writing frames.
pub struct FfmpegEncoder {
    child: Child,
    stderr: File,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &EncodeSettings) -> Result<Self> {
        let stderr = tempfile::tempfile().context("Failed to create ffmpeg log file")?;
        let stderr_handle = stderr.try_clone().context("Failed to share ffmpeg log file")?;

        let child = Command::new("ffmpeg")
            .args(ffmpeg_args(output_path, input_audio, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child,
            stderr,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let status = self.child.wait().context("Failed to wait for ffmpeg")?;
        if !status.success() {
            let tail = read_tail(&mut self.stderr, STDERR_TAIL_BYTES).unwrap_or_default();
            anyhow::bail!("FFmpeg exited with {}:\n{}", status, tail);
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames_written);
        Ok(())
    }
}

pub fn ffmpeg_args(
    output_path: &Path,
    input_audio: &Path,
    settings: &EncodeSettings,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height).into(),
        "-framerate".into(), settings.fps.to_string().into(),
        "-i".into(), "pipe:0".into(),
        "-i".into(), input_audio.as_os_str().to_owned(),
        "-c:v".into(), settings.codec.clone().into(),
        "-pix_fmt".into(), settings.pix_fmt.clone().into(),
    ];

    match &settings.bitrate {
        Some(br) => args.extend(["-b:v".into(), br.into()]),
        None => args.extend([
            "-crf".into(),
            settings.crf.to_string().into(),
            "-preset".into(),
            "medium".into(),
        ]),
    }

    for arg in ["-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart", "-shortest"] {
        args.push(arg.into());
    }
    args.push(output_path.as_os_str().to_owned());
    args
}

fn read_tail(file: &mut File, max: u64) -> std::io::Result<String> {
    let len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(len.saturating_sub(max)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncodeSettings {
        EncodeSettings {
            width: 1280,
            height: 720,
            fps: 30,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 21,
            bitrate: None,
        }
    }

    fn joined(args: &[OsString]) -> String {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn crf_mode_args() {
        let args = joined(&ffmpeg_args(Path::new("out.mp4"), Path::new("song.wav"), &settings()));
        assert!(args.starts_with("-y -f rawvideo -pixel_format rgba -video_size 1280x720 -framerate 30 -i pipe:0 -i song.wav"));
        assert!(args.contains("-crf 21 -preset medium"));
        assert!(args.contains("-movflags +faststart -shortest"));
        assert!(args.ends_with("out.mp4"));
    }

    #[test]
    fn bitrate_replaces_crf() {
        let mut s = settings();
        s.bitrate = Some("5M".into());
        let args = joined(&ffmpeg_args(Path::new("o.mp4"), Path::new("a.mp3"), &s));
        assert!(args.contains("-b:v 5M"));
        assert!(!args.contains("-crf"));
    }

    #[test]
    fn tail_reads_last_bytes() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        assert_eq!(read_tail(&mut file, 4).unwrap(), "6789");
        assert_eq!(read_tail(&mut file, 100).unwrap(), "0123456789");
    }
}
