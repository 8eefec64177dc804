//! Batch path: every frame index becomes a timestamp, every timestamp a pure
//! evaluation against the analysis, every evaluation one drawn frame.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Write;

use super::backend::GpuBackend;
use crate::analysis::AudioAnalysis;
use crate::encode::ffmpeg::FfmpegEncoder;
use crate::shader::pipeline::{ShaderBackend, ShaderPipeline};
use crate::sync::state::{evaluate_frame, SeriesFeatures, VisualState};
use crate::trace::{TraceRecord, TraceWriter};

/// `floor(duration * fps)`; zero for a degenerate duration or rate.
pub fn total_frames(duration: f64, fps: u32) -> u64 {
    if fps == 0 || !duration.is_finite() || duration <= 0.0 {
        return 0;
    }
    (duration * fps as f64).floor() as u64
}

pub fn frame_time(index: u64, fps: u32) -> f64 {
    if fps == 0 {
        return 0.0;
    }
    index as f64 / fps as f64
}

/// Evaluates every frame's state. Frames share nothing but the read-only
/// analysis, so they are computed in parallel.
pub fn plan_states(analysis: &AudioAnalysis, fps: u32) -> Vec<VisualState> {
    let frames = total_frames(analysis.duration, fps);
    (0..frames)
        .into_par_iter()
        .map(|index| {
            let mut source = SeriesFeatures::new(&analysis.features);
            evaluate_frame(
                frame_time(index, fps),
                &mut source,
                &analysis.timeline,
                analysis.duration,
            )
        })
        .collect()
}

/// Draws `states` in order through `pipeline`, handing each finished frame
/// to `on_frame` (readback, encode, trace).
pub fn render_frames<B, F>(
    pipeline: &mut ShaderPipeline<B>,
    states: &[VisualState],
    mut on_frame: F,
) -> Result<()>
where
    B: ShaderBackend,
    F: FnMut(u64, &VisualState, &mut ShaderPipeline<B>) -> Result<()>,
{
    for (index, state) in states.iter().enumerate() {
        pipeline.update(state)?;
        on_frame(index as u64, state, pipeline)?;
    }
    Ok(())
}

/// Renders the whole track and streams it into `encoder`.
pub fn render_video<W: Write>(
    analysis: &AudioAnalysis,
    pipeline: &mut ShaderPipeline<GpuBackend>,
    fps: u32,
    encoder: &mut FfmpegEncoder,
    mut trace: Option<&mut TraceWriter<W>>,
) -> Result<()> {
    log::info!("Planning frames...");
    let states = plan_states(analysis, fps);
    log::info!("{} frames ({:.1}s @ {}fps)", states.len(), analysis.duration, fps);

    let pb = ProgressBar::new(states.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    render_frames(pipeline, &states, |index, state, pipeline| {
        let pixels = pipeline.backend().read_pixels()?;
        encoder.write_frame(&pixels)?;
        if let Some(trace) = trace.as_deref_mut() {
            let record = TraceRecord::new(index, state, pipeline.uniforms())
                .with_hpss(analysis.features.hpss_at(state.time));
            trace.write(&record)?;
        }
        pb.set_position(index + 1);
        Ok(())
    })?;

    pb.finish_with_message("Rendering complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_floors() {
        assert_eq!(total_frames(10.0, 30), 300);
        assert_eq!(total_frames(1.99, 30), 59);
        assert_eq!(total_frames(0.0, 30), 0);
        assert_eq!(total_frames(f64::NAN, 30), 0);
        assert_eq!(total_frames(5.0, 0), 0);
    }

    #[test]
    fn frame_times_are_index_over_rate() {
        assert_eq!(frame_time(0, 30), 0.0);
        assert_eq!(frame_time(15, 30), 0.5);
        assert_eq!(frame_time(45, 30), 1.5);
    }

    #[test]
    fn planned_states_follow_timeline() {
        let analysis = AudioAnalysis::from_json(
            r#"{"metadata": {"duration": 2.0},
                "rhythm": {"beats": [0.0, 0.5, 1.0, 1.5]},
                "spectral": {"times": [0.0, 2.0], "rms": [0.0, 1.0]}}"#,
        )
        .unwrap();
        let states = plan_states(&analysis, 10);
        assert_eq!(states.len(), 20);
        assert_eq!(states[5].beat.beat_index, 1);
        assert_eq!(states[5].beat.intensity, 1.0);
        assert!(!states[6].beat.is_on_beat);
        assert!((states[10].bands.loudness - 0.5).abs() < 1e-6);
        for (i, state) in states.iter().enumerate() {
            assert_eq!(state.time, frame_time(i as u64, 10));
        }
    }
}
