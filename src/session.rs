//! Interactive path.
//!
//! A session owns the live analyser graph (created on first use, torn down
//! with the session) and the shader pipeline. Each tick reads the playback
//! position, samples the graph once, evaluates, and draws one frame.

use anyhow::Result;

use crate::analysis::AudioAnalysis;
use crate::audio::bands::EnergyBands;
use crate::audio::graph::{AnalyserSettings, AudioGraph};
use crate::audio::sampler::FrequencySampler;
use crate::shader::compile::ShaderError;
use crate::shader::pipeline::{ShaderBackend, ShaderOutcome, ShaderPipeline};
use crate::sync::state::{evaluate, evaluate_frame, LiveFeatures, VisualState};

/// Read-only view of the audio transport.
pub trait PlaybackClock {
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
}

/// A transport that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct SimulatedClock {
    position: f64,
    playing: bool,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn seek(&mut self, position: f64) {
        self.position = position.max(0.0);
    }

    /// Moves forward by `dt` seconds while playing.
    pub fn advance(&mut self, dt: f64) {
        if self.playing && dt.is_finite() && dt > 0.0 {
            self.position += dt;
        }
    }
}

impl PlaybackClock for SimulatedClock {
    fn position(&self) -> f64 {
        self.position
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

pub struct PreviewSession<B: ShaderBackend> {
    analysis: AudioAnalysis,
    pipeline: ShaderPipeline<B>,
    settings: AnalyserSettings,
    graph: Option<AudioGraph>,
    sampler: FrequencySampler,
}

impl<B: ShaderBackend> PreviewSession<B> {
    pub fn new(
        analysis: AudioAnalysis,
        pipeline: ShaderPipeline<B>,
        settings: AnalyserSettings,
    ) -> Self {
        Self {
            analysis,
            pipeline,
            settings,
            graph: None,
            sampler: FrequencySampler::new(),
        }
    }

    /// The live graph, created and connected on first use. A change of
    /// sample rate replaces it.
    pub fn audio_graph(&mut self, sample_rate: u32) -> &mut AudioGraph {
        if let Some(graph) = self.graph.take_if(|g| g.sample_rate() != sample_rate) {
            log::debug!(
                "Sample rate changed from {}Hz to {}Hz",
                graph.sample_rate(),
                sample_rate
            );
            graph.teardown();
            self.sampler.reset();
        }
        let settings = self.settings;
        self.graph.get_or_insert_with(|| {
            log::debug!("Creating audio graph at {}Hz", sample_rate);
            let mut graph = AudioGraph::init(settings, sample_rate);
            graph.connect();
            graph
        })
    }

    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Hands freshly played samples to the graph.
    pub fn feed(&mut self, samples: &[f32], sample_rate: u32) {
        self.audio_graph(sample_rate).push_samples(samples);
    }

    /// One animation tick. While paused the last reading is reused, so the
    /// image holds still instead of drifting with stale buffers.
    pub fn tick(&mut self, clock: &dyn PlaybackClock) -> Result<VisualState> {
        let time = clock.position();
        let timeline = &self.analysis.timeline;
        let duration = self.analysis.duration;

        let state = if clock.is_playing() {
            let mut source = LiveFeatures::new(&mut self.sampler, self.graph.as_mut());
            evaluate_frame(time, &mut source, timeline, duration)
        } else {
            let bands = self.sampler.last().unwrap_or(EnergyBands::NEUTRAL);
            evaluate(time, bands, timeline, duration)
        };

        self.pipeline.update(&state)?;
        Ok(state)
    }

    pub fn set_shader_source(
        &mut self,
        source: Option<&str>,
    ) -> Result<ShaderOutcome, ShaderError> {
        self.pipeline.set_shader_source(source)
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.pipeline.set_resolution(width, height);
    }

    pub fn analysis(&self) -> &AudioAnalysis {
        &self.analysis
    }

    pub fn pipeline(&self) -> &ShaderPipeline<B> {
        &self.pipeline
    }

    /// Ends the session, releasing the graph. The pipeline is handed back.
    pub fn teardown(mut self) -> ShaderPipeline<B> {
        if let Some(graph) = self.graph.take() {
            graph.teardown();
        }
        self.sampler.reset();
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::compile::CompiledModule;
    use crate::shader::pipeline::PipelineState;
    use crate::shader::uniforms::FrameUniforms;

    #[derive(Default)]
    struct CountingBackend {
        builds: usize,
        draws: usize,
        viewport: (u32, u32),
        last: Option<FrameUniforms>,
    }

    impl ShaderBackend for CountingBackend {
        type Program = ();

        fn create_program(&mut self, _compiled: &CompiledModule) -> Result<(), ShaderError> {
            self.builds += 1;
            Ok(())
        }

        fn set_viewport(&mut self, width: u32, height: u32) {
            self.viewport = (width, height);
        }

        fn draw(&mut self, _program: &(), uniforms: &FrameUniforms) -> Result<()> {
            self.draws += 1;
            self.last = Some(*uniforms);
            Ok(())
        }
    }

    fn session() -> PreviewSession<CountingBackend> {
        let analysis = AudioAnalysis::from_json(
            r#"{"metadata": {"duration": 4.0}, "rhythm": {"beats": [1.0, 2.0]}}"#,
        )
        .unwrap();
        let pipeline = ShaderPipeline::new(CountingBackend::default(), 64, 64);
        PreviewSession::new(analysis, pipeline, AnalyserSettings::default())
    }

    #[test]
    fn tick_before_audio_is_neutral() {
        let mut session = session();
        let mut clock = SimulatedClock::new();
        clock.play();
        clock.advance(1.0);

        let state = session.tick(&clock).unwrap();
        assert!(!session.has_graph());
        assert_eq!(state.bands.loudness, 0.0);
        assert_eq!(state.bands.spectral_centroid, 0.5);
        assert_eq!(state.beat.beat_index, 0);
        assert_eq!(session.pipeline().backend().draws, 1);
    }

    #[test]
    fn graph_is_created_lazily_and_read_per_tick() {
        let mut session = session();
        let mut clock = SimulatedClock::new();
        clock.play();

        session.feed(&vec![0.5; 4096], 44_100);
        assert!(session.has_graph());
        let state = session.tick(&clock).unwrap();
        assert!(state.bands.loudness > 0.4);
    }

    #[test]
    fn paused_clock_freezes_features_and_time() {
        let mut session = session();
        let mut clock = SimulatedClock::new();
        clock.play();
        session.feed(&vec![0.5; 4096], 44_100);
        let playing = session.tick(&clock).unwrap();

        clock.pause();
        clock.advance(1.0);
        session.feed(&vec![0.0; 4096], 44_100);
        let paused = session.tick(&clock).unwrap();
        assert_eq!(paused.time, playing.time);
        assert_eq!(paused.bands, playing.bands);
    }

    #[test]
    fn teardown_releases_graph() {
        let mut session = session();
        session.feed(&[0.1; 128], 22_050);
        let pipeline = session.teardown();
        assert_eq!(pipeline.backend().draws, 0);
    }

    #[test]
    fn new_sample_rate_replaces_graph() {
        let mut session = session();
        session.feed(&[0.1; 128], 22_050);
        assert_eq!(session.audio_graph(22_050).sample_rate(), 22_050);

        session.feed(&[0.1; 128], 48_000);
        assert_eq!(session.audio_graph(48_000).sample_rate(), 48_000);
    }

    #[test]
    fn resize_reaches_uniforms_without_rebuilding() {
        let mut session = session();
        let mut clock = SimulatedClock::new();
        clock.play();
        session.tick(&clock).unwrap();

        session.set_resolution(1920, 1080);
        session.tick(&clock).unwrap();

        let backend = session.pipeline().backend();
        assert_eq!(backend.viewport, (1920, 1080));
        assert_eq!(backend.last.map(|u| u.resolution), Some([1920.0, 1080.0]));
        assert_eq!(session.pipeline().state(), PipelineState::Fallback);
        assert_eq!(backend.builds, 1);
        assert_eq!(backend.draws, 2);
    }
}
