//! Shader Uniform Pipeline.
//!
//! Owns the current program and the uniform table. Callers talk to it
//! through two entry points only: [`ShaderPipeline::set_shader_source`] and
//! [`ShaderPipeline::update`]. Resizing goes through
//! [`ShaderPipeline::set_resolution`] and never recompiles.

use super::compile::{compile_fragment, CompiledModule, ShaderError};
use super::fallback::{default_fallback, FallbackShader};
use super::uniforms::FrameUniforms;
use crate::sync::state::VisualState;

/// Where validated modules become runnable programs and get drawn.
pub trait ShaderBackend {
    type Program;

    /// Builds a program. Driver-side failures surface here, once per build.
    fn create_program(&mut self, compiled: &CompiledModule) -> Result<Self::Program, ShaderError>;

    fn set_viewport(&mut self, width: u32, height: u32);

    fn draw(&mut self, program: &Self::Program, uniforms: &FrameUniforms) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uncompiled,
    Compiled,
    Fallback,
}

/// Result of a (re)build.
#[derive(Debug, PartialEq)]
pub enum ShaderOutcome {
    Compiled,
    /// `error` is `None` when no source was supplied at all.
    Fallback {
        name: &'static str,
        error: Option<ShaderError>,
    },
}

type ErrorSink = Box<dyn FnMut(&ShaderError)>;

pub struct ShaderPipeline<B: ShaderBackend> {
    backend: B,
    source: Option<String>,
    fallback: &'static FallbackShader,
    state: PipelineState,
    program: Option<B::Program>,
    uniforms: FrameUniforms,
    last_error: Option<ShaderError>,
    on_error: Option<ErrorSink>,
}

impl<B: ShaderBackend> ShaderPipeline<B> {
    pub fn new(mut backend: B, width: u32, height: u32) -> Self {
        backend.set_viewport(width, height);
        Self {
            backend,
            source: None,
            fallback: default_fallback(),
            state: PipelineState::Uncompiled,
            program: None,
            uniforms: FrameUniforms::new(width, height),
            last_error: None,
            on_error: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'static FallbackShader) -> Self {
        if !std::ptr::eq(self.fallback, fallback) {
            self.fallback = fallback;
            if self.state == PipelineState::Fallback {
                self.invalidate();
            }
        }
        self
    }

    /// Called once for every build failure, with the original error.
    pub fn on_error(mut self, sink: impl FnMut(&ShaderError) + 'static) -> Self {
        self.on_error = Some(Box::new(sink));
        self
    }

    /// Replaces the shader source and rebuilds.
    ///
    /// `None` selects the fallback. Supplying the text that is already
    /// bound is a no-op. A failed build installs the fallback and reports
    /// the error; only a fallback that itself fails to build is returned
    /// as `Err`.
    pub fn set_shader_source(
        &mut self,
        source: Option<&str>,
    ) -> Result<ShaderOutcome, ShaderError> {
        if self.state != PipelineState::Uncompiled && self.source.as_deref() == source {
            return Ok(self.current_outcome());
        }
        self.source = source.map(str::to_string);
        self.invalidate();
        self.rebuild()
    }

    /// Evaluated state in, one frame out. Builds lazily on first use.
    pub fn update(&mut self, state: &VisualState) -> anyhow::Result<()> {
        if self.state == PipelineState::Uncompiled {
            self.rebuild()?;
        }
        self.uniforms.apply(state);
        match &self.program {
            Some(program) => self.backend.draw(program, &self.uniforms),
            None => anyhow::bail!("shader pipeline has no program bound"),
        }
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.uniforms.set_resolution(width, height);
        self.backend.set_viewport(width, height);
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    pub fn last_error(&self) -> Option<&ShaderError> {
        self.last_error.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn invalidate(&mut self) {
        self.program = None;
        self.state = PipelineState::Uncompiled;
    }

    fn current_outcome(&self) -> ShaderOutcome {
        match self.state {
            PipelineState::Fallback => ShaderOutcome::Fallback {
                name: self.fallback.name,
                error: self.last_error.clone(),
            },
            _ => ShaderOutcome::Compiled,
        }
    }

    fn rebuild(&mut self) -> Result<ShaderOutcome, ShaderError> {
        let Some(source) = self.source.clone() else {
            self.last_error = None;
            log::info!("No shader source, using fallback '{}'", self.fallback.name);
            self.install_fallback()?;
            return Ok(ShaderOutcome::Fallback {
                name: self.fallback.name,
                error: None,
            });
        };

        let built = compile_fragment(&source)
            .and_then(|compiled| self.backend.create_program(&compiled));
        match built {
            Ok(program) => {
                self.program = Some(program);
                self.state = PipelineState::Compiled;
                self.last_error = None;
                log::debug!("Shader compiled");
                Ok(ShaderOutcome::Compiled)
            }
            Err(err) => {
                log::warn!("{}", err);
                log::info!("Falling back to '{}'", self.fallback.name);
                self.last_error = Some(err.clone());
                if let Some(sink) = self.on_error.as_mut() {
                    sink(&err);
                }
                self.install_fallback()?;
                Ok(ShaderOutcome::Fallback {
                    name: self.fallback.name,
                    error: Some(err),
                })
            }
        }
    }

    fn install_fallback(&mut self) -> Result<(), ShaderError> {
        let fallback = self.fallback;
        let program = compile_fragment(fallback.source)
            .and_then(|compiled| self.backend.create_program(&compiled))
            .map_err(|err| ShaderError::FallbackRejected {
                name: fallback.name.to_string(),
                source: Box::new(err),
            })?;
        self.program = Some(program);
        self.state = PipelineState::Fallback;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BeatTimeline;
    use crate::audio::bands::EnergyBands;
    use crate::shader::fallback;
    use crate::sync::state::evaluate;
    use std::cell::RefCell;
    use std::rc::Rc;

    const VALID: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    fragColor = vec4(u_bass, u_mid, u_treble, 1.0);
}";
    const INVALID: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) { fragColor = ; }";

    #[derive(Default)]
    struct RecordingBackend {
        programs_built: usize,
        draws: Vec<(usize, FrameUniforms)>,
        viewport: (u32, u32),
        reject_marker: Option<&'static str>,
    }

    impl ShaderBackend for RecordingBackend {
        type Program = usize;

        fn create_program(&mut self, compiled: &CompiledModule) -> Result<usize, ShaderError> {
            if let Some(marker) = self.reject_marker {
                if compiled.wrapped.contains(marker) {
                    return Err(ShaderError::Gpu(format!("driver refused {marker}")));
                }
            }
            self.programs_built += 1;
            Ok(self.programs_built)
        }

        fn set_viewport(&mut self, width: u32, height: u32) {
            self.viewport = (width, height);
        }

        fn draw(&mut self, program: &usize, uniforms: &FrameUniforms) -> anyhow::Result<()> {
            self.draws.push((*program, *uniforms));
            Ok(())
        }
    }

    type Errors = Rc<RefCell<Vec<ShaderError>>>;

    fn pipeline_with_errors(
        backend: RecordingBackend,
    ) -> (ShaderPipeline<RecordingBackend>, Errors) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let pipeline = ShaderPipeline::new(backend, 320, 180)
            .on_error(move |e| sink.borrow_mut().push(e.clone()));
        (pipeline, errors)
    }

    fn frame(time: f64) -> VisualState {
        let bands = EnergyBands {
            bass: 0.25,
            mid: 0.5,
            treble: 0.75,
            ..EnergyBands::NEUTRAL
        };
        evaluate(time, bands, &BeatTimeline::new(vec![0.0], vec![]), 10.0)
    }

    #[test]
    fn first_update_builds_lazily() {
        let (mut pipeline, errors) = pipeline_with_errors(RecordingBackend::default());
        assert_eq!(pipeline.state(), PipelineState::Uncompiled);

        pipeline.update(&frame(0.0)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Fallback);
        assert_eq!(pipeline.backend().programs_built, 1);
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn invalid_source_falls_back_and_reports_once() {
        let (mut pipeline, errors) = pipeline_with_errors(RecordingBackend::default());

        let outcome = pipeline.set_shader_source(Some(INVALID)).unwrap();
        assert!(matches!(
            outcome,
            ShaderOutcome::Fallback { name: "plasma", error: Some(ShaderError::Parse(_)) }
        ));
        assert_eq!(pipeline.state(), PipelineState::Fallback);
        assert_eq!(errors.borrow().len(), 1);

        for i in 0..5 {
            pipeline.update(&frame(i as f64 * 0.1)).unwrap();
        }
        pipeline.set_shader_source(Some(INVALID)).unwrap();
        assert_eq!(errors.borrow().len(), 1);
        assert!(pipeline.last_error().is_some());
    }

    #[test]
    fn valid_source_after_fallback_compiles() {
        let (mut pipeline, errors) = pipeline_with_errors(RecordingBackend::default());
        pipeline.set_shader_source(Some(INVALID)).unwrap();

        let outcome = pipeline.set_shader_source(Some(VALID)).unwrap();
        assert_eq!(outcome, ShaderOutcome::Compiled);
        assert_eq!(pipeline.state(), PipelineState::Compiled);
        assert!(pipeline.last_error().is_none());
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn clearing_source_selects_fallback_without_error() {
        let (mut pipeline, errors) = pipeline_with_errors(RecordingBackend::default());
        pipeline.set_shader_source(Some(VALID)).unwrap();

        let outcome = pipeline.set_shader_source(None).unwrap();
        assert_eq!(outcome, ShaderOutcome::Fallback { name: "plasma", error: None });
        assert_eq!(pipeline.state(), PipelineState::Fallback);
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn updates_do_not_rebuild() {
        let (mut pipeline, _) = pipeline_with_errors(RecordingBackend::default());
        pipeline.set_shader_source(Some(VALID)).unwrap();
        for i in 0..10 {
            pipeline.update(&frame(i as f64 / 30.0)).unwrap();
        }
        pipeline.set_shader_source(Some(VALID)).unwrap();

        let backend = pipeline.backend();
        assert_eq!(backend.programs_built, 1);
        assert_eq!(backend.draws.len(), 10);
        assert!(backend.draws.iter().all(|(program, _)| *program == 1));
        let (_, last) = backend.draws[9];
        assert_eq!(last.bass, 0.25);
        assert!((last.time - 0.3).abs() < 1e-6);
    }

    #[test]
    fn resize_updates_resolution_only() {
        let (mut pipeline, _) = pipeline_with_errors(RecordingBackend::default());
        pipeline.set_shader_source(Some(VALID)).unwrap();
        pipeline.set_resolution(1920, 1080);
        pipeline.update(&frame(1.0)).unwrap();

        assert_eq!(pipeline.backend().programs_built, 1);
        assert_eq!(pipeline.backend().viewport, (1920, 1080));
        assert_eq!(pipeline.uniforms().resolution, [1920.0, 1080.0]);
        assert_eq!(pipeline.state(), PipelineState::Compiled);
    }

    #[test]
    fn driver_rejection_falls_back() {
        let backend = RecordingBackend {
            reject_marker: Some("u_treble, 1.0"),
            ..Default::default()
        };
        let (mut pipeline, errors) = pipeline_with_errors(backend);
        let outcome = pipeline.set_shader_source(Some(VALID)).unwrap();
        assert!(matches!(
            outcome,
            ShaderOutcome::Fallback { error: Some(ShaderError::Gpu(_)), .. }
        ));
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn rejected_fallback_is_an_error() {
        let backend = RecordingBackend {
            reject_marker: Some("void main()"),
            ..Default::default()
        };
        let (mut pipeline, _) = pipeline_with_errors(backend);
        let err = pipeline.set_shader_source(None).unwrap_err();
        assert!(matches!(err, ShaderError::FallbackRejected { .. }));
        assert!(pipeline.update(&frame(0.0)).is_err());
    }

    #[test]
    fn custom_fallback_is_used() {
        let tunnel = fallback::find("tunnel").unwrap();
        let (pipeline, _) = pipeline_with_errors(RecordingBackend::default());
        let mut pipeline = pipeline.with_fallback(tunnel);
        let outcome = pipeline.set_shader_source(Some(INVALID)).unwrap();
        assert!(matches!(outcome, ShaderOutcome::Fallback { name: "tunnel", .. }));
    }
}
