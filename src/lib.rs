//! Audio-driven shader visuals with a shared evaluation core.
//!
//! Two drivers feed the same beat/section/uniform pipeline: the interactive
//! [`session`] reads a live analyser graph once per tick, and the batch
//! [`render::batch`] renderer reconstructs features from precomputed analysis
//! series. Both end in [`shader::pipeline::ShaderPipeline::update`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod encode;
pub mod render;
pub mod session;
pub mod shader;
pub mod sync;
pub mod trace;
