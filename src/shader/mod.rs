pub mod compile;
pub mod fallback;
pub mod pipeline;
pub mod uniforms;
pub mod wrap;
