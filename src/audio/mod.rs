pub mod bands;
pub mod decode;
pub mod graph;
pub mod interpolate;
pub mod sampler;
