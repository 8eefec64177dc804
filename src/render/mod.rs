pub mod backend;
pub mod batch;
pub mod frame;
pub mod gpu;
