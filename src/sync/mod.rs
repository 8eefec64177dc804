pub mod beat;
pub mod section;
pub mod state;
