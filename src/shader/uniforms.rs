use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use std::mem::offset_of;

use crate::sync::state::VisualState;

/// The fixed uniform table every wrapped program sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    Resolution,
    Time,
    Bass,
    LowMid,
    Mid,
    HighMid,
    Treble,
    Energy,
    Beat,
    SpectralCentroid,
}

impl Uniform {
    /// Declaration order inside the uniform block.
    pub const ALL: [Uniform; 10] = [
        Uniform::Resolution,
        Uniform::Time,
        Uniform::Bass,
        Uniform::LowMid,
        Uniform::Mid,
        Uniform::HighMid,
        Uniform::Treble,
        Uniform::Energy,
        Uniform::Beat,
        Uniform::SpectralCentroid,
    ];

    /// GLSL identifier.
    pub fn name(self) -> &'static str {
        match self {
            Uniform::Resolution => "iResolution",
            Uniform::Time => "iTime",
            Uniform::Bass => "u_bass",
            Uniform::LowMid => "u_lowMid",
            Uniform::Mid => "u_mid",
            Uniform::HighMid => "u_highMid",
            Uniform::Treble => "u_treble",
            Uniform::Energy => "u_energy",
            Uniform::Beat => "u_beat",
            Uniform::SpectralCentroid => "u_spectralCentroid",
        }
    }

    pub fn glsl_type(self) -> &'static str {
        match self {
            Uniform::Resolution => "vec2",
            _ => "float",
        }
    }

    /// Byte offset of the slot in [`FrameUniforms`], matching std140.
    pub fn offset(self) -> usize {
        match self {
            Uniform::Resolution => offset_of!(FrameUniforms, resolution),
            Uniform::Time => offset_of!(FrameUniforms, time),
            Uniform::Bass => offset_of!(FrameUniforms, bass),
            Uniform::LowMid => offset_of!(FrameUniforms, low_mid),
            Uniform::Mid => offset_of!(FrameUniforms, mid),
            Uniform::HighMid => offset_of!(FrameUniforms, high_mid),
            Uniform::Treble => offset_of!(FrameUniforms, treble),
            Uniform::Energy => offset_of!(FrameUniforms, energy),
            Uniform::Beat => offset_of!(FrameUniforms, beat),
            Uniform::SpectralCentroid => offset_of!(FrameUniforms, spectral_centroid),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
}

/// CPU mirror of the `VisualUniforms` block, uploaded as one buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    pub energy: f32,
    pub beat: f32,
    pub spectral_centroid: f32,
    pub _padding: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            time: 0.0,
            bass: 0.0,
            low_mid: 0.0,
            mid: 0.0,
            high_mid: 0.0,
            treble: 0.0,
            energy: 0.0,
            beat: 0.0,
            spectral_centroid: 0.5,
            _padding: 0.0,
        }
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = [width as f32, height as f32];
    }

    /// Writes every per-frame slot from `state`. Resolution is left alone.
    ///
    /// Non-finite values never reach the table: features are clamped to
    /// [0, 1] with NaN mapped to 0 (centroid to 0.5), and a non-finite
    /// time becomes 0.
    pub fn apply(&mut self, state: &VisualState) {
        let bands = &state.bands;
        self.time = if state.time.is_finite() { state.time as f32 } else { 0.0 };
        self.bass = unit(bands.bass, 0.0);
        self.low_mid = unit(bands.low_mid, 0.0);
        self.mid = unit(bands.mid, 0.0);
        self.high_mid = unit(bands.high_mid, 0.0);
        self.treble = unit(bands.treble, 0.0);
        self.energy = unit(bands.loudness, 0.0);
        self.beat = unit(state.beat.intensity, 0.0);
        self.spectral_centroid = unit(bands.spectral_centroid, 0.5);
    }

    pub fn value(&self, uniform: Uniform) -> UniformValue {
        match uniform {
            Uniform::Resolution => UniformValue::Vec2(self.resolution),
            Uniform::Time => UniformValue::Float(self.time),
            Uniform::Bass => UniformValue::Float(self.bass),
            Uniform::LowMid => UniformValue::Float(self.low_mid),
            Uniform::Mid => UniformValue::Float(self.mid),
            Uniform::HighMid => UniformValue::Float(self.high_mid),
            Uniform::Treble => UniformValue::Float(self.treble),
            Uniform::Energy => UniformValue::Float(self.energy),
            Uniform::Beat => UniformValue::Float(self.beat),
            Uniform::SpectralCentroid => UniformValue::Float(self.spectral_centroid),
        }
    }
}

fn unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}
