//! Per-frame JSON-lines trace.
//!
//! Both drivers can write one; diffing two traces of the same track is how
//! the interactive and batch paths are checked against each other.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::shader::uniforms::{FrameUniforms, Uniform, UniformValue};
use crate::sync::state::VisualState;

#[derive(Debug, Serialize)]
pub struct TraceRecord<'a> {
    pub frame: u64,
    pub time: f64,
    pub uniforms: BTreeMap<&'static str, UniformValue>,
    pub beat_index: i64,
    pub on_beat: bool,
    pub section: Option<&'a str>,
    pub harmonic: Option<f32>,
    pub percussive: Option<f32>,
}

impl<'a> TraceRecord<'a> {
    pub fn new(frame: u64, state: &'a VisualState, uniforms: &FrameUniforms) -> Self {
        Self {
            frame,
            time: state.time,
            uniforms: Uniform::ALL
                .iter()
                .map(|&u| (u.name(), uniforms.value(u)))
                .collect(),
            beat_index: state.beat.beat_index,
            on_beat: state.beat.is_on_beat,
            section: state.section.as_ref().map(|s| s.label.as_str()),
            harmonic: None,
            percussive: None,
        }
    }

    pub fn with_hpss(mut self, (harmonic, percussive): (f32, f32)) -> Self {
        self.harmonic = Some(harmonic);
        self.percussive = Some(percussive);
        self
    }
}

pub struct TraceWriter<W: Write> {
    out: W,
    records: u64,
}

impl TraceWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace file: {}", path.display()))?;
        log::info!("Writing frame trace to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    pub fn write(&mut self, record: &TraceRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record).context("Failed to serialize trace record")?;
        self.out.write_all(b"\n").context("Failed to write trace")?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush().context("Failed to flush trace")?;
        Ok(self.out)
    }
}
