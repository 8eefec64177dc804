//! The evaluation both drivers share.
//!
//! Only the [`FeatureSource`] differs between the interactive and batch
//! paths; everything downstream of it is this one function.

use serde::Serialize;

use super::beat::{beat_state, BeatState};
use super::section::resolve_section;
use crate::analysis::{BeatTimeline, FeatureSeries, Section};
use crate::audio::bands::EnergyBands;
use crate::audio::graph::AudioGraph;
use crate::audio::sampler::FrequencySampler;

/// Where per-frame energy features come from.
pub trait FeatureSource {
    /// Features at `time`, or `None` when the source has nothing yet.
    fn features_at(&mut self, time: f64) -> Option<EnergyBands>;
}

/// Batch source: reconstructs features from precomputed series.
pub struct SeriesFeatures<'a> {
    series: &'a FeatureSeries,
}

impl<'a> SeriesFeatures<'a> {
    pub fn new(series: &'a FeatureSeries) -> Self {
        Self { series }
    }
}

impl FeatureSource for SeriesFeatures<'_> {
    fn features_at(&mut self, time: f64) -> Option<EnergyBands> {
        Some(self.series.energy_at(time))
    }
}

/// Interactive source: whatever the live graph holds right now.
pub struct LiveFeatures<'a> {
    sampler: &'a mut FrequencySampler,
    graph: Option<&'a mut AudioGraph>,
}

impl<'a> LiveFeatures<'a> {
    pub fn new(sampler: &'a mut FrequencySampler, graph: Option<&'a mut AudioGraph>) -> Self {
        Self { sampler, graph }
    }
}

impl FeatureSource for LiveFeatures<'_> {
    fn features_at(&mut self, _time: f64) -> Option<EnergyBands> {
        self.sampler.sample(self.graph.as_deref_mut())
    }
}

/// Everything a frame needs, recomputed from scratch per evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisualState {
    pub time: f64,
    pub bands: EnergyBands,
    pub beat: BeatState,
    pub section: Option<Section>,
}

pub fn evaluate(
    time: f64,
    bands: EnergyBands,
    timeline: &BeatTimeline,
    duration: f64,
) -> VisualState {
    VisualState {
        time,
        bands,
        beat: beat_state(timeline.beats(), time, duration),
        section: resolve_section(timeline.sections(), time).cloned(),
    }
}

/// Pulls features from `source` (neutral when it has none) and evaluates.
pub fn evaluate_frame(
    time: f64,
    source: &mut dyn FeatureSource,
    timeline: &BeatTimeline,
    duration: f64,
) -> VisualState {
    let bands = source.features_at(time).unwrap_or(EnergyBands::NEUTRAL);
    evaluate(time, bands, timeline, duration)
}
