//! Upstream analysis contract.
//!
//! The analysis arrives once per session as JSON and is immutable afterwards.
//! Loading never rejects degenerate data: mismatched or non-monotonic series
//! collapse to something the interpolator can still answer (usually empty).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::audio::bands::EnergyBands;
use crate::audio::interpolate;

/// Duration assumed when the analysis carries no metadata.
pub const DEFAULT_DURATION_SECS: f64 = 60.0;
/// Analysis sample rate used upstream when metadata omits it.
pub const DEFAULT_ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// Loudness ratios used to derive bands when the analysis has none.
pub const DERIVED_BAND_RATIOS: [f32; 5] = [0.8, 0.6, 0.5, 0.4, 0.3];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read analysis file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed analysis JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("series has {times} timestamps but {values} values")]
    LengthMismatch { times: usize, values: usize },
    #[error("series timestamps are not strictly increasing at index {0}")]
    NotIncreasing(usize),
}

/// A discretely sampled feature curve: `times` strictly increasing, one value per time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisSeries {
    times: Vec<f64>,
    values: Vec<f32>,
}

impl AnalysisSeries {
    pub fn new(times: Vec<f64>, values: Vec<f32>) -> Result<Self, AnalysisError> {
        if times.len() != values.len() {
            return Err(AnalysisError::LengthMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        if let Some(i) = times.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(AnalysisError::NotIncreasing(i + 1));
        }
        Ok(Self { times, values })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Value of the curve at `time`, see [`interpolate::interpolate`].
    pub fn sample(&self, time: f64) -> f32 {
        interpolate::interpolate(&self.times, &self.values, time)
    }

    fn scaled(&self, factor: f32) -> Self {
        Self {
            times: self.times.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}

/// A labeled structural region of the track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

/// Sorted beat times and section boundaries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatTimeline {
    beats: Vec<f64>,
    sections: Vec<Section>,
}

impl BeatTimeline {
    /// Builds a timeline, dropping non-finite entries and sorting both lists.
    pub fn new(mut beats: Vec<f64>, mut sections: Vec<Section>) -> Self {
        beats.retain(|b| b.is_finite());
        beats.sort_by(f64::total_cmp);
        beats.dedup();
        sections.retain(|s| s.start.is_finite());
        sections.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { beats, sections }
    }

    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

/// The five energy band curves, either measured upstream or derived from loudness.
#[derive(Clone, Debug, PartialEq)]
pub struct BandSeries {
    pub bass: AnalysisSeries,
    pub low_mid: AnalysisSeries,
    pub mid: AnalysisSeries,
    pub high_mid: AnalysisSeries,
    pub treble: AnalysisSeries,
}

impl BandSeries {
    fn derived_from(loudness: &AnalysisSeries) -> Self {
        let [bass, low_mid, mid, high_mid, treble] = DERIVED_BAND_RATIOS;
        Self {
            bass: loudness.scaled(bass),
            low_mid: loudness.scaled(low_mid),
            mid: loudness.scaled(mid),
            high_mid: loudness.scaled(high_mid),
            treble: loudness.scaled(treble),
        }
    }
}

/// Every tracked feature curve. All are sampled through the same interpolator.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSeries {
    pub loudness: AnalysisSeries,
    pub spectral_centroid: AnalysisSeries,
    pub bands: BandSeries,
    pub harmonic: AnalysisSeries,
    pub percussive: AnalysisSeries,
}

impl FeatureSeries {
    /// Reconstructs the energy bands at `time`.
    pub fn energy_at(&self, time: f64) -> EnergyBands {
        EnergyBands {
            bass: self.bands.bass.sample(time),
            low_mid: self.bands.low_mid.sample(time),
            mid: self.bands.mid.sample(time),
            high_mid: self.bands.high_mid.sample(time),
            treble: self.bands.treble.sample(time),
            loudness: self.loudness.sample(time),
            spectral_centroid: self.spectral_centroid.sample(time),
        }
    }

    /// Harmonic and percussive energy at `time`.
    pub fn hpss_at(&self, time: f64) -> (f32, f32) {
        (self.harmonic.sample(time), self.percussive.sample(time))
    }
}

/// The finished upstream dataset for one track.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAnalysis {
    pub duration: f64,
    pub sample_rate: u32,
    pub timeline: BeatTimeline,
    pub features: FeatureSeries,
}

impl AudioAnalysis {
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let raw: RawAnalysis = serde_json::from_str(json)?;
        Ok(raw.into_analysis())
    }
}

pub fn load_analysis(path: &Path) -> Result<AudioAnalysis, AnalysisError> {
    let json = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let analysis = AudioAnalysis::from_json(&json)?;
    log::info!(
        "Loaded analysis: {:.1}s, {} beats, {} sections, {} feature samples",
        analysis.duration,
        analysis.timeline.beats().len(),
        analysis.timeline.sections().len(),
        analysis.features.loudness.len()
    );
    Ok(analysis)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    metadata: RawMetadata,
    rhythm: RawRhythm,
    sections: RawSections,
    spectral: RawSpectral,
    harmonic_percussive: RawHarmonicPercussive,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    duration: Option<f64>,
    sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRhythm {
    beats: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSections {
    Spans(Vec<Section>),
    Boundaries {
        #[serde(default)]
        boundaries: Vec<f64>,
        #[serde(default)]
        labels: Vec<String>,
    },
}

impl Default for RawSections {
    fn default() -> Self {
        RawSections::Spans(Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpectral {
    times: Vec<f64>,
    rms: Vec<f32>,
    spectral_centroid: Vec<f32>,
    energy_bands: Option<RawEnergyBands>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEnergyBands {
    bass: Vec<f32>,
    low_mid: Vec<f32>,
    mid: Vec<f32>,
    high_mid: Vec<f32>,
    treble: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHarmonicPercussive {
    harmonic_energy: Vec<f32>,
    percussive_energy: Vec<f32>,
}

impl RawAnalysis {
    fn into_analysis(self) -> AudioAnalysis {
        let duration = self
            .metadata
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(DEFAULT_DURATION_SECS);
        let sample_rate = self
            .metadata
            .sample_rate
            .filter(|sr| *sr > 0)
            .unwrap_or(DEFAULT_ANALYSIS_SAMPLE_RATE);

        let sections = match self.sections {
            RawSections::Spans(spans) => spans,
            RawSections::Boundaries { boundaries, labels } => {
                sections_from_boundaries(&boundaries, &labels, duration)
            }
        };
        let timeline = BeatTimeline::new(self.rhythm.beats, sections);

        let times = &self.spectral.times;
        let loudness = build_series("rms", times, self.spectral.rms);
        let centroid = normalize_centroid(self.spectral.spectral_centroid, sample_rate);
        let spectral_centroid = build_series("spectral_centroid", times, centroid);

        let bands = match self.spectral.energy_bands {
            Some(raw) => BandSeries {
                bass: build_series("bass", times, raw.bass),
                low_mid: build_series("low_mid", times, raw.low_mid),
                mid: build_series("mid", times, raw.mid),
                high_mid: build_series("high_mid", times, raw.high_mid),
                treble: build_series("treble", times, raw.treble),
            },
            None => {
                log::info!("Analysis has no energy bands, deriving them from loudness");
                BandSeries::derived_from(&loudness)
            }
        };

        let hp = self.harmonic_percussive;
        AudioAnalysis {
            duration,
            sample_rate,
            timeline,
            features: FeatureSeries {
                loudness,
                spectral_centroid,
                bands,
                harmonic: build_series("harmonic_energy", times, hp.harmonic_energy),
                percussive: build_series("percussive_energy", times, hp.percussive_energy),
            },
        }
    }
}

/// Pairs a value array with the shared timestamps, truncating to the common length.
fn build_series(name: &str, times: &[f64], mut values: Vec<f32>) -> AnalysisSeries {
    if values.is_empty() {
        return AnalysisSeries::empty();
    }
    let len = times.len().min(values.len());
    if times.len() != values.len() {
        log::warn!(
            "Series '{}' has {} values for {} timestamps, truncating to {}",
            name,
            values.len(),
            times.len(),
            len
        );
    }
    values.truncate(len);
    match AnalysisSeries::new(times[..len].to_vec(), values) {
        Ok(series) => series,
        Err(err) => {
            log::warn!("Ignoring series '{}': {}", name, err);
            AnalysisSeries::empty()
        }
    }
}

/// Upstream centroids are in Hz; anything above 1 is rescaled by Nyquist.
fn normalize_centroid(values: Vec<f32>, sample_rate: u32) -> Vec<f32> {
    if !values.iter().any(|v| *v > 1.0) {
        return values;
    }
    let nyquist = sample_rate as f32 / 2.0;
    values
        .into_iter()
        .map(|hz| (hz / nyquist).clamp(0.0, 1.0))
        .collect()
}

fn sections_from_boundaries(boundaries: &[f64], labels: &[String], duration: f64) -> Vec<Section> {
    boundaries
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = boundaries.get(i + 1).copied().unwrap_or(duration).max(start);
            let label = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("section_{}", i + 1));
            Section { label, start, end }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM: &str = r#"{
        "metadata": {"filename": "a.wav", "duration": 150.0, "sample_rate": 22050},
        "rhythm": {"bpm": 120.0, "beats": [0.5, 0.0, 1.0]},
        "sections": {"boundaries": [0.0, 30.0, 90.0], "labels": ["intro", "verse", "chorus"]},
        "spectral": {
            "times": [0.0, 1.0, 2.0],
            "rms": [0.1, 0.2, 0.3],
            "spectral_centroid": [1102.5, 2205.0, 5512.5],
            "energy_bands": {
                "bass": [1.0, 0.5, 0.0],
                "low_mid": [0.0, 0.0, 0.0],
                "mid": [0.2, 0.2, 0.2],
                "high_mid": [0.3, 0.3],
                "treble": [0.9, 0.9, 0.9]
            }
        },
        "harmonic_percussive": {"harmonic_energy": [0.4, 0.4, 0.4], "percussive_energy": [0.6, 0.6, 0.6]}
    }"#;

    #[test]
    fn series_rejects_mismatched_lengths() {
        let err = AnalysisSeries::new(vec![0.0, 1.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::LengthMismatch { times: 2, values: 1 }));
    }

    #[test]
    fn series_rejects_repeated_timestamps() {
        let err = AnalysisSeries::new(vec![0.0, 1.0, 1.0], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::NotIncreasing(2)));
    }

    #[test]
    fn loads_upstream_shape() {
        let analysis = AudioAnalysis::from_json(UPSTREAM).unwrap();
        assert_eq!(analysis.duration, 150.0);
        assert_eq!(analysis.timeline.beats(), &[0.0, 0.5, 1.0]);

        let sections = analysis.timeline.sections();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].label, "verse");
        assert_eq!(sections[1].end, 90.0);
        assert_eq!(sections[2].end, 150.0);

        assert_eq!(analysis.features.bands.bass.sample(0.5), 0.75);
        // high_mid had one value short and was truncated
        assert_eq!(analysis.features.bands.high_mid.len(), 2);
        assert_eq!(analysis.features.hpss_at(1.5), (0.4, 0.6));
    }

    #[test]
    fn centroid_in_hz_is_normalized_by_nyquist() {
        let analysis = AudioAnalysis::from_json(UPSTREAM).unwrap();
        let centroid = analysis.features.spectral_centroid.values();
        assert!((centroid[0] - 0.1).abs() < 1e-6);
        assert!((centroid[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_bands_derive_from_loudness() {
        let json = r#"{"spectral": {"times": [0.0, 1.0], "rms": [0.5, 1.0]}}"#;
        let analysis = AudioAnalysis::from_json(json).unwrap();
        assert_eq!(analysis.duration, DEFAULT_DURATION_SECS);
        let bands = analysis.features.energy_at(1.0);
        assert!((bands.bass - 0.8).abs() < 1e-6);
        assert!((bands.treble - 0.3).abs() < 1e-6);
    }

    #[test]
    fn section_spans_are_accepted() {
        let json = r#"{"sections": [
            {"label": "verse", "start": 30.0, "end": 90.0},
            {"label": "intro", "start": 0.0, "end": 30.0}
        ]}"#;
        let analysis = AudioAnalysis::from_json(json).unwrap();
        let labels: Vec<_> = analysis
            .timeline
            .sections()
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(labels, ["intro", "verse"]);
    }

    #[test]
    fn empty_document_yields_empty_timeline() {
        let analysis = AudioAnalysis::from_json("{}").unwrap();
        assert!(analysis.timeline.beats().is_empty());
        assert!(analysis.timeline.sections().is_empty());
        assert!(analysis.features.loudness.is_empty());
        assert_eq!(analysis.features.energy_at(3.0).bass, 0.0);
    }

    #[test]
    fn non_monotonic_series_is_dropped() {
        let json = r#"{"spectral": {"times": [0.0, 2.0, 1.0], "rms": [0.1, 0.2, 0.3]}}"#;
        let analysis = AudioAnalysis::from_json(json).unwrap();
        assert!(analysis.features.loudness.is_empty());
    }
}
