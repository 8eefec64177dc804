use serde::Serialize;

/// Upper edges of the first four bands as fractions of the bin count.
/// The fifth band (treble) runs to the end of the buffer.
pub const BAND_EDGES: [f32; 4] = [0.04, 0.08, 0.25, 0.5];

/// Per-frame energy features, all in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EnergyBands {
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    /// RMS of the time-domain buffer
    pub loudness: f32,
    /// Magnitude-weighted mean bin index over the bin count
    pub spectral_centroid: f32,
}

impl EnergyBands {
    /// Used when no feature source has produced anything yet.
    pub const NEUTRAL: Self = Self {
        bass: 0.0,
        low_mid: 0.0,
        mid: 0.0,
        high_mid: 0.0,
        treble: 0.0,
        loudness: 0.0,
        spectral_centroid: 0.5,
    };

    pub fn bands(&self) -> [f32; 5] {
        [self.bass, self.low_mid, self.mid, self.high_mid, self.treble]
    }
}

/// Reduces analyser byte buffers (frequency magnitudes and time-domain
/// samples, both 0-255) into [`EnergyBands`].
pub fn map_energy(frequency: &[u8], time_domain: &[u8]) -> EnergyBands {
    let [bass, low_mid, mid, high_mid, treble] = band_levels(frequency);
    EnergyBands {
        bass,
        low_mid,
        mid,
        high_mid,
        treble,
        loudness: rms_loudness(time_domain),
        spectral_centroid: spectral_centroid(frequency),
    }
}

/// Average magnitude of each band, normalized by 255. Empty bands are 0.
pub fn band_levels(frequency: &[u8]) -> [f32; 5] {
    let n = frequency.len();
    let mut edges = [0usize; 6];
    for (i, ratio) in BAND_EDGES.iter().enumerate() {
        edges[i + 1] = ((n as f32 * ratio) as usize).min(n);
    }
    edges[5] = n;

    let mut levels = [0.0f32; 5];
    for (band, level) in levels.iter_mut().enumerate() {
        let bins = &frequency[edges[band]..edges[band + 1].max(edges[band])];
        if bins.is_empty() {
            continue;
        }
        let sum: u32 = bins.iter().map(|&b| b as u32).sum();
        *level = sum as f32 / bins.len() as f32 / 255.0;
    }
    levels
}

/// Centroid bin over bin count. Silence sits at the neutral midpoint 0.5;
/// an empty buffer is 0.
pub fn spectral_centroid(frequency: &[u8]) -> f32 {
    if frequency.is_empty() {
        return 0.0;
    }
    let (weighted, total) = frequency
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(w, t), (i, &mag)| {
            (w + i as f64 * mag as f64, t + mag as f64)
        });
    if total == 0.0 {
        return 0.5;
    }
    (weighted / total / frequency.len() as f64) as f32
}

/// RMS of unsigned 8-bit samples mapped to [-1, 1] via `(s - 128) / 128`.
pub fn rms_loudness(time_domain: &[u8]) -> f32 {
    if time_domain.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = time_domain
        .iter()
        .map(|&s| {
            let x = (s as f32 - 128.0) / 128.0;
            x * x
        })
        .sum();
    (sum_sq / time_domain.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero_with_neutral_centroid() {
        let bands = map_energy(&[0u8; 1024], &[128u8; 2048]);
        assert_eq!(bands.bands(), [0.0; 5]);
        assert_eq!(bands.loudness, 0.0);
        assert_eq!(bands.spectral_centroid, 0.5);
    }

    #[test]
    fn empty_buffers_are_all_zero() {
        let bands = map_energy(&[], &[]);
        assert_eq!(bands, EnergyBands::default());
    }

    #[test]
    fn full_scale_is_one() {
        let bands = map_energy(&[255u8; 1024], &[0u8; 64]);
        for level in bands.bands() {
            assert!((level - 1.0).abs() < 1e-6);
        }
        assert!((bands.loudness - 1.0).abs() < 1e-6);
    }

    #[test]
    fn low_bins_drive_bass_only() {
        let mut bins = [0u8; 1024];
        let bass_end = (1024.0 * 0.04) as usize;
        bins[..bass_end].fill(255);
        let levels = band_levels(&bins);
        assert!(levels[0] > 0.5);
        assert_eq!(levels[4], 0.0);
    }

    #[test]
    fn high_bins_drive_treble_only() {
        let mut bins = [0u8; 1024];
        bins[512..].fill(255);
        let levels = band_levels(&bins);
        assert!(levels[4] > 0.5);
        assert_eq!(levels[0], 0.0);
        assert!(spectral_centroid(&bins) > 0.5);
    }

    #[test]
    fn tiny_buffers_leave_empty_bands_at_zero() {
        // 10 bins: bass and low-mid ranges round down to nothing
        let levels = band_levels(&[255u8; 10]);
        assert_eq!(levels[0], 0.0);
        assert_eq!(levels[1], 0.0);
        assert!((levels[4] - 1.0).abs() < 1e-6);
    }
}
