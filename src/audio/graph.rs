//! Live analyser graph.
//!
//! One graph is owned by one preview session. The playback transport pushes
//! the samples it has just played; the frequency sampler reads byte-scaled
//! frequency and time-domain snapshots of the most recent `fft_size` samples,
//! the same views a browser analyser node exposes.

use ringbuf::{traits::*, HeapRb};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserSettings {
    /// Replaces out-of-range knobs with the defaults.
    fn validated(self) -> Self {
        let defaults = Self::default();
        let fft_size = if self.fft_size.is_power_of_two()
            && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            self.fft_size
        } else {
            log::warn!(
                "Analyser fft_size {} is not a power of two in {}..={}, using {}",
                self.fft_size,
                MIN_FFT_SIZE,
                MAX_FFT_SIZE,
                defaults.fft_size
            );
            defaults.fft_size
        };
        let smoothing_time_constant = if (0.0..=1.0).contains(&self.smoothing_time_constant) {
            self.smoothing_time_constant
        } else {
            defaults.smoothing_time_constant
        };
        let (min_decibels, max_decibels) = if self.min_decibels < self.max_decibels {
            (self.min_decibels, self.max_decibels)
        } else {
            (defaults.min_decibels, defaults.max_decibels)
        };
        Self {
            fft_size,
            smoothing_time_constant,
            min_decibels,
            max_decibels,
        }
    }
}

pub struct AudioGraph {
    settings: AnalyserSettings,
    sample_rate: u32,
    ring: HeapRb<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    connected: bool,
}

impl AudioGraph {
    /// Builds a disconnected graph whose window starts out silent.
    pub fn init(settings: AnalyserSettings, sample_rate: u32) -> Self {
        let settings = settings.validated();
        let n = settings.fft_size;

        let mut ring = HeapRb::<f32>::new(n);
        for _ in 0..n {
            ring.push_overwrite(0.0);
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        log::debug!(
            "Audio graph initialised: fft_size={}, sample_rate={}Hz",
            n,
            sample_rate
        );

        Self {
            settings,
            sample_rate,
            ring,
            fft,
            window: blackman_window(n),
            scratch: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            connected: false,
        }
    }

    pub fn connect(&mut self) {
        if !self.connected {
            log::debug!("Audio graph connected");
        }
        self.connected = true;
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Appends freshly played mono samples, evicting the oldest.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            self.ring.push_overwrite(if s.is_finite() { s } else { 0.0 });
        }
    }

    /// Writes dB-scaled, smoothed magnitudes as bytes. Fills at most
    /// `frequency_bin_count` entries of `out`.
    pub fn read_byte_frequency_data(&mut self, out: &mut [u8]) {
        let n = self.settings.fft_size;
        for ((dst, &sample), &w) in self
            .scratch
            .iter_mut()
            .zip(self.ring.iter())
            .zip(self.window.iter())
        {
            *dst = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing_time_constant;
        let (min_db, max_db) = (self.settings.min_decibels, self.settings.max_decibels);
        let range = max_db - min_db;

        for (k, slot) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() / n as f32;
            *slot = tau * *slot + (1.0 - tau) * magnitude;
        }

        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * mag.log10();
            let scaled = (db - min_db) / range * 255.0;
            *dst = if scaled.is_nan() {
                0
            } else {
                scaled.clamp(0.0, 255.0) as u8
            };
        }
    }

    /// Writes the current window as unsigned 8-bit samples centred on 128.
    pub fn read_byte_time_domain_data(&self, out: &mut [u8]) {
        for (dst, &sample) in out.iter_mut().zip(self.ring.iter()) {
            *dst = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
    }

    /// Ends the graph's lifetime. Consumes it so nothing can keep reading.
    pub fn teardown(self) {
        log::debug!("Audio graph torn down");
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect()
    }

    #[test]
    fn fresh_graph_reads_silence() {
        let mut graph = AudioGraph::init(AnalyserSettings::default(), 44_100);
        let mut freq = vec![1u8; graph.frequency_bin_count()];
        let mut time = vec![0u8; graph.fft_size()];
        graph.read_byte_frequency_data(&mut freq);
        graph.read_byte_time_domain_data(&mut time);
        assert!(freq.iter().all(|&b| b == 0));
        assert!(time.iter().all(|&b| b == 128));
    }

    #[test]
    fn invalid_fft_size_falls_back_to_default() {
        let settings = AnalyserSettings {
            fft_size: 1000,
            ..Default::default()
        };
        let graph = AudioGraph::init(settings, 44_100);
        assert_eq!(graph.fft_size(), 2048);
        assert_eq!(graph.frequency_bin_count(), 1024);
    }

    #[test]
    fn low_tone_lands_in_low_bins() {
        let settings = AnalyserSettings {
            smoothing_time_constant: 0.0,
            ..Default::default()
        };
        let mut graph = AudioGraph::init(settings, 44_100);
        graph.push_samples(&sine(100.0, 44_100, 4096));

        let mut freq = vec![0u8; graph.frequency_bin_count()];
        graph.read_byte_frequency_data(&mut freq);

        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|&(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        // 100 Hz at 44.1 kHz / 2048 is bin ~4.6
        assert!((3..=6).contains(&peak), "peak bin {}", peak);
        assert!(freq[peak] > 200);
    }

    #[test]
    fn time_domain_tracks_latest_samples() {
        let mut graph = AudioGraph::init(
            AnalyserSettings {
                fft_size: 32,
                ..Default::default()
            },
            8_000,
        );
        graph.push_samples(&[1.0; 40]);
        let mut time = vec![0u8; 32];
        graph.read_byte_time_domain_data(&mut time);
        assert!(time.iter().all(|&b| b == 255));
    }

    #[test]
    fn connection_state_toggles() {
        let mut graph = AudioGraph::init(AnalyserSettings::default(), 48_000);
        assert!(!graph.is_connected());
        graph.connect();
        assert!(graph.is_connected());
        graph.disconnect();
        assert!(!graph.is_connected());
        graph.teardown();
    }
}
