use super::bands::{self, EnergyBands};
use super::graph::AudioGraph;

/// Reads the live graph once per interactive tick.
///
/// When the graph is missing or not yet connected the previous reading is
/// returned unchanged (or `None` before the first one), so the render loop
/// keeps going on stale values instead of stalling.
#[derive(Debug, Default)]
pub struct FrequencySampler {
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    last: Option<EnergyBands>,
}

impl FrequencySampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, graph: Option<&mut AudioGraph>) -> Option<EnergyBands> {
        let graph = match graph {
            Some(graph) if graph.is_connected() => graph,
            _ => return self.last,
        };

        self.frequency.resize(graph.frequency_bin_count(), 0);
        self.time_domain.resize(graph.fft_size(), 128);
        graph.read_byte_frequency_data(&mut self.frequency);
        graph.read_byte_time_domain_data(&mut self.time_domain);

        let reading = bands::map_energy(&self.frequency, &self.time_domain);
        self.last = Some(reading);
        self.last
    }

    pub fn last(&self) -> Option<EnergyBands> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
