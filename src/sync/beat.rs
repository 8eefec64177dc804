use serde::Serialize;

/// Length of the post-beat pulse. Intensity decays linearly to 0 across it.
pub const BEAT_WINDOW_SECS: f64 = 0.08;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BeatState {
    pub is_on_beat: bool,
    /// Index of the latest beat at or before the query, -1 before the first beat
    pub beat_index: i64,
    pub intensity: f32,
    pub time_since_last_beat: f64,
    pub time_to_next_beat: f64,
}

/// Evaluates the beat pulse at `time` against sorted `beats`.
///
/// With no beat at or before `time` the reference point is 0 s: the state is
/// off-beat with zero intensity and `time_since_last_beat` is the time itself.
/// `time_to_next_beat` falls back to the remaining track duration after the
/// last beat.
pub fn beat_state(beats: &[f64], time: f64, duration: f64) -> BeatState {
    let time = if time.is_finite() { time } else { 0.0 };
    let next = beats.partition_point(|&b| b <= time);

    let time_to_next_beat = match beats.get(next) {
        Some(&b) => b - time,
        None => (duration - time).max(0.0),
    };

    if next == 0 {
        return BeatState {
            is_on_beat: false,
            beat_index: -1,
            intensity: 0.0,
            time_since_last_beat: time.max(0.0),
            time_to_next_beat,
        };
    }

    let index = next - 1;
    let since = time - beats[index];
    let is_on_beat = since < BEAT_WINDOW_SECS;
    let intensity = if is_on_beat {
        (1.0 - since / BEAT_WINDOW_SECS).max(0.0) as f32
    } else {
        0.0
    };

    BeatState {
        is_on_beat,
        beat_index: index as i64,
        intensity,
        time_since_last_beat: since,
        time_to_next_beat,
    }
}
