/// Reconstructs a feature value at `time` from a sampled curve.
///
/// Clamps to the first/last value outside the sampled range (no
/// extrapolation), linearly interpolates between the bracketing pair inside
/// it, and returns 0 for an empty curve. The bracketing pair is found by
/// binary search. Every feature curve goes through this one routine, so the
/// batch path reconstructs loudness, bands and centroid identically.
pub fn interpolate(times: &[f64], values: &[f32], time: f64) -> f32 {
    let n = times.len().min(values.len());
    if n == 0 {
        return 0.0;
    }
    if time.is_nan() || time <= times[0] {
        return values[0];
    }
    if time >= times[n - 1] {
        return values[n - 1];
    }

    // times[hi] > time >= times[hi - 1], with 1 <= hi <= n - 1
    let hi = times[..n].partition_point(|&t| t <= time);
    let lo = hi - 1;

    let (t0, t1) = (times[lo], times[hi]);
    let (v0, v1) = (values[lo], values[hi]);
    let span = t1 - t0;
    if span <= 0.0 {
        return v0;
    }
    let frac = ((time - t0) / span) as f32;
    v0 + (v1 - v0) * frac
}
