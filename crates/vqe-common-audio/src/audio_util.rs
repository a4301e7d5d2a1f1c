//! Fixed-point helpers and level conversions for S16 audio.

/// Minimum value of a float-encoded S16 sample (`-32768.0`).
pub const MIN_FLOAT_S16_VALUE: f32 = -32768.0;
/// Maximum value of a float-encoded S16 sample (`32767.0`).
pub const MAX_FLOAT_S16_VALUE: f32 = 32767.0;
/// Absolute maximum magnitude of a float-encoded S16 sample (`32768.0`).
pub const MAX_ABS_FLOAT_S16_VALUE: f32 = 32768.0;

/// Minimum audio level in dBFS scale for S16 samples (`20 * log10(1/32768)`).
pub const MIN_LEVEL_DBFS: f32 = -90.309;

/// Saturates a 32-bit value to the `i16` range.
#[inline]
pub fn saturate_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Rounds a float-encoded S16 sample to the nearest `i16`, saturating.
#[inline]
pub fn float_s16_to_s16(v: f32) -> i16 {
    v.clamp(MIN_FLOAT_S16_VALUE, MAX_FLOAT_S16_VALUE).round() as i16
}

/// Converts a dB value to a linear ratio: `10^(v/20)`.
pub fn db_to_ratio(v: f32) -> f32 {
    10.0_f32.powf(v / 20.0)
}

/// Converts a dBFS value to a float S16 linear value.
pub fn dbfs_to_float_s16(v: f32) -> f32 {
    db_to_ratio(v) * MAX_ABS_FLOAT_S16_VALUE
}

/// Converts a float S16 linear value to dBFS.
pub fn float_s16_to_dbfs(v: f32) -> f32 {
    debug_assert!(v >= 0.0);
    if v <= 1.0 {
        return MIN_LEVEL_DBFS;
    }
    // Equal to 20 * log10(v / 32768).
    20.0 * v.log10() + MIN_LEVEL_DBFS
}

/// Mean of the squared samples. Returns `0.0` for an empty slice.
pub fn mean_square(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Root-mean-square level of `samples` in dBFS.
pub fn rms_dbfs(samples: &[i16]) -> f32 {
    float_s16_to_dbfs(mean_square(samples).sqrt())
}

/// Multiplies every sample by `gain`, rounding and saturating to `i16`.
///
/// Returns `true` if any sample had to be saturated.
pub fn apply_gain(samples: &mut [i16], gain: f32) -> bool {
    let mut saturated = false;
    for s in samples.iter_mut() {
        let scaled = f32::from(*s) * gain;
        saturated |= !(MIN_FLOAT_S16_VALUE..=MAX_FLOAT_S16_VALUE).contains(&scaled);
        *s = float_s16_to_s16(scaled);
    }
    saturated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturate_i16_clamps_both_ends() {
        assert_eq!(saturate_i16(40_000), i16::MAX);
        assert_eq!(saturate_i16(-40_000), i16::MIN);
        assert_eq!(saturate_i16(-123), -123);
    }

    #[test]
    fn dbfs_conversions_are_inverse() {
        for dbfs in [-60.0f32, -20.0, -3.0, 0.0] {
            let linear = dbfs_to_float_s16(dbfs);
            assert!((float_s16_to_dbfs(linear) - dbfs).abs() < 0.01, "dbfs {dbfs}");
        }
    }

    #[test]
    fn silence_is_min_level() {
        assert_eq!(rms_dbfs(&[0; 160]), MIN_LEVEL_DBFS);
        assert_eq!(rms_dbfs(&[]), MIN_LEVEL_DBFS);
    }

    #[test]
    fn full_scale_square_wave_is_near_zero_dbfs() {
        let samples: Vec<i16> = (0..160)
            .map(|i| if i % 2 == 0 { i16::MAX } else { -i16::MAX })
            .collect();
        assert!(rms_dbfs(&samples).abs() < 0.01);
    }

    #[test]
    fn apply_gain_reports_saturation() {
        let mut samples = [1000i16, -1000, 20_000];
        assert!(apply_gain(&mut samples, 2.0));
        assert_eq!(samples, [2000, -2000, i16::MAX]);

        let mut quiet = [100i16, -100];
        assert!(!apply_gain(&mut quiet, 0.5));
        assert_eq!(quiet, [50, -50]);
    }
}
