//! Two-band QMF filter bank.
//!
//! Splits a full-band signal into a low and a high band at half the sample
//! rate, and recombines the two bands. The filters are three cascaded
//! first-order all-pass sections per polyphase branch, computed in Q10 fixed
//! point:
//!
//! ```text
//!         a_3 + q^-1    a_2 + q^-1    a_1 + q^-1
//! y[n] =  -----------   -----------   -----------   x[n]
//!         1 + a_3q^-1   1 + a_2q^-1   1 + a_1q^-1
//! ```
//!
//! Analysis followed by synthesis is an all-pass transform: DC and
//! Nyquist-rate inputs are reconstructed exactly once the filters have
//! settled, and every other frequency keeps its magnitude.

/// Number of `i32` words in one all-pass filter state block.
pub const QMF_STATE_SIZE: usize = 6;

/// State of one all-pass branch: `(x[-1], y[-1])` for each of the three
/// cascaded sections.
pub type QmfState = [i32; QMF_STATE_SIZE];

/// Longest supported band, in samples.
pub const MAX_BAND_FRAME_LENGTH: usize = 240;

// Q16 all-pass coefficients for the two polyphase branches.
const ALL_PASS_FILTER_1: [u16; 3] = [6418, 36982, 57261];
const ALL_PASS_FILTER_2: [u16; 3] = [21333, 49062, 63010];

/// `c + a * b` with `a` in Q16, truncated like the 16x32 multiply it models.
#[inline]
fn scale_diff_32(a: u16, b: i32, c: i32) -> i32 {
    let a = i32::from(a);
    let low = ((b & 0xFFFF) as u32 * a as u32) >> 16;
    c.wrapping_add((b >> 16).wrapping_mul(a))
        .wrapping_add(low as i32)
}

/// One first-order all-pass section; `state` holds `[x[-1], y[-1]]`.
fn all_pass_section(input: &[i32], output: &mut [i32], coefficient: u16, state: &mut [i32]) {
    let mut prev_in = state[0];
    let mut prev_out = state[1];
    for (&x, y) in input.iter().zip(output.iter_mut()) {
        *y = scale_diff_32(coefficient, x.saturating_sub(prev_out), prev_in);
        prev_in = x;
        prev_out = *y;
    }
    state[0] = prev_in;
    state[1] = prev_out;
}

/// Runs the three cascaded sections. `data` is used as scratch for the
/// middle section and is clobbered.
fn all_pass_qmf(data: &mut [i32], output: &mut [i32], coefficients: &[u16; 3], state: &mut QmfState) {
    let (s0, rest) = state.split_at_mut(2);
    let (s1, s2) = rest.split_at_mut(2);
    all_pass_section(data, output, coefficients[0], s0);
    all_pass_section(output, data, coefficients[1], s1);
    all_pass_section(data, output, coefficients[2], s2);
}

/// Splits `input` into `low_band` and `high_band`, each half as long.
///
/// # Panics
///
/// Panics if `input` has odd length, if either band is not exactly half of
/// `input`, or if a band is longer than [`MAX_BAND_FRAME_LENGTH`].
pub fn analysis_qmf(
    input: &[i16],
    low_band: &mut [i16],
    high_band: &mut [i16],
    state1: &mut QmfState,
    state2: &mut QmfState,
) {
    let band_length = input.len() / 2;
    assert_eq!(input.len() % 2, 0, "QMF input must have even length");
    assert_eq!(low_band.len(), band_length, "low band length mismatch");
    assert_eq!(high_band.len(), band_length, "high band length mismatch");
    assert!(band_length <= MAX_BAND_FRAME_LENGTH, "band too long: {band_length}");

    let mut half_in1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; MAX_BAND_FRAME_LENGTH];

    // Even samples feed branch 2, odd samples branch 1; both in Q10.
    for (i, pair) in input.chunks_exact(2).enumerate() {
        half_in2[i] = i32::from(pair[0]) << 10;
        half_in1[i] = i32::from(pair[1]) << 10;
    }

    all_pass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_1,
        state1,
    );
    all_pass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_2,
        state2,
    );

    for i in 0..band_length {
        low_band[i] = saturate((filter1[i] + filter2[i] + 1024) >> 11);
        high_band[i] = saturate((filter1[i] - filter2[i] + 1024) >> 11);
    }
}

/// Recombines `low_band` and `high_band` into `output`.
///
/// The synthesis states are distinct from the analysis states of the same
/// channel.
///
/// # Panics
///
/// Panics if the bands differ in length, if `output` is not twice the band
/// length, or if a band is longer than [`MAX_BAND_FRAME_LENGTH`].
pub fn synthesis_qmf(
    low_band: &[i16],
    high_band: &[i16],
    output: &mut [i16],
    state1: &mut QmfState,
    state2: &mut QmfState,
) {
    let band_length = low_band.len();
    assert_eq!(high_band.len(), band_length, "band length mismatch");
    assert_eq!(output.len(), 2 * band_length, "output length mismatch");
    assert!(band_length <= MAX_BAND_FRAME_LENGTH, "band too long: {band_length}");

    let mut half_in1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; MAX_BAND_FRAME_LENGTH];

    // Sum and difference channels, in Q10.
    for i in 0..band_length {
        let low = i32::from(low_band[i]);
        let high = i32::from(high_band[i]);
        half_in1[i] = (low + high) << 10;
        half_in2[i] = (low - high) << 10;
    }

    all_pass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_2,
        state1,
    );
    all_pass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_1,
        state2,
    );

    for (i, pair) in output.chunks_exact_mut(2).enumerate() {
        pair[0] = saturate((filter2[i] + 512) >> 10);
        pair[1] = saturate((filter1[i] + 512) >> 10);
    }
}

#[inline]
fn saturate(value: i32) -> i16 {
    crate::audio_util::saturate_i16(value)
}
