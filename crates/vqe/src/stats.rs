//! Engine statistics.

/// Snapshot of per-stage measurements.
///
/// All fields are `Option`; `None` indicates the statistic is unavailable
/// (e.g. because the relevant stage is disabled or has not seen enough
/// audio yet).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioProcessingStats {
    /// Echo Return Loss in dB: `ERL = 10 log10(P_far / P_near)`, measured
    /// against the delay-aligned far-end frame.
    pub echo_return_loss: Option<f64>,
    /// Stream delay in milliseconds used by the echo stages on the last
    /// capture frame.
    pub delay_ms: Option<i32>,
    /// Voice activity decision for the last capture frame.
    pub voice_detected: Option<bool>,
    /// Whether the gain controller saturated the last capture frame.
    pub stream_is_saturated: Option<bool>,
    /// Analog volume the gain controller recommends for the next frame.
    pub recommended_analog_level: Option<u16>,
}
