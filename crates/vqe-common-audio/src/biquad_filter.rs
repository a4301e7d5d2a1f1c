//! Second-order IIR filter section (direct form I).

use crate::audio_util::float_s16_to_s16;

/// Biquad coefficients. The leading denominator coefficient is implicitly 1:
///
/// ```text
/// y[n] = b0 x[n] + b1 x[n-1] + b2 x[n-2] - a1 y[n-1] - a2 y[n-2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiQuadCoefficients {
    pub b: [f32; 3],
    pub a: [f32; 2],
}

/// A single biquad section with its own delay line.
#[derive(Debug, Clone)]
pub struct BiQuadFilter {
    coefficients: BiQuadCoefficients,
    x: [f32; 2],
    y: [f32; 2],
}

impl BiQuadFilter {
    pub fn new(coefficients: BiQuadCoefficients) -> Self {
        Self {
            coefficients,
            x: [0.0; 2],
            y: [0.0; 2],
        }
    }

    /// Replaces the coefficients and clears the delay line.
    pub fn set_coefficients(&mut self, coefficients: BiQuadCoefficients) {
        self.coefficients = coefficients;
        self.reset();
    }

    pub fn coefficients(&self) -> &BiQuadCoefficients {
        &self.coefficients
    }

    pub fn reset(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; 2];
    }

    #[inline]
    fn step(&mut self, x: f32) -> f32 {
        let BiQuadCoefficients { b, a } = self.coefficients;
        let y = b[0] * x + b[1] * self.x[0] + b[2] * self.x[1] - a[0] * self.y[0] - a[1] * self.y[1];
        self.x[1] = self.x[0];
        self.x[0] = x;
        self.y[1] = self.y[0];
        self.y[0] = y;
        y
    }

    /// Filters float samples in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.step(*s);
        }
    }

    /// Filters S16 samples in place, rounding and saturating the output.
    pub fn process_s16(&mut self, samples: &mut [i16]) {
        for s in samples.iter_mut() {
            *s = float_s16_to_s16(self.step(f32::from(*s)));
        }
    }
}
