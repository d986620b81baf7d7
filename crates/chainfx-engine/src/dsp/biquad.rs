use std::f64::consts::PI;

use super::effect::{Effect, ProcessSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Peak,
    Bandpass,
    Notch,
    Allpass,
}

impl FilterMode {
    /// Index into [`crate::params::GENERAL_FILTER_MODES`]; out-of-range falls back to Peak.
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => Self::Bandpass,
            2 => Self::Notch,
            3 => Self::Allpass,
            _ => Self::Peak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadSettings {
    pub mode: FilterMode,
    pub freq_hz: f32,
    pub q: f32,
    pub gain_db: f32,
}

/// RBJ cookbook biquad, direct form I.
pub struct Biquad {
    sr: f64,
    settings: BiquadSettings,
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new() -> Self {
        let mut bq = Self {
            sr: 48_000.0,
            settings: BiquadSettings { mode: FilterMode::Peak, freq_hz: 750.0, q: 1.0, gain_db: 0.0 },
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        bq.compute_coeffs();
        bq
    }

    /// Coefficients are rebuilt only when a setting actually changes.
    pub fn set(&mut self, settings: BiquadSettings) {
        if settings != self.settings {
            self.settings = settings;
            self.compute_coeffs();
        }
    }

    fn compute_coeffs(&mut self) {
        let BiquadSettings { mode, freq_hz, q, gain_db } = self.settings;
        let freq = (freq_hz as f64).max(1.0).min(0.49 * self.sr);
        let q = (q as f64).max(1e-3);
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let omega = 2.0 * PI * freq / self.sr;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match mode {
            FilterMode::Peak => (
                1.0 + alpha * a,
                -2.0 * cs,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cs,
                1.0 - alpha / a,
            ),
            FilterMode::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterMode::Notch => (1.0, -2.0 * cs, 1.0, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterMode::Allpass => (1.0 - alpha, -2.0 * cs, 1.0 + alpha, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Biquad {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sr = spec.sample_rate;
        self.compute_coeffs();
        self.reset();
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn render(&mut self, block: &mut [f32]) {
        for s in block.iter_mut() {
            *s = self.tick(*s as f64) as f32;
        }
    }
}
