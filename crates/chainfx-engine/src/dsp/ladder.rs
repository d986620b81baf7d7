use std::f32::consts::TAU;

use super::effect::{Effect, ProcessSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderMode {
    Lpf12,
    Hpf12,
    Bpf12,
    Lpf24,
    Hpf24,
    Bpf24,
}

impl LadderMode {
    /// Index into [`crate::params::LADDER_MODES`]; out-of-range falls back to LPF12.
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => Self::Hpf12,
            2 => Self::Bpf12,
            3 => Self::Lpf24,
            4 => Self::Hpf24,
            5 => Self::Bpf24,
            _ => Self::Lpf12,
        }
    }

    /// Stage tap weights and resonance compensation.
    fn taps(self) -> ([f32; 5], f32) {
        match self {
            Self::Lpf12 => ([0.0, 0.0, 1.0, 0.0, 0.0], 0.5),
            Self::Hpf12 => ([1.0, -2.0, 1.0, 0.0, 0.0], 0.0),
            Self::Bpf12 => ([0.0, 0.0, -1.0, 1.0, 0.0], 0.5),
            Self::Lpf24 => ([0.0, 0.0, 0.0, 0.0, 1.0], 0.5),
            Self::Hpf24 => ([1.0, -4.0, 6.0, -4.0, 1.0], 0.0),
            Self::Bpf24 => ([0.0, 0.0, 1.0, -2.0, 1.0], 0.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderSettings {
    pub mode: LadderMode,
    pub cutoff_hz: f32,
    /// 0..=1
    pub resonance: f32,
    /// 1..=100
    pub drive: f32,
}

/// Four one-pole stages with resonance feedback and a saturating input.
pub struct LadderFilter {
    s: [f32; 5],
    sr: f32,
    settings: LadderSettings,
    a1: f32,
    b0: f32,
    b1: f32,
    res: f32,
    taps: [f32; 5],
    comp: f32,
}

impl LadderFilter {
    pub fn new() -> Self {
        let mut f = Self {
            s: [0.0; 5],
            sr: 48_000.0,
            settings: LadderSettings { mode: LadderMode::Lpf12, cutoff_hz: 20_000.0, resonance: 0.0, drive: 1.0 },
            a1: 0.0,
            b0: 0.0,
            b1: 0.0,
            res: 0.0,
            taps: [0.0; 5],
            comp: 0.0,
        };
        f.recompute();
        f
    }

    /// Coefficients are rebuilt only when a setting actually changes.
    pub fn set(&mut self, settings: LadderSettings) {
        let settings = LadderSettings {
            mode: settings.mode,
            cutoff_hz: settings.cutoff_hz.max(20.0).min(0.49 * self.sr),
            resonance: settings.resonance.clamp(0.0, 1.0),
            drive: settings.drive.max(1.0),
        };
        if settings != self.settings {
            self.settings = settings;
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        self.a1 = (-TAU * self.settings.cutoff_hz / self.sr).exp();
        let g = 1.0 - self.a1;
        self.b0 = g * 0.769_230_77;
        self.b1 = g * 0.230_769_23;
        self.res = 0.1 + 0.9 * self.settings.resonance;
        (self.taps, self.comp) = self.settings.mode.taps();
    }
}

impl Default for LadderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for LadderFilter {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sr = spec.sample_rate as f32;
        self.settings.cutoff_hz = self.settings.cutoff_hz.min(0.49 * self.sr);
        self.recompute();
        self.reset();
    }

    fn reset(&mut self) {
        self.s = [0.0; 5];
    }

    fn render(&mut self, block: &mut [f32]) {
        let (a1, b0, b1, res, comp) = (self.a1, self.b0, self.b1, self.res, self.comp);
        let drive = self.settings.drive;
        let s = &mut self.s;
        for x in block.iter_mut() {
            let dx = (drive * *x).tanh() / drive;
            let a = dx - 4.0 * res * (s[4].tanh() - comp * dx);
            let b = b1 * s[0] + a1 * s[1] + b0 * a;
            let c = b1 * s[1] + a1 * s[2] + b0 * b;
            let d = b1 * s[2] + a1 * s[3] + b0 * c;
            let e = b1 * s[3] + a1 * s[4] + b0 * d;
            *s = [a, b, c, d, e];
            *x = self.taps.iter().zip(s.iter()).map(|(t, v)| t * v).sum();
        }
    }
}
