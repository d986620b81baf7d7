use std::f32::consts::{PI, TAU};

use super::effect::{Effect, ProcessSpec};

const STAGES: usize = 4;

struct AllPass {
    a1: f32,
    zm1: f32,
}

/// First-order allpass coefficient for corner `fc`.
#[inline]
fn allpass_coeff(fc: f32, sr: f32) -> f32 {
    let w = (PI * (fc / sr)).tan();
    (1.0 - w) / (1.0 + w)
}

impl AllPass {
    fn new() -> Self {
        Self { a1: 0.0, zm1: 0.0 }
    }
    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let y = -self.a1 * x + self.zm1;
        self.zm1 = x + self.a1 * y;
        y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaserSettings {
    pub rate_hz: f32,
    pub depth: f32,
    pub centre_hz: f32,
    pub feedback: f32,
    pub mix: f32,
}

/// Allpass phaser with an LFO-swept centre frequency.
pub struct Phaser {
    ap: [AllPass; STAGES],
    phase: f32,
    last: f32,
    sr: f32,
    settings: PhaserSettings,
}

impl Phaser {
    pub fn new() -> Self {
        Self {
            ap: std::array::from_fn(|_| AllPass::new()),
            phase: 0.0,
            last: 0.0,
            sr: 48_000.0,
            settings: PhaserSettings { rate_hz: 0.2, depth: 0.05, centre_hz: 1_000.0, feedback: 0.0, mix: 0.05 },
        }
    }

    pub fn set(&mut self, settings: PhaserSettings) {
        self.settings = PhaserSettings {
            rate_hz: settings.rate_hz.max(0.0),
            depth: settings.depth.clamp(0.0, 1.0),
            centre_hz: settings.centre_hz.max(1.0),
            feedback: settings.feedback.clamp(-0.95, 0.95),
            mix: settings.mix.clamp(0.0, 1.0),
        };
    }
}

impl Default for Phaser {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Phaser {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sr = spec.sample_rate as f32;
        self.reset();
    }

    fn reset(&mut self) {
        for ap in self.ap.iter_mut() {
            ap.zm1 = 0.0;
        }
        self.phase = 0.0;
        self.last = 0.0;
    }

    fn render(&mut self, block: &mut [f32]) {
        let PhaserSettings { rate_hz, depth, centre_hz, feedback, mix } = self.settings;
        let dp = rate_hz / self.sr;
        let top = 0.45 * self.sr;
        for s in block.iter_mut() {
            // sweep +-2 octaves around the centre at full depth
            let lfo = (TAU * self.phase).sin();
            let fc = (centre_hz * (2.0 * depth * lfo).exp2()).max(20.0).min(top);
            // all stages share one corner
            let a1 = allpass_coeff(fc, self.sr);
            for ap in self.ap.iter_mut() {
                ap.a1 = a1;
            }
            let x = *s;
            let y = self.ap.iter_mut().fold(x + feedback * self.last, |acc, ap| ap.tick(acc));
            self.last = y;
            self.phase = (self.phase + dp).fract();
            *s = x * (1.0 - mix) + y * mix;
        }
    }
}
