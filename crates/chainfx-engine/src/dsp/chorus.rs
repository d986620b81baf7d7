use std::f32::consts::TAU;

use super::effect::{Effect, ProcessSpec};

/// Longest centre delay plus modulation headroom.
const MAX_DELAY_MS: f32 = 100.0 + MOD_RANGE_MS;
/// Delay swing at full depth.
const MOD_RANGE_MS: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusSettings {
    pub rate_hz: f32,
    pub depth: f32,
    pub centre_delay_ms: f32,
    pub feedback: f32,
    pub mix: f32,
}

/// Modulated delay line.
pub struct Chorus {
    buf: Vec<f32>,
    wr: usize,
    phase: f32,
    last: f32,
    sr: f32,
    settings: ChorusSettings,
}

impl Chorus {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            wr: 0,
            phase: 0.0,
            last: 0.0,
            sr: 48_000.0,
            settings: ChorusSettings { rate_hz: 0.2, depth: 0.05, centre_delay_ms: 7.5, feedback: 0.0, mix: 0.05 },
        }
    }

    pub fn set(&mut self, settings: ChorusSettings) {
        self.settings = ChorusSettings {
            rate_hz: settings.rate_hz.max(0.0),
            depth: settings.depth.clamp(0.0, 1.0),
            centre_delay_ms: settings.centre_delay_ms.clamp(0.0, 100.0),
            feedback: settings.feedback.clamp(-0.95, 0.95),
            mix: settings.mix.clamp(0.0, 1.0),
        };
    }

    #[inline]
    fn read_at(buf: &[f32], idx: f32) -> f32 {
        let len = buf.len() as i32;
        let i0 = idx.floor() as i32;
        let frac = idx - i0 as f32;
        let wrap = |i: i32| -> usize { ((i % len + len) % len) as usize };
        let s0 = buf[wrap(i0)];
        let s1 = buf[wrap(i0 + 1)];
        s0 + (s1 - s0) * frac
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Chorus {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sr = spec.sample_rate as f32;
        let len = ((MAX_DELAY_MS / 1000.0) * self.sr).ceil().max(64.0) as usize + 2;
        self.buf = vec![0.0; len];
        self.reset();
    }

    fn reset(&mut self) {
        self.buf.iter_mut().for_each(|s| *s = 0.0);
        self.wr = 0;
        self.phase = 0.0;
        self.last = 0.0;
    }

    fn render(&mut self, block: &mut [f32]) {
        if self.buf.is_empty() {
            return;
        }
        let ChorusSettings { rate_hz, depth, centre_delay_ms, feedback, mix } = self.settings;
        let dp = rate_hz / self.sr;
        let to_samp = |ms: f32| (ms / 1000.0) * self.sr;
        let max_d = (self.buf.len() - 2) as f32;
        for s in block.iter_mut() {
            let x = *s;
            self.buf[self.wr] = x + feedback * self.last;
            let lfo = (TAU * self.phase).sin();
            let d = to_samp(centre_delay_ms + depth * MOD_RANGE_MS * 0.5 * lfo).clamp(1.0, max_d);
            let y = Self::read_at(&self.buf, self.wr as f32 - d);
            self.last = y;
            self.phase = (self.phase + dp).fract();
            self.wr += 1;
            if self.wr >= self.buf.len() { self.wr = 0; }
            *s = x * (1.0 - mix) + y * mix;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprepared_chorus_passes_through() {
        let mut c = Chorus::new();
        let mut block = [0.5f32; 8];
        c.render(&mut block);
        assert_eq!(block, [0.5; 8]);
    }

    #[test]
    fn impulse_comes_back_after_centre_delay() {
        let mut c = Chorus::new();
        c.prepare(&ProcessSpec { sample_rate: 1_000.0, max_block_size: 64, num_channels: 1 });
        c.set(ChorusSettings { rate_hz: 0.0, depth: 0.0, centre_delay_ms: 10.0, feedback: 0.0, mix: 1.0 });
        let mut block = [0.0f32; 32];
        block[0] = 1.0;
        c.render(&mut block);
        // 10 ms at 1 kHz is 10 samples
        assert_eq!(block[10], 1.0);
        assert_eq!(block.iter().filter(|s| **s != 0.0).count(), 1);
    }
}
