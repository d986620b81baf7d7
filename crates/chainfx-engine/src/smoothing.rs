//! Parameter smoothing: control-rate values ramped to per-sample values.

use crate::error::EngineError;
use crate::params::{names, ParamHandle, ParamStore};

/// Default ramp time.
pub const DEFAULT_RAMP_MS: f64 = 5.0;

/// Linear ramp from the current value toward a target.
///
/// The current value is always derived as `target - step * remaining`, so it
/// never passes the target and lands on it exactly when the ramp ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_len: u32,
}

impl SmoothedValue {
    pub fn new(value: f32) -> Self {
        Self { current: value, target: value, step: 0.0, remaining: 0, ramp_len: 0 }
    }

    /// Set the ramp length. Any ramp in flight jumps to its target.
    pub fn reset(&mut self, sample_rate: f64, ramp_seconds: f64) {
        self.ramp_len = (sample_rate * ramp_seconds).floor().max(0.0) as u32;
        self.initialize(self.target);
    }

    /// Current and target both become `value`; no ramp.
    pub fn initialize(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Ramp from where we are toward `value`.
    pub fn retarget(&mut self, value: f32) {
        if value == self.target {
            return;
        }
        if self.ramp_len == 0 {
            self.initialize(value);
            return;
        }
        self.target = value;
        self.remaining = self.ramp_len;
        self.step = (self.target - self.current) / self.ramp_len as f32;
    }

    pub fn advance(&mut self, num_samples: usize) {
        if self.remaining == 0 {
            return;
        }
        let n = u32::try_from(num_samples).unwrap_or(u32::MAX);
        if n >= self.remaining {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.remaining -= n;
            self.current = self.target - self.step * self.remaining as f32;
        }
    }

    #[inline]
    pub fn current_value(&self) -> f32 {
        self.current
    }

    pub fn target_value(&self) -> f32 {
        self.target
    }

    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Every continuous parameter that is smoothed before reaching the effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothed {
    PhaserRate,
    PhaserDepth,
    PhaserCenterFreq,
    PhaserFeedback,
    PhaserMix,
    ChorusRate,
    ChorusDepth,
    ChorusCenterDelay,
    ChorusFeedback,
    ChorusMix,
    OverdriveSaturation,
    LadderCutoff,
    LadderResonance,
    LadderDrive,
    GeneralFreq,
    GeneralQuality,
    GeneralGain,
    InputGain,
    OutputGain,
}

pub const NUM_SMOOTHED: usize = 19;

impl Smoothed {
    pub const ALL: [Smoothed; NUM_SMOOTHED] = [
        Smoothed::PhaserRate,
        Smoothed::PhaserDepth,
        Smoothed::PhaserCenterFreq,
        Smoothed::PhaserFeedback,
        Smoothed::PhaserMix,
        Smoothed::ChorusRate,
        Smoothed::ChorusDepth,
        Smoothed::ChorusCenterDelay,
        Smoothed::ChorusFeedback,
        Smoothed::ChorusMix,
        Smoothed::OverdriveSaturation,
        Smoothed::LadderCutoff,
        Smoothed::LadderResonance,
        Smoothed::LadderDrive,
        Smoothed::GeneralFreq,
        Smoothed::GeneralQuality,
        Smoothed::GeneralGain,
        Smoothed::InputGain,
        Smoothed::OutputGain,
    ];

    pub fn param_name(self) -> &'static str {
        use Smoothed::*;
        match self {
            PhaserRate => names::PHASER_RATE,
            PhaserDepth => names::PHASER_DEPTH,
            PhaserCenterFreq => names::PHASER_CENTER_FREQ,
            PhaserFeedback => names::PHASER_FEEDBACK,
            PhaserMix => names::PHASER_MIX,
            ChorusRate => names::CHORUS_RATE,
            ChorusDepth => names::CHORUS_DEPTH,
            ChorusCenterDelay => names::CHORUS_CENTER_DELAY,
            ChorusFeedback => names::CHORUS_FEEDBACK,
            ChorusMix => names::CHORUS_MIX,
            OverdriveSaturation => names::OVERDRIVE_SATURATION,
            LadderCutoff => names::LADDER_CUTOFF,
            LadderResonance => names::LADDER_RESONANCE,
            LadderDrive => names::LADDER_DRIVE,
            GeneralFreq => names::GENERAL_FREQ,
            GeneralQuality => names::GENERAL_QUALITY,
            GeneralGain => names::GENERAL_GAIN,
            InputGain => names::INPUT_GAIN,
            OutputGain => names::OUTPUT_GAIN,
        }
    }
}

/// One smoother per [`Smoothed`] parameter, bound to the store by handle.
pub struct SmootherBank {
    handles: [ParamHandle; NUM_SMOOTHED],
    values: [SmoothedValue; NUM_SMOOTHED],
}

impl SmootherBank {
    /// Resolve every smoothed parameter in `store`. A missing name is fatal.
    pub fn bind(store: &ParamStore) -> Result<Self, EngineError> {
        let mut handles = Vec::with_capacity(NUM_SMOOTHED);
        for id in Smoothed::ALL {
            let name = id.param_name();
            handles.push(store.find(name).ok_or(EngineError::MissingParameter(name))?);
        }
        let handles: [ParamHandle; NUM_SMOOTHED] = handles
            .try_into()
            .map_err(|_| EngineError::MissingParameter("<smoothed layout>"))?;
        let values = handles.map(|h| SmoothedValue::new(store.get(h)));
        Ok(Self { handles, values })
    }

    pub fn reset(&mut self, sample_rate: f64, ramp_seconds: f64) {
        for v in self.values.iter_mut() {
            v.reset(sample_rate, ramp_seconds);
        }
    }

    /// Snap every smoother to the store's value, without a ramp.
    pub fn initialize_from(&mut self, store: &ParamStore) {
        for (v, &h) in self.values.iter_mut().zip(self.handles.iter()) {
            v.initialize(store.get(h));
        }
    }

    /// Retarget from the store, then advance by `num_samples`.
    pub fn update_from(&mut self, store: &ParamStore, num_samples: usize) {
        for (v, &h) in self.values.iter_mut().zip(self.handles.iter()) {
            v.retarget(store.get(h));
            v.advance(num_samples);
        }
    }

    #[inline]
    pub fn get(&self, id: Smoothed) -> f32 {
        self.values[id as usize].current_value()
    }

    pub fn smoother(&self, id: Smoothed) -> &SmoothedValue {
        &self.values[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{default_layout, ParamSpec};

    fn ramped(sr: f64, ms: f64) -> SmoothedValue {
        let mut v = SmoothedValue::new(0.0);
        v.reset(sr, ms / 1000.0);
        v
    }

    #[test]
    fn initialize_is_exact() {
        let mut v = ramped(48_000.0, 5.0);
        v.initialize(0.37);
        assert_eq!(v.current_value(), 0.37);
        assert!(!v.is_smoothing());
    }

    #[test]
    fn ramp_stays_in_bounds_and_converges() {
        for &(from, to) in &[(0.0f32, 1.0f32), (1.0, -1.0), (200.0, 20_000.0), (0.5, 0.5001)] {
            let mut v = ramped(48_000.0, 5.0);
            v.initialize(from);
            v.retarget(to);
            let (lo, hi) = (from.min(to), from.max(to));
            let mut prev = v.current_value();
            let mut elapsed = 0;
            while v.is_smoothing() {
                v.advance(7);
                elapsed += 7;
                let x = v.current_value();
                assert!(x >= lo && x <= hi, "{x} escaped [{lo}, {hi}]");
                if to > from { assert!(x >= prev); } else { assert!(x <= prev); }
                prev = x;
            }
            assert_eq!(v.current_value(), to);
            assert!(elapsed <= 240 + 7, "took {elapsed} samples");
        }
    }

    #[test]
    fn reaches_target_within_ramp_time() {
        let mut v = ramped(48_000.0, 5.0);
        v.retarget(1.0);
        v.advance(239);
        assert!(v.current_value() < 1.0);
        v.advance(1);
        assert_eq!(v.current_value(), 1.0);
    }

    #[test]
    fn retarget_keeps_position() {
        let mut v = ramped(1_000.0, 0.1);
        v.retarget(10.0);
        v.advance(50);
        let mid = v.current_value();
        assert!((mid - 5.0).abs() < 1e-4);
        v.retarget(0.0);
        assert_eq!(v.current_value(), mid);
        v.advance(100);
        assert_eq!(v.current_value(), 0.0);
    }

    #[test]
    fn zero_ramp_jumps() {
        let mut v = ramped(48_000.0, 0.0);
        v.retarget(3.0);
        assert_eq!(v.current_value(), 3.0);
    }

    #[test]
    fn advance_zero_is_noop() {
        let mut v = ramped(48_000.0, 5.0);
        v.retarget(1.0);
        let before = v;
        v.advance(0);
        assert_eq!(v, before);
    }

    #[test]
    fn bank_follows_store() {
        let store = ParamStore::with_default_layout();
        let mut bank = SmootherBank::bind(&store).unwrap();
        bank.reset(48_000.0, 0.005);
        bank.initialize_from(&store);
        assert_eq!(bank.get(Smoothed::GeneralFreq), 750.0);

        store.set_by_name(names::GENERAL_FREQ, 1_750.0).unwrap();
        bank.update_from(&store, 120);
        let half = bank.get(Smoothed::GeneralFreq);
        assert!((half - 1_250.0).abs() < 0.01, "{half}");
        bank.update_from(&store, 120);
        assert_eq!(bank.get(Smoothed::GeneralFreq), 1_750.0);
    }

    #[test]
    fn missing_binding_is_fatal() {
        let layout: Vec<ParamSpec> = default_layout()
            .into_iter()
            .filter(|p| p.name != names::CHORUS_MIX)
            .collect();
        let store = ParamStore::new(layout);
        match SmootherBank::bind(&store) {
            Err(EngineError::MissingParameter(name)) => assert_eq!(name, names::CHORUS_MIX),
            other => panic!("expected missing parameter, got {:?}", other.err()),
        }
    }
}
