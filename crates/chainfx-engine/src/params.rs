//! Host-side automatable parameter store.
//!
//! A fixed layout of named parameters whose values live in atomics, so the
//! control thread can write them and the audio thread can read them without
//! locks. The layout never changes after construction.

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

pub mod names {
    pub const PHASER_RATE: &str = "Phaser RateHz";
    pub const PHASER_DEPTH: &str = "Phaser Depth %";
    pub const PHASER_CENTER_FREQ: &str = "Phaser Center FreqHz";
    pub const PHASER_FEEDBACK: &str = "Phaser Feedback %";
    pub const PHASER_MIX: &str = "Phaser Mix %";

    pub const CHORUS_RATE: &str = "Chorus RateHz";
    pub const CHORUS_DEPTH: &str = "Chorus Depth %";
    pub const CHORUS_CENTER_DELAY: &str = "Chorus Center DelayMs";
    pub const CHORUS_FEEDBACK: &str = "Chorus Feedback %";
    pub const CHORUS_MIX: &str = "Chorus Mix %";

    pub const OVERDRIVE_SATURATION: &str = "Overdrive Saturation %";

    pub const LADDER_MODE: &str = "Ladder Filter Mode";
    pub const LADDER_CUTOFF: &str = "Ladder Filter Cutoff Hz";
    pub const LADDER_RESONANCE: &str = "Ladder Filter Resonance";
    pub const LADDER_DRIVE: &str = "Ladder Filter Drive";

    pub const GENERAL_MODE: &str = "General Filter Mode";
    pub const GENERAL_FREQ: &str = "General Filter Freq hz";
    pub const GENERAL_QUALITY: &str = "General Filter Quality";
    pub const GENERAL_GAIN: &str = "General Filter Gain";

    pub const INPUT_GAIN: &str = "Input Gain";
    pub const OUTPUT_GAIN: &str = "Output Gain";
}

pub const LADDER_MODES: &[&str] = &["LPF12", "HPF12", "BPF12", "LPF24", "HPF24", "BPF24"];
pub const GENERAL_FILTER_MODES: &[&str] = &["Peak", "Bandpass", "Notch", "Allpass"];

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    Unknown(String),
    #[error("parameter `{name}` has no choice {index} (of {len})")]
    ChoiceOutOfRange { name: String, index: i64, len: usize },
    #[error("parameter `{0}` needs a finite value")]
    NotFinite(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Float { min: f32, max: f32 },
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: f32,
    pub unit: &'static str,
}

impl ParamSpec {
    pub fn float(name: &'static str, min: f32, max: f32, default: f32, unit: &'static str) -> Self {
        Self { name, kind: ParamKind::Float { min, max }, default, unit }
    }

    pub fn choice(name: &'static str, choices: &'static [&'static str], default: usize) -> Self {
        Self { name, kind: ParamKind::Choice(choices), default: default as f32, unit: "" }
    }

    fn clamp(&self, value: f32) -> Result<f32, ParamError> {
        if !value.is_finite() {
            return Err(ParamError::NotFinite(self.name.to_string()));
        }
        match self.kind {
            ParamKind::Float { min, max } => Ok(value.clamp(min, max)),
            ParamKind::Choice(choices) => {
                let index = value.round() as i64;
                if index < 0 || index as usize >= choices.len() {
                    return Err(ParamError::ChoiceOutOfRange {
                        name: self.name.to_string(),
                        index,
                        len: choices.len(),
                    });
                }
                Ok(index as f32)
            }
        }
    }
}

/// The plugin's parameter layout.
pub fn default_layout() -> Vec<ParamSpec> {
    use names::*;
    vec![
        ParamSpec::float(PHASER_RATE, 0.01, 2.0, 0.2, "Hz"),
        ParamSpec::float(PHASER_DEPTH, 0.01, 1.0, 0.05, "%"),
        ParamSpec::float(PHASER_CENTER_FREQ, 20.0, 20_000.0, 1_000.0, "Hz"),
        ParamSpec::float(PHASER_FEEDBACK, -1.0, 1.0, 0.0, "%"),
        ParamSpec::float(PHASER_MIX, 0.01, 1.0, 0.05, "%"),
        ParamSpec::float(CHORUS_RATE, 0.01, 100.0, 0.2, "Hz"),
        ParamSpec::float(CHORUS_DEPTH, 0.01, 1.0, 0.05, "%"),
        ParamSpec::float(CHORUS_CENTER_DELAY, 0.01, 100.0, 7.5, "ms"),
        ParamSpec::float(CHORUS_FEEDBACK, -1.0, 1.0, 0.0, "%"),
        ParamSpec::float(CHORUS_MIX, 0.01, 1.0, 0.05, "%"),
        ParamSpec::float(OVERDRIVE_SATURATION, 1.0, 100.0, 1.0, "%"),
        ParamSpec::choice(LADDER_MODE, LADDER_MODES, 0),
        ParamSpec::float(LADDER_CUTOFF, 20.0, 20_000.0, 20_000.0, "Hz"),
        ParamSpec::float(LADDER_RESONANCE, 0.0, 100.0, 0.0, "%"),
        ParamSpec::float(LADDER_DRIVE, 1.0, 100.0, 1.0, ""),
        ParamSpec::choice(GENERAL_MODE, GENERAL_FILTER_MODES, 0),
        ParamSpec::float(GENERAL_FREQ, 20.0, 20_000.0, 750.0, "Hz"),
        ParamSpec::float(GENERAL_QUALITY, 0.1, 10.0, 1.0, ""),
        ParamSpec::float(GENERAL_GAIN, -24.0, 24.0, 0.0, "dB"),
        ParamSpec::float(INPUT_GAIN, -18.0, 18.0, 0.0, "dB"),
        ParamSpec::float(OUTPUT_GAIN, -18.0, 18.0, 0.0, "dB"),
    ]
}

/// Index of a parameter in its store, resolved once at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamHandle(usize);

pub struct ParamStore {
    specs: Vec<ParamSpec>,
    values: Box<[AtomicU32]>,
}

impl ParamStore {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        let values = specs.iter().map(|s| AtomicU32::new(s.default.to_bits())).collect();
        Self { specs, values }
    }

    pub fn with_default_layout() -> Self {
        Self::new(default_layout())
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn find(&self, name: &str) -> Option<ParamHandle> {
        self.specs.iter().position(|s| s.name == name).map(ParamHandle)
    }

    pub fn spec(&self, handle: ParamHandle) -> &ParamSpec {
        &self.specs[handle.0]
    }

    /// Lock-free read, safe from the audio thread.
    #[inline]
    pub fn get(&self, handle: ParamHandle) -> f32 {
        f32::from_bits(self.values[handle.0].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn choice_index(&self, handle: ParamHandle) -> usize {
        self.get(handle).max(0.0) as usize
    }

    /// Store a value, clamped to the parameter's range. Returns the stored value.
    pub fn set(&self, handle: ParamHandle, value: f32) -> Result<f32, ParamError> {
        let value = self.specs[handle.0].clamp(value)?;
        self.values[handle.0].store(value.to_bits(), Ordering::Relaxed);
        Ok(value)
    }

    pub fn set_by_name(&self, name: &str, value: f32) -> Result<f32, ParamError> {
        let handle = self.find(name).ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        self.set(handle, value)
    }

    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        self.find(name).map(|h| self.get(h))
    }

    pub fn reset_to_defaults(&self) {
        for (spec, value) in self.specs.iter().zip(self.values.iter()) {
            value.store(spec.default.to_bits(), Ordering::Relaxed);
        }
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::with_default_layout()
    }
}
