pub mod biquad;
pub mod chorus;
pub mod effect;
pub mod gain;
pub mod ladder;
pub mod overdrive;
pub mod phaser;

use crate::order::EffectKind;

use biquad::{Biquad, BiquadSettings, FilterMode};
use chorus::{Chorus, ChorusSettings};
use effect::{Effect, ProcessContext, ProcessSpec};
use ladder::{LadderFilter, LadderMode, LadderSettings};
use overdrive::Overdrive;
use phaser::{Phaser, PhaserSettings};

/// Derived per-effect settings, computed once per sub-block and shared by
/// every channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSettings {
    pub phaser: PhaserSettings,
    pub chorus: ChorusSettings,
    pub overdrive_saturation: f32,
    pub ladder: LadderSettings,
    pub general: BiquadSettings,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            phaser: PhaserSettings { rate_hz: 0.2, depth: 0.05, centre_hz: 1_000.0, feedback: 0.0, mix: 0.05 },
            chorus: ChorusSettings { rate_hz: 0.2, depth: 0.05, centre_delay_ms: 7.5, feedback: 0.0, mix: 0.05 },
            overdrive_saturation: 1.0,
            ladder: LadderSettings { mode: LadderMode::Lpf12, cutoff_hz: 20_000.0, resonance: 0.0, drive: 1.0 },
            general: BiquadSettings { mode: FilterMode::Peak, freq_hz: 750.0, q: 1.0, gain_db: 0.0 },
        }
    }
}

/// The five effect instances of one channel, addressed by [`EffectKind`].
#[derive(Default)]
pub struct ChannelEffects {
    phaser: Phaser,
    chorus: Chorus,
    overdrive: Overdrive,
    ladder: LadderFilter,
    general: Biquad,
}

impl ChannelEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.phaser.prepare(spec);
        self.chorus.prepare(spec);
        self.overdrive.prepare(spec);
        self.ladder.prepare(spec);
        self.general.prepare(spec);
    }

    pub fn reset(&mut self) {
        self.phaser.reset();
        self.chorus.reset();
        self.overdrive.reset();
        self.ladder.reset();
        self.general.reset();
    }

    /// Push derived settings into every effect, bypassed or not.
    pub fn apply(&mut self, settings: &EffectSettings) {
        self.phaser.set(settings.phaser);
        self.chorus.set(settings.chorus);
        self.overdrive.set_saturation(settings.overdrive_saturation);
        self.ladder.set(settings.ladder);
        self.general.set(settings.general);
    }

    /// Run the instance for `kind`.
    #[inline]
    pub fn process(&mut self, kind: EffectKind, ctx: &mut ProcessContext<'_>) {
        match kind {
            EffectKind::Phase => self.phaser.process(ctx),
            EffectKind::Chorus => self.chorus.process(ctx),
            EffectKind::Overdrive => self.overdrive.process(ctx),
            EffectKind::LadderFilter => self.ladder.process(ctx),
            EffectKind::GeneralFilter => self.general.process(ctx),
        }
    }
}
