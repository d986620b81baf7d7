use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::effect::ProcessContext;
use crate::dsp::ChannelEffects;
use crate::order::{ChainOrder, EffectKind, NUM_EFFECTS};

/// One bypass flag per effect kind. Single writer (control), single reader
/// (audio); read once per sub-block.
#[derive(Default)]
pub struct BypassFlags([AtomicBool; NUM_EFFECTS]);

impl BypassFlags {
    pub fn set(&self, kind: EffectKind, bypassed: bool) {
        self.0[kind.index()].store(bypassed, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, kind: EffectKind) -> bool {
        self.0[kind.index()].load(Ordering::Relaxed)
    }

    pub fn bypassed(&self) -> impl Iterator<Item = EffectKind> + '_ {
        EffectKind::ALL.into_iter().filter(|&k| self.get(k))
    }
}

/// Position descriptor: which effect runs here and whether it is bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub kind: Option<EffectKind>,
    pub bypass: bool,
}

/// The chain for one sub-block: the active order with bypass flags resolved.
/// Rebuilt every sub-block; shared by all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChain {
    slots: [SlotState; NUM_EFFECTS],
}

impl ResolvedChain {
    pub fn resolve(order: &ChainOrder, bypass: &BypassFlags) -> Self {
        let slots = order.slots().map(|kind| SlotState {
            kind,
            bypass: kind.is_some_and(|k| bypass.get(k)),
        });
        Self { slots }
    }

    pub fn slots(&self) -> &[SlotState; NUM_EFFECTS] {
        &self.slots
    }

    /// Process one channel's block through every position, in order.
    pub fn run(&self, effects: &mut ChannelEffects, block: &mut [f32]) {
        let mut ctx = ProcessContext::new(block);
        for slot in &self.slots {
            let Some(kind) = slot.kind else {
                debug_assert!(false, "chain slot without an effect kind");
                continue;
            };
            ctx.set_bypassed(slot.bypass);
            effects.process(kind, &mut ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::biquad::{self, BiquadSettings, FilterMode};
    use crate::dsp::chorus::{self, ChorusSettings};
    use crate::dsp::effect::{Effect, ProcessSpec};
    use crate::dsp::ladder::{self, LadderMode, LadderSettings};
    use crate::dsp::phaser::{self, PhaserSettings};
    use crate::dsp::EffectSettings;
    use EffectKind::*;

    const SPEC: ProcessSpec = ProcessSpec { sample_rate: 48_000.0, max_block_size: 64, num_channels: 1 };

    fn settings() -> EffectSettings {
        EffectSettings {
            phaser: PhaserSettings { rate_hz: 1.0, depth: 0.6, centre_hz: 900.0, feedback: 0.3, mix: 0.5 },
            chorus: ChorusSettings { rate_hz: 0.8, depth: 0.5, centre_delay_ms: 4.0, feedback: 0.2, mix: 0.5 },
            overdrive_saturation: 40.0,
            ladder: LadderSettings { mode: LadderMode::Lpf24, cutoff_hz: 3_000.0, resonance: 0.3, drive: 2.0 },
            general: BiquadSettings { mode: FilterMode::Peak, freq_hz: 1_200.0, q: 1.5, gain_db: 6.0 },
        }
    }

    fn channel() -> ChannelEffects {
        let mut fx = ChannelEffects::new();
        fx.prepare(&SPEC);
        fx.apply(&settings());
        fx
    }

    fn signal() -> Vec<f32> {
        (0..64).map(|n| 0.5 * (n as f32 * 0.37).sin() + if n == 0 { 0.5 } else { 0.0 }).collect()
    }

    #[test]
    fn resolve_copies_order_and_flags() {
        let flags = BypassFlags::default();
        flags.set(Overdrive, true);
        let order = ChainOrder::new([Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]).unwrap();
        let chain = ResolvedChain::resolve(&order, &flags);
        let kinds: Vec<_> = chain.slots().iter().map(|s| s.kind.unwrap()).collect();
        assert_eq!(kinds, vec![Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]);
        let bypassed: Vec<_> = chain.slots().iter().map(|s| s.bypass).collect();
        assert_eq!(bypassed, vec![false, false, true, false, false]);
    }

    #[test]
    fn all_bypassed_is_identity() {
        let flags = BypassFlags::default();
        for k in EffectKind::ALL {
            flags.set(k, true);
        }
        let chain = ResolvedChain::resolve(&ChainOrder::default(), &flags);
        let mut fx = channel();
        let mut block = signal();
        chain.run(&mut fx, &mut block);
        assert_eq!(block, signal());
    }

    #[test]
    fn bypass_removes_only_that_effect() {
        let flags = BypassFlags::default();
        flags.set(Overdrive, true);
        let chain = ResolvedChain::resolve(&ChainOrder::default(), &flags);
        let mut fx = channel();
        let mut block = signal();
        chain.run(&mut fx, &mut block);

        let s = settings();
        let mut phaser = phaser::Phaser::new();
        let mut chorus = chorus::Chorus::new();
        let mut ladder = ladder::LadderFilter::new();
        let mut general = biquad::Biquad::new();
        phaser.prepare(&SPEC);
        chorus.prepare(&SPEC);
        ladder.prepare(&SPEC);
        general.prepare(&SPEC);
        phaser.set(s.phaser);
        chorus.set(s.chorus);
        ladder.set(s.ladder);
        general.set(s.general);

        let mut reference = signal();
        phaser.render(&mut reference);
        chorus.render(&mut reference);
        ladder.render(&mut reference);
        general.render(&mut reference);
        assert_eq!(block, reference);
    }

    #[test]
    fn bypassed_effect_keeps_frozen_state() {
        let live = BypassFlags::default();
        let only_chorus = BypassFlags::default();
        for k in EffectKind::ALL {
            only_chorus.set(k, k != Chorus);
        }
        let everything = ResolvedChain::resolve(&ChainOrder::default(), &live);
        let chorus_alone = ResolvedChain::resolve(&ChainOrder::default(), &only_chorus);

        let mut toggled = channel();
        let mut untouched = channel();
        let mut a = signal();
        let mut b = signal();
        everything.run(&mut toggled, &mut a);
        everything.run(&mut untouched, &mut b);

        // bypass chorus on one channel for a block of non-silent input
        live.set(Chorus, true);
        let without_chorus = ResolvedChain::resolve(&ChainOrder::default(), &live);
        let mut filler = vec![0.25f32; 64];
        without_chorus.run(&mut toggled, &mut filler);

        let mut a = signal();
        let mut b = signal();
        chorus_alone.run(&mut toggled, &mut a);
        chorus_alone.run(&mut untouched, &mut b);
        assert_eq!(a, b, "chorus state must not advance while bypassed");
    }

    #[test]
    fn order_changes_the_result() {
        let flags = BypassFlags::default();
        let forward = ResolvedChain::resolve(&ChainOrder::default(), &flags);
        let reversed = ResolvedChain::resolve(
            &ChainOrder::new([GeneralFilter, LadderFilter, Overdrive, Chorus, Phase]).unwrap(),
            &flags,
        );
        let mut a = signal();
        let mut b = signal();
        forward.run(&mut channel(), &mut a);
        reversed.run(&mut channel(), &mut b);
        assert_ne!(a, b);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "chain slot without an effect kind")]
    fn empty_slot_asserts_in_debug() {
        let flags = BypassFlags::default();
        let chain = ResolvedChain::resolve(&ChainOrder::SENTINEL, &flags);
        let mut block = signal();
        chain.run(&mut channel(), &mut block);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn empty_slot_is_skipped_in_release() {
        let flags = BypassFlags::default();
        let chain = ResolvedChain::resolve(&ChainOrder::SENTINEL, &flags);
        let mut block = signal();
        chain.run(&mut channel(), &mut block);
        assert_eq!(block, signal());
    }
}
