//! Per-callback driver.
//!
//! Each host block starts by draining the order queue, so the active order is
//! fixed for the whole callback. The block is then cut into sub-blocks of at
//! most `max_sub_block` frames; for each one the smoothers advance, derived
//! effect settings are rebuilt, and the chain runs on every channel.
//!
//! Nothing here allocates, locks or logs once `prepare` has run.

use std::ops::Range;
use std::sync::Arc;

use crate::chain::ResolvedChain;
use crate::dsp::biquad::{BiquadSettings, FilterMode};
use crate::dsp::chorus::ChorusSettings;
use crate::dsp::effect::ProcessSpec;
use crate::dsp::gain::Gain;
use crate::dsp::ladder::{LadderMode, LadderSettings};
use crate::dsp::phaser::PhaserSettings;
use crate::dsp::{ChannelEffects, EffectSettings};
use crate::error::EngineError;
use crate::order::{ChainOrder, OrderConsumer};
use crate::params::{names, ParamHandle, ParamStore};
use crate::shared::SharedState;
use crate::smoothing::{Smoothed, SmootherBank};

/// Default sub-block length in frames.
pub const DEFAULT_MAX_SUB_BLOCK: usize = 64;

/// Lowest sample rate `prepare` accepts.
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;

/// Consecutive ranges of at most `max` covering `0..total`.
#[derive(Debug, Clone)]
pub struct SubBlocks {
    pos: usize,
    total: usize,
    max: usize,
}

impl SubBlocks {
    pub fn new(total: usize, max: usize) -> Self {
        Self { pos: 0, total, max: max.max(1) }
    }
}

impl Iterator for SubBlocks {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.pos >= self.total {
            return None;
        }
        let start = self.pos;
        self.pos = (start + self.max).min(self.total);
        Some(start..self.pos)
    }
}

/// Counters kept by the audio thread; cheap to copy out for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub callbacks: u64,
    pub sub_blocks: u64,
    pub orders_applied: u64,
    pub orders_rejected: u64,
}

pub struct Processor {
    shared: Arc<SharedState>,
    orders: OrderConsumer,
    active: ChainOrder,
    smoothers: SmootherBank,
    ladder_mode: ParamHandle,
    general_mode: ParamHandle,
    channels: Vec<ChannelEffects>,
    input_gain: Gain,
    output_gain: Gain,
    scratch: Vec<Vec<f32>>,
    spec: Option<ProcessSpec>,
    max_sub_block: usize,
    ramp_seconds: f64,
    stats: ProcessorStats,
}

impl Processor {
    /// Bind every parameter the chain reads. Fails before any audio runs if
    /// one is missing from the store.
    pub fn new(
        shared: Arc<SharedState>,
        orders: OrderConsumer,
        initial: ChainOrder,
        max_sub_block: usize,
        smoothing_ms: f64,
    ) -> Result<Self, EngineError> {
        initial.validate()?;
        if max_sub_block == 0 {
            return Err(EngineError::InvalidConfig("max_sub_block must be at least 1".into()));
        }
        if !(smoothing_ms.is_finite() && smoothing_ms >= 0.0) {
            return Err(EngineError::InvalidConfig(format!("smoothing_ms must be >= 0, got {smoothing_ms}")));
        }
        let store = shared.params();
        let smoothers = SmootherBank::bind(store)?;
        let ladder_mode = store.find(names::LADDER_MODE).ok_or(EngineError::MissingParameter(names::LADDER_MODE))?;
        let general_mode = store.find(names::GENERAL_MODE).ok_or(EngineError::MissingParameter(names::GENERAL_MODE))?;
        shared.publish_active(initial);

        Ok(Self {
            shared,
            orders,
            active: initial,
            smoothers,
            ladder_mode,
            general_mode,
            channels: Vec::new(),
            input_gain: Gain::new(0.0),
            output_gain: Gain::new(0.0),
            scratch: Vec::new(),
            spec: None,
            max_sub_block,
            ramp_seconds: smoothing_ms / 1000.0,
            stats: ProcessorStats::default(),
        })
    }

    /// (Re)configure for a sample rate, block size and channel count.
    /// Allocates; call off the audio thread. A rejected spec leaves the
    /// processor as it was.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<(), EngineError> {
        if !(spec.sample_rate.is_finite() && spec.sample_rate >= MIN_SAMPLE_RATE) {
            return Err(EngineError::UnsupportedSampleRate(spec.sample_rate));
        }
        let sub_spec = ProcessSpec { max_block_size: spec.max_block_size.min(self.max_sub_block).max(1), ..spec };
        self.channels.resize_with(spec.num_channels, ChannelEffects::new);
        for fx in self.channels.iter_mut() {
            fx.prepare(&sub_spec);
        }
        self.scratch = vec![vec![0.0; self.max_sub_block]; spec.num_channels];
        self.smoothers.reset(spec.sample_rate, self.ramp_seconds);
        self.spec = Some(spec);
        self.snap_to_params();
        Ok(())
    }

    /// Playback restart: clear effect state and snap smoothers to the store
    /// so nothing ramps in.
    pub fn reset(&mut self) {
        for fx in self.channels.iter_mut() {
            fx.reset();
        }
        self.snap_to_params();
    }

    fn snap_to_params(&mut self) {
        self.smoothers.initialize_from(self.shared.params());
        let settings = self.derive_settings();
        for fx in self.channels.iter_mut() {
            fx.apply(&settings);
        }
        self.input_gain.set_db(self.smoothers.get(Smoothed::InputGain));
        self.output_gain.set_db(self.smoothers.get(Smoothed::OutputGain));
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    pub fn active_order(&self) -> ChainOrder {
        self.active
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn max_sub_block(&self) -> usize {
        self.max_sub_block
    }

    /// Drain the order queue, keeping only the newest entry. Applies it if it
    /// is a full permutation. Returns true when the active order changed.
    fn begin_callback(&mut self) -> bool {
        self.stats.callbacks += 1;
        let Some(order) = self.orders.drain_latest() else {
            return false;
        };
        if !order.is_permutation() {
            self.stats.orders_rejected += 1;
            return false;
        }
        self.stats.orders_applied += 1;
        self.shared.publish_active(order);
        let changed = order != self.active;
        self.active = order;
        changed
    }

    /// Advance smoothers by `len` frames and push the fresh settings into
    /// every channel. Returns the chain to run for this sub-block.
    fn step(&mut self, len: usize) -> ResolvedChain {
        self.stats.sub_blocks += 1;
        self.smoothers.update_from(self.shared.params(), len);
        let settings = self.derive_settings();
        for fx in self.channels.iter_mut() {
            fx.apply(&settings);
        }
        self.input_gain.set_db(self.smoothers.get(Smoothed::InputGain));
        self.output_gain.set_db(self.smoothers.get(Smoothed::OutputGain));
        ResolvedChain::resolve(&self.active, self.shared.bypass())
    }

    fn derive_settings(&self) -> EffectSettings {
        let s = &self.smoothers;
        let store: &ParamStore = self.shared.params();
        EffectSettings {
            phaser: PhaserSettings {
                rate_hz: s.get(Smoothed::PhaserRate),
                depth: s.get(Smoothed::PhaserDepth),
                centre_hz: s.get(Smoothed::PhaserCenterFreq),
                feedback: s.get(Smoothed::PhaserFeedback),
                mix: s.get(Smoothed::PhaserMix),
            },
            chorus: ChorusSettings {
                rate_hz: s.get(Smoothed::ChorusRate),
                depth: s.get(Smoothed::ChorusDepth),
                centre_delay_ms: s.get(Smoothed::ChorusCenterDelay),
                feedback: s.get(Smoothed::ChorusFeedback),
                mix: s.get(Smoothed::ChorusMix),
            },
            overdrive_saturation: s.get(Smoothed::OverdriveSaturation),
            ladder: LadderSettings {
                mode: LadderMode::from_index(store.choice_index(self.ladder_mode)),
                cutoff_hz: s.get(Smoothed::LadderCutoff),
                resonance: s.get(Smoothed::LadderResonance) / 100.0,
                drive: s.get(Smoothed::LadderDrive),
            },
            general: BiquadSettings {
                mode: FilterMode::from_index(store.choice_index(self.general_mode)),
                freq_hz: s.get(Smoothed::GeneralFreq),
                q: s.get(Smoothed::GeneralQuality),
                gain_db: s.get(Smoothed::GeneralGain),
            },
        }
    }

    /// Process planar channels in place. Channels beyond the prepared count
    /// are left untouched; all channels are cut to the shortest length.
    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        if self.spec.is_none() {
            return;
        }
        self.begin_callback();
        let num = channels.len().min(self.channels.len());
        let frames = channels[..num].iter().map(|c| c.len()).min().unwrap_or(0);

        for range in SubBlocks::new(frames, self.max_sub_block) {
            let chain = self.step(range.len());
            for (fx, buf) in self.channels.iter_mut().zip(channels[..num].iter_mut()) {
                render_channel(&chain, fx, &self.input_gain, &self.output_gain, &mut buf[range.clone()]);
            }
        }
    }

    /// Process an interleaved buffer in place, one sub-block at a time
    /// through the preallocated scratch channels.
    pub fn process_interleaved(&mut self, data: &mut [f32], num_channels: usize) {
        if self.spec.is_none() || num_channels == 0 {
            return;
        }
        self.begin_callback();
        let num = num_channels.min(self.channels.len());
        let frames = data.len() / num_channels;

        for range in SubBlocks::new(frames, self.max_sub_block) {
            let chain = self.step(range.len());
            let len = range.len();
            for (ch, (fx, buf)) in self.channels.iter_mut().zip(self.scratch.iter_mut()).enumerate().take(num) {
                let buf = &mut buf[..len];
                for (i, s) in buf.iter_mut().enumerate() {
                    *s = data[(range.start + i) * num_channels + ch];
                }
                render_channel(&chain, fx, &self.input_gain, &self.output_gain, buf);
                for (i, s) in buf.iter().enumerate() {
                    data[(range.start + i) * num_channels + ch] = *s;
                }
            }
        }
    }
}

#[inline]
fn render_channel(chain: &ResolvedChain, fx: &mut ChannelEffects, input: &Gain, output: &Gain, block: &mut [f32]) {
    input.process(block);
    chain.run(fx, block);
    output.process(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{snapshot_queue, EffectKind, OrderProducer};
    use crate::params::ParamStore;
    use EffectKind::*;

    fn processor(channels: usize) -> (Processor, OrderProducer, Arc<SharedState>) {
        let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), ChainOrder::default()));
        let (tx, rx) = snapshot_queue(8);
        let mut p = Processor::new(shared.clone(), rx, ChainOrder::default(), 64, 5.0).unwrap();
        p.prepare(ProcessSpec { sample_rate: 48_000.0, max_block_size: 512, num_channels: channels }).unwrap();
        (p, tx, shared)
    }

    fn bypass_all(shared: &SharedState) {
        for k in EffectKind::ALL {
            shared.bypass().set(k, true);
        }
    }

    #[test]
    fn sub_blocks_partition_the_block() {
        let ranges: Vec<_> = SubBlocks::new(72, 64).collect();
        assert_eq!(ranges, vec![0..64, 64..72]);
        assert_eq!(SubBlocks::new(128, 64).count(), 2);
        assert_eq!(SubBlocks::new(10, 64).collect::<Vec<_>>(), vec![0..10]);
        assert_eq!(SubBlocks::new(0, 64).count(), 0);
    }

    #[test]
    fn seventy_two_frames_run_two_sub_blocks_in_order() {
        let (mut p, _tx, shared) = processor(1);
        bypass_all(&shared);
        let input: Vec<f32> = (0..72).map(|i| i as f32 / 72.0).collect();
        let mut buf = input.clone();
        p.process(&mut [&mut buf[..]]);
        assert_eq!(p.stats().sub_blocks, 2);
        assert_eq!(buf, input);
    }

    #[test]
    fn empty_block_does_nothing() {
        let (mut p, _tx, shared) = processor(2);
        shared.params().set_by_name(names::GENERAL_FREQ, 5_000.0).unwrap();
        let mut l: [f32; 0] = [];
        let mut r: [f32; 0] = [];
        p.process(&mut [&mut l[..], &mut r[..]]);
        assert_eq!(p.stats().sub_blocks, 0);
        assert_eq!(p.smoothers.get(Smoothed::GeneralFreq), 750.0);
    }

    #[test]
    fn pushed_order_applies_at_next_callback() {
        let (mut p, mut tx, shared) = processor(1);
        let order = ChainOrder::new([Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]).unwrap();
        assert!(tx.push(order));
        assert_eq!(p.active_order(), ChainOrder::default());
        let mut buf = [0.0f32; 16];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(p.active_order(), order);
        assert_eq!(shared.active_order(), order);
    }

    #[test]
    fn burst_of_pushes_coalesces_to_the_last() {
        let (mut p, mut tx, _shared) = processor(1);
        let first = ChainOrder::new([Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]).unwrap();
        let second = ChainOrder::new([Overdrive, Chorus, Phase, LadderFilter, GeneralFilter]).unwrap();
        let last = ChainOrder::new([GeneralFilter, LadderFilter, Overdrive, Chorus, Phase]).unwrap();
        for o in [first, second, last] {
            assert!(tx.push(o));
        }
        let mut buf = [0.0f32; 8];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(p.active_order(), last);
        assert_eq!(p.stats().orders_applied, 1);
        assert!(p.active_order().is_permutation());
    }

    #[test]
    fn invalid_order_is_never_applied() {
        let (mut p, mut tx, _shared) = processor(1);
        assert!(tx.push(ChainOrder::SENTINEL));
        let mut buf = [0.0f32; 8];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(p.active_order(), ChainOrder::default());
        assert_eq!(p.stats().orders_rejected, 1);
    }

    #[test]
    fn smoothers_advance_per_sub_block() {
        let (mut p, _tx, shared) = processor(1);
        shared.params().set_by_name(names::GENERAL_FREQ, 990.0).unwrap();
        let mut buf = [0.0f32; 120];
        p.process(&mut [&mut buf[..]]);
        // 240-sample ramp, 120 samples in
        let f = p.smoothers.get(Smoothed::GeneralFreq);
        assert!((f - 870.0).abs() < 0.01, "{f}");
        let mut buf = [0.0f32; 200];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(p.smoothers.get(Smoothed::GeneralFreq), 990.0);
    }

    #[test]
    fn reset_snaps_without_ramp() {
        let (mut p, _tx, shared) = processor(1);
        shared.params().set_by_name(names::CHORUS_MIX, 0.9).unwrap();
        p.reset();
        assert_eq!(p.smoothers.get(Smoothed::ChorusMix), 0.9);
        assert!(!p.smoothers.smoother(Smoothed::ChorusMix).is_smoothing());
    }

    #[test]
    fn interleaved_matches_planar() {
        let (mut planar, mut tx_a, shared_a) = processor(2);
        let (mut inter, mut tx_b, shared_b) = processor(2);
        for shared in [&shared_a, &shared_b] {
            shared.params().set_by_name(names::CHORUS_MIX, 0.6).unwrap();
            shared.params().set_by_name(names::OVERDRIVE_SATURATION, 30.0).unwrap();
        }
        let order = ChainOrder::new([Overdrive, Chorus, Phase, GeneralFilter, LadderFilter]).unwrap();
        tx_a.push(order);
        tx_b.push(order);

        let left: Vec<f32> = (0..150).map(|i| (i as f32 * 0.05).sin()).collect();
        let right: Vec<f32> = (0..150).map(|i| (i as f32 * 0.11).cos() * 0.5).collect();

        let (mut l, mut r) = (left.clone(), right.clone());
        planar.process(&mut [&mut l[..], &mut r[..]]);

        let mut data: Vec<f32> = left.iter().zip(&right).flat_map(|(a, b)| [*a, *b]).collect();
        inter.process_interleaved(&mut data, 2);

        for i in 0..150 {
            assert_eq!(data[2 * i], l[i]);
            assert_eq!(data[2 * i + 1], r[i]);
        }
    }

    #[test]
    fn channels_do_not_share_state() {
        let (mut p, _tx, shared) = processor(2);
        shared.params().set_by_name(names::CHORUS_MIX, 1.0).unwrap();
        p.reset();
        let mut l = vec![0.0f32; 64];
        l[0] = 1.0;
        let mut r = vec![0.0f32; 64];
        p.process(&mut [&mut l[..], &mut r[..]]);
        assert!(r.iter().all(|s| *s == 0.0), "right channel picked up left's input");
        assert!(l.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn unprepared_processor_passes_through() {
        let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), ChainOrder::default()));
        let (_tx, rx) = snapshot_queue(4);
        let mut p = Processor::new(shared, rx, ChainOrder::default(), 64, 5.0).unwrap();
        let mut buf = [0.5f32; 4];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(buf, [0.5; 4]);
        assert_eq!(p.stats().callbacks, 0);
    }

    #[test]
    fn implausible_sample_rates_are_rejected() {
        let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), ChainOrder::default()));
        let (_tx, rx) = snapshot_queue(4);
        let mut p = Processor::new(shared, rx, ChainOrder::default(), 64, 5.0).unwrap();
        for sr in [0.0, 30.0, 7_999.0, f64::NAN, f64::INFINITY, -48_000.0] {
            let spec = ProcessSpec { sample_rate: sr, max_block_size: 64, num_channels: 1 };
            assert!(matches!(p.prepare(spec), Err(EngineError::UnsupportedSampleRate(_))), "{sr}");
        }
        assert_eq!(p.spec(), None);
        let mut buf = [0.5f32; 4];
        p.process(&mut [&mut buf[..]]);
        assert_eq!(buf, [0.5; 4]);

        let spec = ProcessSpec { sample_rate: MIN_SAMPLE_RATE, max_block_size: 64, num_channels: 1 };
        assert!(p.prepare(spec).is_ok());
    }

    #[test]
    fn zero_sub_block_is_rejected() {
        let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), ChainOrder::default()));
        let (_tx, rx) = snapshot_queue(4);
        assert!(matches!(
            Processor::new(shared, rx, ChainOrder::default(), 0, 5.0),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
