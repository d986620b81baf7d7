pub mod chain;
pub mod config;
pub mod control;
pub mod devices;
pub mod dsp;
pub mod error;
pub mod order;
pub mod params;
pub mod processor;
pub mod render;
pub mod ring;
pub mod shared;
pub mod smoothing;
pub mod state;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::{error, info};

pub use config::EngineConfig;
pub use control::ChainControl;
pub use dsp::effect::ProcessSpec;
pub use error::EngineError;
pub use order::{ChainOrder, EffectKind, OrderError};
pub use params::ParamError;
pub use processor::Processor;
pub use state::StateError;

use order::snapshot_queue;
use params::ParamStore;
use ring::{next_pow2, Consumer, Producer};
use shared::SharedState;

/// Wire up one chain: the control handle for the UI side and the processor
/// for the audio side, sharing one parameter store, bypass set and order
/// queue.
pub fn build_chain(cfg: &EngineConfig) -> Result<(ChainControl, Processor), EngineError> {
    cfg.validate()?;
    let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), cfg.order));
    for &kind in &cfg.bypass {
        shared.bypass().set(kind, true);
    }
    let (tx, rx) = snapshot_queue(cfg.order_queue_capacity);
    let processor = Processor::new(shared.clone(), rx, cfg.order, cfg.max_sub_block, cfg.smoothing_ms)?;
    Ok((ChainControl::new(shared, tx), processor))
}

pub struct Engine {
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
    cfg: EngineConfig,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { input_stream: None, output_stream: None, cfg }
    }

    /// Run `processor` on input -> output. The processor moves into the
    /// input callback; audio crosses to the output callback through a ring.
    ///
    /// On error the processor is dropped, and with it the reading end of the
    /// order queue. The paired [`ChainControl`] then feeds a queue nobody
    /// drains, so rebuild both with [`build_chain`] before retrying.
    pub fn start(&mut self, mut processor: Processor) -> Result<()> {
        let host = cpal::default_host();

        let in_dev  = pick_device(&host, true,  self.cfg.input_name.as_deref(), self.cfg.input_index)?
            .context("No input device matched (and no default available)")?;
        let out_dev = pick_device(&host, false, self.cfg.output_name.as_deref(), self.cfg.output_index)?
            .context("No output device matched (and no default available)")?;

        let in_cfg_any  = in_dev.default_input_config().context("No default input config")?;
        let out_cfg_any = out_dev.default_output_config().context("No default output config")?;

        let mut in_cfg  = in_cfg_any.config();
        let mut out_cfg = out_cfg_any.config();

        // Honor sample_rate/block_size if provided (best-effort)
        if let Some(sr) = self.cfg.sample_rate {
            in_cfg.sample_rate  = cpal::SampleRate(sr);
            out_cfg.sample_rate = cpal::SampleRate(sr);
        }
        if let Some(bs) = self.cfg.block_size {
            out_cfg.buffer_size = cpal::BufferSize::Fixed(bs);
            in_cfg.buffer_size  = cpal::BufferSize::Fixed(bs);
        }

        // Align channels/SR
        in_cfg.channels    = out_cfg.channels;
        in_cfg.sample_rate = out_cfg.sample_rate;

        let channels = out_cfg.channels as usize;
        let sr = out_cfg.sample_rate.0;

        // Capacity: choose a power-of-two ring >= 8 output buffers
        let block_frames = match out_cfg.buffer_size {
            cpal::BufferSize::Fixed(n) => n as usize,
            _ => 512,
        };
        let cap = next_pow2(block_frames * 8 * channels).max(1024);

        processor.prepare(ProcessSpec {
            sample_rate: sr as f64,
            max_block_size: block_frames,
            num_channels: channels,
        })?;
        info!(
            "streaming {} -> {} at {sr} Hz, {channels} ch, order {}",
            in_dev.name().unwrap_or_default(),
            out_dev.name().unwrap_or_default(),
            processor.active_order(),
        );

        let (ring_tx, ring_rx) = ring::channel::<f32>(cap);

        // Output first: the input stream takes ownership of the processor.
        let output_stream = match out_cfg_any.sample_format() {
            cpal::SampleFormat::F32 => build_output::<f32>(&out_dev, &out_cfg, ring_rx, cap)?,
            cpal::SampleFormat::I16 => build_output::<i16>(&out_dev, &out_cfg, ring_rx, cap)?,
            cpal::SampleFormat::U16 => build_output::<u16>(&out_dev, &out_cfg, ring_rx, cap)?,
            other => return Err(anyhow!("Unsupported output format: {other:?}")),
        };

        let input_stream = match in_cfg_any.sample_format() {
            cpal::SampleFormat::F32 => build_input::<f32>(&in_dev, &in_cfg, processor, ring_tx, cap)?,
            cpal::SampleFormat::I16 => build_input::<i16>(&in_dev, &in_cfg, processor, ring_tx, cap)?,
            cpal::SampleFormat::U16 => build_input::<u16>(&in_dev, &in_cfg, processor, ring_tx, cap)?,
            other => return Err(anyhow!("Unsupported input format: {other:?}")),
        };

        input_stream.play().context("Failed to play input stream")?;
        output_stream.play().context("Failed to play output stream")?;

        self.input_stream  = Some(input_stream);
        self.output_stream = Some(output_stream);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.input_stream.is_some() {
            info!("stopping streams");
        }
        self.input_stream  = None;
        self.output_stream = None;
    }
}

/* ---------- stream builders (one per sample format) ---------- */

fn build_input<T>(
    dev: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut processor: Processor,
    mut ring: Producer<f32>,
    scratch_len: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = cfg.channels as usize;
    // Whole frames only, so chunks never split a frame.
    let chunk = (scratch_len / channels).max(1) * channels;
    let mut scratch = vec![0.0f32; chunk];

    let stream = dev.build_input_stream::<T, _, _>(
        cfg,
        move |data: &[T], _| {
            for part in data.chunks(chunk) {
                let buf = &mut scratch[..part.len()];
                for (d, &s) in buf.iter_mut().zip(part) {
                    *d = f32::from_sample(s);
                }
                processor.process_interleaved(buf, channels);
                // Dropped when the output side falls behind.
                let _ = ring.push_slice(buf);
            }
        },
        move |err| error!("input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    dev: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut ring: Consumer<f32>,
    scratch_len: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut tmp = vec![0.0f32; scratch_len.max(1)];

    let stream = dev.build_output_stream::<T, _, _>(
        cfg,
        move |out: &mut [T], _| {
            for part in out.chunks_mut(tmp.len()) {
                let buf = &mut tmp[..part.len()];
                if ring.pop_into(buf) {
                    for (o, &v) in part.iter_mut().zip(buf.iter()) {
                        *o = T::from_sample(v.clamp(-1.0, 1.0));
                    }
                } else {
                    part.fill(T::EQUILIBRIUM);
                }
            }
        },
        move |err| error!("output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/* ---------- device picking (by name or index) ---------- */

fn supports(dev: &cpal::Device, want_input: bool) -> bool {
    if want_input {
        dev.supported_input_configs().ok().is_some()
    } else {
        dev.supported_output_configs().ok().is_some()
    }
}

fn pick_device(
    host: &cpal::Host,
    want_input: bool,
    name_substr: Option<&str>,
    index: Option<usize>,
) -> Result<Option<cpal::Device>> {
    // Try explicit index first
    if let Some(idx) = index {
        if let Some(dev) = host.devices()?.filter(|d| supports(d, want_input)).nth(idx) {
            return Ok(Some(dev));
        }
        log::warn!("no {} device at index {idx}, falling back", if want_input { "input" } else { "output" });
    }

    // Then try substring match
    if let Some(q) = name_substr {
        let qn = q.to_lowercase();
        for dev in host.devices()? {
            let name = dev.name().unwrap_or_default();
            if name.to_lowercase().contains(&qn) && supports(&dev, want_input) {
                return Ok(Some(dev));
            }
        }
    }

    // Fallback to default
    Ok(if want_input { host.default_input_device() } else { host.default_output_device() })
}
