//! Offline rendering: run a WAV file through a [`Processor`] in host-sized
//! blocks, exactly as a device callback would see it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::info;

use crate::dsp::effect::ProcessSpec;
use crate::processor::Processor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderReport {
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
    pub blocks: usize,
}

/// Process interleaved `data` in place, `block_frames` frames per callback.
/// `before_block` runs ahead of each callback with the block index, which is
/// where a control thread's requests would land.
pub fn render_interleaved(
    processor: &mut Processor,
    data: &mut [f32],
    channels: usize,
    block_frames: usize,
    mut before_block: impl FnMut(usize),
) -> usize {
    if channels == 0 {
        return 0;
    }
    let step = block_frames.max(1) * channels;
    let mut blocks = 0;
    for (i, block) in data.chunks_mut(step).enumerate() {
        before_block(i);
        processor.process_interleaved(block, channels);
        blocks += 1;
    }
    blocks
}

pub fn read_wav(path: &Path) -> Result<(WavSpec, Vec<f32>)> {
    let mut reader = WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>(),
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
        }
    };
    let samples = samples.with_context(|| format!("reading samples from {}", path.display()))?;
    Ok((spec, samples))
}

pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let spec = WavSpec { channels, sample_rate, bits_per_sample: 32, sample_format: SampleFormat::Float };
    let mut writer = WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize().with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

/// Render `input` to `output` (32-bit float WAV, same rate and channels).
pub fn render_wav(processor: &mut Processor, input: &Path, output: &Path, block_frames: usize) -> Result<RenderReport> {
    let (spec, mut samples) = read_wav(input)?;
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no channels", input.display());
    }
    processor.prepare(ProcessSpec {
        sample_rate: spec.sample_rate as f64,
        max_block_size: block_frames.max(1),
        num_channels: channels,
    })?;
    let blocks = render_interleaved(processor, &mut samples, channels, block_frames, |_| {});
    write_wav(output, spec.channels, spec.sample_rate, &samples)?;

    let report = RenderReport { frames: samples.len() / channels, channels, sample_rate: spec.sample_rate, blocks };
    info!(
        "rendered {} frames ({} ch @ {} Hz) in {} blocks to {}",
        report.frames, report.channels, report.sample_rate, report.blocks, output.display()
    );
    Ok(report)
}
