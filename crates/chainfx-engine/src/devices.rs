use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default_input: bool,
    pub is_default_output: bool,
    /// Default input config as (channels, sample rate), if the device records.
    pub input: Option<(u16, u32)>,
    /// Default output config as (channels, sample rate), if the device plays.
    pub output: Option<(u16, u32)>,
}

impl DeviceInfo {
    fn marks(&self) -> String {
        let mut marks = Vec::new();
        if self.is_default_input { marks.push("*I"); }
        if self.is_default_output { marks.push("*O"); }
        marks.join(" ")
    }
}

pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();

    let default_in  = host.default_input_device().map(|d| d.name().unwrap_or_default());
    let default_out = host.default_output_device().map(|d| d.name().unwrap_or_default());

    let devices = host.devices().context("enumerating audio devices")?;
    let out = devices
        .map(|dev| {
            let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
            let input = dev.default_input_config().ok().map(|c| (c.channels(), c.sample_rate().0));
            let output = dev.default_output_config().ok().map(|c| (c.channels(), c.sample_rate().0));
            DeviceInfo {
                is_default_input: default_in.as_deref() == Some(name.as_str()),
                is_default_output: default_out.as_deref() == Some(name.as_str()),
                name,
                input,
                output,
            }
        })
        .collect();
    Ok(out)
}

/// Pretty-print for CLI
pub fn print_devices() -> Result<()> {
    let list = list_devices()?;
    log::debug!("found {} devices", list.len());
    if list.is_empty() {
        println!("(no devices found)");
        return Ok(());
    }
    let fmt_io = |io: Option<(u16, u32)>| io.map_or("-".to_string(), |(ch, sr)| format!("{ch}ch@{sr}"));
    for (i, d) in list.iter().enumerate() {
        let marks = d.marks();
        if !marks.is_empty() { print!("[{marks}] "); }
        println!("{:>2}  {}  in {}  out {}", i, d.name, fmt_io(d.input), fmt_io(d.output));
    }
    Ok(())
}
