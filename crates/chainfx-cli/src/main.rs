use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chainfx_engine::params::{ParamKind, ParamStore};
use chainfx_engine::{build_chain, ChainControl, ChainOrder, EffectKind, Engine, EngineConfig};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "chainfx", version, about = "Reorderable five-effect chain")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio devices
    Devices,
    /// List parameters with their ranges and defaults
    Params,
    /// Stream input -> chain -> output, controlled from stdin
    Run {
        #[command(flatten)]
        chain: ChainArgs,
        /// Input device (substring match)
        #[arg(long)]
        input: Option<String>,
        /// Output device (substring match)
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        input_index: Option<usize>,
        #[arg(long)]
        output_index: Option<usize>,
        #[arg(long)]
        sample_rate: Option<u32>,
        /// Frames per device buffer
        #[arg(long)]
        buffer: Option<u32>,
    },
    /// Process a WAV file offline
    Render {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        chain: ChainArgs,
        /// Frames per simulated callback
        #[arg(long, default_value_t = 512)]
        block: usize,
    },
}

#[derive(Args)]
struct ChainArgs {
    /// JSON engine config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Chain order, e.g. chorus,phase,overdrive,ladder,filter
    #[arg(long)]
    order: Option<ChainOrder>,
    /// Effects to start bypassed (repeatable)
    #[arg(long, value_name = "KIND")]
    bypass: Vec<EffectKind>,
    #[arg(long)]
    sub_block: Option<usize>,
    #[arg(long)]
    smoothing_ms: Option<f64>,
    /// Parameter override, NAME=VALUE (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    sets: Vec<String>,
    /// Restore chain order from a saved state blob
    #[arg(long)]
    state: Option<PathBuf>,
}

impl ChainArgs {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(order) = self.order {
            cfg.order = order;
        }
        cfg.bypass.extend(self.bypass.iter().copied());
        if let Some(n) = self.sub_block {
            cfg.max_sub_block = n;
        }
        if let Some(ms) = self.smoothing_ms {
            cfg.smoothing_ms = ms;
        }
        Ok(cfg)
    }

    /// Apply `--set` and `--state` to a freshly built chain.
    fn apply(&self, ctl: &mut ChainControl) -> Result<()> {
        for s in &self.sets {
            let (name, value) = s.rsplit_once('=').ok_or_else(|| anyhow!("expected NAME=VALUE, got `{s}`"))?;
            let value: f32 = value.trim().parse().with_context(|| format!("bad value in `{s}`"))?;
            let stored = ctl.set_parameter(name.trim(), value)?;
            info!("{} = {stored}", name.trim());
        }
        if let Some(path) = &self.state {
            load_state_file(ctl, path)?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Devices => chainfx_engine::devices::print_devices()?,
        Command::Params => print_params(),
        Command::Run { chain, input, output, input_index, output_index, sample_rate, buffer } => {
            let mut cfg = chain.engine_config()?;
            cfg.input_name = input.or(cfg.input_name);
            cfg.output_name = output.or(cfg.output_name);
            cfg.input_index = input_index.or(cfg.input_index);
            cfg.output_index = output_index.or(cfg.output_index);
            cfg.sample_rate = sample_rate.or(cfg.sample_rate);
            cfg.block_size = buffer.or(cfg.block_size);

            let (mut ctl, processor) = build_chain(&cfg)?;
            chain.apply(&mut ctl)?;
            let mut eng = Engine::new(cfg);
            eng.start(processor)?;
            let res = control_loop(&mut ctl);
            eng.stop();
            res?;
        }
        Command::Render { input, output, chain, block } => {
            let cfg = chain.engine_config()?;
            let (mut ctl, mut processor) = build_chain(&cfg)?;
            chain.apply(&mut ctl)?;
            // a restored order is queued; render applies it on the first block
            chainfx_engine::render::render_wav(&mut processor, &input, &output, block)?;
        }
    }
    Ok(())
}

fn print_params() {
    let store = ParamStore::with_default_layout();
    for spec in store.specs() {
        match spec.kind {
            ParamKind::Float { min, max } => {
                println!("{:<28} {min} .. {max} {}  (default {})", spec.name, spec.unit, spec.default)
            }
            ParamKind::Choice(choices) => {
                let default = choices.get(spec.default as usize).copied().unwrap_or("?");
                println!("{:<28} {}  (default {default})", spec.name, choices.join(" | "))
            }
        }
    }
}

fn load_state_file(ctl: &mut ChainControl, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading state {}", path.display()))?;
    ctl.load_state(&bytes)?;
    Ok(())
}

const HELP: &str = "\
commands:
  order KIND,KIND,KIND,KIND,KIND   reorder the chain
  bypass KIND on|off               toggle one effect
  set NAME VALUE                   set a parameter (NAME may contain spaces)
  get NAME                         read a parameter
  show                             print order and bypass flags
  save PATH | load PATH            persist / restore the chain order
  quit";

fn control_loop(ctl: &mut ChainControl) -> Result<()> {
    println!("{HELP}");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit" | "q") {
            return Ok(());
        }
        if let Err(e) = run_command(ctl, line) {
            warn!("{e:#}");
        }
        if let Some(order) = ctl.take_restored_order() {
            println!("restored order {order}");
        }
    }
}

fn run_command(ctl: &mut ChainControl, line: &str) -> Result<()> {
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match cmd {
        "order" => {
            let order: ChainOrder = rest.parse()?;
            if !ctl.request_order_change(order)? {
                bail!("order queue full, try again");
            }
        }
        "bypass" => {
            let (kind, state) = rest.split_once(char::is_whitespace).ok_or_else(|| anyhow!("usage: bypass KIND on|off"))?;
            let kind: EffectKind = kind.parse()?;
            let on = match state.trim() {
                "on" | "1" | "true" => true,
                "off" | "0" | "false" => false,
                other => bail!("expected on|off, got `{other}`"),
            };
            ctl.set_bypass(kind, on);
        }
        "set" => {
            let (name, value) = rest.rsplit_once(char::is_whitespace).ok_or_else(|| anyhow!("usage: set NAME VALUE"))?;
            let value: f32 = value.parse().with_context(|| format!("bad value `{value}`"))?;
            let stored = ctl.set_parameter(name.trim(), value)?;
            println!("{} = {stored}", name.trim());
        }
        "get" => {
            let value = ctl.parameter(rest).ok_or_else(|| anyhow!("unknown parameter `{rest}`"))?;
            println!("{rest} = {value}");
        }
        "show" => {
            println!("order  {}", ctl.active_order());
            let bypassed: Vec<String> = EffectKind::ALL
                .into_iter()
                .filter(|&k| ctl.is_bypassed(k))
                .map(|k| k.to_string())
                .collect();
            println!("bypass {}", if bypassed.is_empty() { "-".to_string() } else { bypassed.join(", ") });
        }
        "save" => {
            if rest.is_empty() {
                bail!("usage: save PATH");
            }
            std::fs::write(rest, ctl.save_state()).with_context(|| format!("writing {rest}"))?;
            info!("saved order {} to {rest}", ctl.active_order());
        }
        "load" => {
            if rest.is_empty() {
                bail!("usage: load PATH");
            }
            load_state_file(ctl, Path::new(rest))?;
        }
        "help" | "?" => println!("{HELP}"),
        other => bail!("unknown command `{other}` (try `help`)"),
    }
    Ok(())
}
