//! Command-line front end: load a machine configuration and a PAL/ROM
//! image, run the CPUs, and report halt status.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use es40_machine::{Machine, MachineConfig};

#[derive(Parser, Debug)]
#[command(name = "es40-machine", about = "AlphaServer ES40 CPU-core emulator")]
struct Args {
    /// INI-style machine configuration file.
    config: Option<PathBuf>,

    /// Raw PAL/firmware image loaded at PalBase before start.
    #[arg(long)]
    pal_image: Option<PathBuf>,

    /// Override [System] CpuCount.
    #[arg(long)]
    cpus: Option<usize>,

    /// Give up if the machine has not halted after this many seconds.
    #[arg(long, default_value_t = 60)]
    max_seconds: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MachineConfig::from_ini_str(&text).context("parsing configuration")?
        }
        None => MachineConfig::default(),
    };
    if let Some(cpus) = args.cpus {
        cfg.cpu_count = cpus;
    }

    let mut machine = Machine::new(cfg);

    if let Some(image) = &args.pal_image {
        let bytes =
            std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
        let base = machine.config().pal_base;
        machine
            .load_physical_bytes(base, &bytes)
            .context("loading PAL image")?;
        tracing::info!(base = format_args!("{base:#x}"), len = bytes.len(), "PAL image loaded");
    }

    tracing::info!(cpus = machine.cpu_count(), "starting machine");
    machine.start();

    let result = machine.wait_all_halted(Duration::from_secs(args.max_seconds));
    machine.stop();

    match result {
        Ok(()) => {
            for cpu in 0..machine.cpu_count() {
                let core = machine.core(cpu)?;
                tracing::info!(cpu, halt_code = core.state.halt_code, "halted");
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
