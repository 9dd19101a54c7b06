//! `nna`: command-line interface for the NNA tensor accelerator.
//!
//! ```text
//! USAGE:
//!   nna power on|off                 Gate the accelerator clock (root)
//!   nna clock <mhz>                  Select the accelerator clock (root)
//!   nna reset                        Disable and re-arm every engine (root)
//!   nna status                       Print the interrupt status register (root)
//!   nna plan-conv --input WxHxC ...  Print the register program for a layer
//! ```
//!
//! Hardware commands map `/dev/mem`; override the device and addresses with
//! `NNA_MEM_DEVICE`, `NNA_BASE_ADDR` and `NNA_CLOCK_MHZ`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nna_chip::regs::{cdma, glb};
use nna_driver::pdp::pooled_output_size;
use nna_driver::prelude::*;
use nna_driver::{
    BufferProvider, MappedWindow, PhysicalRegion, PowerControl, RegisterIo, ReservedMemory,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nna", about = "NNA tensor accelerator CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerState {
    On,
    Off,
}

#[derive(Subcommand)]
enum Cmd {
    /// Open or close the accelerator clock gate.
    Power {
        /// Target state.
        state: PowerState,
    },
    /// Select the accelerator clock.
    Clock {
        /// Frequency in MHz (100, 200, 300, 400, 600, 800 or 1200).
        mhz: u32,
    },
    /// Disable then re-arm every engine.
    Reset,
    /// Read the interrupt status register.
    Status,
    /// Compile a convolution layer and print its register program.
    ///
    /// Runs against a software register window; no hardware is touched.
    PlanConv {
        /// Input cube, `WxHxC`.
        #[arg(long, value_parser = parse_cube)]
        input: CubeDims,
        /// Kernel window, `KWxKH` or `K`.
        #[arg(long, value_parser = parse_kernel)]
        kernel: (u32, u32),
        /// Number of kernels (output channels).
        #[arg(long)]
        kernels: u32,
        /// Symmetric zero padding.
        #[arg(long, default_value_t = 0)]
        pad: u32,
        /// Convolution stride.
        #[arg(long, default_value_t = 1)]
        stride: u32,
        /// Follow with a max-pool of this window.
        #[arg(long)]
        pool: Option<u32>,
        /// Pool stride (defaults to the pool window).
        #[arg(long, requires = "pool")]
        pool_stride: Option<u32>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Power { state } => cmd_power(state)?,
        Cmd::Clock { mhz } => cmd_clock(mhz)?,
        Cmd::Reset => cmd_reset()?,
        Cmd::Status => cmd_status()?,
        Cmd::PlanConv {
            input,
            kernel,
            kernels,
            pad,
            stride,
            pool,
            pool_stride,
        } => cmd_plan_conv(input, kernel, kernels, pad, stride, pool, pool_stride)?,
    }

    Ok(())
}

fn open_power() -> Result<PowerControl<MappedWindow>> {
    let config = SessionConfig::from_env()?;
    let ccu = MappedWindow::open(&config.mem_device, config.ccu_base, config.ccu_size)
        .with_context(|| format!("mapping CCU at {:#x}", config.ccu_base))?;
    Ok(PowerControl::new(ccu))
}

fn cmd_power(state: PowerState) -> Result<()> {
    let mut power = open_power()?;
    match state {
        PowerState::On => power.power_on(),
        PowerState::Off => power.power_off(),
    }
    println!("NNA powered {}", if power.is_powered() { "on" } else { "off" });
    Ok(())
}

fn cmd_clock(mhz: u32) -> Result<()> {
    let mut power = open_power()?;
    power.set_clock(mhz)?;
    println!("NNA clock: {mhz} MHz");
    Ok(())
}

fn cmd_reset() -> Result<()> {
    open_power()?.reset();
    println!("NNA reset");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = SessionConfig::from_env()?;
    let mut nna = MappedWindow::open(&config.mem_device, config.nna_base, config.nna_size)
        .with_context(|| format!("mapping NNA at {:#x}", config.nna_base))?;
    let status = nna.read32(glb::S_INTR_STATUS);
    println!("Interrupt status : {status:#010x}");
    println!("CBUF flushed     : {}", nna.read32(cdma::S_CBUF_FLUSH_STATUS) != 0);
    Ok(())
}

/// Synthetic physical layout for dry runs.
const PLAN_REGION_BASE: u64 = 0x4000_0000;
const PLAN_REGION_SIZE: u64 = 0x0400_0000;

fn cmd_plan_conv(
    input: CubeDims,
    kernel: (u32, u32),
    kernels: u32,
    pad: u32,
    stride: u32,
    pool: Option<u32>,
    pool_stride: Option<u32>,
) -> Result<()> {
    let mut region =
        ReservedMemory::new(PLAN_REGION_BASE, PLAN_REGION_SIZE).allocate(PLAN_REGION_SIZE)?;
    let input_cube = feature_in(&mut region, input)?;
    let weight_bytes: u64 = [kernels, input.channel, kernel.0, kernel.1]
        .into_iter()
        .map(u64::from)
        .product();
    let weights = region.allocate(weight_bytes, 32)?;

    let conv = ConvOperation::new(
        input_cube,
        Kernel {
            width: kernel.0,
            height: kernel.1,
            count: kernels,
        },
        weights,
    )
    .with_padding(Padding::symmetric(pad))
    .with_stride(Stride::uniform(stride));
    let geometry = conv.geometry()?;
    let out = geometry.output;

    println!("Convolution");
    println!("  input            {input}");
    println!("  output           {out}");
    println!("  entries/slice    {}", geometry.entries_per_slice);
    println!("  bytes/kernel     {}", geometry.bytes_per_kernel);
    println!("  data banks       {}", geometry.data_banks);
    println!("  weight banks     {}", geometry.weight_banks);
    println!("  weight bytes     {}", geometry.total_weight_bytes);

    let run = match pool {
        None => {
            let dst = feature_in(&mut region, out)?;
            PipelineRun::ConvOnly {
                conv,
                sdp: ScaleBiasOperation::new(DataCube::flying(out), dst),
            }
        }
        Some(k) => {
            let s = pool_stride.unwrap_or(k);
            let (Some(w), Some(h)) = (
                pooled_output_size(out.width, k, s, 0),
                pooled_output_size(out.height, k, s, 0),
            ) else {
                bail!("pool window {k} larger than {out}");
            };
            let pooled = CubeDims::new(w, h, out.channel);
            println!("Pooling");
            println!("  window/stride    {k}/{s}");
            println!("  output           {pooled}");
            let dst = feature_in(&mut region, pooled)?;
            PipelineRun::ConvPool {
                conv,
                sdp: ScaleBiasOperation::new(DataCube::flying(out), DataCube::flying(out)),
                pdp: PoolOperation::new(PoolMode::Max, k, s, DataCube::flying(out), dst),
            }
        }
    };

    let compiled = run.compile()?;
    println!();
    for program in compiled.programs() {
        println!("{program}");
    }

    let report = dry_run(&run)?;
    info!("dry run visited {:?}", report.states);
    println!(
        "Dry run: {} completed in {} poll(s); {} bytes of {:#x} region used",
        report.shape,
        report.polls,
        region.size() - region.remaining(),
        region.base()
    );
    Ok(())
}

fn feature_in(region: &mut PhysicalRegion, dims: CubeDims) -> Result<DataCube> {
    let size = DataCube::flying(dims).size;
    Ok(DataCube::feature(region.allocate(u64::from(size), 32)?, dims))
}

/// Drive the full orchestrator against software windows that report
/// completion immediately.
fn dry_run(run: &PipelineRun) -> Result<nna_driver::RunReport> {
    let mut session = Session::with_windows(
        SoftwareWindow::nna(),
        SoftwareWindow::ccu(),
        &SessionConfig::default(),
    )?;
    session.nna_mut().set(cdma::S_CBUF_FLUSH_STATUS, 1);
    session.nna_mut().set(glb::S_INTR_STATUS, run.event_value());
    Ok(session.run_operation(run, &RunOptions::default())?)
}

fn parse_cube(text: &str) -> Result<CubeDims> {
    let parts = text
        .split(['x', 'X'])
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid cube {text:?}"))?;
    match parts.as_slice() {
        &[w, h, c] => Ok(CubeDims::new(w, h, c)),
        _ => bail!("expected WxHxC, got {text:?}"),
    }
}

fn parse_kernel(text: &str) -> Result<(u32, u32)> {
    let parts = text
        .split(['x', 'X'])
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid kernel {text:?}"))?;
    match parts.as_slice() {
        &[k] => Ok((k, k)),
        &[w, h] => Ok((w, h)),
        _ => bail!("expected KWxKH, got {text:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_arguments() {
        assert_eq!(parse_cube("32x32x3").unwrap(), CubeDims::new(32, 32, 3));
        assert!(parse_cube("32x32").is_err());
        assert!(parse_cube("axbxc").is_err());
    }

    #[test]
    fn kernel_arguments() {
        assert_eq!(parse_kernel("5").unwrap(), (5, 5));
        assert_eq!(parse_kernel("3x1").unwrap(), (3, 1));
        assert!(parse_kernel("3x3x3").is_err());
    }

    #[test]
    fn cli_parses_plan() {
        let cli = Cli::try_parse_from([
            "nna", "plan-conv", "--input", "32x32x3", "--kernel", "5", "--kernels", "32",
            "--pad", "2", "--pool", "3", "--pool-stride", "2",
        ])
        .unwrap();
        assert!(matches!(cli.command, Cmd::PlanConv { pool: Some(3), .. }));
    }

    #[test]
    fn dry_run_completes() {
        let dims = CubeDims::new(32, 32, 32);
        let run = PipelineRun::ConvOnly {
            conv: ConvOperation::new(
                DataCube::feature(0x4000_0000, CubeDims::new(32, 32, 3)),
                Kernel::square(5, 32),
                0x4010_0000,
            )
            .with_padding(Padding::symmetric(2)),
            sdp: ScaleBiasOperation::new(
                DataCube::flying(dims),
                DataCube::feature(0x4020_0000, dims),
            ),
        };
        let report = dry_run(&run).unwrap();
        assert_eq!(report.polls, 1);
    }
}
