use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use snes2c64::link::{LinkConfig, PortOpener};
use snes2c64::proto::{codec, GamepadMap, SlotIndex, SLOT_COUNT};
use snes2c64::{Job, LinkWorker, Reply, SerialOpener, DEFAULT_BAUD_RATE};

#[derive(Parser)]
#[command(name = "snes2c64", version)]
#[command(about = "Read and write gamepad maps on a SNES-to-C64 adapter")]
struct Cli {
    /// Serial port of the adapter
    #[arg(short, long, env = "SNES2C64_PORT", global = true)]
    port: Option<String>,

    /// Line speed
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    baud: u32,

    /// Deadline for each request, in milliseconds
    #[arg(long, default_value_t = 2000, global = true)]
    timeout_ms: u64,

    /// Skip the version probe when connecting
    #[arg(long, global = true)]
    no_probe: bool,

    /// Talk to a built-in simulated adapter instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the adapter firmware version
    Version,
    /// Print all eight slots
    Download,
    /// Print one slot
    Read {
        #[arg(short, long, value_parser = parse_slot)]
        slot: SlotIndex,
    },
    /// Write a map to a slot and print every slot as stored,
    /// e.g. `upload -s 2 b=fire1 up=up right=right+fire2`
    Upload {
        #[arg(short, long, value_parser = parse_slot)]
        slot: SlotIndex,
        /// Assignments `key=target[+target...]`
        #[arg(required = true)]
        map: Vec<String>,
    },
    /// Empty a slot and print every slot as stored
    Clear {
        #[arg(short, long, value_parser = parse_slot)]
        slot: SlotIndex,
    },
}

fn parse_slot(s: &str) -> Result<SlotIndex, String> {
    let index: u8 = s.parse().map_err(|e| format!("{e}"))?;
    SlotIndex::new(index).map_err(|e| e.to_string())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = LinkConfig::default()
        .with_response_timeout(Duration::from_millis(cli.timeout_ms))
        .with_probe(!cli.no_probe);

    if cli.simulate {
        let job = job_for(&cli.command, SIM_PORT)?;
        return run_simulated(config, job);
    }

    let Some(port) = cli.port.as_deref() else {
        bail!("no port given; pass --port or set SNES2C64_PORT");
    };
    let job = job_for(&cli.command, port)?;
    run(SerialOpener::new(cli.baud), port, config, job)
}

const SIM_PORT: &str = "sim";

fn job_for(command: &Cmd, port: &str) -> Result<Job> {
    Ok(match command {
        Cmd::Version => Job::Version,
        Cmd::Download => Job::Connect(port.to_owned()),
        Cmd::Read { slot } => Job::ReadSlot(*slot),
        Cmd::Upload { slot, map } => {
            let map: GamepadMap = map.join(" ").parse().context("invalid map")?;
            Job::UploadAndRefresh(*slot, map)
        }
        Cmd::Clear { slot } => Job::UploadAndRefresh(*slot, GamepadMap::EMPTY),
    })
}

fn run<O>(opener: O, port: &str, config: LinkConfig, job: Job) -> Result<()>
where
    O: PortOpener + Send + 'static,
{
    let worker = LinkWorker::spawn(opener, config).context("starting link thread")?;

    // Connect opens the port itself.
    if !matches!(job, Job::Connect(_)) {
        let opened = worker
            .call(Job::Open(port.to_owned()))
            .with_context(|| format!("connecting to {port}"))?;
        if let Reply::Opened {
            version: Some(version),
            ..
        } = opened
        {
            info!("adapter on {port} runs firmware {version}");
        }
    }

    match worker.call(job)? {
        Reply::Version(version) => println!("{version}"),
        Reply::Slot(slot, map) => print_slot(slot, &map),
        Reply::Slots(maps) | Reply::Connected { slots: maps, .. } => print_slots(&maps),
        Reply::Uploaded(slot) => println!("slot {slot} written"),
        Reply::Refreshed {
            slot,
            verified,
            slots,
        } => {
            if verified {
                println!("slot {slot} written");
            } else {
                warn!("slot {slot} reads back differently from what was uploaded");
            }
            print_slots(&slots);
        }
        Reply::Opened { .. } | Reply::Closed => {}
    }

    worker.call(Job::Close)?;
    worker.shutdown();
    Ok(())
}

#[cfg(feature = "sim")]
fn run_simulated(config: LinkConfig, job: Job) -> Result<()> {
    let adapter = snes2c64::link::sim::SimulatedAdapter::new("sim-1.0");
    run(adapter, SIM_PORT, config, job)
}

#[cfg(not(feature = "sim"))]
fn run_simulated(_config: LinkConfig, _job: Job) -> Result<()> {
    bail!("built without the `sim` feature")
}

fn print_slots(maps: &[GamepadMap; SLOT_COUNT]) {
    let used: String = maps
        .iter()
        .map(|map| if codec::is_empty(map) { '.' } else { '#' })
        .collect();
    println!("slots 0-7: [{used}]");
    for (slot, map) in SlotIndex::ALL.iter().zip(maps.iter()) {
        print_slot(*slot, map);
    }
}

fn print_slot(slot: SlotIndex, map: &GamepadMap) {
    if codec::is_empty(map) {
        println!("slot {slot}: (empty)");
    } else {
        println!("slot {slot}: {map}");
    }
}
