use std::path::PathBuf;

use bankbus::{
    config::{self, ModeSetting},
    machine::{Machine, MachineError},
};
use bankbus_core::bank::DmaSource;
use clap::{Parser, ValueEnum};
use log::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DmaArg {
    Rom,
    Ram,
    Vram,
    Wram,
    Invalid,
}

impl From<DmaArg> for DmaSource {
    fn from(arg: DmaArg) -> Self {
        match arg {
            DmaArg::Rom => DmaSource::Rom,
            DmaArg::Ram => DmaSource::Ram,
            DmaArg::Vram => DmaSource::Vram,
            DmaArg::Wram => DmaSource::Wram,
            DmaArg::Invalid => DmaSource::Invalid,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Inspect the banked memory map of a cartridge image")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Force classic (DMG) mode
    #[arg(long, conflicts_with = "enhanced")]
    classic: bool,

    /// Force enhanced (CGB) mode
    #[arg(long, conflicts_with = "classic")]
    enhanced: bool,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the window map as seen during an OAM DMA from this source
    #[arg(long, value_enum)]
    dma_source: Option<DmaArg>,

    /// Address to read through the bus, in hex (repeatable)
    #[arg(long = "peek", value_parser = parse_addr)]
    peek: Vec<u16>,

    /// Print the 8255 registers
    #[arg(long)]
    dump_ppi: bool,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn run(args: Args, mut cfg: config::MachineConfig) -> Result<(), MachineError> {
    if args.classic {
        cfg.mode = ModeSetting::Classic;
    } else if args.enhanced {
        cfg.mode = ModeSetting::Enhanced;
    }

    let mut machine = Machine::from_file(&args.rom, &cfg)?;
    let cart = machine.bus().cartridge();
    println!("title:  {}", cart.title);
    println!("type:   {:02X} ({:?})", cart.cart_type(), cart.mbc);
    println!("ram:    {} KiB", cart.ram_len() / 1024);
    println!("cgb:    {}", if cart.cgb { "yes" } else { "no" });
    println!("mode:   {:?}", machine.mode());

    if let Some(source) = args.dma_source {
        info!("simulating OAM DMA from {source:?}");
        machine
            .bus_mut()
            .mapper_mut()
            .set_dma_source(source.into());
    }

    println!();
    for line in machine.window_map() {
        println!("{line}");
    }

    if !args.peek.is_empty() {
        println!();
        for addr in &args.peek {
            println!("{addr:04X}: {:02X}", machine.bus().peek_byte(*addr));
        }
    }

    if args.dump_ppi {
        println!();
        for line in machine.bus().ppi().dump() {
            println!("{line}");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let cfg_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&cfg_path);

    let default_level = cfg.log_level.clone().unwrap_or_else(|| "warn".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(args, cfg) {
        error!("{e}");
        std::process::exit(1);
    }
}
