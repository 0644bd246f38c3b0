use std::{
    io::{Read, Write},
    path::Path,
};

use thiserror::Error;

use bankbus_core::{
    bank::{AddressWindow, Region, Target, WINDOW_COUNT},
    bus::{Bus, BusConfig},
    cartridge::CartridgeError,
    hardware::CompatMode,
    ppi::PortWiring,
    snapshot::{SnapshotError, SnapshotReader, SnapshotWriter},
};

use crate::config::MachineConfig;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("cartridge error: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("save state error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One emulated machine: the bus plus what is needed to rebuild it.
pub struct Machine {
    bus: Bus,
    image: Vec<u8>,
    config: BusConfig,
}

impl Machine {
    pub fn new(rom: Vec<u8>, cfg: &MachineConfig) -> Result<Self, MachineError> {
        let cgb_flag = rom.get(0x143).is_some_and(|b| b & 0x80 != 0);
        let config = BusConfig {
            mode: cfg.mode.resolve(cgb_flag),
            ppi_base: cfg.ppi_base,
        };
        let bus = Bus::new(rom.clone(), config)?;
        Ok(Self {
            bus,
            image: rom,
            config,
        })
    }

    pub fn from_file(path: &Path, cfg: &MachineConfig) -> Result<Self, MachineError> {
        let rom = std::fs::read(path)?;
        Self::new(rom, cfg)
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn mode(&self) -> CompatMode {
        self.config.mode
    }

    /// Attach pin wiring to the 8255 and run its reset sequence.
    pub fn connect_ppi(&mut self, wiring: Box<dyn PortWiring>) {
        self.bus.ppi_mut().connect(wiring);
        self.bus.ppi_mut().reset();
    }

    pub fn reset(&mut self) {
        self.bus.ppi_mut().reset();
    }

    pub fn save_state<W: Write>(&self, w: W) -> Result<W, MachineError> {
        let mut snap = SnapshotWriter::new(w)?;
        snap.module("mapper", self.bus.mapper())?;
        snap.module("cartridge", self.bus.cartridge())?;
        snap.module("bus", &self.bus)?;
        snap.module("i8255", self.bus.ppi())?;
        Ok(snap.finish()?)
    }

    /// Restore a state written by [`Machine::save_state`]. Every module is
    /// decoded into a fresh bus first, so on error nothing changes.
    pub fn load_state<R: Read>(&mut self, r: R) -> Result<(), MachineError> {
        let mut scratch = Bus::new(self.image.clone(), self.config)?;
        let mut snap = SnapshotReader::new(r)?;
        snap.module("mapper", scratch.mapper_mut())?;
        snap.module("cartridge", scratch.cartridge_mut().0)?;
        snap.module("bus", &mut scratch)?;
        snap.module("i8255", scratch.ppi_mut())?;

        // Keep the attached wiring, take the restored registers.
        let regs = scratch.ppi().state();
        std::mem::swap(scratch.ppi_mut(), self.bus.ppi_mut());
        scratch.ppi_mut().restore(regs);
        self.bus = scratch;
        log::debug!("save state restored");
        Ok(())
    }

    /// Human-readable view of the 16 dispatch windows.
    pub fn window_map(&self) -> Vec<String> {
        (0..WINDOW_COUNT)
            .map(|i| describe_window(i, self.bus.mapper().window(i)))
            .collect()
    }
}

fn describe_target(t: Target) -> String {
    if t.region.is_disabled() {
        return "-".to_string();
    }
    match t.region {
        Region::Rtc => format!("rtc[{}]", t.base),
        region => format!("{region:?}+{:#07X}", t.base),
    }
}

fn describe_window(index: usize, window: AddressWindow) -> String {
    let start = index << 12;
    let state = if window.is_disconnected() {
        " (disconnected)"
    } else {
        ""
    };
    format!(
        "{start:04X}-{:04X}  read {:<16} write {}{state}",
        start + 0xFFF,
        describe_target(window.read),
        describe_target(window.write)
    )
}
