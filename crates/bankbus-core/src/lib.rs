//! Banked memory bus core.
//!
//! This crate contains the platform-agnostic bus logic: the 16-window address
//! mapper with OAM DMA conflict handling, the cartridge bank controller that
//! drives it, and an Intel 8255 peripheral interface. Hosts drive the core
//! through the [`bus`] facade.

/// Bank descriptors, window targets and other shared value types.
pub mod bank;

/// CPU-facing bus that wires the mapper, cartridge and peripherals together.
pub mod bus;

/// Cartridge header parsing and bank controller (MBC) register decode.
pub mod cartridge;

/// Compatibility modes and their memory sizes.
pub mod hardware;

/// Window table, bank setters and DMA disconnects.
pub mod mapper;

/// Intel 8255A programmable peripheral interface.
pub mod ppi;

/// Save-state container and the per-component snapshot trait.
pub mod snapshot;
