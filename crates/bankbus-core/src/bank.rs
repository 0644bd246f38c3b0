//! Value types shared by the address mapper and its users.

use bitflags::bitflags;

/// Size of one dispatch window in bytes.
pub const WINDOW_SIZE: usize = 0x1000;
/// log2 of [`WINDOW_SIZE`].
pub const WINDOW_SHIFT: u32 = 12;
/// Number of dispatch windows covering the 64KB address space.
pub const WINDOW_COUNT: usize = 0x10000 / WINDOW_SIZE;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const VRAM_BANK_SIZE: usize = 0x2000;

/// Value driven on the data bus when nothing answers.
pub const OPEN_BUS: u8 = 0xFF;

/// Backing store a window points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Rom,
    CartRam,
    Vram,
    Wram,
    /// Cartridge clock registers, selected through the RAM bank register.
    Rtc,
    /// Read sentinel: always returns [`OPEN_BUS`].
    DisabledRead,
    /// Write sentinel: swallows every write.
    DisabledWrite,
}

impl Region {
    pub const fn is_disabled(self) -> bool {
        matches!(self, Region::DisabledRead | Region::DisabledWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    Rom,
    Ram,
}

/// Handle to one physical bank inside the mapper's arena.
///
/// Descriptors are created when an image is loaded and never change
/// afterwards; bank switching only changes which descriptor a window uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankDescriptor {
    pub kind: BankKind,
    pub index: usize,
    pub region: Region,
    pub base: usize,
    pub len: usize,
}

impl BankDescriptor {
    pub const fn new(
        kind: BankKind,
        index: usize,
        region: Region,
        base: usize,
        len: usize,
    ) -> Self {
        Self {
            kind,
            index,
            region,
            base,
            len,
        }
    }

    /// Target covering `window_offset` bytes into this bank for one window.
    pub(crate) const fn target(&self, window_offset: usize) -> Target {
        Target {
            region: self.region,
            base: self.base + window_offset,
            mask: (WINDOW_SIZE - 1) as u16,
        }
    }
}

/// Resolved backing for one access direction of a window.
///
/// The byte touched by an access to `addr` is `base + (addr & mask)` inside
/// `region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub region: Region,
    pub base: usize,
    pub mask: u16,
}

impl Target {
    pub const DISABLED_READ: Target = Target::mirrored(Region::DisabledRead, 0);
    pub const DISABLED_WRITE: Target = Target::mirrored(Region::DisabledWrite, 0);

    /// A single byte mirrored across the whole window.
    pub const fn mirrored(region: Region, base: usize) -> Self {
        Self {
            region,
            base,
            mask: 0,
        }
    }

    #[inline]
    pub const fn offset(&self, addr: u16) -> usize {
        self.base + (addr & self.mask) as usize
    }
}

/// One entry of the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    pub read: Target,
    pub write: Target,
}

impl AddressWindow {
    pub const DISCONNECTED: AddressWindow = AddressWindow {
        read: Target::DISABLED_READ,
        write: Target::DISABLED_WRITE,
    };

    pub const fn read_only(read: Target) -> Self {
        Self {
            read,
            write: Target::DISABLED_WRITE,
        }
    }

    pub const fn read_write(target: Target) -> Self {
        Self {
            read: target,
            write: target,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        *self == Self::DISCONNECTED
    }
}

/// Region currently feeding an OAM DMA transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum DmaSource {
    #[default]
    Off,
    Rom,
    Ram,
    Vram,
    Wram,
    Invalid,
}

impl DmaSource {
    pub const ALL: [DmaSource; 6] = [
        DmaSource::Off,
        DmaSource::Rom,
        DmaSource::Ram,
        DmaSource::Vram,
        DmaSource::Wram,
        DmaSource::Invalid,
    ];

    /// Classify a transfer by the high byte of its source address.
    pub const fn from_page(page: u8) -> Self {
        match page {
            0x00..=0x7F => DmaSource::Rom,
            0x80..=0x9F => DmaSource::Vram,
            0xA0..=0xBF => DmaSource::Ram,
            0xC0..=0xFD => DmaSource::Wram,
            _ => DmaSource::Invalid,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            DmaSource::Off => 0,
            DmaSource::Rom => 1,
            DmaSource::Ram => 2,
            DmaSource::Vram => 3,
            DmaSource::Wram => 4,
            DmaSource::Invalid => 5,
        }
    }

    pub(crate) const fn to_byte(self) -> u8 {
        self.index() as u8
    }

    pub(crate) const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DmaSource::Off),
            1 => Some(DmaSource::Rom),
            2 => Some(DmaSource::Ram),
            3 => Some(DmaSource::Vram),
            4 => Some(DmaSource::Wram),
            5 => Some(DmaSource::Invalid),
            _ => None,
        }
    }
}

bitflags! {
    /// Cartridge RAM enable latches as seen by the mapper.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RamFlags: u8 {
        const READ_EN = 0x01;
        const WRITE_EN = 0x02;
        /// A000-BFFF selects a clock register instead of a RAM bank.
        const RTC_EN = 0x04;
        const ENABLED = Self::READ_EN.bits() | Self::WRITE_EN.bits();
    }
}
