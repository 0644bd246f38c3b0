#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Compatibility mode of the emulated machine.
///
/// Classic machines (DMG-style) share a single external bus between the
/// cartridge and work RAM. Enhanced machines (CGB-style) move work RAM onto its
/// own bus and add extra work-RAM and VRAM banks.
pub enum CompatMode {
    #[default]
    Classic,
    Enhanced,
}

impl CompatMode {
    #[inline]
    pub const fn from_enhanced(enhanced: bool) -> Self {
        if enhanced {
            CompatMode::Enhanced
        } else {
            CompatMode::Classic
        }
    }

    #[inline]
    pub const fn is_enhanced(self) -> bool {
        matches!(self, CompatMode::Enhanced)
    }

    #[inline]
    /// Number of 4KB work-RAM banks present.
    pub const fn wram_banks(self) -> usize {
        match self {
            CompatMode::Classic => 2,
            CompatMode::Enhanced => 8,
        }
    }

    #[inline]
    /// Number of 8KB VRAM banks present.
    pub const fn vram_banks(self) -> usize {
        match self {
            CompatMode::Classic => 1,
            CompatMode::Enhanced => 2,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            CompatMode::Classic => 0,
            CompatMode::Enhanced => 1,
        }
    }
}
