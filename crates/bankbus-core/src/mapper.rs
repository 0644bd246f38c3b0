use crate::{
    bank::{
        AddressWindow, BankDescriptor, BankKind, DmaSource, OPEN_BUS, RAM_BANK_SIZE, ROM_BANK_SIZE,
        RamFlags, Region, Target, VRAM_BANK_SIZE, WINDOW_COUNT, WINDOW_SHIFT, WINDOW_SIZE,
        WRAM_BANK_SIZE,
    },
    hardware::CompatMode,
    snapshot::{ByteReader, Snapshot, SnapshotError},
};

/// First address of the OAM/IO region, which never goes through the table.
pub const OAM_REGION_START: u16 = 0xFE00;

/// Number of clock registers reachable through the RTC select.
pub const RTC_REGISTERS: usize = 5;

/// Windows disconnected while an OAM DMA reads from a given source, one bit
/// per 4KB window. Indexed by `[DmaSource::index()][CompatMode::index()]`.
///
/// Classic machines share one external bus between the cartridge and work
/// RAM, so any external source blocks ROM, cartridge RAM and work RAM alike.
/// Enhanced machines put work RAM on its own bus.
const DMA_CONFLICT_MAP: [[u16; 2]; 6] = [
    // classic, enhanced
    [0x0000, 0x0000], // off
    [0xFCFF, 0x0CFF], // rom
    [0xFCFF, 0x0CFF], // cartridge ram
    [0x0300, 0x0300], // vram
    [0xFCFF, 0xF000], // wram
    [0xFCFF, 0x0CFF], // invalid
];

#[inline]
pub const fn conflict_mask(source: DmaSource, mode: CompatMode) -> u16 {
    DMA_CONFLICT_MAP[source.index()][mode.index()]
}

#[inline]
pub const fn window_index(addr: u16) -> usize {
    (addr >> WINDOW_SHIFT) as usize
}

/// O(1) translation of CPU addresses to backing bytes.
///
/// All backing stores live in owned buffers; windows refer to them through
/// `(region, offset)` pairs. `normal` holds what the bank registers select,
/// `windows` is what the CPU actually sees after DMA disconnects.
pub struct AddressMapper {
    rom: Vec<u8>,
    cart_ram: Vec<u8>,
    wram: Vec<u8>,
    vram: Vec<u8>,
    rtc: [u8; RTC_REGISTERS],
    rom_banks: Vec<BankDescriptor>,
    ram_banks: Vec<BankDescriptor>,
    wram_banks: Vec<BankDescriptor>,
    vram_banks: Vec<BankDescriptor>,
    normal: [AddressWindow; WINDOW_COUNT],
    windows: [AddressWindow; WINDOW_COUNT],
    rom_bank0: usize,
    rom_bank1: usize,
    ram_flags: RamFlags,
    ram_bank: usize,
    wram_bank: usize,
    vram_bank: usize,
    dma_source: DmaSource,
    mode: CompatMode,
}

impl AddressMapper {
    /// Build the arena for a ROM image and `ram_len` bytes of cartridge RAM.
    ///
    /// The ROM is padded with 0xFF up to a power-of-two number of 16KB banks
    /// (at least two) so that bank masks never index past the end. RAM is
    /// rounded up to whole 8KB banks.
    pub fn new(mut rom: Vec<u8>, ram_len: usize, mode: CompatMode) -> Self {
        let rom_bank_count = rom.len().div_ceil(ROM_BANK_SIZE).max(2).next_power_of_two();
        rom.resize(rom_bank_count * ROM_BANK_SIZE, OPEN_BUS);

        let ram_bank_count = ram_len.div_ceil(RAM_BANK_SIZE);
        let wram_bank_count = mode.wram_banks();
        let vram_bank_count = mode.vram_banks();

        let rom_banks =
            Self::descriptors(BankKind::Rom, Region::Rom, rom_bank_count, ROM_BANK_SIZE);
        let ram_banks =
            Self::descriptors(BankKind::Ram, Region::CartRam, ram_bank_count, RAM_BANK_SIZE);
        let wram_banks =
            Self::descriptors(BankKind::Ram, Region::Wram, wram_bank_count, WRAM_BANK_SIZE);
        let vram_banks =
            Self::descriptors(BankKind::Ram, Region::Vram, vram_bank_count, VRAM_BANK_SIZE);

        log::debug!(
            "mapper: {rom_bank_count} ROM banks, {ram_bank_count} RAM banks, {wram_bank_count} WRAM banks ({mode:?})"
        );

        let mut mapper = Self {
            rom,
            cart_ram: vec![0; ram_bank_count * RAM_BANK_SIZE],
            wram: vec![0; wram_bank_count * WRAM_BANK_SIZE],
            vram: vec![0; vram_bank_count * VRAM_BANK_SIZE],
            rtc: [0; RTC_REGISTERS],
            rom_banks,
            ram_banks,
            wram_banks,
            vram_banks,
            normal: [AddressWindow::DISCONNECTED; WINDOW_COUNT],
            windows: [AddressWindow::DISCONNECTED; WINDOW_COUNT],
            rom_bank0: 0,
            rom_bank1: 1,
            ram_flags: RamFlags::empty(),
            ram_bank: 0,
            wram_bank: 1,
            vram_bank: 0,
            dma_source: DmaSource::Off,
            mode,
        };
        mapper.rebuild();
        mapper
    }

    fn descriptors(
        kind: BankKind,
        region: Region,
        count: usize,
        size: usize,
    ) -> Vec<BankDescriptor> {
        (0..count)
            .map(|i| BankDescriptor::new(kind, i, region, i * size, size))
            .collect()
    }

    /// Recompute every window from the current bank registers.
    fn rebuild(&mut self) {
        self.apply_rom_bank0();
        self.apply_rom_bank1();
        self.apply_vram_bank();
        self.apply_ram_bank();
        self.apply_wram_bank0();
        self.apply_wram_bank();
        self.restore_windows();
        self.recompute_dma_disconnects();
    }

    fn install(&mut self, index: usize, window: AddressWindow) {
        self.normal[index] = window;
        self.windows[index] = window;
    }

    fn install_bank(&mut self, first: usize, count: usize, bank: BankDescriptor, writable: bool) {
        for i in 0..count {
            let target = bank.target(i * WINDOW_SIZE);
            let window = if writable {
                AddressWindow::read_write(target)
            } else {
                AddressWindow::read_only(target)
            };
            self.install(first + i, window);
        }
    }

    fn apply_rom_bank0(&mut self) {
        let bank = self.rom_banks[self.rom_bank0];
        self.install_bank(0x0, 4, bank, false);
    }

    fn apply_rom_bank1(&mut self) {
        let bank = self.rom_banks[self.rom_bank1];
        self.install_bank(0x4, 4, bank, false);
    }

    fn apply_vram_bank(&mut self) {
        let bank = self.vram_banks[self.vram_bank];
        self.install_bank(0x8, 2, bank, true);
    }

    fn apply_wram_bank0(&mut self) {
        let bank = self.wram_banks[0];
        self.install_bank(0xC, 1, bank, true);
        self.install_bank(0xE, 1, bank, true);
    }

    fn apply_wram_bank(&mut self) {
        let bank = self.wram_banks[self.wram_bank];
        self.install_bank(0xD, 1, bank, true);
        self.install_bank(0xF, 1, bank, true);
    }

    fn apply_ram_bank(&mut self) {
        let flags = self.ram_flags;
        let selected: Option<[Target; 2]> = if flags.contains(RamFlags::RTC_EN) {
            let reg = Target::mirrored(Region::Rtc, self.ram_bank % RTC_REGISTERS);
            Some([reg, reg])
        } else if let Some(bank) = self.ram_banks.get(self.ram_bank) {
            Some([bank.target(0), bank.target(WINDOW_SIZE)])
        } else {
            None
        };

        for (i, index) in [0xA, 0xB].into_iter().enumerate() {
            let read = match selected {
                Some(t) if flags.contains(RamFlags::READ_EN) => t[i],
                _ => Target::DISABLED_READ,
            };
            let write = match selected {
                Some(t) if flags.contains(RamFlags::WRITE_EN) => t[i],
                _ => Target::DISABLED_WRITE,
            };
            self.install(index, AddressWindow { read, write });
        }
    }

    /// Select the ROM bank behind 0000-3FFF.
    pub fn set_rom_bank0(&mut self, bank: usize) {
        debug_assert!(bank < self.rom_banks.len(), "ROM bank {bank} out of range");
        self.rom_bank0 = bank & (self.rom_banks.len() - 1);
        self.apply_rom_bank0();
        self.recompute_dma_disconnects();
    }

    /// Select the ROM bank behind 4000-7FFF.
    pub fn set_rom_bank1(&mut self, bank: usize) {
        debug_assert!(bank < self.rom_banks.len(), "ROM bank {bank} out of range");
        self.rom_bank1 = bank & (self.rom_banks.len() - 1);
        self.apply_rom_bank1();
        self.recompute_dma_disconnects();
    }

    /// Select the cartridge RAM bank (or clock register when `RTC_EN` is set)
    /// behind A000-BFFF and apply the enable latches.
    ///
    /// Reads without `READ_EN` see open bus; writes without `WRITE_EN` are
    /// dropped. A cartridge without RAM always reads open bus.
    pub fn set_ram_bank(&mut self, flags: RamFlags, bank: usize) {
        self.ram_flags = flags;
        self.ram_bank = if flags.contains(RamFlags::RTC_EN) {
            bank % RTC_REGISTERS
        } else if self.ram_banks.is_empty() {
            0
        } else {
            debug_assert!(bank < self.ram_banks.len(), "RAM bank {bank} out of range");
            bank % self.ram_banks.len()
        };
        self.apply_ram_bank();
        self.recompute_dma_disconnects();
    }

    /// Select the work-RAM bank behind D000-DFFF. Bank 0 selects bank 1.
    pub fn set_wram_bank(&mut self, bank: usize) {
        let bank = bank & (self.wram_banks.len() - 1);
        self.wram_bank = if bank == 0 { 1 } else { bank };
        self.apply_wram_bank();
        self.recompute_dma_disconnects();
    }

    /// Select the VRAM bank behind 8000-9FFF.
    pub fn set_vram_bank(&mut self, bank: usize) {
        self.vram_bank = bank & (self.vram_banks.len() - 1);
        self.apply_vram_bank();
        self.recompute_dma_disconnects();
    }

    /// Mark `source` as the region feeding an in-flight OAM DMA, or `Off`.
    ///
    /// All windows are restored to their bank-selected targets first, since
    /// the disconnect pass only looks at the new source.
    pub fn set_dma_source(&mut self, source: DmaSource) {
        self.restore_windows();
        self.dma_source = source;
        self.recompute_dma_disconnects();
    }

    fn restore_windows(&mut self) {
        self.windows = self.normal;
    }

    fn recompute_dma_disconnects(&mut self) {
        let mask = conflict_mask(self.dma_source, self.mode);
        if mask == 0 {
            return;
        }
        for (i, window) in self.windows.iter_mut().enumerate() {
            if (mask >> i) & 1 != 0 {
                *window = AddressWindow::DISCONNECTED;
            }
        }
    }

    /// Whether a CPU access to `addr` currently races with the OAM DMA.
    pub fn is_in_conflict_area(&self, addr: u16) -> bool {
        addr < OAM_REGION_START
            && (conflict_mask(self.dma_source, self.mode) >> window_index(addr)) & 1 != 0
    }

    #[inline]
    fn fetch(&self, target: Target, addr: u16) -> u8 {
        let offset = target.offset(addr);
        let bytes: &[u8] = match target.region {
            Region::Rom => &self.rom,
            Region::CartRam => &self.cart_ram,
            Region::Vram => &self.vram,
            Region::Wram => &self.wram,
            Region::Rtc => &self.rtc,
            Region::DisabledRead | Region::DisabledWrite => return OPEN_BUS,
        };
        bytes.get(offset).copied().unwrap_or(OPEN_BUS)
    }

    #[inline]
    pub fn read8(&self, addr: u16) -> u8 {
        self.fetch(self.windows[window_index(addr)].read, addr)
    }

    /// Read through the bank-selected targets, ignoring DMA disconnects.
    /// This is the path the DMA engine itself uses.
    #[inline]
    pub fn dma_read8(&self, addr: u16) -> u8 {
        self.fetch(self.normal[window_index(addr)].read, addr)
    }

    #[inline]
    pub fn write8(&mut self, addr: u16, val: u8) {
        let target = self.windows[window_index(addr)].write;
        let offset = target.offset(addr);
        let bytes: &mut [u8] = match target.region {
            Region::CartRam => &mut self.cart_ram,
            Region::Vram => &mut self.vram,
            Region::Wram => &mut self.wram,
            Region::Rtc => &mut self.rtc,
            Region::Rom | Region::DisabledRead | Region::DisabledWrite => return,
        };
        if let Some(b) = bytes.get_mut(offset) {
            *b = val;
        }
    }

    pub fn window(&self, index: usize) -> AddressWindow {
        self.windows[index & (WINDOW_COUNT - 1)]
    }

    pub fn windows(&self) -> &[AddressWindow; WINDOW_COUNT] {
        &self.windows
    }

    pub fn rom_bank(&self, index: usize) -> Option<BankDescriptor> {
        self.rom_banks.get(index).copied()
    }

    pub fn ram_bank(&self, index: usize) -> Option<BankDescriptor> {
        self.ram_banks.get(index).copied()
    }

    pub fn wram_bank(&self, index: usize) -> Option<BankDescriptor> {
        self.wram_banks.get(index).copied()
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom_banks.len()
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram_banks.len()
    }

    pub fn wram_bank_count(&self) -> usize {
        self.wram_banks.len()
    }

    pub fn vram_bank_count(&self) -> usize {
        self.vram_banks.len()
    }

    pub fn selected_rom_banks(&self) -> (usize, usize) {
        (self.rom_bank0, self.rom_bank1)
    }

    pub fn selected_wram_bank(&self) -> usize {
        self.wram_bank
    }

    pub fn selected_vram_bank(&self) -> usize {
        self.vram_bank
    }

    pub fn ram_state(&self) -> (RamFlags, usize) {
        (self.ram_flags, self.ram_bank)
    }

    pub fn dma_source(&self) -> DmaSource {
        self.dma_source
    }

    pub fn mode(&self) -> CompatMode {
        self.mode
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn cart_ram(&self) -> &[u8] {
        &self.cart_ram
    }

    pub fn cart_ram_mut(&mut self) -> &mut [u8] {
        &mut self.cart_ram
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn rtc_registers(&self) -> &[u8; RTC_REGISTERS] {
        &self.rtc
    }
}

impl Snapshot for AddressMapper {
    fn save(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.rom_bank0 as u16).to_le_bytes());
        out.extend_from_slice(&(self.rom_bank1 as u16).to_le_bytes());
        out.push(self.ram_flags.bits());
        out.push(self.ram_bank as u8);
        out.push(self.wram_bank as u8);
        out.push(self.vram_bank as u8);
        out.push(self.dma_source.to_byte());
        for region in [&self.cart_ram, &self.wram, &self.vram] {
            out.extend_from_slice(&(region.len() as u32).to_le_bytes());
            out.extend_from_slice(region);
        }
        out.extend_from_slice(&self.rtc);
    }

    fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = ByteReader::new(data);
        let rom_bank0 = r.u16_le()? as usize;
        let rom_bank1 = r.u16_le()? as usize;
        let ram_flags = RamFlags::from_bits_truncate(r.u8()?);
        let ram_bank = r.u8()? as usize;
        let wram_bank = r.u8()? as usize;
        let vram_bank = r.u8()? as usize;
        let dma_source = DmaSource::from_byte(r.u8()?)
            .ok_or(SnapshotError::Invalid("DMA source"))?;
        let cart_ram = r.sized(self.cart_ram.len(), "cartridge RAM size")?;
        let wram = r.sized(self.wram.len(), "work RAM size")?;
        let vram = r.sized(self.vram.len(), "VRAM size")?;
        let rtc = r.bytes(RTC_REGISTERS)?;
        r.finish()?;

        if rom_bank0 >= self.rom_banks.len() || rom_bank1 >= self.rom_banks.len() {
            return Err(SnapshotError::Invalid("ROM bank"));
        }
        if wram_bank == 0 || wram_bank >= self.wram_banks.len() {
            return Err(SnapshotError::Invalid("work RAM bank"));
        }
        if vram_bank >= self.vram_banks.len() {
            return Err(SnapshotError::Invalid("VRAM bank"));
        }
        let ram_bank_limit = if ram_flags.contains(RamFlags::RTC_EN) {
            RTC_REGISTERS
        } else {
            self.ram_banks.len().max(1)
        };
        if ram_bank >= ram_bank_limit {
            return Err(SnapshotError::Invalid("RAM bank"));
        }

        self.cart_ram.copy_from_slice(cart_ram);
        self.wram.copy_from_slice(wram);
        self.vram.copy_from_slice(vram);
        self.rtc.copy_from_slice(rtc);
        self.rom_bank0 = rom_bank0;
        self.rom_bank1 = rom_bank1;
        self.ram_flags = ram_flags;
        self.ram_bank = ram_bank;
        self.wram_bank = wram_bank;
        self.vram_bank = vram_bank;
        self.dma_source = dma_source;
        self.rebuild();
        Ok(())
    }
}
