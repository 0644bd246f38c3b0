use crate::{
    bank::{DmaSource, OPEN_BUS},
    cartridge::{Cartridge, CartridgeError},
    hardware::CompatMode,
    mapper::{AddressMapper, OAM_REGION_START},
    ppi::Ppi8255,
    snapshot::{ByteReader, Snapshot, SnapshotError},
};

pub const OAM_SIZE: usize = 0xA0;
const HRAM_SIZE: usize = 0x7F;

/// Default base of the 8255 register window.
pub const DEFAULT_PPI_BASE: u16 = 0xFF60;
/// Bases at which all four 8255 registers sit inside the high page.
pub const PPI_BASE_RANGE: std::ops::RangeInclusive<u16> = OAM_REGION_START..=0xFFFC;

/// Dots between the FF46 write and the first byte moved.
const DMA_START_DELAY: u16 = 8;
/// 160 M-cycles of 4 dots each.
const DMA_DURATION: u16 = 640;
const DMA_DOTS_PER_BYTE: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub mode: CompatMode,
    pub ppi_base: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mode: CompatMode::Classic,
            ppi_base: DEFAULT_PPI_BASE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct OamDma {
    source: u16,
    pending: Option<u16>,
    pending_delay: u16,
    cycles: u16,
}

/// CPU-facing memory bus.
///
/// Everything below 0xFE00 is resolved through the mapper's window table;
/// the high page holds OAM, a few control registers, the 8255 window and
/// high RAM.
pub struct Bus {
    mapper: AddressMapper,
    cart: Cartridge,
    ppi: Ppi8255,
    oam: [u8; OAM_SIZE],
    hram: [u8; HRAM_SIZE],
    ie: u8,
    dma_reg: u8,
    dma: OamDma,
    ppi_base: u16,
}

impl Bus {
    pub fn new(image: Vec<u8>, config: BusConfig) -> Result<Self, CartridgeError> {
        let cart = Cartridge::load(&image)?;
        let mut mapper = AddressMapper::new(image, cart.ram_len(), config.mode);
        cart.apply(&mut mapper);

        if !PPI_BASE_RANGE.contains(&config.ppi_base) {
            log::warn!(
                "8255 window at {:#06X} is outside the high page and will not be reachable",
                config.ppi_base
            );
        }

        let mut ppi = Ppi8255::new();
        ppi.reset();

        Ok(Self {
            mapper,
            cart,
            ppi,
            oam: [0; OAM_SIZE],
            hram: [0; HRAM_SIZE],
            ie: 0,
            dma_reg: 0,
            dma: OamDma::default(),
            ppi_base: config.ppi_base,
        })
    }

    /// Register index if `addr` falls in the 8255 window.
    #[inline]
    fn ppi_reg(&self, addr: u16) -> Option<u8> {
        if !PPI_BASE_RANGE.contains(&self.ppi_base) {
            return None;
        }
        let offset = addr.wrapping_sub(self.ppi_base);
        (offset < 4).then_some(offset as u8)
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        if addr < OAM_REGION_START {
            return self.mapper.read8(addr);
        }
        if let Some(reg) = self.ppi_reg(addr) {
            return self.ppi.read(reg);
        }
        self.read_high(addr)
    }

    /// Read without side effects on attached peripherals.
    pub fn peek_byte(&self, addr: u16) -> u8 {
        if addr < OAM_REGION_START {
            return self.mapper.read8(addr);
        }
        if let Some(reg) = self.ppi_reg(addr) {
            return self.ppi.peek(reg);
        }
        self.read_high(addr)
    }

    fn read_high(&self, addr: u16) -> u8 {
        let enhanced = self.mapper.mode().is_enhanced();
        match addr {
            0xFE00..=0xFE9F => {
                if self.dma.cycles > 0 {
                    OPEN_BUS
                } else {
                    self.oam[(addr - 0xFE00) as usize]
                }
            }
            0xFF46 => self.dma_reg,
            0xFF4F if enhanced => 0xFE | self.mapper.selected_vram_bank() as u8,
            0xFF70 if enhanced => 0xF8 | self.mapper.selected_wram_bank() as u8,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie,
            _ => OPEN_BUS,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.cart.write(&mut self.mapper, addr, val),
            0x8000..=0xFDFF => self.mapper.write8(addr, val),
            _ => {
                if let Some(reg) = self.ppi_reg(addr) {
                    self.ppi.write(reg, val);
                    return;
                }
                self.write_high(addr, val);
            }
        }
    }

    fn write_high(&mut self, addr: u16, val: u8) {
        let enhanced = self.mapper.mode().is_enhanced();
        match addr {
            0xFE00..=0xFE9F => {
                if self.dma.cycles == 0 {
                    self.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFF46 => {
                self.dma_reg = val;
                self.dma.pending = Some((val as u16) << 8);
                self.dma.pending_delay = DMA_START_DELAY;
            }
            0xFF4F if enhanced => self.mapper.set_vram_bank((val & 0x01) as usize),
            0xFF70 if enhanced => self.mapper.set_wram_bank((val & 0x07) as usize),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie = val,
            _ => {}
        }
    }

    /// Advance the OAM DMA engine by `dots` clock ticks.
    pub fn dma_step(&mut self, dots: u32) {
        for _ in 0..dots {
            if self.dma.pending_delay > 0 {
                self.dma.pending_delay -= 1;
                if self.dma.pending_delay == 0
                    && let Some(src) = self.dma.pending.take()
                {
                    let source = DmaSource::from_page((src >> 8) as u8);
                    log::debug!("OAM DMA started src={src:04X} ({source:?})");
                    self.dma.source = src;
                    self.dma.cycles = DMA_DURATION;
                    self.mapper.set_dma_source(source);
                }
            }

            if self.dma.cycles == 0 {
                continue;
            }

            let elapsed = DMA_DURATION - self.dma.cycles;
            if elapsed.is_multiple_of(DMA_DOTS_PER_BYTE) {
                let idx = elapsed / DMA_DOTS_PER_BYTE;
                if (idx as usize) < OAM_SIZE {
                    self.oam[idx as usize] =
                        self.mapper.dma_read8(self.dma.source.wrapping_add(idx));
                }
            }

            self.dma.cycles -= 1;
            if self.dma.cycles == 0 {
                log::debug!("OAM DMA finished");
                self.mapper.set_dma_source(DmaSource::Off);
            }
        }
    }

    /// True from the FF46 write until the last byte has been copied.
    pub fn dma_active(&self) -> bool {
        self.dma.cycles > 0 || self.dma.pending_delay > 0
    }

    pub fn is_in_conflict_area(&self, addr: u16) -> bool {
        self.mapper.is_in_conflict_area(addr)
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut AddressMapper {
        &mut self.mapper
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cart
    }

    /// Mapper and cartridge together, for restoring bank state.
    pub fn cartridge_mut(&mut self) -> (&mut Cartridge, &mut AddressMapper) {
        (&mut self.cart, &mut self.mapper)
    }

    pub fn ppi(&self) -> &Ppi8255 {
        &self.ppi
    }

    pub fn ppi_mut(&mut self) -> &mut Ppi8255 {
        &mut self.ppi
    }

    pub fn ppi_base(&self) -> u16 {
        self.ppi_base
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    pub fn mode(&self) -> CompatMode {
        self.mapper.mode()
    }
}

impl Snapshot for Bus {
    fn save(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.oam);
        out.extend_from_slice(&self.hram);
        out.push(self.ie);
        out.push(self.dma_reg);
        out.extend_from_slice(&self.dma.source.to_le_bytes());
        out.push(self.dma.pending.is_some() as u8);
        out.extend_from_slice(&self.dma.pending.unwrap_or(0).to_le_bytes());
        out.extend_from_slice(&self.dma.pending_delay.to_le_bytes());
        out.extend_from_slice(&self.dma.cycles.to_le_bytes());
    }

    fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = ByteReader::new(data);
        let oam = r.bytes(OAM_SIZE)?;
        let hram = r.bytes(HRAM_SIZE)?;
        let ie = r.u8()?;
        let dma_reg = r.u8()?;
        let source = r.u16_le()?;
        let has_pending = r.bool()?;
        let pending = r.u16_le()?;
        let pending_delay = r.u16_le()?;
        let cycles = r.u16_le()?;
        r.finish()?;

        if pending_delay > DMA_START_DELAY || cycles > DMA_DURATION {
            return Err(SnapshotError::Invalid("DMA timing"));
        }

        self.oam.copy_from_slice(oam);
        self.hram.copy_from_slice(hram);
        self.ie = ie;
        self.dma_reg = dma_reg;
        self.dma = OamDma {
            source,
            pending: has_pending.then_some(pending),
            pending_delay,
            cycles,
        };
        Ok(())
    }
}
