use thiserror::Error;

use crate::{
    bank::{RAM_BANK_SIZE, RamFlags},
    mapper::{AddressMapper, RTC_REGISTERS},
    snapshot::{ByteReader, Snapshot, SnapshotError},
};

/// Bytes needed to cover the cartridge header.
pub const HEADER_LEN: usize = 0x150;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("header should be at least {HEADER_LEN} bytes, was {len} bytes")]
    HeaderTooShort { len: usize },
    #[error("invalid RAM size code in cartridge header: {code:02X}")]
    InvalidRamSize { code: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
    Unknown(u8),
}

/// Bank controller state for the cartridge in the slot.
///
/// The ROM and RAM bytes themselves live in the [`AddressMapper`]; this type
/// only decodes register writes into mapper bank selections.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub title: String,
    pub cgb: bool,
    pub mbc: MbcType,
    cart_type: u8,
    ram_len: usize,
    rom_bank: u16,
    ram_bank: u8,
    ram_enable: bool,
    mode: u8,
}

impl Cartridge {
    pub fn load(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_LEN {
            return Err(CartridgeError::HeaderTooShort { len: data.len() });
        }
        let header = Header::parse(data);
        let mbc = header.mbc_type();
        if let MbcType::Unknown(code) = mbc {
            log::warn!("unsupported cartridge type {code:02X}, treating as plain ROM");
        }

        let cart = Self {
            title: header.title(),
            cgb: header.cgb_supported(),
            mbc,
            cart_type: header.cart_type(),
            ram_len: header.ram_size()?,
            rom_bank: 1,
            ram_bank: 0,
            ram_enable: false,
            mode: 0,
        };
        log::info!(
            "loaded cartridge \"{}\": {:?}, {} KiB ROM, {} KiB RAM, CGB {}",
            cart.title,
            cart.mbc,
            data.len() / 1024,
            cart.ram_len / 1024,
            if cart.cgb { "yes" } else { "no" }
        );
        Ok(cart)
    }

    pub fn ram_len(&self) -> usize {
        self.ram_len
    }

    pub fn cart_type(&self) -> u8 {
        self.cart_type
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    /// Handle a CPU write to the controller registers at 0000-7FFF.
    pub fn write(&mut self, mapper: &mut AddressMapper, addr: u16, val: u8) {
        match (self.mbc, addr) {
            (MbcType::NoMbc | MbcType::Unknown(_), _) => {}
            (MbcType::Mbc2, 0x0000..=0x3FFF) => {
                // Address bit 8 picks RAM enable or ROM bank.
                if addr & 0x0100 == 0 {
                    self.ram_enable = val & 0x0F == 0x0A;
                    self.apply_ram(mapper);
                } else {
                    self.rom_bank = (val & 0x0F) as u16;
                    self.apply_rom(mapper);
                }
            }
            (_, 0x0000..=0x1FFF) => {
                self.ram_enable = val & 0x0F == 0x0A;
                self.apply_ram(mapper);
            }
            (MbcType::Mbc1, 0x2000..=0x3FFF) => {
                self.rom_bank = if self.mode == 1 {
                    (val & 0x1F) as u16
                } else {
                    (self.rom_bank & 0x60) | (val & 0x1F) as u16
                };
                self.apply_rom(mapper);
            }
            (MbcType::Mbc3, 0x2000..=0x3FFF) => {
                self.rom_bank = (val & 0x7F) as u16;
                self.apply_rom(mapper);
            }
            (MbcType::Mbc5, 0x2000..=0x2FFF) => {
                self.rom_bank = (self.rom_bank & 0x100) | val as u16;
                self.apply_rom(mapper);
            }
            (MbcType::Mbc5, 0x3000..=0x3FFF) => {
                self.rom_bank = (((val & 0x01) as u16) << 8) | (self.rom_bank & 0xFF);
                self.apply_rom(mapper);
            }
            (MbcType::Mbc1, 0x4000..=0x5FFF) => {
                if self.mode == 1 {
                    self.ram_bank = val & 0x03;
                    self.apply_ram(mapper);
                } else {
                    self.rom_bank = (((val & 0x03) as u16) << 5) | (self.rom_bank & 0x1F);
                    self.apply_rom(mapper);
                }
            }
            (MbcType::Mbc3, 0x4000..=0x5FFF) => {
                self.ram_bank = val;
                self.apply_ram(mapper);
            }
            (MbcType::Mbc5, 0x4000..=0x5FFF) => {
                self.ram_bank = val & 0x0F;
                self.apply_ram(mapper);
            }
            (MbcType::Mbc1, 0x6000..=0x7FFF) => {
                self.mode = val & 0x01;
            }
            _ => {}
        }
    }

    /// Push the whole banking state into the mapper.
    pub fn apply(&self, mapper: &mut AddressMapper) {
        self.apply_rom(mapper);
        self.apply_ram(mapper);
    }

    fn adjusted_rom_bank(&self, bank: usize) -> usize {
        match self.mbc {
            MbcType::Mbc1 if bank & 0x1F == 0 => bank + 1,
            MbcType::Mbc2 | MbcType::Mbc3 if bank == 0 => 1,
            MbcType::NoMbc | MbcType::Unknown(_) => 1,
            _ => bank,
        }
    }

    fn apply_rom(&self, mapper: &mut AddressMapper) {
        let mask = mapper.rom_bank_count() - 1;
        let bank = self.adjusted_rom_bank(self.rom_bank as usize & mask);
        log::debug!("ROM bank {bank:#04X}");
        mapper.set_rom_bank0(0);
        mapper.set_rom_bank1(bank);
    }

    fn apply_ram(&self, mapper: &mut AddressMapper) {
        let mut flags = if self.ram_enable || self.mbc == MbcType::NoMbc {
            RamFlags::ENABLED
        } else {
            RamFlags::empty()
        };

        let bank = match self.ram_bank {
            0x08..=0x0C if self.mbc == MbcType::Mbc3 && self.has_rtc() => {
                flags = flags | RamFlags::RTC_EN;
                (self.ram_bank - 0x08) as usize % RTC_REGISTERS
            }
            bank => {
                let count = mapper.ram_bank_count();
                if count == 0 {
                    0
                } else {
                    (bank & 0x0F) as usize % count
                }
            }
        };
        mapper.set_ram_bank(flags, bank);
    }

    pub fn rom_bank(&self) -> u16 {
        self.rom_bank
    }

    pub fn ram_bank(&self) -> u8 {
        self.ram_bank
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enable
    }

    pub fn banking_mode(&self) -> u8 {
        self.mode
    }
}

impl Snapshot for Cartridge {
    fn save(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.rom_bank.to_le_bytes());
        out.push(self.ram_bank);
        out.push(self.ram_enable as u8);
        out.push(self.mode);
    }

    fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = ByteReader::new(data);
        let rom_bank = r.u16_le()?;
        let ram_bank = r.u8()?;
        let ram_enable = r.bool()?;
        let mode = r.u8()?;
        r.finish()?;
        if rom_bank > 0x1FF {
            return Err(SnapshotError::Invalid("cartridge ROM bank"));
        }
        if mode > 1 {
            return Err(SnapshotError::Invalid("banking mode"));
        }
        self.rom_bank = rom_bank;
        self.ram_bank = ram_bank;
        self.ram_enable = ram_enable;
        self.mode = mode;
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0143];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.data[0x0143] & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> MbcType {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => MbcType::NoMbc,
            0x01..=0x03 => MbcType::Mbc1,
            0x05 | 0x06 => MbcType::Mbc2,
            0x0F..=0x13 => MbcType::Mbc3,
            0x19..=0x1E => MbcType::Mbc5,
            other => MbcType::Unknown(other),
        }
    }

    fn ram_size(&self) -> Result<usize, CartridgeError> {
        // MBC2 has 512x4-bit internal RAM regardless of the header.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return Ok(RAM_BANK_SIZE);
        }

        match self.data[0x0149] {
            0x00 => Ok(0),
            0x01 => Ok(0x800),
            0x02 => Ok(0x2000),
            0x03 => Ok(0x8000),
            0x04 => Ok(0x20000),
            0x05 => Ok(0x10000),
            code => Err(CartridgeError::InvalidRamSize { code }),
        }
    }
}
