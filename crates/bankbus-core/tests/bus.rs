use bankbus_core::{
    bank::{DmaSource, OPEN_BUS, ROM_BANK_SIZE},
    bus::{Bus, BusConfig, DEFAULT_PPI_BASE, PPI_BASE_RANGE},
    cartridge::CartridgeError,
    hardware::CompatMode,
    snapshot::{Snapshot, SnapshotReader, SnapshotWriter},
};

/// ROM where byte 0x100 of every bank holds the bank number.
fn rom(cart_type: u8, ram_code: u8, banks: usize) -> Vec<u8> {
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
    for (i, chunk) in rom.chunks_mut(ROM_BANK_SIZE).enumerate() {
        chunk[0x100] = i as u8;
        chunk[0x101] = (i >> 8) as u8;
    }
    rom[0x134..0x13C].copy_from_slice(b"BUS TEST");
    rom[0x147] = cart_type;
    rom[0x149] = ram_code;
    rom
}

fn bus_with(image: Vec<u8>, mode: CompatMode) -> Bus {
    Bus::new(
        image,
        BusConfig {
            mode,
            ..BusConfig::default()
        },
    )
    .unwrap()
}

fn high_bank(bus: &mut Bus) -> u16 {
    (bus.read_byte(0x4100) as u16) | ((bus.read_byte(0x4101) as u16) << 8)
}

#[test]
fn short_image_is_rejected() {
    assert!(matches!(
        Bus::new(vec![0; 0x20], BusConfig::default()),
        Err(CartridgeError::HeaderTooShort { .. })
    ));
}

#[test]
fn mbc1_switches_through_bus() {
    let mut bus = bus_with(rom(0x01, 0x00, 32), CompatMode::Classic);
    assert_eq!(high_bank(&mut bus), 1);

    bus.write_byte(0x2000, 0x07);
    assert_eq!(high_bank(&mut bus), 7);
    bus.write_byte(0x2000, 0x00);
    assert_eq!(high_bank(&mut bus), 1);
    // Bank numbers past the ROM size wrap.
    bus.write_byte(0x2000, 0x1F);
    bus.write_byte(0x4000, 0x01);
    assert_eq!(high_bank(&mut bus), 0x1F);
    assert_eq!(bus.read_byte(0x0100), 0);
}

#[test]
fn mbc5_switches_through_bus() {
    let mut bus = bus_with(rom(0x19, 0x00, 512), CompatMode::Enhanced);
    bus.write_byte(0x2000, 0x34);
    bus.write_byte(0x3000, 0x01);
    assert_eq!(high_bank(&mut bus), 0x134);
    bus.write_byte(0x3000, 0x00);
    assert_eq!(high_bank(&mut bus), 0x34);
    bus.write_byte(0x2000, 0x00);
    assert_eq!(high_bank(&mut bus), 0);
}

#[test]
fn cartridge_ram_needs_enable() {
    let mut bus = bus_with(rom(0x1B, 0x03, 4), CompatMode::Classic);
    bus.write_byte(0xA000, 0x11);
    assert_eq!(bus.read_byte(0xA000), OPEN_BUS);

    bus.write_byte(0x0000, 0x0A);
    bus.write_byte(0x4000, 0x02);
    bus.write_byte(0xA000, 0x22);
    assert_eq!(bus.read_byte(0xA000), 0x22);
    bus.write_byte(0x4000, 0x00);
    assert_eq!(bus.read_byte(0xA000), 0x00);
    bus.write_byte(0x4000, 0x02);
    assert_eq!(bus.read_byte(0xA000), 0x22);

    bus.write_byte(0x0000, 0x00);
    assert_eq!(bus.read_byte(0xA000), OPEN_BUS);
}

#[test]
fn wram_bank_register_treats_zero_as_one() {
    let mut bus = bus_with(rom(0x00, 0x00, 2), CompatMode::Enhanced);
    bus.write_byte(0xFF70, 0x01);
    bus.write_byte(0xD000, 0xAA);
    bus.write_byte(0xFF70, 0x02);
    assert_eq!(bus.read_byte(0xD000), 0x00);
    bus.write_byte(0xFF70, 0x00);
    assert_eq!(bus.read_byte(0xD000), 0xAA);
    assert_eq!(bus.read_byte(0xFF70), 0xF9);
}

#[test]
fn oam_dma_from_wram_blocks_only_wram_on_enhanced() {
    let mut bus = bus_with(rom(0x00, 0x00, 2), CompatMode::Enhanced);
    for i in 0..0xA0u16 {
        bus.write_byte(0xC000 + i, i as u8 ^ 0x5A);
    }
    bus.write_byte(0xFF46, 0xC0);
    bus.dma_step(8);
    assert_eq!(bus.mapper().dma_source(), DmaSource::Wram);

    assert_eq!(bus.read_byte(0xC000), OPEN_BUS);
    assert_eq!(bus.read_byte(0x0100), 0);
    assert!(bus.is_in_conflict_area(0xD000));
    assert!(!bus.is_in_conflict_area(0x4000));

    // High RAM stays reachable.
    bus.write_byte(0xFF80, 0x99);
    assert_eq!(bus.read_byte(0xFF80), 0x99);

    bus.dma_step(640);
    assert!(!bus.dma_active());
    assert_eq!(bus.read_byte(0xC000), 0x5A);
    for i in 0..0xA0u16 {
        assert_eq!(bus.read_byte(0xFE00 + i), i as u8 ^ 0x5A);
    }
}

#[test]
fn oam_dma_from_rom_blocks_work_ram_on_classic() {
    let mut bus = bus_with(rom(0x00, 0x00, 2), CompatMode::Classic);
    bus.write_byte(0xFF46, 0x40);
    bus.dma_step(8);
    assert_eq!(bus.mapper().dma_source(), DmaSource::Rom);
    assert_eq!(bus.read_byte(0xC000), OPEN_BUS);
    assert_eq!(bus.read_byte(0x4100), OPEN_BUS);
    assert_eq!(bus.read_byte(0x8000), 0x00);
    bus.dma_step(640);
    assert_eq!(bus.read_byte(0xFE00), bus.read_byte(0x4000));
}

#[test]
fn ppi_window_follows_config() {
    let mut bus = Bus::new(
        rom(0x00, 0x00, 2),
        BusConfig {
            mode: CompatMode::Classic,
            ppi_base: 0xFF10,
        },
    )
    .unwrap();
    assert_eq!(bus.read_byte(0xFF13), 0x9B);
    assert_eq!(bus.read_byte(DEFAULT_PPI_BASE + 3), OPEN_BUS);
    bus.write_byte(0xFF13, 0x80);
    bus.write_byte(0xFF11, 0x66);
    assert_eq!(bus.peek_byte(0xFF11), 0x66);
    assert_eq!(bus.ppi().state().latches[1], 0x66);
}

#[test]
fn ppi_window_past_high_page_is_not_decoded() {
    for base in [0xFFFD, 0xFFFE, 0xFFFF, 0xFDFE] {
        assert!(!PPI_BASE_RANGE.contains(&base));
        let mut bus = Bus::new(
            rom(0x00, 0x00, 2),
            BusConfig {
                mode: CompatMode::Classic,
                ppi_base: base,
            },
        )
        .unwrap();

        bus.write_byte(0xFFFF, 0x1F);
        assert_eq!(bus.read_byte(0xFFFF), 0x1F, "base {base:04X}");
        bus.write_byte(0xFFFE, 0x42);
        assert_eq!(bus.read_byte(0xFFFE), 0x42, "base {base:04X}");
        bus.write_byte(0xFE00, 0x24);
        assert_eq!(bus.peek_byte(0xFE00), 0x24, "base {base:04X}");
        assert_eq!(bus.ppi().state().latches, [0, 0, 0]);
    }
}

#[test]
fn ppi_window_at_top_of_range_still_decodes() {
    let mut bus = Bus::new(
        rom(0x00, 0x00, 2),
        BusConfig {
            mode: CompatMode::Classic,
            ppi_base: 0xFFFC,
        },
    )
    .unwrap();
    bus.write_byte(0xFFFF, 0x80);
    assert_eq!(bus.peek_byte(0xFFFF), 0x80);
    bus.write_byte(0xFFFC, 0x3C);
    assert_eq!(bus.ppi().state().latches[0], 0x3C);
}

#[test]
fn bus_snapshot_round_trip_mid_dma() {
    let mut bus = bus_with(rom(0x00, 0x00, 2), CompatMode::Classic);
    bus.write_byte(0xFF90, 0x12);
    bus.write_byte(0xFFFF, 0x1F);
    bus.write_byte(0xFF46, 0x00);
    bus.dma_step(100);

    let mut w = SnapshotWriter::new(Vec::new()).unwrap();
    w.module("bus", &bus).unwrap();
    let bytes = w.finish().unwrap();

    let mut other = bus_with(rom(0x00, 0x00, 2), CompatMode::Classic);
    SnapshotReader::new(bytes.as_slice())
        .unwrap()
        .module("bus", &mut other)
        .unwrap();

    assert_eq!(other.read_byte(0xFF90), 0x12);
    assert_eq!(other.read_byte(0xFFFF), 0x1F);
    assert!(other.dma_active());
    assert_eq!(other.read_byte(0xFF46), 0x00);

    let mut bad = Vec::new();
    bus.save(&mut bad);
    bad.truncate(bad.len() - 1);
    assert!(other.load(&bad).is_err());
}
