use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng, rngs::StdRng};

use bankbus_core::{
    ppi::{NullWiring, PEEK_FLAG, PinChange, Port, PortWiring, Ppi8255, PpiState},
    snapshot::{Snapshot, SnapshotReader, SnapshotWriter},
};

type SetLog = Arc<Mutex<Vec<(Port, u8, PinChange)>>>;

/// Pins held at fixed levels; every output is recorded.
struct FixedPins {
    a: u8,
    b: u8,
    c: u8,
    sets: SetLog,
    reads: Arc<Mutex<usize>>,
}

impl FixedPins {
    fn level(&self, port: Port) -> u8 {
        match port {
            Port::A => self.a,
            Port::B => self.b,
            Port::C => self.c,
        }
    }
}

impl PortWiring for FixedPins {
    fn get_port(&mut self, port: Port) -> u8 {
        *self.reads.lock().unwrap() += 1;
        self.level(port)
    }

    fn peek_port(&self, port: Port) -> u8 {
        self.level(port)
    }

    fn set_port(&mut self, port: Port, value: u8, reason: PinChange) {
        self.sets.lock().unwrap().push((port, value, reason));
    }
}

struct Harness {
    ppi: Ppi8255,
    sets: SetLog,
    reads: Arc<Mutex<usize>>,
}

fn wired(a: u8, b: u8, c: u8) -> Harness {
    let sets = SetLog::default();
    let reads = Arc::new(Mutex::new(0));
    let ppi = Ppi8255::with_wiring(Box::new(FixedPins {
        a,
        b,
        c,
        sets: sets.clone(),
        reads: reads.clone(),
    }));
    Harness { ppi, sets, reads }
}

#[test]
fn reset_relays_wired_inputs() {
    let mut h = wired(0x5A, 0x00, 0xC3);
    h.ppi.reset();
    assert_eq!(h.ppi.peek(0), 0x5A);
    assert_eq!(h.ppi.read(0), 0x5A);
    assert_eq!(h.ppi.state().latches, [0x5A, 0x00, 0xC3]);

    let sets = h.sets.lock().unwrap();
    assert!(sets.contains(&(Port::A, 0x5A, PinChange::Reset)));
    assert!(sets.contains(&(Port::C, 0xC3, PinChange::Reset)));
}

#[test]
fn reset_without_wiring_zeroes_latches() {
    let mut ppi = Ppi8255::with_wiring(Box::new(NullWiring));
    ppi.write(3, 0x80);
    ppi.write(0, 0x12);
    ppi.reset();
    assert_eq!(ppi.state(), PpiState::default());
    assert_eq!(ppi.peek(0), 0xFF);
}

#[test]
fn control_write_without_mode_set_is_ignored() {
    let mut h = wired(0, 0, 0);
    h.ppi.write(3, 0x1B);
    assert_eq!(h.ppi.peek(3), 0x9B);

    h.ppi.write(3, 0x9B & !0x10);
    h.ppi.write(3, 0x00);
    assert_eq!(h.ppi.peek(3), 0x8B);
    h.ppi.write(3, 0x0F);
    assert_eq!(h.ppi.peek(3), 0x8B);
}

#[test]
fn port_c_nibbles_have_independent_direction() {
    let mut h = wired(0x00, 0x00, 0x05);
    // Upper nibble output, lower nibble input.
    h.ppi.write(3, 0x80 | 0x01);
    h.sets.lock().unwrap().clear();

    h.ppi.write(2, 0xF0);
    let sets = h.sets.lock().unwrap();
    assert_eq!(sets.as_slice(), &[(Port::C, 0xF5, PinChange::DataWrite)]);
    drop(sets);

    assert_eq!(h.ppi.read(2), 0xF5);
}

#[test]
fn port_c_upper_input_lower_output() {
    let mut h = wired(0x00, 0x00, 0xA0);
    h.ppi.write(3, 0x80 | 0x08);
    h.sets.lock().unwrap().clear();

    h.ppi.write(2, 0x3C);
    assert_eq!(
        h.sets.lock().unwrap().as_slice(),
        &[(Port::C, 0xAC, PinChange::DataWrite)]
    );
    assert_eq!(h.ppi.peek(2), 0xAC);
}

#[test]
fn input_ports_read_live_pins() {
    let mut h = wired(0x11, 0x22, 0x33);
    assert_eq!(h.ppi.read(0), 0x11);
    assert_eq!(h.ppi.read(1), 0x22);
    assert_eq!(h.ppi.read(2), 0x33);
    assert_eq!(*h.reads.lock().unwrap(), 3);
}

#[test]
fn peek_never_samples_with_side_effects() {
    let mut h = wired(0x11, 0x22, 0x33);
    for reg in 0..4 {
        h.ppi.peek(reg);
        h.ppi.read(reg | PEEK_FLAG);
    }
    let _ = h.ppi.dump();
    assert_eq!(*h.reads.lock().unwrap(), 0);
}

#[test]
fn output_latch_survives_direction_changes() {
    let mut h = wired(0x11, 0x22, 0x33);
    h.ppi.write(3, 0x80);
    h.ppi.write(0, 0x44);
    h.ppi.write(3, 0x90);
    assert_eq!(h.ppi.read(0), 0x11);

    h.sets.lock().unwrap().clear();
    h.ppi.write(3, 0x80);
    assert_eq!(h.ppi.read(0), 0x44);
    assert!(
        h.sets
            .lock()
            .unwrap()
            .contains(&(Port::A, 0x44, PinChange::ModeSet))
    );
}

#[test]
fn dump_uses_peek_path() {
    let mut h = wired(0x5A, 0x22, 0x33);
    h.ppi.reset();
    let lines = h.ppi.dump();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].ends_with("5A"));
    assert!(lines[1].ends_with("22"));
    assert!(lines[2].ends_with("33"));
    assert!(lines[3].ends_with("9B"));
}

#[test]
fn snapshot_layout_is_ctrl_then_ports() {
    let mut ppi = Ppi8255::new();
    ppi.write(3, 0x80);
    ppi.write(0, 0xAA);
    ppi.write(1, 0xBB);
    ppi.write(2, 0xCC);
    let mut out = Vec::new();
    ppi.save(&mut out);
    assert_eq!(out, [0x80, 0xAA, 0xBB, 0xCC]);
}

#[test]
fn snapshot_round_trip_for_random_registers() {
    let mut rng = StdRng::seed_from_u64(0x8255);

    for _ in 0..256 {
        let mut ppi = Ppi8255::new();
        ppi.write(3, rng.random::<u8>() | 0x80);
        ppi.write(0, rng.random());
        ppi.write(1, rng.random());
        ppi.write(2, rng.random());
        ppi.write(3, rng.random());

        let mut w = SnapshotWriter::new(Vec::new()).unwrap();
        w.module("i8255", &ppi).unwrap();
        let bytes = w.finish().unwrap();

        let mut restored = Ppi8255::new();
        SnapshotReader::new(bytes.as_slice())
            .unwrap()
            .module("i8255", &mut restored)
            .unwrap();

        assert_eq!(restored.state(), ppi.state());
        for reg in 0..4 {
            assert_eq!(restored.read(reg), ppi.read(reg));
        }
    }
}
