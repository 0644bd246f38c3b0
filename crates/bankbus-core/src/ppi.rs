//! Intel 8255A programmable peripheral interface.
//!
//! Only mode 0 (basic I/O) is modelled. Mode 1/2 requests are stored so the
//! control byte reads back, but the strobed handshake lines are not driven.

use crate::snapshot::{ByteReader, Snapshot, SnapshotError};

/// ORed into a register index to turn a read into a side-effect-free peek.
pub const PEEK_FLAG: u8 = 0x80;

/// Control byte after reset: mode-set, every port input, mode 0.
pub const RESET_CONTROL: u8 = 0x9B;

const CTRL_MODE_SET: u8 = 0x80;
const CTRL_A_INPUT: u8 = 0x10;
const CTRL_C_UPPER_INPUT: u8 = 0x08;
const CTRL_B_INPUT: u8 = 0x02;
const CTRL_C_LOWER_INPUT: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    A,
    B,
    C,
}

impl Port {
    pub const ALL: [Port; 3] = [Port::A, Port::B, Port::C];

    const fn index(self) -> usize {
        match self {
            Port::A => 0,
            Port::B => 1,
            Port::C => 2,
        }
    }

    const fn from_reg(reg: u8) -> Option<Port> {
        match reg & 0x03 {
            0 => Some(Port::A),
            1 => Some(Port::B),
            2 => Some(Port::C),
            _ => None,
        }
    }
}

/// Why the chip drove a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChange {
    DataWrite,
    ModeSet,
    Reset,
}

/// Whatever virtual hardware is attached to the chip's pins.
///
/// Every method has a default, so a wiring only implements the ports it
/// actually drives. Unconnected pins float high.
pub trait PortWiring: Send {
    /// Sample the live pins. May have side effects (e.g. acknowledging a
    /// latch in the attached device).
    fn get_port(&mut self, _port: Port) -> u8 {
        0xFF
    }

    /// Sample the live pins without side effects.
    fn peek_port(&self, _port: Port) -> u8 {
        0xFF
    }

    fn set_port(&mut self, _port: Port, _value: u8, _reason: PinChange) {}

    /// Whether anything is attached to `port`. Reset only relays wired ports.
    fn wired(&self, _port: Port) -> bool {
        true
    }
}

/// Wiring used when nothing is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWiring;

impl PortWiring for NullWiring {
    fn wired(&self, _port: Port) -> bool {
        false
    }
}

/// The four registers of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpiState {
    pub ctrl: u8,
    pub latches: [u8; 3],
}

impl Default for PpiState {
    fn default() -> Self {
        Self {
            ctrl: RESET_CONTROL,
            latches: [0; 3],
        }
    }
}

impl PpiState {
    #[inline]
    pub fn group_a_mode(&self) -> u8 {
        (self.ctrl >> 5) & 0x03
    }

    #[inline]
    pub fn group_b_mode(&self) -> u8 {
        (self.ctrl >> 2) & 0x01
    }

    /// Bits of `port` currently configured as input.
    pub fn input_mask(&self, port: Port) -> u8 {
        match port {
            Port::A => flag_mask(self.ctrl & CTRL_A_INPUT != 0, 0xFF),
            Port::B => flag_mask(self.ctrl & CTRL_B_INPUT != 0, 0xFF),
            Port::C => {
                flag_mask(self.ctrl & CTRL_C_UPPER_INPUT != 0, 0xF0)
                    | flag_mask(self.ctrl & CTRL_C_LOWER_INPUT != 0, 0x0F)
            }
        }
    }

    /// Value seen on a data register: input bits from `pins`, output bits
    /// from the latch. `pins` is only sampled when some bit is input.
    fn compose(&self, port: Port, pins: impl FnOnce() -> u8) -> u8 {
        match port {
            Port::A if self.group_a_mode() != 0 => 0xFF,
            Port::B if self.group_b_mode() != 0 => 0xFF,
            _ => merge(self.input_mask(port), pins, self.latches[port.index()]),
        }
    }
}

#[inline]
fn flag_mask(set: bool, mask: u8) -> u8 {
    if set { mask } else { 0 }
}

#[inline]
fn merge(input: u8, pins: impl FnOnce() -> u8, latch: u8) -> u8 {
    if input == 0 {
        latch
    } else {
        (pins() & input) | (latch & !input)
    }
}

pub struct Ppi8255 {
    regs: PpiState,
    wiring: Box<dyn PortWiring>,
}

impl Default for Ppi8255 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppi8255 {
    pub fn new() -> Self {
        Self::with_wiring(Box::new(NullWiring))
    }

    pub fn with_wiring(wiring: Box<dyn PortWiring>) -> Self {
        Self {
            regs: PpiState::default(),
            wiring,
        }
    }

    /// Attach new pin wiring. Register contents are kept.
    pub fn connect(&mut self, wiring: Box<dyn PortWiring>) {
        self.wiring = wiring;
    }

    /// Power-on state. Every port comes up as input, and a wired port has its
    /// current pin level latched and driven back out, the way floating
    /// outputs settle onto whatever they are tied to.
    pub fn reset(&mut self) {
        self.regs = PpiState::default();
        for port in Port::ALL {
            if !self.wiring.wired(port) {
                continue;
            }
            let value = self.wiring.get_port(port);
            self.regs.latches[port.index()] = value;
            self.wiring.set_port(port, value, PinChange::Reset);
        }
    }

    /// Read register `reg` (0 = A, 1 = B, 2 = C, 3 = control). With
    /// [`PEEK_FLAG`] set this is the same as [`Ppi8255::peek`].
    pub fn read(&mut self, reg: u8) -> u8 {
        if reg & PEEK_FLAG != 0 {
            return self.peek(reg);
        }
        let Some(port) = Port::from_reg(reg) else {
            return self.regs.ctrl;
        };
        let wiring = &mut self.wiring;
        self.regs.compose(port, || wiring.get_port(port))
    }

    pub fn peek(&self, reg: u8) -> u8 {
        let Some(port) = Port::from_reg(reg) else {
            return self.regs.ctrl;
        };
        self.regs.compose(port, || self.wiring.peek_port(port))
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match Port::from_reg(reg) {
            Some(port) => {
                self.regs.latches[port.index()] = value;
                self.drive(port, PinChange::DataWrite);
            }
            None => self.write_control(value),
        }
    }

    /// Push the output bits of `port` to the pins. Input bits of a partly
    /// output port C are taken from the live pins.
    fn drive(&mut self, port: Port, reason: PinChange) {
        let input = self.regs.input_mask(port);
        if input == 0xFF {
            return;
        }
        let latch = self.regs.latches[port.index()];
        let wiring = &mut self.wiring;
        let value = merge(input, || wiring.get_port(port), latch);
        self.wiring.set_port(port, value, reason);
    }

    fn write_control(&mut self, value: u8) {
        // Bit set/reset commands on port C are not modelled.
        if value & CTRL_MODE_SET == 0 {
            return;
        }

        self.regs.ctrl = value;
        let (mode_a, mode_b) = (self.regs.group_a_mode(), self.regs.group_b_mode());
        if mode_a != 0 || mode_b != 0 {
            log::warn!(
                "8255: unsupported mode set {value:#04X} (group A mode {mode_a}, group B mode {mode_b})"
            );
        }

        self.drive(Port::A, PinChange::ModeSet);
        self.drive(Port::B, PinChange::ModeSet);
        if self.regs.input_mask(Port::C) == 0xFF {
            // Whole port is input: resync the pins once.
            let pins = self.wiring.get_port(Port::C);
            self.wiring.set_port(Port::C, pins, PinChange::ModeSet);
        } else {
            self.drive(Port::C, PinChange::ModeSet);
        }
    }

    /// One line per register, read through the peek path.
    pub fn dump(&self) -> [String; 4] {
        [
            format!("PORT A  {:02X}", self.peek(0)),
            format!("PORT B  {:02X}", self.peek(1)),
            format!("PORT C  {:02X}", self.peek(2)),
            format!("CONTROL {:02X}", self.peek(3)),
        ]
    }

    pub fn state(&self) -> PpiState {
        self.regs
    }

    /// Overwrite the registers without touching the pins.
    pub fn restore(&mut self, state: PpiState) {
        self.regs = state;
    }
}

impl Snapshot for Ppi8255 {
    fn save(&self, out: &mut Vec<u8>) {
        out.push(self.regs.ctrl);
        out.extend_from_slice(&self.regs.latches);
    }

    fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = ByteReader::new(data);
        let ctrl = r.u8()?;
        let latches = r.bytes(3)?;
        r.finish()?;
        self.restore(PpiState {
            ctrl,
            latches: [latches[0], latches[1], latches[2]],
        });
        Ok(())
    }
}
