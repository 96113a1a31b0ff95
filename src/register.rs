//! Register map and wire-format helpers shared by the blocking and async drivers.
//!
//! Everything in here is pure: no bus access, so it can be tested on its own.

/// Fixed part of the SPI opcode (`0100 A1 A0 RW`).
pub const MCP23S08_OPCODE: u8 = 0x40;

/// IOCON bit enabling the hardware address pins (HAEN).
pub const MCP23S08_IOCON_HAEN: u8 = 0x08;

/// Number of registers in the register file.
pub const REGISTER_COUNT: usize = 11;

/// Register addresses of the MCP23S08.
///
/// The driver only uses `IODIR`, `IOCON`, `GPPU`, `GPIO` and `OLAT`. The others are
/// reachable through [`Mcp23s08::read_register`](crate::Mcp23s08::read_register) and
/// [`Mcp23s08::write_register`](crate::Mcp23s08::write_register).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// I/O direction, 1 = input.
    IODIR = 0x00,
    /// Input polarity inversion.
    IPOL = 0x01,
    /// Interrupt-on-change enable.
    GPINTEN = 0x02,
    /// Default compare value for interrupt-on-change.
    DEFVAL = 0x03,
    /// Interrupt-on-change control.
    INTCON = 0x04,
    /// Device configuration.
    IOCON = 0x05,
    /// Pull-up enable.
    GPPU = 0x06,
    /// Interrupt flags (read-only).
    INTF = 0x07,
    /// Interrupt capture (read-only).
    INTCAP = 0x08,
    /// Port value. Reads return the pin levels, writes go to `OLAT`.
    GPIO = 0x09,
    /// Output latch.
    OLAT = 0x0A,
}

impl From<Register> for u8 {
    fn from(reg: Register) -> Self {
        reg as u8
    }
}

/// Direction of a register transfer, encoded in the opcode's lowest bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    /// R/W bit cleared.
    Write,
    /// R/W bit set.
    Read,
}

/// Builds the opcode byte for a device address and transfer direction.
///
/// Only the two low bits of `device_address` are used; larger values are
/// silently truncated.
///
/// ```
/// use mcp23s08::{opcode, Access};
///
/// assert_eq!(opcode(3, Access::Write), 0x46);
/// assert_eq!(opcode(3, Access::Read), 0x47);
/// ```
pub const fn opcode(device_address: u8, access: Access) -> u8 {
    let base = MCP23S08_OPCODE | ((device_address & 0x03) << 1);
    match access {
        Access::Write => base,
        Access::Read => base | 0x01,
    }
}

/// Converts pin modes (1 = output) into the value stored in `IODIR` (1 = input).
pub const fn modes_to_iodir(modes: u8) -> u8 {
    !modes
}

/// Converts an `IODIR` value (1 = input) into pin modes (1 = output).
pub const fn iodir_to_modes(iodir: u8) -> u8 {
    !iodir
}

/// Power-on values of all registers, `IODIR` first and `OLAT` last.
///
/// When `haen` is set the `IOCON` entry carries the HAEN bit so that a reset
/// keeps hardware addressing enabled.
pub const fn reset_image(haen: bool) -> [u8; REGISTER_COUNT] {
    let mut image = [0x00; REGISTER_COUNT];
    image[Register::IODIR as usize] = 0xFF;
    if haen {
        image[Register::IOCON as usize] = MCP23S08_IOCON_HAEN;
    }
    image
}
