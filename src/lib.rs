//! MCP23S08 GPIO Expander Driver
//!
//! A platform-agnostic driver for the Microchip MCP23S08 8-bit SPI I/O expander.
//!
//! The MCP23S08 has eight GPIO pins and eleven 8-bit registers, reached through a
//! three-byte SPI protocol: an opcode (`0100 A1 A0 RW`), a register address and a
//! data byte. Up to four devices can share one chip-select line when hardware
//! addressing (HAEN) is enabled.
//!
//! # Features
//!
//! - `no_std` compatible
//! - Uses `embedded-hal` 1.0 [`SpiDevice`] for bus access and chip-select handling
//! - Arduino-style pin operations: [`read_pin`](Mcp23s08::read_pin),
//!   [`write_pin`](Mcp23s08::write_pin), [`set_pin_mode`](Mcp23s08::set_pin_mode)
//! - Bulk 8-bit access to output latch, pin modes and pull-ups
//! - Optional critical-section protection for read-modify-write operations, behind the
//!   `critical-section` feature
//! - Async driver behind the `async` feature
//! - `defmt` or `log` output behind the features of the same name
//!
//! # Pin modes
//!
//! The chip's `IODIR` register uses 1 = input. This driver exposes pin modes the
//! other way round (1 = output) everywhere, and converts on every access.
//!
//! # Example
//!
//! ```ignore
//! use mcp23s08::{Config, Mcp23s08, PinMode};
//! # let spi = todo!();
//!
//! let mut gpio = Mcp23s08::with_config(spi, 0, Config::default().with_haen(true));
//! gpio.begin().unwrap();
//!
//! gpio.set_pin_mode(0, PinMode::Output).unwrap();
//! gpio.write_pin(0, true).unwrap();
//!
//! gpio.set_pin_mode(4, PinMode::InputPullup).unwrap();
//! let pressed = !gpio.read_pin(4).unwrap();
//! ```

#![no_std]

#[macro_use]
mod fmt;

#[cfg(feature = "async")]
pub mod async_impl;
mod register;
#[cfg(test)]
mod sim;

use embedded_hal::spi::{Mode, Operation, SpiDevice, MODE_0};
use num_enum::TryFromPrimitive;

pub use register::{
    iodir_to_modes, modes_to_iodir, opcode, reset_image, Access, Register, MCP23S08_IOCON_HAEN,
    MCP23S08_OPCODE, REGISTER_COUNT,
};

#[cfg(feature = "async")]
pub use async_impl::Mcp23s08Async;

/// Default SPI clock frequency in Hz.
pub const DEFAULT_FREQUENCY: u32 = 1_000_000;

/// Raw mode value for [`PinMode::Input`].
pub const INPUT: u8 = 0;
/// Raw mode value for [`PinMode::Output`].
pub const OUTPUT: u8 = 1;
/// Raw mode value for [`PinMode::InputPullup`].
pub const INPUT_PULLUP: u8 = 2;

/// Pin mode bitmask with every pin set to input.
pub const PIN_MODE_INPUT_ALL: u8 = 0x00;
/// Pin mode bitmask with every pin set to output.
pub const PIN_MODE_OUTPUT_ALL: u8 = 0xFF;

/// GPIO pin
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Pin {
    Gp0 = 0,
    Gp1 = 1,
    Gp2 = 2,
    Gp3 = 3,
    Gp4 = 4,
    Gp5 = 5,
    Gp6 = 6,
    Gp7 = 7,
}

impl Pin {
    /// All pins in bit order.
    pub const ALL: [Pin; 8] = [
        Pin::Gp0,
        Pin::Gp1,
        Pin::Gp2,
        Pin::Gp3,
        Pin::Gp4,
        Pin::Gp5,
        Pin::Gp6,
        Pin::Gp7,
    ];

    /// Validates a raw pin index. Returns `None` for anything above 7.
    pub fn new(index: u8) -> Option<Self> {
        Self::try_from(index).ok()
    }

    /// Bit position of this pin inside an 8-bit register.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Single-bit mask for this pin.
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

/// Pin modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PinMode {
    /// Floating input, pull-up disabled.
    Input = 0,
    /// Push-pull output.
    Output = 1,
    /// Input with the internal 100 kΩ pull-up enabled.
    InputPullup = 2,
}

/// Outcome of a pin-level write.
///
/// Out-of-range pins and unknown mode values are not errors: the call does
/// nothing and reports [`PinUpdate::Ignored`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinUpdate {
    /// The registers were updated.
    Applied,
    /// The arguments were out of range; no bus traffic took place.
    Ignored,
}

/// How read-modify-write sequences are protected.
///
/// [`write_pin`](Mcp23s08::write_pin) and [`set_pin_mode`](Mcp23s08::set_pin_mode) read a
/// register and write it back in two separate SPI transactions. Anything else touching
/// the same chip in between (another driver instance, an interrupt handler) can have its
/// update overwritten.
///
/// Locking is opt-in. The default never touches `critical-section`, so the driver links
/// on targets that provide no critical-section implementation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RmwLocking {
    /// No protection. The read and the write can be interleaved with other accesses.
    #[default]
    None,
    /// Run the whole sequence inside [`critical_section::with`]. Needs the
    /// `critical-section` feature and an implementation for the target.
    #[cfg(feature = "critical-section")]
    CriticalSection,
}

/// SPI bit order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first.
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

/// Bus settings the MCP23S08 expects.
///
/// `embedded-hal` leaves bus configuration to whoever builds the [`SpiDevice`], so the
/// driver only reports these. Apply them when creating the SPI peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusSettings {
    /// Clock frequency in Hz.
    pub frequency: u32,
    /// Clock polarity and phase.
    pub mode: Mode,
    /// Bit order on the wire.
    pub bit_order: BitOrder,
}

/// Driver configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Enable hardware address decoding (`IOCON.HAEN`) in [`begin`](Mcp23s08::begin)
    /// and keep it enabled across [`reset`](Mcp23s08::reset).
    pub haen: bool,
    /// SPI clock frequency in Hz.
    pub frequency: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            haen: false,
            frequency: DEFAULT_FREQUENCY,
        }
    }
}

impl Config {
    /// Sets whether hardware addressing is enabled.
    pub const fn with_haen(mut self, haen: bool) -> Self {
        self.haen = haen;
        self
    }

    /// Sets the SPI clock frequency in Hz.
    pub const fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Bus settings derived from this configuration.
    pub const fn bus_settings(&self) -> BusSettings {
        BusSettings {
            frequency: self.frequency,
            mode: MODE_0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// Errors that can occur when talking to the MCP23S08
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mcp23s08Error<E> {
    /// SPI transaction for a register read failed
    ReadError(E),
    /// SPI transaction for a register write failed
    WriteError(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for Mcp23s08Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReadError(e) => write!(f, "register read failed: {e:?}"),
            Self::WriteError(e) => write!(f, "register write failed: {e:?}"),
        }
    }
}

/// MCP23S08 driver instance
///
/// Owns an [`SpiDevice`] whose chip-select line selects this expander. Every method
/// performs live bus transactions; no register contents are cached.
///
/// The SPI device is usually a `embedded_hal_bus::spi::ExclusiveDevice` or, when the bus
/// is shared with other chips, one of the `embedded-hal-bus` shared devices. Those lock
/// the bus for each transaction.
#[derive(Debug)]
pub struct Mcp23s08<SPI> {
    spi: SPI,
    opcode: u8,
    config: Config,
    locking: RmwLocking,
}

impl<SPI> Mcp23s08<SPI>
where
    SPI: SpiDevice,
{
    /// Creates a new driver with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `spi` - SPI device for this chip
    /// * `device_address` - Hardware address set on the A1/A0 pins (0-3). Only the two
    ///   low bits are used.
    ///
    /// # Example
    ///
    /// ```ignore
    /// # use mcp23s08::Mcp23s08;
    /// # let spi = todo!();
    /// let gpio = Mcp23s08::new(spi, 0);
    /// ```
    pub fn new(spi: SPI, device_address: u8) -> Self {
        Self::with_config(spi, device_address, Config::default())
    }

    /// Creates a new driver with an explicit configuration.
    pub fn with_config(spi: SPI, device_address: u8, config: Config) -> Self {
        Self {
            spi,
            opcode: opcode(device_address, Access::Write),
            config,
            locking: RmwLocking::None,
        }
    }

    /// Selects how [`write_pin`](Self::write_pin) and [`set_pin_mode`](Self::set_pin_mode)
    /// protect their read-modify-write sequences.
    pub fn with_locking(mut self, locking: RmwLocking) -> Self {
        self.locking = locking;
        self
    }

    /// Consumes the driver and returns the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Write opcode of this device (R/W bit cleared).
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Configuration the driver was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bus settings to apply to the SPI peripheral.
    pub fn bus_settings(&self) -> BusSettings {
        self.config.bus_settings()
    }

    /// Prepares the chip for use. Call once before any other operation.
    ///
    /// Writes `IOCON.HAEN` when hardware addressing was requested. Without HAEN the
    /// chip ignores the address bits in the opcode.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI write fails.
    pub fn begin(&mut self) -> Result<(), Mcp23s08Error<SPI::Error>> {
        debug!("mcp23s08: begin, opcode={:#x} haen={}", self.opcode, self.config.haen);
        if self.config.haen {
            self.write_register(Register::IOCON, MCP23S08_IOCON_HAEN)?;
        }
        Ok(())
    }

    /// Restores every register to its power-on value.
    ///
    /// All pins become inputs, pull-ups are disabled and the output latch is cleared.
    /// HAEN is written again if it was configured. The chip has no reset command, so
    /// this writes all eleven registers in one transaction, relying on the chip's
    /// address auto-increment.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI write fails.
    pub fn reset(&mut self) -> Result<(), Mcp23s08Error<SPI::Error>> {
        debug!("mcp23s08: reset, haen={}", self.config.haen);
        let image = reset_image(self.config.haen);
        let mut frame = [0u8; REGISTER_COUNT + 2];
        frame[0] = self.opcode;
        frame[1] = Register::IODIR as u8;
        frame[2..].copy_from_slice(&image);

        self.spi.write(&frame).map_err(Mcp23s08Error::WriteError)
    }

    /// Reads the level of a single pin from the `GPIO` register.
    ///
    /// Pins configured as outputs report the level actually present on the pin, not
    /// the latched output value.
    ///
    /// # Arguments
    ///
    /// * `pin` - Pin number (0-7). Larger values return `false` without touching the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI read fails.
    pub fn read_pin(&mut self, pin: u8) -> Result<bool, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => self.read(pin),
            None => {
                trace!("mcp23s08: read of invalid pin {} ignored", pin);
                Ok(false)
            }
        }
    }

    /// Reads the level of a single pin.
    pub fn read(&mut self, pin: Pin) -> Result<bool, Mcp23s08Error<SPI::Error>> {
        Ok(self.get_input_states()? & pin.mask() != 0)
    }

    /// Sets the output latch of a single pin.
    ///
    /// Reads `OLAT`, changes one bit and writes it back. See [`RmwLocking`] for what
    /// can happen if the chip is accessed from elsewhere in between.
    ///
    /// # Arguments
    ///
    /// * `pin` - Pin number (0-7). Larger values are ignored.
    /// * `state` - true = high, false = low
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI read or write fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// # use mcp23s08::{Mcp23s08, PinMode};
    /// # let spi = todo!();
    /// # let mut gpio = Mcp23s08::new(spi, 0);
    /// gpio.set_pin_mode(3, PinMode::Output).unwrap();
    /// gpio.write_pin(3, true).unwrap(); // Set pin 3 high
    /// ```
    pub fn write_pin(
        &mut self,
        pin: u8,
        state: bool,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => self.write(pin, state).map(|()| PinUpdate::Applied),
            None => {
                trace!("mcp23s08: write to invalid pin {} ignored", pin);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Sets the output latch of a single pin.
    pub fn write(&mut self, pin: Pin, state: bool) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.exclusive(|dev| {
            dev.update_register(Register::OLAT, |olat| set_bits(olat, pin.mask(), state))
        })
    }

    /// Configures the mode of a single pin.
    ///
    /// Updates the direction bit and the pull-up bit, each with its own
    /// read-modify-write.
    ///
    /// # Arguments
    ///
    /// * `pin` - Pin number (0-7). Larger values are ignored.
    /// * `mode` - One of:
    ///   - `PinMode::Input` - direction input, pull-up disabled
    ///   - `PinMode::Output` - direction output, pull-up disabled
    ///   - `PinMode::InputPullup` - direction input, pull-up enabled
    ///
    /// # Errors
    ///
    /// Returns an error if any SPI transaction fails.
    pub fn set_pin_mode(
        &mut self,
        pin: u8,
        mode: PinMode,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => self.set_mode(pin, mode).map(|()| PinUpdate::Applied),
            None => {
                trace!("mcp23s08: mode change of invalid pin {} ignored", pin);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Configures the mode of a single pin from a raw mode value
    /// ([`INPUT`], [`OUTPUT`] or [`INPUT_PULLUP`]). Unknown values are ignored.
    pub fn set_pin_mode_raw(
        &mut self,
        pin: u8,
        mode: u8,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match PinMode::try_from(mode) {
            Ok(mode) => self.set_pin_mode(pin, mode),
            Err(_) => {
                warn!("mcp23s08: unknown pin mode {} ignored", mode);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Configures the mode of a single pin.
    pub fn set_mode(&mut self, pin: Pin, mode: PinMode) -> Result<(), Mcp23s08Error<SPI::Error>> {
        let (output, pullup) = mode_bits(mode);
        self.exclusive(|dev| -> Result<(), Mcp23s08Error<SPI::Error>> {
            // IODIR holds 1 = input, so setting the output bit clears it on chip
            dev.update_register(Register::IODIR, |iodir| {
                modes_to_iodir(set_bits(iodir_to_modes(iodir), pin.mask(), output))
            })?;
            dev.update_register(Register::GPPU, |gppu| set_bits(gppu, pin.mask(), pullup))
        })
    }

    /// Writes the output latch of all pins at once (`OLAT`).
    pub fn set_output_states(&mut self, states: u8) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::OLAT, states)
    }

    /// Reads the output latch of all pins (`OLAT`).
    pub fn get_output_states(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::OLAT)
    }

    /// Reads the level of all pins (`GPIO`).
    pub fn get_input_states(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::GPIO)
    }

    /// Sets the mode of all pins at once.
    ///
    /// Each bit selects output (1) or input (0) for the corresponding pin. The value
    /// is inverted before it is written to `IODIR`. Pull-ups are left untouched.
    ///
    /// # Example
    ///
    /// ```ignore
    /// # use mcp23s08::{Mcp23s08, PIN_MODE_OUTPUT_ALL};
    /// # let spi = todo!();
    /// # let mut gpio = Mcp23s08::new(spi, 0);
    /// gpio.set_pin_modes(PIN_MODE_OUTPUT_ALL).unwrap();
    /// ```
    pub fn set_pin_modes(&mut self, modes: u8) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::IODIR, modes_to_iodir(modes))
    }

    /// Reads the mode of all pins, 1 = output.
    pub fn get_pin_modes(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::IODIR).map(iodir_to_modes)
    }

    /// Enables (1) or disables (0) the pull-up of every pin (`GPPU`).
    pub fn enable_pullups(&mut self, enables: u8) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::GPPU, enables)
    }

    /// Reads which pull-ups are enabled (`GPPU`).
    pub fn get_enabled_pullups(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::GPPU)
    }

    /// Writes one register in a single transaction: opcode, address, data.
    ///
    /// # Errors
    ///
    /// Returns `WriteError` if the SPI transaction fails.
    pub fn write_register(
        &mut self,
        reg: Register,
        data: u8,
    ) -> Result<(), Mcp23s08Error<SPI::Error>> {
        trace!("mcp23s08: write {:?} <- {:#x}", reg, data);
        self.spi
            .write(&[self.opcode, reg as u8, data])
            .map_err(Mcp23s08Error::WriteError)
    }

    /// Reads one register in a single transaction.
    ///
    /// Sends the read opcode and the address, then clocks out one dummy byte while
    /// the chip returns the register value.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` if the SPI transaction fails.
    pub fn read_register(&mut self, reg: Register) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        let header = [self.opcode | 0x01, reg as u8];
        let mut data = [0u8];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(&mut data)])
            .map_err(Mcp23s08Error::ReadError)?;
        trace!("mcp23s08: read {:?} -> {:#x}", reg, data[0]);
        Ok(data[0])
    }

    fn update_register(
        &mut self,
        reg: Register,
        f: impl FnOnce(u8) -> u8,
    ) -> Result<(), Mcp23s08Error<SPI::Error>> {
        let value = self.read_register(reg)?;
        self.write_register(reg, f(value))
    }

    fn exclusive<T>(&mut self, op: impl FnOnce(&mut Self) -> T) -> T {
        match self.locking {
            RmwLocking::None => op(self),
            #[cfg(feature = "critical-section")]
            RmwLocking::CriticalSection => critical_section::with(|_| op(self)),
        }
    }
}

/// Direction (1 = output) and pull-up bits for a mode.
pub(crate) const fn mode_bits(mode: PinMode) -> (bool, bool) {
    match mode {
        PinMode::Input => (false, false),
        PinMode::Output => (true, false),
        PinMode::InputPullup => (false, true),
    }
}

pub(crate) const fn set_bits(value: u8, mask: u8, state: bool) -> u8 {
    if state {
        value | mask
    } else {
        value & !mask
    }
}
