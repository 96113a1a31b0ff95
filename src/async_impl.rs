//! Async implementation of the MCP23S08 driver.
//!
//! This module provides an async version of the driver that uses
//! `embedded-hal-async` traits. Enable the `async` feature to use this module.
//!
//! The wire format is identical to the blocking [`Mcp23s08`](crate::Mcp23s08).
//! Read-modify-write sequences are never locked here: a critical section cannot be
//! held across an `.await`.
//!
//! # Example
//!
//! ```ignore
//! use mcp23s08::{Mcp23s08Async, PinMode};
//! # let spi = todo!(); // async SPI device
//!
//! async fn configure_gpio() {
//!     let mut gpio = Mcp23s08Async::new(spi, 0);
//!     gpio.begin().await.unwrap();
//!     gpio.set_pin_mode(0, PinMode::Output).await.unwrap();
//!     gpio.write_pin(0, true).await.unwrap();
//! }
//! ```

use embedded_hal::spi::Operation;
use embedded_hal_async::spi::SpiDevice;

use crate::{
    iodir_to_modes, mode_bits, modes_to_iodir, opcode, reset_image, set_bits, Access, BusSettings,
    Config, Mcp23s08Error, Pin, PinMode, PinUpdate, Register, MCP23S08_IOCON_HAEN,
    REGISTER_COUNT,
};

/// Async MCP23S08 driver instance
///
/// All methods in this struct are async and must be `.await`ed.
///
/// # Type Parameters
///
/// * `SPI` - An async SPI device from `embedded-hal-async`
#[derive(Debug)]
pub struct Mcp23s08Async<SPI> {
    spi: SPI,
    opcode: u8,
    config: Config,
}

impl<SPI> Mcp23s08Async<SPI>
where
    SPI: SpiDevice,
{
    /// Creates a new async driver with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `spi` - Async SPI device for this chip
    /// * `device_address` - Hardware address set on the A1/A0 pins (0-3)
    pub fn new(spi: SPI, device_address: u8) -> Self {
        Self::with_config(spi, device_address, Config::default())
    }

    /// Creates a new async driver with an explicit configuration.
    pub fn with_config(spi: SPI, device_address: u8, config: Config) -> Self {
        Self {
            spi,
            opcode: opcode(device_address, Access::Write),
            config,
        }
    }

    /// Consumes the driver and returns the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Write opcode of this device (R/W bit cleared).
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Bus settings to apply to the SPI peripheral.
    pub fn bus_settings(&self) -> BusSettings {
        self.config.bus_settings()
    }

    /// Prepares the chip for use, writing `IOCON.HAEN` if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI write fails.
    pub async fn begin(&mut self) -> Result<(), Mcp23s08Error<SPI::Error>> {
        debug!("mcp23s08: begin, opcode={:#x} haen={}", self.opcode, self.config.haen);
        if self.config.haen {
            self.write_register(Register::IOCON, MCP23S08_IOCON_HAEN).await?;
        }
        Ok(())
    }

    /// Restores every register to its power-on value in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI write fails.
    pub async fn reset(&mut self) -> Result<(), Mcp23s08Error<SPI::Error>> {
        debug!("mcp23s08: reset, haen={}", self.config.haen);
        let mut frame = [0u8; REGISTER_COUNT + 2];
        frame[0] = self.opcode;
        frame[1] = Register::IODIR as u8;
        frame[2..].copy_from_slice(&reset_image(self.config.haen));

        self.spi
            .write(&frame)
            .await
            .map_err(Mcp23s08Error::WriteError)
    }

    /// Reads the level of a single pin asynchronously. Pins above 7 read as `false`.
    pub async fn read_pin(&mut self, pin: u8) -> Result<bool, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => self.read(pin).await,
            None => {
                trace!("mcp23s08: read of invalid pin {} ignored", pin);
                Ok(false)
            }
        }
    }

    /// Reads the level of a single pin asynchronously.
    pub async fn read(&mut self, pin: Pin) -> Result<bool, Mcp23s08Error<SPI::Error>> {
        Ok(self.get_input_states().await? & pin.mask() != 0)
    }

    /// Sets the output latch of a single pin asynchronously.
    ///
    /// # Arguments
    ///
    /// * `pin` - Pin number (0-7). Larger values are ignored.
    /// * `state` - true = high, false = low
    ///
    /// # Example
    ///
    /// ```ignore
    /// # use mcp23s08::Mcp23s08Async;
    /// # let spi = todo!();
    /// async fn example() {
    ///     let mut gpio = Mcp23s08Async::new(spi, 0);
    ///     gpio.write_pin(5, true).await.unwrap(); // Set pin 5 high
    /// }
    /// ```
    pub async fn write_pin(
        &mut self,
        pin: u8,
        state: bool,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => {
                self.write(pin, state).await?;
                Ok(PinUpdate::Applied)
            }
            None => {
                trace!("mcp23s08: write to invalid pin {} ignored", pin);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Sets the output latch of a single pin asynchronously.
    pub async fn write(&mut self, pin: Pin, state: bool) -> Result<(), Mcp23s08Error<SPI::Error>> {
        let olat = self.read_register(Register::OLAT).await?;
        self.write_register(Register::OLAT, set_bits(olat, pin.mask(), state)).await
    }

    /// Configures the mode of a single pin asynchronously. Pins above 7 are ignored.
    pub async fn set_pin_mode(
        &mut self,
        pin: u8,
        mode: PinMode,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match Pin::new(pin) {
            Some(pin) => {
                self.set_mode(pin, mode).await?;
                Ok(PinUpdate::Applied)
            }
            None => {
                trace!("mcp23s08: mode change of invalid pin {} ignored", pin);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Configures the mode of a single pin from a raw mode value. Unknown values are
    /// ignored.
    pub async fn set_pin_mode_raw(
        &mut self,
        pin: u8,
        mode: u8,
    ) -> Result<PinUpdate, Mcp23s08Error<SPI::Error>> {
        match PinMode::try_from(mode) {
            Ok(mode) => self.set_pin_mode(pin, mode).await,
            Err(_) => {
                warn!("mcp23s08: unknown pin mode {} ignored", mode);
                Ok(PinUpdate::Ignored)
            }
        }
    }

    /// Configures the mode of a single pin asynchronously.
    pub async fn set_mode(
        &mut self,
        pin: Pin,
        mode: PinMode,
    ) -> Result<(), Mcp23s08Error<SPI::Error>> {
        let (output, pullup) = mode_bits(mode);

        let modes = iodir_to_modes(self.read_register(Register::IODIR).await?);
        self.write_register(
            Register::IODIR,
            modes_to_iodir(set_bits(modes, pin.mask(), output)),
        )
        .await?;

        let gppu = self.read_register(Register::GPPU).await?;
        self.write_register(Register::GPPU, set_bits(gppu, pin.mask(), pullup)).await
    }

    /// Writes the output latch of all pins at once.
    pub async fn set_output_states(
        &mut self,
        states: u8,
    ) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::OLAT, states).await
    }

    /// Reads the output latch of all pins.
    pub async fn get_output_states(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::OLAT).await
    }

    /// Reads the level of all pins.
    pub async fn get_input_states(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::GPIO).await
    }

    /// Sets the mode of all pins at once, 1 = output.
    pub async fn set_pin_modes(&mut self, modes: u8) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::IODIR, modes_to_iodir(modes)).await
    }

    /// Reads the mode of all pins, 1 = output.
    pub async fn get_pin_modes(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        Ok(iodir_to_modes(self.read_register(Register::IODIR).await?))
    }

    /// Enables (1) or disables (0) the pull-up of every pin.
    pub async fn enable_pullups(&mut self, enables: u8) -> Result<(), Mcp23s08Error<SPI::Error>> {
        self.write_register(Register::GPPU, enables).await
    }

    /// Reads which pull-ups are enabled.
    pub async fn get_enabled_pullups(&mut self) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        self.read_register(Register::GPPU).await
    }

    /// Writes one register asynchronously.
    pub async fn write_register(
        &mut self,
        reg: Register,
        data: u8,
    ) -> Result<(), Mcp23s08Error<SPI::Error>> {
        trace!("mcp23s08: write {:?} <- {:#x}", reg, data);
        self.spi
            .write(&[self.opcode, reg as u8, data])
            .await
            .map_err(Mcp23s08Error::WriteError)
    }

    /// Reads one register asynchronously.
    pub async fn read_register(&mut self, reg: Register) -> Result<u8, Mcp23s08Error<SPI::Error>> {
        let header = [self.opcode | 0x01, reg as u8];
        let mut data = [0u8];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(&mut data)])
            .await
            .map_err(Mcp23s08Error::ReadError)?;
        trace!("mcp23s08: read {:?} -> {:#x}", reg, data[0]);
        Ok(data[0])
    }
}
