//! Register-level model of an MCP23S08 for driver tests.
//!
//! Models the eleven-register file, sequential addressing with rollover,
//! HAEN-gated opcode decoding, read-only interrupt registers, writes to `GPIO`
//! landing in `OLAT`, and pins driven from outside the chip. Bus faults can be
//! injected per transaction.

extern crate std;
use std::boxed::Box;
use std::sync::{Arc, Mutex};

use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};

use crate::{Register, MCP23S08_IOCON_HAEN, MCP23S08_OPCODE, REGISTER_COUNT};

/// IOCON.SEQOP, 1 = sequential addressing disabled.
const IOCON_SEQOP: u8 = 0x20;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Opcode,
    Address,
    Data,
}

/// State of the simulated chip.
#[derive(Debug)]
pub struct ChipState {
    pub registers: [u8; REGISTER_COUNT],
    /// Level of the A1/A0 pins.
    pub hardware_address: u8,
    /// Levels applied from outside to pins configured as inputs.
    pub inputs: u8,
    /// Pins pulled low from outside, whatever their direction.
    pub forced_low: u8,
    /// Completed transactions addressed to this chip.
    pub transactions: usize,
    /// Transactions started on the bus, failed ones included.
    pub attempts: usize,
    /// Zero-based attempt that fails with [`ErrorKind::Other`] without
    /// reaching the chip.
    pub fail_at: Option<usize>,
    phase: Phase,
    selected: bool,
    reading: bool,
    pointer: usize,
}

impl ChipState {
    fn power_on(hardware_address: u8) -> Self {
        let mut registers = [0u8; REGISTER_COUNT];
        registers[Register::IODIR as usize] = 0xFF;
        Self {
            registers,
            hardware_address,
            inputs: 0,
            forced_low: 0,
            transactions: 0,
            attempts: 0,
            fail_at: None,
            phase: Phase::Opcode,
            selected: false,
            reading: false,
            pointer: 0,
        }
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.registers[reg as usize]
    }

    pub fn set_reg(&mut self, reg: Register, value: u8) {
        self.registers[reg as usize] = value;
    }

    fn haen(&self) -> bool {
        self.reg(Register::IOCON) & MCP23S08_IOCON_HAEN != 0
    }

    fn sequential(&self) -> bool {
        self.reg(Register::IOCON) & IOCON_SEQOP == 0
    }

    fn pin_levels(&self) -> u8 {
        let iodir = self.reg(Register::IODIR);
        ((self.inputs & iodir) | (self.reg(Register::OLAT) & !iodir)) & !self.forced_low
    }

    fn decodes(&self, opcode: u8) -> bool {
        if opcode & 0xF8 != MCP23S08_OPCODE {
            return false;
        }
        !self.haen() || (opcode >> 1) & 0x03 == self.hardware_address
    }

    fn load(&self, address: usize) -> u8 {
        if address == Register::GPIO as usize {
            self.pin_levels()
        } else {
            self.registers.get(address).copied().unwrap_or(0)
        }
    }

    fn store(&mut self, address: usize, value: u8) {
        match address {
            a if a == Register::INTF as usize || a == Register::INTCAP as usize => {}
            a if a == Register::GPIO as usize => self.set_reg(Register::OLAT, value),
            a if a < REGISTER_COUNT => self.registers[a] = value,
            _ => {}
        }
    }

    /// Shifts one byte in on MOSI and returns the byte driven on MISO.
    fn clock(&mut self, mosi: u8) -> u8 {
        match self.phase {
            Phase::Opcode => {
                self.selected = self.decodes(mosi);
                self.reading = mosi & 0x01 != 0;
                self.phase = Phase::Address;
                0
            }
            Phase::Address => {
                self.pointer = mosi as usize;
                self.phase = Phase::Data;
                0
            }
            Phase::Data => {
                if !self.selected {
                    return 0;
                }
                let miso = if self.reading {
                    self.load(self.pointer)
                } else {
                    self.store(self.pointer, mosi);
                    0
                };
                if self.sequential() {
                    self.pointer = (self.pointer + 1) % REGISTER_COUNT;
                }
                miso
            }
        }
    }

    fn run(&mut self, operations: &mut [Operation<'_, u8>]) {
        self.phase = Phase::Opcode;
        self.selected = false;
        for op in operations {
            match op {
                Operation::Write(words) => {
                    for &w in words.iter() {
                        self.clock(w);
                    }
                }
                Operation::Read(words) => {
                    for w in words.iter_mut() {
                        *w = self.clock(0x00);
                    }
                }
                Operation::Transfer(read, write) => {
                    for i in 0..read.len().max(write.len()) {
                        let miso = self.clock(write.get(i).copied().unwrap_or(0x00));
                        if let Some(r) = read.get_mut(i) {
                            *r = miso;
                        }
                    }
                }
                Operation::TransferInPlace(words) => {
                    for w in words.iter_mut() {
                        *w = self.clock(*w);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        if self.selected {
            self.transactions += 1;
        }
    }
}

type Hook = Box<dyn FnMut(&mut ChipState) + Send>;

/// Shareable handle to a simulated chip, usable as an [`SpiDevice`].
///
/// Clones talk to the same chip. A hook can be installed to act as another bus
/// master touching the chip between two of the driver's transactions.
#[derive(Clone)]
pub struct SimulatedChip {
    state: Arc<Mutex<ChipState>>,
    hook: Arc<Mutex<Option<Hook>>>,
}

impl SimulatedChip {
    pub fn new(hardware_address: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState::power_on(hardware_address))),
            hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs `f` on the chip state.
    pub fn with<T>(&self, f: impl FnOnce(&mut ChipState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut *state)
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.with(|chip| chip.reg(reg))
    }

    pub fn registers(&self) -> [u8; REGISTER_COUNT] {
        self.with(|chip| chip.registers)
    }

    pub fn transactions(&self) -> usize {
        self.with(|chip| chip.transactions)
    }

    pub fn attempts(&self) -> usize {
        self.with(|chip| chip.attempts)
    }

    /// Makes the `n`-th transaction from now fail, counting from zero.
    pub fn fail_transaction(&self, n: usize) {
        self.with(|chip| chip.fail_at = Some(chip.attempts + n));
    }

    /// Installs a hook called after every transaction.
    pub fn after_transaction(&self, hook: impl FnMut(&mut ChipState) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn transfer(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.attempts;
        state.attempts += 1;
        if state.fail_at == Some(attempt) {
            return Err(ErrorKind::Other);
        }
        state.run(operations);
        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook(&mut *state);
        }
        Ok(())
    }
}

impl ErrorType for SimulatedChip {
    type Error = ErrorKind;
}

impl SpiDevice for SimulatedChip {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.transfer(operations)
    }
}

#[cfg(feature = "async")]
impl embedded_hal_async::spi::SpiDevice for SimulatedChip {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        self.transfer(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_write_rolls_over_after_olat() {
        let mut chip = SimulatedChip::new(0);
        let data = [0x40, 0x0A, 0x11, 0x22];
        chip.transaction(&mut [Operation::Write(&data)]).unwrap();

        assert_eq!(chip.reg(Register::OLAT), 0x11);
        assert_eq!(chip.reg(Register::IODIR), 0x22);
    }

    #[test]
    fn byte_mode_keeps_the_address_pointer() {
        let mut chip = SimulatedChip::new(0);
        chip.with(|c| c.set_reg(Register::IOCON, IOCON_SEQOP));
        let data = [0x40, 0x06, 0x01, 0x02];
        chip.transaction(&mut [Operation::Write(&data)]).unwrap();

        assert_eq!(chip.reg(Register::GPPU), 0x02);
        assert_eq!(chip.reg(Register::INTF), 0x00);
    }

    #[test]
    fn haen_gates_the_address_bits() {
        let mut chip = SimulatedChip::new(2);
        chip.transaction(&mut [Operation::Write(&[0x40, 0x0A, 0x01])])
            .unwrap();
        assert_eq!(chip.reg(Register::OLAT), 0x01);

        chip.with(|c| c.set_reg(Register::IOCON, MCP23S08_IOCON_HAEN));
        chip.transaction(&mut [Operation::Write(&[0x40, 0x0A, 0x02])])
            .unwrap();
        assert_eq!(chip.reg(Register::OLAT), 0x01);

        chip.transaction(&mut [Operation::Write(&[0x44, 0x0A, 0x03])])
            .unwrap();
        assert_eq!(chip.reg(Register::OLAT), 0x03);
    }

    #[test]
    fn gpio_reflects_pin_levels_not_latch() {
        let mut chip = SimulatedChip::new(0);
        chip.with(|c| {
            c.set_reg(Register::IODIR, 0x0F);
            c.set_reg(Register::OLAT, 0xF0);
            c.inputs = 0x05;
            c.forced_low = 0x10;
        });

        let mut value = [0u8];
        chip.transaction(&mut [
            Operation::Write(&[0x41, 0x09]),
            Operation::Read(&mut value),
        ])
        .unwrap();

        assert_eq!(value[0], 0xE5);
    }

    #[test]
    fn injected_fault_skips_the_chip() {
        let mut chip = SimulatedChip::new(0);
        chip.fail_transaction(1);

        chip.transaction(&mut [Operation::Write(&[0x40, 0x0A, 0x01])])
            .unwrap();
        let err = chip.transaction(&mut [Operation::Write(&[0x40, 0x0A, 0x02])]);
        assert_eq!(err, Err(ErrorKind::Other));
        chip.transaction(&mut [Operation::Write(&[0x40, 0x06, 0x03])])
            .unwrap();

        assert_eq!(chip.reg(Register::OLAT), 0x01);
        assert_eq!(chip.reg(Register::GPPU), 0x03);
        assert_eq!(chip.attempts(), 3);
        assert_eq!(chip.transactions(), 2);
    }
}
