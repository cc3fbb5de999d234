//! Shared mocks for the unit tests: an in-memory NOR flash and no-op
//! collaborator implementations that record what the menu asked of them.

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::drivers::{Accelerometer, CapturePeripheral, PowerControl};

const MOCK_SECTOR_SIZE: usize = 4096;

/// Ways the mock flash can misbehave, for exercising the self-test paths.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    None,
    /// Erase succeeds but leaves the old contents in place.
    StuckErase,
    /// Writes flip the low bit of every byte.
    CorruptWrite,
}

/// One-sector in-memory NOR flash. Erase sets 0xFF; writes can only clear
/// bits, as on the real medium.
pub struct MockFlash {
    memory: [u8; MOCK_SECTOR_SIZE],
    fault: FaultMode,
}

impl MockFlash {
    pub fn new() -> Self {
        Self::with_fault(FaultMode::None)
    }

    pub fn with_fault(fault: FaultMode) -> Self {
        Self {
            memory: [0xFF; MOCK_SECTOR_SIZE],
            fault,
        }
    }

    /// Raw view of the stored bytes, for layout assertions.
    pub fn raw(
        &self,
        offset: u32,
        len: usize,
    ) -> &[u8] {
        &self.memory[offset as usize..offset as usize + len]
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(
        &mut self,
        offset: u32,
        bytes: &mut [u8],
    ) -> Result<(), Self::Error> {
        let start = offset as usize;
        if start + bytes.len() > self.memory.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.memory[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = MOCK_SECTOR_SIZE;

    fn erase(
        &mut self,
        from: u32,
        to: u32,
    ) -> Result<(), Self::Error> {
        if from != 0 || to as usize != MOCK_SECTOR_SIZE {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if self.fault != FaultMode::StuckErase {
            self.memory.fill(0xFF);
        }
        Ok(())
    }

    fn write(
        &mut self,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), Self::Error> {
        let start = offset as usize;
        if start + bytes.len() > self.memory.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        for (cell, &byte) in self.memory[start..].iter_mut().zip(bytes) {
            let byte = match self.fault {
                FaultMode::CorruptWrite => byte ^ 0x01,
                _ => byte,
            };
            // NOR semantics: writes can only clear bits
            *cell &= byte;
        }
        Ok(())
    }
}

/// Records start/stop calls from the menu.
#[derive(Default)]
pub struct MockCapture {
    pub starts: usize,
    pub stops: usize,
}

impl CapturePeripheral for MockCapture {
    fn start(&mut self) {
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.stops += 1;
    }
}

/// Accelerometer returning a fixed identity and counting acquisitions.
pub struct MockAccel {
    pub id: u8,
    pub inits: usize,
    pub xyz_reads: usize,
}

impl MockAccel {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            inits: 0,
            xyz_reads: 0,
        }
    }
}

impl Accelerometer for MockAccel {
    fn init(&mut self) {
        self.inits += 1;
    }

    fn read_id(&mut self) -> u8 {
        self.id
    }

    fn read_xyz(&mut self) -> (i16, i16, i16) {
        self.xyz_reads += 1;
        (0, 0, 0)
    }
}

/// Remembers the last state of each rail.
pub struct MockPower {
    pub backlight_on: bool,
    pub regulator_on: bool,
    pub led_toggles: usize,
}

impl MockPower {
    pub fn new() -> Self {
        Self {
            backlight_on: true,
            regulator_on: true,
            led_toggles: 0,
        }
    }
}

impl PowerControl for MockPower {
    fn backlight(
        &mut self,
        on: bool,
    ) {
        self.backlight_on = on;
    }

    fn regulator(
        &mut self,
        on: bool,
    ) {
        self.regulator_on = on;
    }

    fn status_led_toggle(&mut self) {
        self.led_toggles += 1;
    }
}
