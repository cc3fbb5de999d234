//! Measurement profile records and their non-volatile store.
//!
//! Four fixed slots of four bytes each live at the start of one flash sector.
//! The medium is erase-before-write, so saving any slot reloads the table,
//! patches the target record in memory and rewrites the whole table behind a
//! sector erase. The store is generic over the `embedded-storage` NOR-flash
//! traits; tests run it against an in-memory mock.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::config::{DEFAULT_BLADES, DEFAULT_CYLINDERS, NB_PROFILES};

/// Marker byte of a slot the user has saved.
pub const VALID_FLAG: u8 = 0xA5;

/// Bytes per persisted record.
const RECORD_SIZE: usize = 4;

/// Bytes of the whole persisted table.
pub const TABLE_SIZE: usize = NB_PROFILES * RECORD_SIZE;

/// Slot exercised by the round-trip self-test.
const SELF_TEST_SLOT: usize = 1;

/// One measurement profile as persisted: `[blades, cylinders, valid, pad]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Profile {
    pub blades: u8,
    pub cylinders: u8,
    pub valid: u8,
    reserved: u8,
}

impl Profile {
    /// Factory defaults: 2 blades, 4 cylinders, not user-saved.
    pub const fn factory_default() -> Self {
        Self {
            blades: DEFAULT_BLADES,
            cylinders: DEFAULT_CYLINDERS,
            valid: 0,
            reserved: 0,
        }
    }

    const fn saved(
        blades: u8,
        cylinders: u8,
    ) -> Self {
        Self {
            blades,
            cylinders,
            valid: VALID_FLAG,
            reserved: 0,
        }
    }

    /// True when the slot holds user-saved values.
    #[inline]
    pub const fn is_valid(&self) -> bool { self.valid == VALID_FLAG }

    const fn to_bytes(self) -> [u8; RECORD_SIZE] {
        [self.blades, self.cylinders, self.valid, self.reserved]
    }

    const fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self {
            blades: bytes[0],
            cylinders: bytes[1],
            valid: bytes[2],
            reserved: bytes[3],
        }
    }
}

/// Result of the persistence round-trip self-test.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SelfTest {
    /// The erased sector did not read back as the 0xFF pattern.
    EraseFailed,
    /// The written record did not read back intact.
    WriteMismatch,
    Ok,
}

/// In-memory mirror of the profile table, backed by one NOR-flash sector.
pub struct ProfileStore<F> {
    flash: F,
    base: u32,
    profiles: [Profile; NB_PROFILES],
}

impl<F: NorFlash + ReadNorFlash> ProfileStore<F> {
    /// `base` must be aligned to the flash's erase sector; the table occupies
    /// the first [`TABLE_SIZE`] bytes of that sector.
    pub fn new(
        flash: F,
        base: u32,
    ) -> Self {
        Self {
            flash,
            base,
            profiles: [Profile::factory_default(); NB_PROFILES],
        }
    }

    /// Read the persisted table into memory. Safe to call repeatedly.
    pub fn load_all(&mut self) -> Result<(), F::Error> {
        let mut raw = [0u8; TABLE_SIZE];
        self.flash.read(self.base, &mut raw)?;
        self.profiles = decode(&raw);
        Ok(())
    }

    /// The in-memory record, or `None` for an out-of-range slot.
    pub fn get(
        &self,
        index: usize,
    ) -> Option<&Profile> {
        self.profiles.get(index)
    }

    /// Persist blade/cylinder counts into one slot, marking it valid.
    ///
    /// An out-of-range index is a silent no-op. The table is reloaded from
    /// flash first so the full-sector rewrite cannot clobber slots written
    /// since this mirror was last refreshed.
    pub fn save_one(
        &mut self,
        index: usize,
        blades: u8,
        cylinders: u8,
    ) -> Result<(), F::Error> {
        if index >= NB_PROFILES {
            return Ok(());
        }
        self.load_all()?;
        self.profiles[index] = Profile::saved(blades, cylinders);
        self.persist()
    }

    /// Reset every slot to factory defaults and persist the result. Only on
    /// explicit user or test action, never at boot.
    pub fn reset_all(&mut self) -> Result<(), F::Error> {
        self.profiles = [Profile::factory_default(); NB_PROFILES];
        self.persist()
    }

    /// Erase/write round trip against slot 1: erase the sector, verify the
    /// erased pattern, write a known record, read it back. Destroys the
    /// stored table; debug builds only.
    pub fn self_test(&mut self) -> Result<SelfTest, F::Error> {
        self.flash
            .erase(self.base, self.base + F::ERASE_SIZE as u32)?;

        let mut erased = [0u8; TABLE_SIZE];
        self.flash.read(self.base, &mut erased)?;
        if erased[SELF_TEST_SLOT * RECORD_SIZE..][..RECORD_SIZE]
            .iter()
            .any(|&b| b != 0xFF)
        {
            return Ok(SelfTest::EraseFailed);
        }

        self.profiles[SELF_TEST_SLOT] = Profile::saved(3, 6);
        self.flash.write(self.base, &encode(&self.profiles))?;

        let mut raw = [0u8; TABLE_SIZE];
        self.flash.read(self.base, &mut raw)?;
        if decode(&raw)[SELF_TEST_SLOT] == self.profiles[SELF_TEST_SLOT] {
            Ok(SelfTest::Ok)
        } else {
            Ok(SelfTest::WriteMismatch)
        }
    }

    fn persist(&mut self) -> Result<(), F::Error> {
        self.flash
            .erase(self.base, self.base + F::ERASE_SIZE as u32)?;
        self.flash.write(self.base, &encode(&self.profiles))
    }
}

fn encode(profiles: &[Profile; NB_PROFILES]) -> [u8; TABLE_SIZE] {
    let mut raw = [0u8; TABLE_SIZE];
    for (slot, profile) in profiles.iter().enumerate() {
        raw[slot * RECORD_SIZE..][..RECORD_SIZE].copy_from_slice(&profile.to_bytes());
    }
    raw
}

fn decode(raw: &[u8; TABLE_SIZE]) -> [Profile; NB_PROFILES] {
    let mut profiles = [Profile::factory_default(); NB_PROFILES];
    for (slot, profile) in profiles.iter_mut().enumerate() {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes.copy_from_slice(&raw[slot * RECORD_SIZE..][..RECORD_SIZE]);
        *profile = Profile::from_bytes(bytes);
    }
    profiles
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FaultMode, MockFlash};

    const BASE: u32 = 0;

    #[test]
    fn test_save_load_round_trip() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(1, 3, 6).unwrap();

        // A fresh store over the same flash sees the persisted record
        let flash = store.flash;
        let mut reloaded = ProfileStore::new(flash, BASE);
        reloaded.load_all().unwrap();

        let p = reloaded.get(1).unwrap();
        assert!(p.is_valid());
        assert_eq!(p.blades, 3);
        assert_eq!(p.cylinders, 6);
    }

    #[test]
    fn test_save_preserves_other_slots() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(0, 1, 7).unwrap();
        store.save_one(3, 4, 5).unwrap();

        store.load_all().unwrap();
        assert_eq!(store.get(0).unwrap().blades, 1);
        assert_eq!(store.get(0).unwrap().cylinders, 7);
        assert_eq!(store.get(3).unwrap().blades, 4);
        assert!(!store.get(1).unwrap().is_valid());
    }

    #[test]
    fn test_out_of_range_save_is_noop() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(NB_PROFILES, 3, 6).unwrap();

        store.load_all().unwrap();
        for slot in 0..NB_PROFILES {
            assert!(!store.get(slot).unwrap().is_valid());
        }
    }

    #[test]
    fn test_out_of_range_get_is_none() {
        let store = ProfileStore::new(MockFlash::new(), BASE);
        assert!(store.get(NB_PROFILES).is_none());
        assert!(store.get(usize::MAX).is_none());
    }

    #[test]
    fn test_factory_reset() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(2, 3, 6).unwrap();
        store.reset_all().unwrap();

        store.load_all().unwrap();
        for slot in 0..NB_PROFILES {
            let p = store.get(slot).unwrap();
            assert!(!p.is_valid());
            assert_eq!(p.blades, DEFAULT_BLADES);
            assert_eq!(p.cylinders, DEFAULT_CYLINDERS);
        }
    }

    #[test]
    fn test_load_all_idempotent() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(0, 2, 5).unwrap();

        store.load_all().unwrap();
        let first = *store.get(0).unwrap();
        store.load_all().unwrap();
        assert_eq!(*store.get(0).unwrap(), first);
    }

    #[test]
    fn test_self_test_ok() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        assert_eq!(store.self_test().unwrap(), SelfTest::Ok);
    }

    #[test]
    fn test_self_test_detects_failed_erase() {
        let mut store = ProfileStore::new(MockFlash::with_fault(FaultMode::StuckErase), BASE);
        assert_eq!(store.self_test().unwrap(), SelfTest::EraseFailed);
    }

    #[test]
    fn test_self_test_detects_corrupted_write() {
        let mut store = ProfileStore::new(MockFlash::with_fault(FaultMode::CorruptWrite), BASE);
        assert_eq!(store.self_test().unwrap(), SelfTest::WriteMismatch);
    }

    #[test]
    fn test_table_layout_is_four_bytes_per_slot() {
        let mut store = ProfileStore::new(MockFlash::new(), BASE);
        store.save_one(1, 3, 6).unwrap();

        // Slot 1 occupies bytes 4..8: blades, cylinders, valid marker, pad
        let raw = store.flash.raw(BASE, TABLE_SIZE);
        assert_eq!(&raw[4..8], &[3, 6, VALID_FLAG, 0][..]);
    }
}
