//! RPM derivation from edge-capture timestamps.
//!
//! A hardware capture source timestamps one edge per blade pass with a
//! free-running counter and appends the values to a small circular buffer
//! from interrupt context. The menu poll derives the rotation period from the
//! two most recently completed captures and watches for loss of signal.
//!
//! The buffer publishes a sample by storing the slot first and advancing the
//! index afterwards (release ordering), so a poll that races the writer sees
//! at worst a one-poll-stale interval - never torn state. Timer wraparound is
//! handled by wrapping unsigned subtraction.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::config::{CAPTURE_BUFFER_SIZE, RPM_DROPOUT_POLLS};

/// Circular timestamp buffer shared between the capture interrupt (single
/// writer) and the menu poll (single reader).
pub struct CaptureBuffer {
    slots: [AtomicU32; CAPTURE_BUFFER_SIZE],
    write_index: AtomicUsize,
    active: AtomicBool,
}

impl CaptureBuffer {
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicU32::new(0) }; CAPTURE_BUFFER_SIZE],
            write_index: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Arm the buffer: clear every slot, rewind the index and accept captures.
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
        self.write_index.store(0, Ordering::Release);
        self.active.store(true, Ordering::Release);
    }

    /// Stop accepting captures. Called before the screen transition commits
    /// so no further writes are attributed to the next screen's data.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Append one capture timestamp and advance the index. Runs in interrupt
    /// context; never blocks, ignored while the buffer is inactive.
    pub fn record(
        &self,
        timestamp: u32,
    ) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let i = self.write_index.load(Ordering::Relaxed);
        self.slots[i].store(timestamp, Ordering::Relaxed);
        self.write_index
            .store((i + 1) % CAPTURE_BUFFER_SIZE, Ordering::Release);
    }

    /// Write index plus the interval between the two most recently completed
    /// captures, both relative to one index read.
    fn snapshot(&self) -> (usize, u32) {
        let i = self.write_index.load(Ordering::Acquire);
        let j = (i + CAPTURE_BUFFER_SIZE - 1) % CAPTURE_BUFFER_SIZE;
        let k = (j + CAPTURE_BUFFER_SIZE - 1) % CAPTURE_BUFFER_SIZE;
        let newer = self.slots[j].load(Ordering::Relaxed);
        let older = self.slots[k].load(Ordering::Relaxed);
        (i, newer.wrapping_sub(older))
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self { Self::new() }
}

/// Derives the displayed RPM value from the capture buffer, including
/// dropout-to-zero detection.
pub struct RpmMonitor {
    timer_hz: u32,
    last_rpm: u32,
    last_index_seen: usize,
    stale_polls: u16,
}

impl RpmMonitor {
    /// `timer_hz` is the clock of the counter the capture source timestamps
    /// with; it never changes at runtime.
    pub const fn new(timer_hz: u32) -> Self {
        Self {
            timer_hz,
            last_rpm: 0,
            last_index_seen: 0,
            stale_polls: 0,
        }
    }

    /// Rewind change and dropout tracking. Call when a measurement starts.
    pub fn restart(&mut self) {
        self.last_rpm = 0;
        self.last_index_seen = 0;
        self.stale_polls = 0;
    }

    /// Currently displayed value.
    pub const fn rpm(&self) -> u32 {
        self.last_rpm
    }

    /// One poll step while measurement is active.
    ///
    /// Returns `Some(rpm)` only when the value changed since the previous
    /// poll, so the caller refreshes the display exactly when needed. A zero
    /// interval or a zero blade count keeps the previous value; an index that
    /// has not advanced for more than [`RPM_DROPOUT_POLLS`] polls forces the
    /// value to zero (signal lost).
    pub fn poll(
        &mut self,
        samples: &CaptureBuffer,
        blades: u8,
    ) -> Option<u32> {
        let (index, delta) = samples.snapshot();

        let mut rpm = self.last_rpm;
        if delta != 0 && blades != 0 {
            rpm = (60u64 * u64::from(self.timer_hz) / (u64::from(delta) * u64::from(blades))) as u32;
        }

        if index == self.last_index_seen {
            self.stale_polls = self.stale_polls.saturating_add(1);
            if self.stale_polls > RPM_DROPOUT_POLLS {
                rpm = 0;
            }
        } else {
            self.stale_polls = 0;
            self.last_index_seen = index;
        }

        if rpm != self.last_rpm {
            self.last_rpm = rpm;
            Some(rpm)
        } else {
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
