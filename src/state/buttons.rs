//! Button debounce handling for the two front-panel switches.
//!
//! Each switch runs an independent two-phase state machine advanced once per
//! 1 ms tick: a change in the raw level arms the stabilizer, and the new level
//! must then repeat for [`DEBOUNCE_CONFIRM_SAMPLES`] consecutive samples
//! before it is committed as the stable value. Committing a stable
//! high-to-low transition (the switches are active-low) latches a pressed
//! edge that stays pending until [`ButtonPad::scan`] consumes it.

use crate::config::DEBOUNCE_CONFIRM_SAMPLES;

/// Debounce phase for one switch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    /// Waiting for the raw level to differ from the last-seen sample.
    AwaitingChange,
    /// Counting consecutive identical samples of the candidate level.
    AwaitingStable,
}

/// Debounce state for one switch.
///
/// Raw levels are active-low: `true` means the contact is open (released).
#[derive(Debug)]
struct SwitchState {
    phase: Phase,
    counter: u8,
    last_raw: bool,
    stable: bool,
    pressed: bool,
}

impl SwitchState {
    /// Released, stable, nothing pending.
    const fn new() -> Self {
        Self {
            phase: Phase::AwaitingChange,
            counter: 0,
            last_raw: true,
            stable: true,
            pressed: false,
        }
    }

    fn sample(&mut self, raw: bool) {
        match self.phase {
            Phase::AwaitingChange => {
                if raw != self.last_raw {
                    self.last_raw = raw;
                    self.phase = Phase::AwaitingStable;
                }
            }
            Phase::AwaitingStable => {
                if raw == self.last_raw {
                    self.counter += 1;
                    if self.counter >= DEBOUNCE_CONFIRM_SAMPLES {
                        let was_released = self.stable;
                        self.stable = raw;
                        // Falling edge of the stable level = press
                        if was_released && !raw {
                            self.pressed = true;
                        }
                        self.phase = Phase::AwaitingChange;
                        self.counter = 0;
                    }
                } else {
                    // Chatter: restart stabilization on the new level
                    self.counter = 0;
                    self.last_raw = raw;
                }
            }
        }
    }
}

/// Pressed edges accumulated between two menu polls.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ButtonMask {
    pub ok: bool,
    pub select: bool,
}

impl ButtonMask {
    /// True when no button event is pending.
    #[inline]
    pub const fn is_empty(&self) -> bool { !self.ok && !self.select }
}

/// The two front-panel switches.
pub struct ButtonPad {
    ok: SwitchState,
    select: SwitchState,
}

impl ButtonPad {
    /// Create a pad with both switches at the released/stable baseline.
    pub const fn new() -> Self {
        Self {
            ok: SwitchState::new(),
            select: SwitchState::new(),
        }
    }

    /// Advance both debounce machines with the raw active-low pin levels.
    /// Must be called at the fixed tick period.
    pub fn tick(
        &mut self,
        raw_ok: bool,
        raw_select: bool,
    ) {
        self.ok.sample(raw_ok);
        self.select.sample(raw_select);
    }

    /// Return the pressed edges latched since the previous call, then clear
    /// them. This is the only read path for the pending flags; with no new
    /// edge the mask is empty.
    pub fn scan(&mut self) -> ButtonMask {
        let mask = ButtonMask {
            ok: self.ok.pressed,
            select: self.select.pressed,
        };
        self.ok.pressed = false;
        self.select.pressed = false;
        mask
    }
}

impl Default for ButtonPad {
    fn default() -> Self { Self::new() }
}

// =============================================================================
// Unit Tests
// =============================================================================
