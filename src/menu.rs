//! Menu state machine and display payload rendering.
//!
//! The menu is a fixed ring of screens for one product, driven by the two
//! debounced buttons. Each poll pass consumes the pending button mask,
//! mutates the shared [`AppContext`] and flags a refresh whenever the
//! two-line payload changed; the driving loop renders only then, which
//! decouples the poll rate from LCD bus traffic.
//!
//! # Screens
//!
//! `Welcome` advances on the first poll. `ChooseProfile` picks one of the
//! four stored profiles or walks the new-profile flow
//! (`ConfigureBladeCount` -> `ConfigureCylinderCount` -> `SaveAs`). The
//! measurement ring is `MeasureVisual` -> `MeasureAudio` ->
//! `MeasureVibration` -> `Parameters`, and `Battery`/`Parameters` link the
//! service screens together.

use core::fmt::Write;

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use heapless::String;

use crate::buttons::ButtonMask;
use crate::config::{
    ACCEL_EXPECTED_ID,
    ACCEL_READ_INTERVAL_POLLS,
    BLADES_MAX,
    CYLINDERS_MAX,
    CYLINDERS_MIN,
    LCD_COLS,
    NB_PROFILES,
};
use crate::context::AppContext;
use crate::drivers::{Accelerometer, CapturePeripheral, PowerControl};
use crate::profiles::ProfileStore;
use crate::rpm::{CaptureBuffer, RpmMonitor};

/// The fixed set of UI states. Transitions in [`Menu::poll`] are the only way
/// the current screen changes.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Screen {
    /// Splash; advances unconditionally on the first poll.
    #[default]
    Welcome,
    /// Battery status / profile management chooser.
    Battery,
    /// Settings / power-off chooser.
    Parameters,
    /// Profile slots 1-4 plus "New".
    ChooseProfile,
    /// Blade count for a new profile, cycling 1..=4.
    ConfigureBladeCount,
    /// Cylinder count for a new profile, cycling 4..=7.
    ConfigureCylinderCount,
    /// Destination slot chooser; OK persists the working counts.
    SaveAs,
    /// Live tachometer readout from the capture peripheral.
    MeasureVisual,
    /// Acoustic measurement placeholder.
    MeasureAudio,
    /// Vibration measurement; acquires accelerometer samples.
    MeasureVibration,
}

/// Two rendered LCD lines, at most [`LCD_COLS`] characters each.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct DisplayFrame {
    pub line1: String<LCD_COLS>,
    pub line2: String<LCD_COLS>,
}

impl DisplayFrame {
    fn text(
        line1: &str,
        line2: &str,
    ) -> Self {
        let mut frame = Self::default();
        let _ = frame.line1.push_str(line1);
        let _ = frame.line2.push_str(line2);
        frame
    }
}

/// The top-level orchestrator: current screen plus the per-screen cursors.
pub struct Menu {
    screen: Screen,
    /// 0..=3 select a slot, 4 is "New".
    profile_cursor: usize,
    /// Destination slot on the save screen.
    save_cursor: usize,
    parameters_cursor: u8,
    battery_cursor: u8,
    capture_started: bool,
    accel_init_done: bool,
    accel_poll_counter: u8,
}

impl Menu {
    pub const fn new() -> Self {
        Self {
            screen: Screen::Welcome,
            profile_cursor: 0,
            save_cursor: 0,
            parameters_cursor: 0,
            battery_cursor: 0,
            capture_started: false,
            accel_init_done: false,
            accel_poll_counter: 0,
        }
    }

    /// Currently displayed screen.
    pub const fn screen(&self) -> Screen {
        self.screen
    }

    /// One cooperative poll pass.
    ///
    /// Consumes the button mask produced since the previous pass, advances
    /// the state machine, and sets `ctx.refresh_needed` whenever the display
    /// payload must be re-rendered. Storage faults degrade to "keep the
    /// previous displayed state"; nothing here halts the device.
    #[allow(clippy::too_many_arguments)]
    pub fn poll<F, C, A, P>(
        &mut self,
        ctx: &mut AppContext,
        buttons: ButtonMask,
        samples: &CaptureBuffer,
        monitor: &mut RpmMonitor,
        store: &mut ProfileStore<F>,
        capture: &mut C,
        accel: &mut A,
        power: &mut P,
    ) where
        F: NorFlash + ReadNorFlash,
        C: CapturePeripheral,
        A: Accelerometer,
        P: PowerControl,
    {
        match self.screen {
            Screen::Welcome => {
                self.screen = Screen::ChooseProfile;
                ctx.refresh_needed = true;
            }

            Screen::Battery => {
                if buttons.select {
                    self.battery_cursor ^= 1;
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    if self.battery_cursor == 0 {
                        self.screen = Screen::Parameters;
                        self.parameters_cursor = 0;
                    } else {
                        self.screen = Screen::ChooseProfile;
                    }
                    ctx.refresh_needed = true;
                }
            }

            Screen::Parameters => {
                if buttons.select {
                    self.parameters_cursor ^= 1;
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    if self.parameters_cursor == 0 {
                        self.screen = Screen::Battery;
                    } else {
                        // Power down: the regulator drops out and the device
                        // dies here; the screen intentionally stays put.
                        power.backlight(false);
                        power.regulator(false);
                    }
                    ctx.refresh_needed = true;
                }
            }

            Screen::ChooseProfile => {
                if buttons.select {
                    self.profile_cursor = (self.profile_cursor + 1) % (NB_PROFILES + 1);
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    if self.profile_cursor == NB_PROFILES {
                        // "New": first slot not yet saved, slot 0 when all
                        // four are taken
                        let slot = (0..NB_PROFILES)
                            .find(|&i| store.get(i).is_none_or(|p| !p.is_valid()))
                            .unwrap_or(0);
                        ctx.selected_profile = slot;
                        self.screen = Screen::ConfigureBladeCount;
                    } else {
                        ctx.selected_profile = self.profile_cursor;
                        if let Some(p) = store.get(self.profile_cursor)
                            && p.is_valid()
                        {
                            ctx.blades = p.blades;
                            ctx.cylinders = p.cylinders;
                        }
                        self.screen = Screen::MeasureVisual;
                    }
                    ctx.refresh_needed = true;
                }
            }

            Screen::ConfigureBladeCount => {
                if buttons.select {
                    ctx.blades = (ctx.blades % BLADES_MAX) + 1;
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    self.screen = Screen::ConfigureCylinderCount;
                    ctx.refresh_needed = true;
                }
            }

            Screen::ConfigureCylinderCount => {
                if buttons.select {
                    ctx.cylinders += 1;
                    if ctx.cylinders > CYLINDERS_MAX {
                        ctx.cylinders = CYLINDERS_MIN;
                    }
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    // Propose the selected slot as the save destination
                    self.save_cursor = ctx.selected_profile;
                    self.screen = Screen::SaveAs;
                    ctx.refresh_needed = true;
                }
            }

            Screen::SaveAs => {
                if buttons.select {
                    self.save_cursor = (self.save_cursor + 1) % NB_PROFILES;
                    ctx.refresh_needed = true;
                } else if buttons.ok {
                    // A storage fault leaves the old table in place; the
                    // instrument keeps running either way
                    let _ = store.save_one(self.save_cursor, ctx.blades, ctx.cylinders);
                    ctx.selected_profile = self.save_cursor;
                    self.screen = Screen::MeasureVisual;
                    ctx.refresh_needed = true;
                }
            }

            Screen::MeasureVisual => {
                if !self.capture_started {
                    self.capture_started = true;
                    samples.reset();
                    monitor.restart();
                    capture.start();
                }

                if let Some(rpm) = monitor.poll(samples, ctx.blades) {
                    ctx.rpm = rpm;
                    ctx.refresh_needed = true;
                }

                if buttons.select {
                    // Deactivate before the transition commits so no late
                    // capture is attributed to the next screen
                    self.capture_started = false;
                    samples.deactivate();
                    capture.stop();
                    self.screen = Screen::MeasureAudio;
                    ctx.refresh_needed = true;
                }
            }

            Screen::MeasureAudio => {
                if buttons.select {
                    self.screen = Screen::MeasureVibration;
                    ctx.refresh_needed = true;
                }
            }

            Screen::MeasureVibration => {
                if !self.accel_init_done {
                    accel.init();
                    if accel.read_id() == ACCEL_EXPECTED_ID {
                        power.status_led_toggle();
                    }
                    self.accel_init_done = true;
                }

                self.accel_poll_counter += 1;
                if self.accel_poll_counter >= ACCEL_READ_INTERVAL_POLLS {
                    // Acquired only; processing is a future feature
                    let _ = accel.read_xyz();
                    self.accel_poll_counter = 0;
                }

                if buttons.select {
                    self.screen = Screen::Parameters;
                    self.parameters_cursor = 0;
                    ctx.refresh_needed = true;
                }
            }
        }
    }

    /// Produce the two display lines for the current screen. Pure with
    /// respect to the state machine; the caller decides when to push the
    /// frame to the LCD.
    pub fn render<F: NorFlash + ReadNorFlash>(
        &self,
        ctx: &AppContext,
        store: &ProfileStore<F>,
    ) -> DisplayFrame {
        match self.screen {
            Screen::Welcome => DisplayFrame::text("RPM Meter", "handheld tachometer"),

            Screen::Battery => match self.battery_cursor {
                0 => DisplayFrame::text(">Battery = XXX", " Manage profiles"),
                _ => DisplayFrame::text(" Battery = XXX", ">Manage profiles"),
            },

            Screen::Parameters => match self.parameters_cursor {
                0 => DisplayFrame::text(">Parameters", " Power off"),
                _ => DisplayFrame::text(" Parameters", ">Power off"),
            },

            Screen::ChooseProfile => {
                let slots = match self.profile_cursor {
                    0 => ">1 2 3 4 New",
                    1 => " 1>2 3 4 New",
                    2 => " 1 2>3 4 New",
                    3 => " 1 2 3>4 New",
                    _ => " 1 2 3 4>New",
                };
                DisplayFrame::text("Choose profile", slots)
            }

            Screen::ConfigureBladeCount => {
                let mut frame = DisplayFrame::text("Blade count:", "");
                let _ = write!(frame.line2, "> {}", ctx.blades);
                frame
            }

            Screen::ConfigureCylinderCount => {
                let mut frame = DisplayFrame::text("Cylinder count:", "");
                let _ = write!(frame.line2, "> {}", ctx.cylinders);
                frame
            }

            Screen::SaveAs => {
                let mut frame = DisplayFrame::text("Save to P1-P4", "");
                let _ = write!(
                    frame.line2,
                    ">P{}  ({}H {}C)",
                    self.save_cursor + 1,
                    ctx.blades,
                    ctx.cylinders
                );
                frame
            }

            Screen::MeasureVisual => {
                let mut frame = DisplayFrame::default();
                let _ = write!(frame.line1, "Visual: {:5} RPM", ctx.rpm);
                let number = ctx.selected_profile + 1;
                match store.get(ctx.selected_profile) {
                    Some(p) if p.is_valid() => {
                        let _ = write!(
                            frame.line2,
                            "Profile{}: {}H {}C",
                            number, p.blades, p.cylinders
                        );
                    }
                    _ => {
                        let _ = write!(frame.line2, "Profile{number}: --  --");
                    }
                }
                frame
            }

            Screen::MeasureAudio => DisplayFrame::text("Audio measure", "xxxx RPM / cyl"),

            Screen::MeasureVibration => DisplayFrame::text("Vibration measure", "xxxx RPM / cyl"),
        }
    }
}

impl Default for Menu {
    fn default() -> Self { Self::new() }
}

// =============================================================================
// Unit Tests
// =============================================================================
