//! RPM meter library - testable modules for the handheld instrument.
//!
//! This library contains the core logic that can be tested on the host
//! machine: button debouncing, RPM derivation from capture timestamps, the
//! profile store and the menu state machine. The binary (`main.rs`) uses this
//! library and adds the embedded-specific code.
//!
//! # Testing
//!
//! Run tests on host with:
//! ```bash
//! cargo test --lib
//! ```
//!
//! Tests run with `std` enabled (via `cfg_attr`), allowing use of the standard
//! test framework while the actual firmware runs as `no_std`.

// Use no_std only when NOT testing (tests need std for the test harness)
#![cfg_attr(not(test), no_std)]
// Crate-level lints
#![allow(clippy::cast_possible_truncation)]

// === Pure logic modules (testable on host, no ARM dependencies) ===

// Configuration
pub mod config;

// Hardware seams (traits only; implementations live in the binary)
pub mod drivers;

// Measurement and persistence
pub mod profiles;
pub mod rpm;

// UI
pub mod menu;

// State handling
mod state {
    pub mod buttons;
    pub mod context;
}

// Re-export at top level for existing imports
pub use state::{buttons, context};

// Shared mocks for the unit tests
#[cfg(test)]
pub(crate) mod testing;
