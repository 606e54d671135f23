//! Thermabox temperature controller library.
//!
//! Drives a heating and a cooling element through GPIO relays to hold an
//! enclosure at a target temperature, using on/off hysteresis around a
//! primary temperature probe.

pub mod config;
pub mod controller;
pub mod element;
pub mod error;
pub mod gpio;
pub mod instance_lock;
pub mod interfaces;
pub mod probe;
pub mod relay;
