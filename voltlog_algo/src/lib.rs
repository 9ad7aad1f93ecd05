#![no_std]

//! Acquisition core for the voltlog multi-channel data logger.
//!
//! Everything in this crate is target-independent: the analog front-end and
//! the storage layer are reached through traits ([`frontend::AdcExchange`],
//! [`pipeline::BlockStorage`]) and the hardware cycle counter is passed in
//! as a plain value, so the timing, averaging, and formatting logic all run
//! under host tests exactly as they run on the target.

#[cfg(test)]
extern crate std;

pub mod acquisition;
pub mod config;
pub mod error;
pub mod frontend;
pub mod math_fixed;
pub mod pipeline;
pub mod regulator;
pub mod ring_buffer;

pub use acquisition::{Acquisition, RunState};
pub use config::{ChannelConfig, DataMode, InputRange, SessionConfig};
pub use error::{ConfigError, DaqError};
pub use regulator::OutputRegulator;
