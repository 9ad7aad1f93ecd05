#![no_std]

//! STM32G4 bindings for the voltlog acquisition core: pin definitions,
//! the SPI analog front-end, the external SPI RAM buffer memory, and the
//! auxiliary-output PWM stage.

pub mod adc_spi;
pub mod pinout;
pub mod pwm;
pub mod ram_spi;
