use super::PinDef;
use super::{PinMode, Port};

pub const SPI1_SCK: PinDef = PinDef {
    port: Port::A,
    pin: 5,
    mode: PinMode::Alt(5),
};

pub const SPI1_MISO: PinDef = PinDef {
    port: Port::A,
    pin: 6,
    mode: PinMode::Alt(5),
};

pub const SPI1_MOSI: PinDef = PinDef {
    port: Port::A,
    pin: 7,
    mode: PinMode::Alt(5),
};

pub const SPI1_CS: PinDef = PinDef {
    port: Port::C,
    pin: 4,
    mode: PinMode::Output,
};

/// Range-select outputs for the three input dividers.
pub const RSEL1: PinDef = PinDef {
    port: Port::B,
    pin: 0,
    mode: PinMode::Output,
};

pub const RSEL2: PinDef = PinDef {
    port: Port::B,
    pin: 1,
    mode: PinMode::Output,
};

pub const RSEL3: PinDef = PinDef {
    port: Port::B,
    pin: 2,
    mode: PinMode::Output,
};
