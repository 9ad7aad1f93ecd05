use super::PinDef;
use super::{PinMode, Port};

pub const SPI3_SCK: PinDef = PinDef {
    port: Port::C,
    pin: 10,
    mode: PinMode::Alt(6),
};

pub const SPI3_MISO: PinDef = PinDef {
    port: Port::C,
    pin: 11,
    mode: PinMode::Alt(6),
};

pub const SPI3_MOSI: PinDef = PinDef {
    port: Port::C,
    pin: 12,
    mode: PinMode::Alt(6),
};

pub const SPI3_CS: PinDef = PinDef {
    port: Port::A,
    pin: 15,
    mode: PinMode::Output,
};
