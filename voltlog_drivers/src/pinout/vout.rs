use super::PinDef;
use super::{PinMode, Port};

/// Hardware shutdown line of the output stage; low keeps the output off
/// regardless of PWM state.
pub const SHDN: PinDef = PinDef {
    port: Port::C,
    pin: 7,
    mode: PinMode::Output,
};

/// TIM3 channel 1 PWM output feeding the supply filter.
pub const PWM: PinDef = PinDef {
    port: Port::C,
    pin: 6,
    mode: PinMode::Alt(2),
};
