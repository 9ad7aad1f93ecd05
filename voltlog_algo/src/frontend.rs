// Licensed under the Apache License, Version 2.0

//! Seam between the acquisition logic and the analog front-end.
//!
//! The converter is an AD7682-class device driven over SPI in
//! read-after-conversion mode: each full-width exchange starts a new
//! conversion and returns the result of the conversion started two
//! exchanges earlier. The engine owns that pipelining; the bus driver only
//! has to move one word and pace consecutive conversions.

/// One full-width word exchange with the analog front-end.
pub trait AdcExchange {
    fn exchange(&mut self, cfg: u16) -> u16;
}

/// Channel carrying the regulated output's sense divider. Not part of the
/// recordable channel set.
pub const SENSE_CHANNEL: u8 = 3;

/// CFG register bit positions (14-bit register left-aligned in the word).
#[allow(dead_code)]
mod bits {
    /// 0 = read back CFG, 1 = do not read back
    pub const RB: u16 = 2;
    /// Channel sequencer mode
    pub const SEQ: u16 = 3;
    /// Reference select
    pub const REF: u16 = 5;
    /// Low-pass bandwidth select, 1 = full bandwidth
    pub const BW: u16 = 8;
    /// Input channel selection
    pub const IN: u16 = 9;
    /// Input channel configuration
    pub const INCC: u16 = 12;
    /// 0 = keep configuration, 1 = overwrite
    pub const CFG: u16 = 15;
}

/// Base word shared by every conversion: overwrite CFG, unipolar input
/// referenced to COM, full bandwidth, internal 4.096 V reference, no
/// read-back.
const fn base_cfg() -> u16 {
    (1 << bits::CFG) | (6 << bits::INCC) | (1 << bits::BW) | (1 << bits::REF) | (1 << bits::RB)
}

/// Configuration word for a single conversion on `channel`, sequencer off.
pub const fn single_channel_cfg(channel: u8) -> u16 {
    base_cfg() | ((channel as u16) << bits::IN)
}

/// Configuration word enabling the channel sequencer for a sweep over
/// channels `0..=last_channel`.
pub const fn sequence_cfg(last_channel: u8) -> u16 {
    base_cfg() | ((last_channel as u16) << bits::IN) | (3 << bits::SEQ)
}
