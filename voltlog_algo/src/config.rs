// Implements channel and session configuration for the logger, including
// the limit/normalization pass that runs before every acquisition.

// Key Features:
// - Fixed table of physical channels with per-range calibration pairs.
// - Sample rate normalized into the {1,2,5}*10^k set.
// - Oversample count and timestamp resolution derived from the rate.
// - apply_limits is idempotent and never fails; genuinely unusable
//   configurations are rejected at acquisition start instead.

// Licensed under the Apache License, Version 2.0

use heapless::String;

use crate::math_fixed::{DecFloat, Fix64};

/// Number of physical input channels.
pub const MAX_CHANNELS: usize = 3;

/// Base rate of the sampling timer. Requested sample rates below this are
/// reached by averaging `oversamples` conversions per emitted frame.
pub const MAX_CONVERSION_RATE_HZ: u32 = 10_000;

/// Safe band for the regulated sensor-supply output.
pub const OUTPUT_MV_MIN: i32 = 5_000;
pub const OUTPUT_MV_MAX: i32 = 24_000;

/// Input divider range of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputRange {
    /// 0..5 V divider
    Low,
    /// 0..24 V divider
    High,
}

/// Output record representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataMode {
    Readable,
    Hex,
    Binary,
}

/// Calibration pair converting a raw code to physical microvolts for one
/// input range: `uv = (raw - zero_offset_lsb) * uv_per_lsb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeCal {
    pub zero_offset_lsb: Fix64,
    pub uv_per_lsb: Fix64,
}

impl RangeCal {
    /// Pass-through calibration: one LSB is one microvolt.
    pub const UNITY: RangeCal = RangeCal {
        zero_offset_lsb: Fix64::ZERO,
        uv_per_lsb: Fix64::ONE,
    };
}

/// Static configuration of one physical channel. Never mutated while an
/// acquisition is active.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub range: InputRange,
    /// User units per volt.
    pub scale: DecFloat,
    /// User-facing zero offset in microvolts.
    pub offset_uv: Fix64,
    pub unit_label: String<8>,
    /// Calibration for [`InputRange::Low`].
    pub cal_low: RangeCal,
    /// Calibration for [`InputRange::High`].
    pub cal_high: RangeCal,
}

impl ChannelConfig {
    /// Calibration pair for the selected range.
    pub fn cal(&self) -> &RangeCal {
        match self.range {
            InputRange::Low => &self.cal_low,
            InputRange::High => &self.cal_high,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let mut unit_label = String::new();
        let _ = unit_label.push_str("V");
        ChannelConfig {
            enabled: true,
            range: InputRange::High,
            scale: DecFloat::from_int(1),
            offset_uv: Fix64::ZERO,
            unit_label,
            // Theoretical divider values for the two input ranges:
            // low range 78.04726 uV/LSB, high range 745.48879 uV/LSB with
            // a 32511.13 LSB zero point.
            cal_low: RangeCal {
                zero_offset_lsb: Fix64::ZERO,
                uv_per_lsb: Fix64::from_millionths(78_047_260),
            },
            cal_high: RangeCal {
                zero_offset_lsb: Fix64::from_millionths(32_511_130_000),
                uv_per_lsb: Fix64::from_millionths(745_488_790),
            },
        }
    }
}

/// Full session state. Loaded or defaulted once, passed through
/// [`apply_limits`](SessionConfig::apply_limits), then immutable until the
/// acquisition stops.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub channels: [ChannelConfig; MAX_CHANNELS],
    pub sample_rate_hz: u32,
    pub output_mv: i32,
    pub data_mode: DataMode,
    /// Seconds between arming and the first recorded frame.
    pub trigger_delay_s: u32,
    /// Free-form first line of the data file header.
    pub comment: String<64>,

    // Derived by apply_limits
    pub channel_count: u8,
    pub oversamples: u32,
    pub time_res: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut comment = String::new();
        let _ = comment.push_str("User header comment");
        let mut config = SessionConfig {
            channels: [
                ChannelConfig::default(),
                ChannelConfig::default(),
                ChannelConfig::default(),
            ],
            sample_rate_hz: 1_000,
            output_mv: 5_000,
            data_mode: DataMode::Readable,
            trigger_delay_s: 0,
            comment,
            channel_count: 0,
            oversamples: 0,
            time_res: 0,
        };
        config.apply_limits();
        config
    }
}

impl SessionConfig {
    /// Clamps every session parameter into its valid range and recomputes
    /// the derived fields. Idempotent; must run before every session start.
    pub fn apply_limits(&mut self) {
        self.channel_count = self.channels.iter().filter(|ch| ch.enabled).count() as u8;

        // Force the sample rate into the set {1,2,5}*10^k
        self.sample_rate_hz = self.sample_rate_hz.clamp(1, MAX_CONVERSION_RATE_HZ);
        let mut mag = 1;
        while mag < self.sample_rate_hz {
            if self.sample_rate_hz <= mag * 2 {
                self.sample_rate_hz = mag * 2;
            } else if self.sample_rate_hz <= mag * 5 {
                self.sample_rate_hz = mag * 5;
            } else if self.sample_rate_hz <= mag * 10 {
                self.sample_rate_hz = mag * 10;
            }
            mag *= 10;
        }

        self.oversamples = MAX_CONVERSION_RATE_HZ / self.sample_rate_hz;

        // Timestamp digits needed to tell consecutive samples apart
        self.time_res = 0;
        let mut mag = 1;
        while mag < self.sample_rate_hz {
            self.time_res += 1;
            mag *= 10;
        }

        self.output_mv = self.output_mv.clamp(OUTPUT_MV_MIN, OUTPUT_MV_MAX);
    }

    /// Bytes of one raw sample frame.
    pub fn frame_len(&self) -> usize {
        self.channel_count as usize * 2
    }
}
