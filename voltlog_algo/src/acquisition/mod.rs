// Implements the sample-timing engine: one conversion sweep per base-rate
// tick, cross-tick oversample averaging, timing-integrity verification
// against the hardware cycle counter, and frame emission into the raw
// ring buffer.

// Key Features:
// - Explicit run-state machine: Idle, WaitingForTrigger, Recording.
// - Timing check compares expected elapsed cycles with the measured
//   cycle-counter delta on every tick; a deviation beyond one conversion
//   period is a hard SampleTiming error, not a warning.
// - At the base rate the converter's channel sequencer sweeps all inputs
//   in one bounded bus window; below it channels are addressed one by one
//   and accumulated until `oversamples` sub-samples form one frame.
// - Frames produced while waiting out the trigger delay are discarded.

// Licensed under the Apache License, Version 2.0

use crate::config::{SessionConfig, MAX_CHANNELS, MAX_CONVERSION_RATE_HZ};
use crate::error::{ConfigError, DaqError};
use crate::frontend::{self, AdcExchange};
use crate::ring_buffer::{BufferMemory, Producer};

/// Acquisition run state. Transitions:
/// `Idle -> WaitingForTrigger -> Recording -> Idle` (or straight to
/// `Recording` with no trigger delay).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    Idle,
    WaitingForTrigger { ticks_left: u32 },
    Recording,
}

/// Sample-timing engine. Owns no hardware: the analog front-end arrives
/// as an [`AdcExchange`] and timing as raw cycle-counter readings, so the
/// whole engine runs under host tests.
pub struct Acquisition {
    state: RunState,

    // Snapshot of the parts of the configuration the tick path needs
    enabled: [bool; MAX_CHANNELS],
    channel_count: usize,
    oversamples: u32,

    // Oversample accumulation
    sums: [u32; MAX_CHANNELS],
    subsample: u32,

    // Timing integrity
    tick_count: u32,
    cycles_per_tick: u32,
    cycle_last: u32,
    cycle_elapsed: u64,
}

impl Acquisition {
    pub fn new() -> Self {
        Acquisition {
            state: RunState::Idle,
            enabled: [false; MAX_CHANNELS],
            channel_count: 0,
            oversamples: 1,
            sums: [0; MAX_CHANNELS],
            subsample: 0,
            tick_count: 0,
            cycles_per_tick: 0,
            cycle_last: 0,
            cycle_elapsed: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RunState::Recording)
    }

    /// Validates the session and arms the engine. The caller arms the
    /// hardware timer at [`MAX_CONVERSION_RATE_HZ`] once this returns Ok.
    pub fn start(
        &mut self,
        config: &SessionConfig,
        sysclk_hz: u32,
        cycle_now: u32,
    ) -> Result<(), ConfigError> {
        if config.channel_count == 0 {
            return Err(ConfigError::NoEnabledChannels);
        }
        if config.sample_rate_hz == 0
            || config.oversamples == 0
            || MAX_CONVERSION_RATE_HZ % config.sample_rate_hz != 0
        {
            return Err(ConfigError::UnsupportedRate);
        }

        for (enabled, ch) in self.enabled.iter_mut().zip(config.channels.iter()) {
            *enabled = ch.enabled;
        }
        self.channel_count = config.channel_count as usize;
        self.oversamples = config.oversamples;

        self.sums = [0; MAX_CHANNELS];
        self.subsample = 0;
        self.tick_count = 0;
        self.cycles_per_tick = sysclk_hz / MAX_CONVERSION_RATE_HZ;
        self.cycle_last = cycle_now;
        self.cycle_elapsed = 0;

        let delay_ticks = config.trigger_delay_s.saturating_mul(MAX_CONVERSION_RATE_HZ);
        self.state = if delay_ticks == 0 {
            RunState::Recording
        } else {
            RunState::WaitingForTrigger {
                ticks_left: delay_ticks,
            }
        };

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "DAQ: armed, {} channels, {} oversamples",
            self.channel_count,
            self.oversamples
        );
        Ok(())
    }

    /// Disarms the engine. Data already in the raw ring stays for the
    /// final drain.
    pub fn stop(&mut self) {
        self.state = RunState::Idle;
        #[cfg(feature = "defmt")]
        defmt::debug!("DAQ: stopped");
    }

    /// Base-rate timer callback. Must only be called from the sampling
    /// interrupt context, with the front-end bus held for the duration.
    pub fn on_tick<A, M>(
        &mut self,
        adc: &mut A,
        cycle_now: u32,
        raw: &mut Producer<'_, M>,
    ) -> Result<(), DaqError>
    where
        A: AdcExchange,
        M: BufferMemory,
    {
        if matches!(self.state, RunState::Idle) {
            // Straggler tick between stop() and timer disarm
            return Ok(());
        }

        self.tick_count = self.tick_count.wrapping_add(1);
        self.check_timing(cycle_now)?;

        if self.oversamples == 1 {
            self.sweep_sequencer(adc);
        } else {
            self.sweep_addressed(adc);
        }

        self.subsample += 1;
        if self.subsample == self.oversamples {
            self.subsample = 0;
            self.emit_frame(raw)?;
        }

        self.state = Self::next_state(self.state);
        Ok(())
    }

    /// Exhaustive trigger-delay transition, evaluated once per tick.
    fn next_state(state: RunState) -> RunState {
        match state {
            RunState::WaitingForTrigger { ticks_left: 1 } => RunState::Recording,
            RunState::WaitingForTrigger { ticks_left } => RunState::WaitingForTrigger {
                ticks_left: ticks_left - 1,
            },
            other => other,
        }
    }

    /// Verifies expected elapsed time against the cycle counter. The
    /// expected value is `tick_count * cycles_per_tick`; the tolerance is
    /// one conversion period.
    fn check_timing(&mut self, cycle_now: u32) -> Result<(), DaqError> {
        self.cycle_elapsed += cycle_now.wrapping_sub(self.cycle_last) as u64;
        self.cycle_last = cycle_now;

        let expected = self.tick_count as u64 * self.cycles_per_tick as u64;
        let deviation = expected as i64 - self.cycle_elapsed as i64;
        if deviation.unsigned_abs() > self.cycles_per_tick as u64 {
            return Err(DaqError::SampleTiming);
        }
        Ok(())
    }

    /// Sweeps all channels through the hardware sequencer; used at the
    /// base rate where per-channel addressing would not fit the tick.
    fn sweep_sequencer<A: AdcExchange>(&mut self, adc: &mut A) {
        adc.exchange(frontend::sequence_cfg((MAX_CHANNELS - 1) as u8));
        adc.exchange(0); // priming read, next result is channel 0
        let mut slot = 0;
        for ch in 0..MAX_CHANNELS {
            let raw = adc.exchange(0);
            if self.enabled[ch] {
                self.sums[slot] += raw as u32;
                slot += 1;
            }
        }
    }

    /// Addresses each enabled channel individually; used below the base
    /// rate where the extra configuration words fit comfortably.
    fn sweep_addressed<A: AdcExchange>(&mut self, adc: &mut A) {
        let mut slot = 0;
        for ch in 0..MAX_CHANNELS {
            if !self.enabled[ch] {
                continue;
            }
            adc.exchange(frontend::single_channel_cfg(ch as u8));
            adc.exchange(0); // priming read
            self.sums[slot] += adc.exchange(0) as u32;
            slot += 1;
        }
    }

    /// Averages the accumulated sums into one frame and enqueues it when
    /// recording; frames before the trigger point are discarded.
    fn emit_frame<M: BufferMemory>(&mut self, raw: &mut Producer<'_, M>) -> Result<(), DaqError> {
        let mut frame = [0u8; MAX_CHANNELS * 2];
        for slot in 0..self.channel_count {
            let avg = (self.sums[slot] / self.oversamples) as u16;
            frame[slot * 2..slot * 2 + 2].copy_from_slice(&avg.to_le_bytes());
        }
        self.sums = [0; MAX_CHANNELS];

        if self.is_recording() {
            raw.write(&frame[..self.channel_count * 2])
                .map_err(|_| DaqError::BufferOverflow)?;
        }
        Ok(())
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}
