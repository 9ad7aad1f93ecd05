// Licensed under the Apache License, Version 2.0

/// Session parameters that cannot start an acquisition. Recoverable: the
/// caller fixes the configuration and starts again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No channel is enabled, there is nothing to sample.
    NoEnabledChannels,
    /// The sample rate does not divide the base conversion rate.
    UnsupportedRate,
}

/// Fatal conditions of a running session. None of these are retryable:
/// once raised, further samples would be unreliable or unbufferable, so
/// acquisition stops and the operator restarts with corrected
/// configuration or faster storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DaqError {
    /// Invalid session parameters, refused before the session starts.
    Config(ConfigError),
    /// The elapsed-time check failed in the sampling tick: a deadline was
    /// missed and sample timestamps can no longer be trusted.
    SampleTiming,
    /// A producer outran its consumer; the storage layer or background
    /// scheduling could not keep up with the configured rate.
    BufferOverflow,
    /// The storage layer reported a failed write.
    StorageWrite,
}

impl From<ConfigError> for DaqError {
    fn from(err: ConfigError) -> Self {
        DaqError::Config(err)
    }
}
