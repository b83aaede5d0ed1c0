// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Clock HAL contract consumed by the SCMI clock handler
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//!
//! The HAL moves physical clocks. Each state-touching call either completes in
//! place or returns [`Completion::Pending`]; a pending call is finished later by a
//! [`ClockCompletion`] delivered to the dispatcher. The HAL must eventually
//! complete every pending call: the dispatcher has no timeout.

/// Index of a physical clock device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockDeviceId(pub u32);

impl ClockDeviceId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// Rounding applied by the HAL when the requested rate is not exactly reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundMode {
    Nearest,
    Up,
    Down,
}

/// How a clock describes its supported rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateRange {
    /// `rate_count` rates, enumerated through [`ClockHal::get_rate_from_index`].
    Discrete { rate_count: u32 },
    /// Every rate from `min` to `max` in increments of `step`.
    Linear { min: u64, max: u64, step: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockInfo {
    pub range: RateRange,
}

/// Outcome of a HAL call that may finish asynchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "a pending completion must be tracked"]
pub enum Completion<T> {
    Done(T),
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    #[error("operation not supported by the clock")]
    Unsupported,
    #[error("value out of range")]
    OutOfRange,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("clock busy")]
    Busy,
    #[error("hardware failure")]
    Hardware,
}

pub type HalResult<T> = Result<Completion<T>, HalError>;

/// Clock hardware-abstraction layer.
pub trait ClockHal {
    fn get_state(&mut self, device: ClockDeviceId) -> HalResult<ClockState>;

    fn get_rate(&mut self, device: ClockDeviceId) -> HalResult<u64>;

    fn set_rate(&mut self, device: ClockDeviceId, rate: u64, round: RoundMode) -> HalResult<()>;

    fn set_state(&mut self, device: ClockDeviceId, state: ClockState) -> HalResult<()>;

    fn get_info(&self, device: ClockDeviceId) -> Result<ClockInfo, HalError>;

    fn get_rate_from_index(&self, device: ClockDeviceId, index: u32) -> Result<u64, HalError>;
}

/// Value carried by a successful completion notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionValue {
    State(ClockState),
    Rate(u64),
    /// Completion of a set-rate or set-state request.
    Applied,
}

/// Out-of-band notification that a pending HAL call finished.
///
/// `device` is the only correlation key: each physical device has at most one
/// request in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockCompletion {
    pub device: ClockDeviceId,
    pub result: Result<CompletionValue, HalError>,
}

impl ClockCompletion {
    pub fn ok(device: ClockDeviceId, value: CompletionValue) -> Self {
        Self { device, result: Ok(value) }
    }

    pub fn err(device: ClockDeviceId, error: HalError) -> Self {
        Self { device, result: Err(error) }
    }
}
