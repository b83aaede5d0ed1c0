// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: SCMI clock protocol v1.0 wire format (message ids, request decode, response encode)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + `tests/dispatch.rs`
//!
//! INVARIANTS:
//! - Request payload sizes must match exactly; decoding never panics
//! - Error responses carry only the status word

use bitflags::bitflags;
use nexus_scmi::wire::{join_u64, read_word, WordWriter};
use nexus_scmi::ScmiStatus;

use crate::config::CLOCK_NAME_LEN;
use crate::hal::{ClockState, HalError, RoundMode};

/// Clock protocol version 1.0 (major in bits 31:16).
pub const PROTOCOL_VERSION: u32 = 0x0001_0000;

const MAX_PENDING_SHIFT: u32 = 16;
const CLOCK_COUNT_MASK: u32 = 0xFFFF;

/// Clock management protocol messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageId {
    ProtocolVersion = 0,
    ProtocolAttributes = 1,
    ProtocolMessageAttributes = 2,
    ClockAttributes = 3,
    DescribeRates = 4,
    RateSet = 5,
    RateGet = 6,
    ConfigSet = 7,
}

impl MessageId {
    pub const ALL: [MessageId; 8] = [
        MessageId::ProtocolVersion,
        MessageId::ProtocolAttributes,
        MessageId::ProtocolMessageAttributes,
        MessageId::ClockAttributes,
        MessageId::DescribeRates,
        MessageId::RateSet,
        MessageId::RateGet,
        MessageId::ConfigSet,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Exact request payload size in bytes.
    pub const fn payload_size(self) -> usize {
        match self {
            MessageId::ProtocolVersion | MessageId::ProtocolAttributes => 0,
            MessageId::ProtocolMessageAttributes
            | MessageId::ClockAttributes
            | MessageId::RateGet => 4,
            MessageId::DescribeRates | MessageId::ConfigSet => 8,
            MessageId::RateSet => 16,
        }
    }
}

bitflags! {
    /// CLOCK_RATE_SET flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RateSetFlags: u32 {
        const ASYNC = 1 << 0;
        const ROUND_UP = 1 << 2;
        const ROUND_AUTO = 1 << 3;
    }
}

impl RateSetFlags {
    /// ROUND_AUTO wins over ROUND_UP; neither means round down.
    pub fn round_mode(self) -> RoundMode {
        if self.contains(RateSetFlags::ROUND_AUTO) {
            RoundMode::Nearest
        } else if self.contains(RateSetFlags::ROUND_UP) {
            RoundMode::Up
        } else {
            RoundMode::Down
        }
    }
}

bitflags! {
    /// CLOCK_CONFIG_SET attributes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ConfigSetAttributes: u32 {
        const ENABLE = 1 << 0;
    }
}

impl ConfigSetAttributes {
    pub fn requested_state(self) -> ClockState {
        if self.contains(ConfigSetAttributes::ENABLE) {
            ClockState::Running
        } else {
            ClockState::Stopped
        }
    }
}

/// A decoded request. Flag words are kept raw so handlers can reject unknown bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    ProtocolVersion,
    ProtocolAttributes,
    ProtocolMessageAttributes { message_id: u32 },
    ClockAttributes { clock_id: u32 },
    DescribeRates { clock_id: u32, rate_index: u32 },
    RateSet { flags: u32, clock_id: u32, rate: u64 },
    RateGet { clock_id: u32 },
    ConfigSet { clock_id: u32, attributes: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "decode errors must be answered"]
pub enum DecodeError {
    UnknownMessage(u32),
    PayloadSize { expected: usize, actual: usize },
}

impl DecodeError {
    pub fn status(self) -> ScmiStatus {
        match self {
            DecodeError::UnknownMessage(_) => ScmiStatus::NotFound,
            DecodeError::PayloadSize { .. } => ScmiStatus::ProtocolError,
        }
    }
}

/// Validates the message id and payload size.
pub fn message_id(raw: u32, payload: &[u8]) -> Result<MessageId, DecodeError> {
    let id = MessageId::from_raw(raw).ok_or(DecodeError::UnknownMessage(raw))?;
    if payload.len() != id.payload_size() {
        return Err(DecodeError::PayloadSize { expected: id.payload_size(), actual: payload.len() });
    }
    Ok(id)
}

/// Decodes a request whose size was validated by [`message_id`].
pub fn decode_request(id: MessageId, payload: &[u8]) -> Result<Request, DecodeError> {
    let size_err = DecodeError::PayloadSize { expected: id.payload_size(), actual: payload.len() };
    if payload.len() != id.payload_size() {
        return Err(size_err);
    }
    let word = |idx| read_word(payload, idx).ok_or(size_err);
    let req = match id {
        MessageId::ProtocolVersion => Request::ProtocolVersion,
        MessageId::ProtocolAttributes => Request::ProtocolAttributes,
        MessageId::ProtocolMessageAttributes => {
            Request::ProtocolMessageAttributes { message_id: word(0)? }
        }
        MessageId::ClockAttributes => Request::ClockAttributes { clock_id: word(0)? },
        MessageId::DescribeRates => {
            Request::DescribeRates { clock_id: word(0)?, rate_index: word(1)? }
        }
        MessageId::RateSet => Request::RateSet {
            flags: word(0)?,
            clock_id: word(1)?,
            rate: join_u64(word(2)?, word(3)?),
        },
        MessageId::RateGet => Request::RateGet { clock_id: word(0)? },
        MessageId::ConfigSet => Request::ConfigSet { clock_id: word(0)?, attributes: word(1)? },
    };
    Ok(req)
}

impl Request {
    /// Clock id used for resource permission checks, if the message addresses a clock.
    pub fn clock_id(&self) -> Option<u32> {
        match *self {
            Request::ProtocolVersion
            | Request::ProtocolAttributes
            | Request::ProtocolMessageAttributes { .. } => None,
            Request::ClockAttributes { clock_id }
            | Request::DescribeRates { clock_id, .. }
            | Request::RateSet { clock_id, .. }
            | Request::RateGet { clock_id }
            | Request::ConfigSet { clock_id, .. } => Some(clock_id),
        }
    }
}

/// Status mapping for HAL failures, shared by the synchronous and completion paths.
pub fn hal_error_status(err: HalError) -> ScmiStatus {
    match err {
        HalError::Unsupported => ScmiStatus::NotSupported,
        HalError::OutOfRange | HalError::InvalidParam => ScmiStatus::InvalidParameters,
        HalError::Busy | HalError::Hardware => ScmiStatus::GenericError,
    }
}

/// Largest fixed-shape response: status, attributes, name.
const RESPONSE_MAX: usize = 8 + CLOCK_NAME_LEN;

/// Encoded response with inline storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseFrame {
    buf: [u8; RESPONSE_MAX],
    len: usize,
}

impl ResponseFrame {
    fn build(f: impl FnOnce(&mut WordWriter<'_>)) -> Self {
        let mut buf = [0u8; RESPONSE_MAX];
        let len = {
            let mut w = WordWriter::new(&mut buf);
            f(&mut w);
            debug_assert!(!w.overflowed(), "response exceeds {RESPONSE_MAX} bytes");
            w.len()
        };
        Self { buf, len }
    }

    pub fn status(status: ScmiStatus) -> Self {
        Self::build(|w| {
            w.put(status.as_word());
        })
    }

    pub fn protocol_version() -> Self {
        Self::build(|w| {
            w.put(ScmiStatus::Success.as_word()).put(PROTOCOL_VERSION);
        })
    }

    pub fn protocol_attributes(max_pending_transactions: u8, clock_count: usize) -> Self {
        let attributes = ((max_pending_transactions as u32) << MAX_PENDING_SHIFT)
            | (clock_count as u32 & CLOCK_COUNT_MASK);
        Self::build(|w| {
            w.put(ScmiStatus::Success.as_word()).put(attributes);
        })
    }

    pub fn message_attributes(attributes: u32) -> Self {
        Self::build(|w| {
            w.put(ScmiStatus::Success.as_word()).put(attributes);
        })
    }

    /// CLOCK_ATTRIBUTES: bit 0 = enabled; name truncated and NUL-padded to 16 bytes.
    pub fn clock_attributes(state: ClockState, name: &str) -> Self {
        let mut name_buf = [0u8; CLOCK_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(CLOCK_NAME_LEN - 1);
        name_buf[..n].copy_from_slice(&bytes[..n]);
        Self::build(|w| {
            w.put(ScmiStatus::Success.as_word())
                .put(u32::from(state == ClockState::Running))
                .put_bytes(&name_buf);
        })
    }

    pub fn rate(rate: u64) -> Self {
        Self::build(|w| {
            w.put(ScmiStatus::Success.as_word()).put_u64(rate);
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
