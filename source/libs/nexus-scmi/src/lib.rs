// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: SCMI plumbing shared by protocol handlers (status words, ids, collaborator traits)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (host) + proptest word helpers
//!
//! PUBLIC API: ScmiStatus, ProtocolId, ServiceId, AgentId, ScmiTransport, Reply,
//!             ResourcePermissions, AllowAll, wire helpers
//! DEPENDS_ON: thiserror
//!
//! INVARIANTS:
//! - Status words are encoded as the two's complement of the signed SCMI status
//! - Collaborator traits never panic on unknown services; they return errors

#![forbid(unsafe_code)]

pub mod transport;
pub mod wire;

pub use transport::{AllowAll, Reply, ResourcePermissions, ScmiTransport, TransportError};

/// SCMI protocol identifier as carried in the message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ProtocolId(pub u8);

impl ProtocolId {
    pub const CLOCK: ProtocolId = ProtocolId(0x14);

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Opaque identity of the transport channel a message arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ServiceId(pub u32);

/// Index of a configured agent (OSPM, PSCI, secure world, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AgentId(pub u32);

impl AgentId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// SCMI status codes returned in the first word of every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ScmiStatus {
    Success = 0,
    NotSupported = -1,
    InvalidParameters = -2,
    Denied = -3,
    NotFound = -4,
    OutOfRange = -5,
    Busy = -6,
    CommsError = -7,
    GenericError = -8,
    HardwareError = -9,
    ProtocolError = -10,
}

impl ScmiStatus {
    /// Raw 32-bit word as placed on the wire.
    #[inline]
    pub const fn as_word(self) -> u32 {
        self as i32 as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        let status = match word as i32 {
            0 => ScmiStatus::Success,
            -1 => ScmiStatus::NotSupported,
            -2 => ScmiStatus::InvalidParameters,
            -3 => ScmiStatus::Denied,
            -4 => ScmiStatus::NotFound,
            -5 => ScmiStatus::OutOfRange,
            -6 => ScmiStatus::Busy,
            -7 => ScmiStatus::CommsError,
            -8 => ScmiStatus::GenericError,
            -9 => ScmiStatus::HardwareError,
            -10 => ScmiStatus::ProtocolError,
            _ => return None,
        };
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_words_are_twos_complement() {
        assert_eq!(ScmiStatus::Success.as_word(), 0);
        assert_eq!(ScmiStatus::NotSupported.as_word(), 0xFFFF_FFFF);
        assert_eq!(ScmiStatus::ProtocolError.as_word(), 0xFFFF_FFF6);
    }

    #[test]
    fn status_word_decode() {
        for status in [
            ScmiStatus::Success,
            ScmiStatus::InvalidParameters,
            ScmiStatus::Denied,
            ScmiStatus::NotFound,
            ScmiStatus::OutOfRange,
            ScmiStatus::Busy,
            ScmiStatus::GenericError,
            ScmiStatus::ProtocolError,
        ] {
            assert_eq!(ScmiStatus::from_word(status.as_word()), Some(status));
        }
        assert_eq!(ScmiStatus::from_word(7), None);
    }

    #[test]
    fn clock_protocol_id() {
        assert_eq!(ProtocolId::CLOCK.raw(), 0x14);
    }
}
