// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Collaborator contracts consumed by SCMI protocol handlers
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//!
//! The transport decides which protocol owns a message and delivers it; protocol
//! handlers only see the narrow surface below. Permission decisions are made by
//! a separate oracle so that builds without resource permissions can plug in
//! [`AllowAll`].

use crate::{AgentId, ServiceId};

/// Errors reported by the transport layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("unknown service {0:?}")]
    UnknownService(ServiceId),
    #[error("payload write out of bounds (offset {offset}, len {len})")]
    OutOfBounds { offset: usize, len: usize },
    #[error("no message in flight on service {0:?}")]
    NoMessage(ServiceId),
}

/// Response body handed back to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    /// The full response payload, status word first.
    Bytes(&'a [u8]),
    /// The response was staged with [`ScmiTransport::write_payload`]; send its first `len` bytes.
    Staged { len: usize },
}

/// Message delivery surface provided to a protocol handler.
pub trait ScmiTransport {
    /// Resolves the agent that owns `service`.
    fn agent_id(&self, service: ServiceId) -> Result<AgentId, TransportError>;

    /// Largest response payload (in bytes) the channel of `service` can carry.
    fn max_payload_size(&self, service: ServiceId) -> Result<usize, TransportError>;

    /// Stages `bytes` at `offset` in the outgoing payload of `service`.
    fn write_payload(
        &mut self,
        service: ServiceId,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Completes the in-flight message on `service`.
    fn respond(&mut self, service: ServiceId, reply: Reply<'_>) -> Result<(), TransportError>;
}

/// Binary allow/deny oracle keyed by agent and resource.
pub trait ResourcePermissions {
    fn agent_has_protocol_permission(&self, agent: AgentId, protocol: u8) -> bool;

    fn agent_has_resource_permission(
        &self,
        agent: AgentId,
        protocol: u8,
        message_id: u32,
        resource_id: u32,
    ) -> bool;
}

/// Permission oracle for builds without resource permissions.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl ResourcePermissions for AllowAll {
    fn agent_has_protocol_permission(&self, _agent: AgentId, _protocol: u8) -> bool {
        true
    }

    fn agent_has_resource_permission(
        &self,
        _agent: AgentId,
        _protocol: u8,
        _message_id: u32,
        _resource_id: u32,
    ) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolId;

    #[test]
    fn allow_all_allows() {
        let perms = AllowAll;
        assert!(perms.agent_has_protocol_permission(AgentId(3), ProtocolId::CLOCK.raw()));
        assert!(perms.agent_has_resource_permission(AgentId(3), ProtocolId::CLOCK.raw(), 5, 99));
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::OutOfBounds { offset: 128, len: 8 };
        assert_eq!(err.to_string(), "payload write out of bounds (offset 128, len 8)");
    }
}
