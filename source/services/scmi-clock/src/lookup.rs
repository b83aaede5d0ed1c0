// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resolution of (service, agent-relative clock id) pairs to clock device records.

use nexus_scmi::{AgentId, ScmiTransport, ServiceId, TransportError};
use thiserror::Error;

use crate::config::{AgentView, ClockConfig, ClockDeviceRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("agent unresolved: {0}")]
    NotFound(#[from] TransportError),
    #[error("agent {0:?} is not configured")]
    InvalidParam(AgentId),
    #[error("clock {index} out of range ({count} clocks)")]
    OutOfRange { index: u32, count: usize },
}

/// A clock resolved for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedClock {
    pub agent: AgentId,
    /// Agent-relative clock id as sent on the wire.
    pub index: u32,
    pub record: ClockDeviceRecord,
}

pub fn resolve_agent<'c, T: ScmiTransport>(
    config: &'c ClockConfig,
    transport: &T,
    service: ServiceId,
) -> Result<(AgentId, &'c AgentView), LookupError> {
    let agent = transport.agent_id(service)?;
    let view = config.agent(agent.index()).ok_or(LookupError::InvalidParam(agent))?;
    Ok((agent, view))
}

pub fn resolve_clock<T: ScmiTransport>(
    config: &ClockConfig,
    transport: &T,
    service: ServiceId,
    index: u32,
) -> Result<ResolvedClock, LookupError> {
    let (agent, view) = resolve_agent(config, transport, service)?;
    let record = view
        .clock(index)
        .copied()
        .ok_or(LookupError::OutOfRange { index, count: view.clock_count() })?;
    Ok(ResolvedClock { agent, index, record })
}
