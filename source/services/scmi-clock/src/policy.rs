// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Clock request policies (rate-set veto/rewrite, shared enable/disable)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + `tests/refcount.rs`
//!
//! Physical clocks can be shared by several agents. The reference-counting
//! policy tracks, per (agent, physical device), the last state the agent set
//! and, per physical device, how many agents hold it RUNNING. Only the first
//! holder's RUNNING request and the last holder's STOPPED request reach the HAL.
//!
//! INVARIANTS:
//! - `Pre` never mutates; `Post` is only invoked after the HAL applied the state
//! - Reference counts move by one per committed transition
//! - A STOPPED request while other agents still hold the clock is never forwarded

use log::{debug, warn};
use nexus_scmi::AgentId;
use thiserror::Error;

use crate::config::ClockConfig;
use crate::hal::{ClockDeviceId, ClockState, RoundMode};

/// Phase of a policy invocation relative to the HAL call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyCommit {
    /// Before dispatch: validate only.
    Pre,
    /// After the HAL completed successfully: commit bookkeeping.
    Post,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "a skipped request must not reach the HAL"]
pub enum PolicyDecision {
    /// Forward the request to the HAL.
    Proceed,
    /// Treat the request as already satisfied; answer success without touching the HAL.
    Skip,
}

/// Request identity handed to policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyContext {
    pub agent: AgentId,
    /// Agent-relative clock id.
    pub clock_index: u32,
    pub device: ClockDeviceId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid {requested:?} transition for agent {agent:?} on device {device:?} (refcount {refcount})")]
    InvalidState { agent: AgentId, device: ClockDeviceId, requested: ClockState, refcount: u32 },
    #[error("agent {agent:?} / device {device:?} outside the policy tables")]
    InvalidParam { agent: AgentId, device: ClockDeviceId },
    #[error("request rejected by policy")]
    Rejected,
}

/// Policy hooks consulted by the dispatcher.
pub trait ClockPolicy {
    /// Invoked once before a rate change is dispatched. May rewrite `rate` and `round`.
    fn rate_set(
        &mut self,
        ctx: &PolicyContext,
        rate: &mut u64,
        round: &mut RoundMode,
    ) -> Result<PolicyDecision, PolicyError> {
        let _ = (ctx, rate, round);
        Ok(PolicyDecision::Proceed)
    }

    /// Invoked `Pre` before a state change is dispatched and `Post` once the HAL applied it.
    fn config_set(
        &mut self,
        commit: PolicyCommit,
        ctx: &PolicyContext,
        state: &mut ClockState,
    ) -> Result<PolicyDecision, PolicyError>;
}

/// Reference-counted sharing of physical clocks between agents.
#[derive(Clone, Debug)]
pub struct RefCountPolicy {
    device_count: usize,
    /// Row-major `agent × device` table of the last state each agent set.
    agent_state: Vec<ClockState>,
    refcount: Vec<u32>,
}

impl RefCountPolicy {
    pub fn new(config: &ClockConfig) -> Self {
        let device_count = config.device_count();
        let mut policy = Self {
            device_count,
            agent_state: vec![ClockState::Stopped; config.agent_count() * device_count],
            refcount: vec![0; device_count],
        };
        for (agent, view) in config.agents().iter().enumerate() {
            for clock in view.clocks().iter().filter(|clock| clock.starts_enabled) {
                let cell = agent * device_count + clock.device.index();
                // An agent listing the same device twice still holds it once.
                if policy.agent_state[cell] == ClockState::Stopped {
                    policy.agent_state[cell] = ClockState::Running;
                    policy.refcount[clock.device.index()] += 1;
                }
            }
        }
        policy
    }

    pub fn hardware_refcount(&self, device: ClockDeviceId) -> Option<u32> {
        self.refcount.get(device.index()).copied()
    }

    pub fn agent_state(&self, agent: AgentId, device: ClockDeviceId) -> Option<ClockState> {
        self.cell(agent, device).map(|cell| self.agent_state[cell])
    }

    fn cell(&self, agent: AgentId, device: ClockDeviceId) -> Option<usize> {
        if device.index() >= self.device_count {
            return None;
        }
        let cell = agent.index().checked_mul(self.device_count)?.checked_add(device.index())?;
        (cell < self.agent_state.len()).then_some(cell)
    }
}

impl ClockPolicy for RefCountPolicy {
    fn config_set(
        &mut self,
        commit: PolicyCommit,
        ctx: &PolicyContext,
        state: &mut ClockState,
    ) -> Result<PolicyDecision, PolicyError> {
        let cell = self
            .cell(ctx.agent, ctx.device)
            .ok_or(PolicyError::InvalidParam { agent: ctx.agent, device: ctx.device })?;
        let dev = ctx.device.index();
        let refcount = self.refcount[dev];
        let invalid = PolicyError::InvalidState {
            agent: ctx.agent,
            device: ctx.device,
            requested: *state,
            refcount,
        };

        if self.agent_state[cell] == *state {
            return Ok(PolicyDecision::Skip);
        }

        match *state {
            ClockState::Running => {
                if refcount != 0 {
                    // Another agent already brought the clock up.
                    if commit == PolicyCommit::Post {
                        warn!("scmi-clock: {invalid}");
                        return Err(invalid);
                    }
                    debug!(
                        "scmi-clock: agent {} shares running device {} (refcount {refcount})",
                        ctx.agent.0, ctx.device.0
                    );
                    return Ok(PolicyDecision::Skip);
                }
                if commit == PolicyCommit::Post {
                    self.agent_state[cell] = ClockState::Running;
                    self.refcount[dev] += 1;
                }
            }
            ClockState::Stopped => {
                if refcount == 0 {
                    warn!(
                        "scmi-clock: invalid STOP request agent {} clock {} device {}",
                        ctx.agent.0, ctx.clock_index, ctx.device.0
                    );
                    return Err(invalid);
                }
                if refcount != 1 {
                    // Not the last holder: hardware stays up.
                    if commit == PolicyCommit::Post {
                        warn!("scmi-clock: {invalid}");
                        return Err(invalid);
                    }
                    debug!(
                        "scmi-clock: agent {} stop of shared device {} suppressed (refcount {refcount})",
                        ctx.agent.0, ctx.device.0
                    );
                    return Ok(PolicyDecision::Skip);
                }
                if commit == PolicyCommit::Post {
                    self.agent_state[cell] = ClockState::Stopped;
                    self.refcount[dev] -= 1;
                }
            }
        }
        Ok(PolicyDecision::Proceed)
    }
}
