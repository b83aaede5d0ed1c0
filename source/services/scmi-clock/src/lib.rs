// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! CONTEXT: scmi-clock – SCMI clock management protocol handler
//!
//! OWNERS: @firmware
//!
//! STATUS: Experimental
//!
//! API_STABILITY: Unstable
//!
//! TEST_COVERAGE:
//!   - Unit tests: per-module `#[cfg(test)]` blocks (wire decode, pagination, refcount policy, tracker)
//!   - Integration: `tests/dispatch.rs`, `tests/refcount.rs`, `tests/describe_rates.rs`
//!
//! PUBLIC API:
//!   - `ClockService`: message dispatch, deferred HAL work, completion handling
//!   - `ClockHal`: hardware contract (sync or pending completion)
//!   - `ClockPolicy` / `RefCountPolicy`: enable/disable sharing between agents
//!   - `ClockConfig`: validated clock topology (TOML-loadable)
//!   - `cli`: `scmi-clock check <config.toml>`
//!
//! Transport, agent identity and resource permissions come from `nexus-scmi`.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod hal;
pub mod lookup;
pub mod policy;
pub mod protocol;
pub mod rates;
pub mod tracker;

pub use cli::{execute, help, run};
pub use config::{AgentView, ClockConfig, ClockDeviceRecord, ConfigError};
pub use dispatch::{ClockService, CompletionError, WorkItem, WorkOutcome, WorkRequest};
pub use hal::{
    ClockCompletion, ClockDeviceId, ClockHal, ClockInfo, ClockState, Completion,
    CompletionValue, HalError, HalResult, RateRange, RoundMode,
};
pub use policy::{
    ClockPolicy, PolicyCommit, PolicyContext, PolicyDecision, PolicyError, RefCountPolicy,
};
pub use protocol::{MessageId, PROTOCOL_VERSION};
