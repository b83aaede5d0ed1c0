// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: SCMI clock dispatcher and completion state machine
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: `tests/dispatch.rs`, `tests/refcount.rs`, `tests/policy.rs`, `tests/describe_rates.rs`
//!
//! Requests that touch a clock are accepted in two phases. `handle_message`
//! validates the request, claims the device's slot and queues a work item;
//! `process_next` runs the item against the HAL. A HAL call that returns
//! `Pending` keeps the slot busy until `handle_completion` receives the matching
//! notification. Every path answers the requester exactly once.
//!
//! INVARIANTS:
//! - At most one request in flight per physical device; contention is answered BUSY
//! - The slot is released in the same step that sends the final response
//! - The enable/disable policy is committed once, after the HAL applied the state

use std::collections::VecDeque;

use log::{debug, warn};
use nexus_scmi::{AllowAll, ProtocolId, Reply, ResourcePermissions, ScmiStatus, ScmiTransport};
use nexus_scmi::wire::split_u64;
use nexus_scmi::{ServiceId, TransportError};
use thiserror::Error;

use crate::config::ClockConfig;
use crate::hal::{
    ClockCompletion, ClockDeviceId, ClockHal, ClockState, Completion, CompletionValue, HalError,
    HalResult, RoundMode,
};
use crate::lookup::{resolve_agent, resolve_clock, ResolvedClock};
use crate::policy::{ClockPolicy, PolicyCommit, PolicyContext, PolicyDecision, RefCountPolicy};
use crate::protocol::{
    decode_request, hal_error_status, message_id, ConfigSetAttributes, MessageId, RateSetFlags,
    Request, ResponseFrame,
};
use crate::rates::{describe_rates, entry_capacity, DescribeError, DESCRIBE_RATES_HEADER_LEN};
use crate::tracker::{OperationSlot, RequestKind, RequestTracker, SlotOwner, TrackerError};

/// Deferred HAL operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkRequest {
    GetState,
    GetRate,
    SetRate { rate: u64, round: RoundMode },
    SetState { state: ClockState },
}

impl WorkRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            WorkRequest::GetState => RequestKind::GetState,
            WorkRequest::GetRate => RequestKind::GetRate,
            WorkRequest::SetRate { .. } => RequestKind::SetRate,
            WorkRequest::SetState { .. } => RequestKind::SetState,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub device: ClockDeviceId,
    pub request: WorkRequest,
}

/// Result of running one work item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Answered and released.
    Completed,
    /// The HAL will deliver a completion notification.
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("completion for device {0:?} without a request in flight")]
    Unsolicited(ClockDeviceId),
    #[error("completion for device {device:?} does not match the {kind:?} request in flight")]
    Mismatch { device: ClockDeviceId, kind: RequestKind },
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

fn value_matches(value: &CompletionValue, kind: RequestKind) -> bool {
    matches!(
        (value, kind),
        (CompletionValue::State(_), RequestKind::GetState)
            | (CompletionValue::Rate(_), RequestKind::GetRate)
            | (CompletionValue::Applied, RequestKind::SetRate | RequestKind::SetState)
    )
}

fn settle<V>(
    result: HalResult<V>,
    wrap: impl FnOnce(V) -> CompletionValue,
) -> Option<Result<CompletionValue, HalError>> {
    match result {
        Ok(Completion::Done(value)) => Some(Ok(wrap(value))),
        Ok(Completion::Pending) => None,
        Err(err) => Some(Err(err)),
    }
}

/// SCMI clock protocol handler.
pub struct ClockService<T, H, P = RefCountPolicy, R = AllowAll> {
    config: ClockConfig,
    transport: T,
    hal: H,
    policy: P,
    permissions: R,
    tracker: RequestTracker,
    work: VecDeque<WorkItem>,
}

impl<T: ScmiTransport, H: ClockHal> ClockService<T, H> {
    /// Handler with the reference-counting policy and no resource permissions.
    pub fn new(config: ClockConfig, transport: T, hal: H) -> Self {
        let policy = RefCountPolicy::new(&config);
        Self::with_parts(config, transport, hal, policy, AllowAll)
    }
}

impl<T, H, P, R> ClockService<T, H, P, R>
where
    T: ScmiTransport,
    H: ClockHal,
    P: ClockPolicy,
    R: ResourcePermissions,
{
    pub fn with_parts(config: ClockConfig, transport: T, hal: H, policy: P, permissions: R) -> Self {
        let tracker = RequestTracker::new(config.device_count());
        Self { config, transport, hal, policy, permissions, tracker, work: VecDeque::new() }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn is_busy(&self, device: ClockDeviceId) -> bool {
        self.tracker.slot(device).is_some()
    }

    pub fn in_flight(&self, device: ClockDeviceId) -> Option<&OperationSlot> {
        self.tracker.slot(device)
    }

    pub fn pending_work(&self) -> usize {
        self.work.len()
    }

    /// Entry point for an inbound clock protocol message.
    pub fn handle_message(
        &mut self,
        service: ServiceId,
        raw_message_id: u32,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let (id, request) = match message_id(raw_message_id, payload)
            .and_then(|id| decode_request(id, payload).map(|req| (id, req)))
        {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("scmi-clock: reject message {raw_message_id} from {service:?}: {err:?}");
                return self.respond_status(service, err.status());
            }
        };

        if !self.permitted(service, id, &request) {
            debug!("scmi-clock: {id:?} denied for {service:?}");
            return self.respond_status(service, ScmiStatus::Denied);
        }

        match request {
            Request::ProtocolVersion => {
                self.respond(service, &ResponseFrame::protocol_version())
            }
            Request::ProtocolAttributes => self.protocol_attributes(service),
            Request::ProtocolMessageAttributes { message_id } => {
                let frame = match MessageId::from_raw(message_id) {
                    Some(_) => ResponseFrame::message_attributes(0),
                    None => ResponseFrame::status(ScmiStatus::NotFound),
                };
                self.respond(service, &frame)
            }
            Request::ClockAttributes { clock_id } => {
                self.queue_for_clock(service, clock_id, WorkRequest::GetState)
            }
            Request::RateGet { clock_id } => {
                self.queue_for_clock(service, clock_id, WorkRequest::GetRate)
            }
            Request::RateSet { flags, clock_id, rate } => {
                self.rate_set(service, flags, clock_id, rate)
            }
            Request::ConfigSet { clock_id, attributes } => {
                self.config_set(service, clock_id, attributes)
            }
            Request::DescribeRates { clock_id, rate_index } => {
                self.describe_rates(service, clock_id, rate_index)
            }
        }
    }

    /// Runs the oldest queued work item against the HAL.
    pub fn process_next(&mut self) -> Option<Result<WorkOutcome, TransportError>> {
        let item = self.work.pop_front()?;
        Some(self.execute(item))
    }

    /// Runs every queued work item; returns how many were processed.
    pub fn run_pending(&mut self) -> Result<usize, TransportError> {
        let mut processed = 0;
        while let Some(result) = self.process_next() {
            result?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Finishes a request the HAL previously reported as pending.
    pub fn handle_completion(&mut self, completion: ClockCompletion) -> Result<(), CompletionError> {
        let device = completion.device;
        let slot = match self.tracker.slot(device) {
            Some(slot) if !self.work.iter().any(|item| item.device == device) => *slot,
            _ => {
                warn!("scmi-clock: unsolicited completion for device {}", device.0);
                return Err(CompletionError::Unsolicited(device));
            }
        };
        let mismatched = matches!(&completion.result, Ok(value) if !value_matches(value, slot.kind));
        self.finish(device, slot, completion.result)?;
        if mismatched {
            return Err(CompletionError::Mismatch { device, kind: slot.kind });
        }
        Ok(())
    }

    fn permitted(&self, service: ServiceId, id: MessageId, request: &Request) -> bool {
        let Ok(agent) = self.transport.agent_id(service) else {
            return false;
        };
        let protocol = ProtocolId::CLOCK.raw();
        match request.clock_id() {
            None => self.permissions.agent_has_protocol_permission(agent, protocol),
            Some(clock_id) => {
                self.permissions.agent_has_resource_permission(agent, protocol, id.raw(), clock_id)
            }
        }
    }

    fn protocol_attributes(&mut self, service: ServiceId) -> Result<(), TransportError> {
        let frame = match resolve_agent(&self.config, &self.transport, service) {
            Ok((_, view)) => ResponseFrame::protocol_attributes(
                self.config.max_pending_transactions(),
                view.clock_count(),
            ),
            Err(err) => {
                debug!("scmi-clock: protocol attributes for {service:?}: {err}");
                ResponseFrame::status(ScmiStatus::GenericError)
            }
        };
        self.respond(service, &frame)
    }

    fn rate_set(
        &mut self,
        service: ServiceId,
        flags: u32,
        clock_id: u32,
        rate: u64,
    ) -> Result<(), TransportError> {
        let Some(flags) = RateSetFlags::from_bits(flags) else {
            return self.respond_status(service, ScmiStatus::InvalidParameters);
        };
        let clock = match resolve_clock(&self.config, &self.transport, service, clock_id) {
            Ok(clock) => clock,
            Err(_) => return self.respond_status(service, ScmiStatus::NotFound),
        };
        if flags.contains(RateSetFlags::ASYNC) {
            return self.respond_status(service, ScmiStatus::NotSupported);
        }

        let mut rate = rate;
        let mut round = flags.round_mode();
        match self.policy.rate_set(&policy_context(&clock), &mut rate, &mut round) {
            Ok(PolicyDecision::Proceed) => {}
            Ok(PolicyDecision::Skip) => return self.respond_status(service, ScmiStatus::Success),
            Err(err) => {
                debug!("scmi-clock: rate set rejected: {err}");
                return self.respond_status(service, ScmiStatus::GenericError);
            }
        }
        self.queue(service, clock, WorkRequest::SetRate { rate, round })
    }

    fn config_set(
        &mut self,
        service: ServiceId,
        clock_id: u32,
        attributes: u32,
    ) -> Result<(), TransportError> {
        let Some(attributes) = ConfigSetAttributes::from_bits(attributes) else {
            return self.respond_status(service, ScmiStatus::InvalidParameters);
        };
        let clock = match resolve_clock(&self.config, &self.transport, service, clock_id) {
            Ok(clock) => clock,
            Err(_) => return self.respond_status(service, ScmiStatus::NotFound),
        };

        let mut state = attributes.requested_state();
        match self.policy.config_set(PolicyCommit::Pre, &policy_context(&clock), &mut state) {
            Ok(PolicyDecision::Proceed) => {}
            Ok(PolicyDecision::Skip) => return self.respond_status(service, ScmiStatus::Success),
            Err(err) => {
                debug!("scmi-clock: config set rejected: {err}");
                return self.respond_status(service, ScmiStatus::GenericError);
            }
        }
        self.queue(service, clock, WorkRequest::SetState { state })
    }

    fn describe_rates(
        &mut self,
        service: ServiceId,
        clock_id: u32,
        rate_index: u32,
    ) -> Result<(), TransportError> {
        let clock = match resolve_clock(&self.config, &self.transport, service, clock_id) {
            Ok(clock) => clock,
            Err(_) => return self.respond_status(service, ScmiStatus::NotFound),
        };
        let device = clock.record.device;
        let Ok(max_payload) = self.transport.max_payload_size(service) else {
            return self.respond_status(service, ScmiStatus::GenericError);
        };
        let info = match self.hal.get_info(device) {
            Ok(info) => info,
            Err(err) => {
                debug!("scmi-clock: get_info({}) failed: {err}", device.0);
                return self.respond_status(service, ScmiStatus::GenericError);
            }
        };

        let hal = &self.hal;
        let page = match describe_rates(info.range, rate_index, entry_capacity(max_payload), |i| {
            hal.get_rate_from_index(device, i)
        }) {
            Ok(page) => page,
            Err(DescribeError::OutOfRange { .. }) => {
                return self.respond_status(service, ScmiStatus::OutOfRange)
            }
            Err(err) => {
                debug!("scmi-clock: describe rates for device {}: {err}", device.0);
                return self.respond_status(service, ScmiStatus::GenericError);
            }
        };

        let mut entries = Vec::with_capacity(page.entries_len());
        for &rate in &page.rates {
            let (low, high) = split_u64(rate);
            entries.extend_from_slice(&low.to_le_bytes());
            entries.extend_from_slice(&high.to_le_bytes());
        }
        let mut header = [0u8; DESCRIBE_RATES_HEADER_LEN];
        header[..4].copy_from_slice(&ScmiStatus::Success.as_word().to_le_bytes());
        header[4..].copy_from_slice(&page.num_rates_flags().to_le_bytes());

        let staged = self
            .transport
            .write_payload(service, DESCRIBE_RATES_HEADER_LEN, &entries)
            .and_then(|()| self.transport.write_payload(service, 0, &header));
        if let Err(err) = staged {
            debug!("scmi-clock: staging describe rates failed: {err}");
            return self.respond_status(service, ScmiStatus::GenericError);
        }
        self.transport.respond(
            service,
            Reply::Staged { len: DESCRIBE_RATES_HEADER_LEN + page.entries_len() },
        )
    }

    fn queue_for_clock(
        &mut self,
        service: ServiceId,
        clock_id: u32,
        request: WorkRequest,
    ) -> Result<(), TransportError> {
        match resolve_clock(&self.config, &self.transport, service, clock_id) {
            Ok(clock) => self.queue(service, clock, request),
            Err(err) => {
                debug!("scmi-clock: clock {clock_id} for {service:?}: {err}");
                self.respond_status(service, ScmiStatus::NotFound)
            }
        }
    }

    /// Claims the device slot and queues the HAL call; contention is answered BUSY.
    fn queue(
        &mut self,
        service: ServiceId,
        clock: ResolvedClock,
        request: WorkRequest,
    ) -> Result<(), TransportError> {
        let device = clock.record.device;
        let owner = SlotOwner { service, agent: clock.agent, clock_index: clock.index };
        let target_state = match request {
            WorkRequest::SetState { state } => Some(state),
            _ => None,
        };
        match self.tracker.acquire(device, owner, request.kind(), target_state) {
            Ok(()) => {
                self.work.push_back(WorkItem { device, request });
                Ok(())
            }
            Err(TrackerError::Busy(_)) => self.respond_status(service, ScmiStatus::Busy),
            Err(err @ TrackerError::UnknownDevice(_)) => {
                warn!("scmi-clock: {err}");
                self.respond_status(service, ScmiStatus::GenericError)
            }
        }
    }

    fn execute(&mut self, item: WorkItem) -> Result<WorkOutcome, TransportError> {
        let device = item.device;
        let Some(slot) = self.tracker.slot(device).copied() else {
            warn!("scmi-clock: work item for idle device {}", device.0);
            return Ok(WorkOutcome::Completed);
        };
        let settled = match item.request {
            WorkRequest::GetState => settle(self.hal.get_state(device), CompletionValue::State),
            WorkRequest::GetRate => settle(self.hal.get_rate(device), CompletionValue::Rate),
            WorkRequest::SetRate { rate, round } => {
                settle(self.hal.set_rate(device, rate, round), |()| CompletionValue::Applied)
            }
            WorkRequest::SetState { state } => {
                settle(self.hal.set_state(device, state), |()| CompletionValue::Applied)
            }
        };
        match settled {
            Some(result) => {
                self.finish(device, slot, result)?;
                Ok(WorkOutcome::Completed)
            }
            None => {
                debug!("scmi-clock: device {} {:?} pending", device.0, slot.kind);
                Ok(WorkOutcome::Pending)
            }
        }
    }

    /// Answers the slot owner and releases the slot.
    fn finish(
        &mut self,
        device: ClockDeviceId,
        slot: OperationSlot,
        result: Result<CompletionValue, HalError>,
    ) -> Result<(), TransportError> {
        let frame = match result {
            Err(err) => {
                debug!("scmi-clock: device {} {:?} failed: {err}", device.0, slot.kind);
                ResponseFrame::status(hal_error_status(err))
            }
            Ok(value) if !value_matches(&value, slot.kind) => {
                warn!(
                    "scmi-clock: device {} completed {value:?} for a {:?} request",
                    device.0, slot.kind
                );
                ResponseFrame::status(ScmiStatus::GenericError)
            }
            Ok(CompletionValue::State(state)) => {
                ResponseFrame::clock_attributes(state, self.config.device_name(device).unwrap_or(""))
            }
            Ok(CompletionValue::Rate(rate)) => ResponseFrame::rate(rate),
            Ok(CompletionValue::Applied) => {
                if slot.kind == RequestKind::SetState {
                    self.commit_state(device, &slot);
                }
                ResponseFrame::status(ScmiStatus::Success)
            }
        };
        self.tracker.release(device);
        self.respond(slot.owner.service, &frame)
    }

    fn commit_state(&mut self, device: ClockDeviceId, slot: &OperationSlot) {
        let Some(mut state) = slot.target_state else {
            warn!("scmi-clock: set-state slot for device {} lost its target", device.0);
            return;
        };
        let ctx = PolicyContext {
            agent: slot.owner.agent,
            clock_index: slot.owner.clock_index,
            device,
        };
        if let Err(err) = self.policy.config_set(PolicyCommit::Post, &ctx, &mut state) {
            warn!("scmi-clock: post-commit for device {}: {err}", device.0);
        }
    }

    fn respond(&mut self, service: ServiceId, frame: &ResponseFrame) -> Result<(), TransportError> {
        self.transport.respond(service, Reply::Bytes(frame.as_slice()))
    }

    fn respond_status(&mut self, service: ServiceId, status: ScmiStatus) -> Result<(), TransportError> {
        self.respond(service, &ResponseFrame::status(status))
    }
}

fn policy_context(clock: &ResolvedClock) -> PolicyContext {
    PolicyContext { agent: clock.agent, clock_index: clock.index, device: clock.record.device }
}
