// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport, clock HAL and permission doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use nexus_scmi::{AgentId, Reply, ResourcePermissions, ScmiStatus, ScmiTransport, ServiceId};
use nexus_scmi::TransportError;
use scmi_clock::{
    AgentView, ClockConfig, ClockDeviceId, ClockDeviceRecord, ClockHal, ClockInfo, ClockPolicy,
    ClockService, ClockState, Completion, HalError, HalResult, RateRange, RefCountPolicy,
    RoundMode,
};

pub const CPU: ClockDeviceId = ClockDeviceId(0);
pub const GPU: ClockDeviceId = ClockDeviceId(1);
pub const DDR: ClockDeviceId = ClockDeviceId(2);

/// Services 0..n map to agents 0..n unless remapped.
pub struct MockTransport {
    agents: HashMap<u32, u32>,
    pub max_payload: usize,
    staging: Vec<u8>,
    pub responses: Vec<(ServiceId, Vec<u8>)>,
}

impl MockTransport {
    pub fn new(services: &[(u32, u32)], max_payload: usize) -> Self {
        Self {
            agents: services.iter().copied().collect(),
            max_payload,
            staging: Vec::new(),
            responses: Vec::new(),
        }
    }

    pub fn take(&mut self) -> Vec<(ServiceId, Vec<u8>)> {
        std::mem::take(&mut self.responses)
    }
}

impl ScmiTransport for MockTransport {
    fn agent_id(&self, service: ServiceId) -> Result<AgentId, TransportError> {
        self.agents.get(&service.0).copied().map(AgentId).ok_or(TransportError::UnknownService(service))
    }

    fn max_payload_size(&self, service: ServiceId) -> Result<usize, TransportError> {
        self.agent_id(service).map(|_| self.max_payload)
    }

    fn write_payload(
        &mut self,
        service: ServiceId,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.agent_id(service)?;
        let end = offset + bytes.len();
        if end > self.max_payload {
            return Err(TransportError::OutOfBounds { offset, len: bytes.len() });
        }
        if self.staging.len() < end {
            self.staging.resize(end, 0);
        }
        self.staging[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn respond(&mut self, service: ServiceId, reply: Reply<'_>) -> Result<(), TransportError> {
        let body = match reply {
            Reply::Bytes(bytes) => bytes.to_vec(),
            Reply::Staged { len } => {
                let body = self.staging.get(..len).ok_or(TransportError::NoMessage(service))?;
                body.to_vec()
            }
        };
        self.staging.clear();
        self.responses.push((service, body));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalCall {
    GetState(ClockDeviceId),
    GetRate(ClockDeviceId),
    SetRate(ClockDeviceId, u64, RoundMode),
    SetState(ClockDeviceId, ClockState),
}

pub struct MockDevice {
    pub state: ClockState,
    pub rate: u64,
    pub range: RateRange,
    pub rates: Vec<u64>,
}

/// Clock HAL double. Devices in `deferred` answer `Pending`; `fail` injects an error.
pub struct MockHal {
    pub devices: Vec<MockDevice>,
    pub deferred: HashSet<ClockDeviceId>,
    pub fail: Option<HalError>,
    pub calls: Vec<HalCall>,
}

impl MockHal {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self { devices, deferred: HashSet::new(), fail: None, calls: Vec::new() }
    }

    pub fn state_changes(&self) -> usize {
        self.calls.iter().filter(|call| matches!(call, HalCall::SetState(..))).count()
    }

    fn device(&mut self, device: ClockDeviceId) -> Result<&mut MockDevice, HalError> {
        self.devices.get_mut(device.index()).ok_or(HalError::InvalidParam)
    }

    fn finish<T>(&mut self, device: ClockDeviceId, value: T) -> HalResult<T> {
        if let Some(err) = self.fail.take() {
            return Err(err);
        }
        if self.deferred.contains(&device) {
            return Ok(Completion::Pending);
        }
        Ok(Completion::Done(value))
    }
}

impl ClockHal for MockHal {
    fn get_state(&mut self, device: ClockDeviceId) -> HalResult<ClockState> {
        self.calls.push(HalCall::GetState(device));
        let state = self.device(device)?.state;
        self.finish(device, state)
    }

    fn get_rate(&mut self, device: ClockDeviceId) -> HalResult<u64> {
        self.calls.push(HalCall::GetRate(device));
        let rate = self.device(device)?.rate;
        self.finish(device, rate)
    }

    fn set_rate(&mut self, device: ClockDeviceId, rate: u64, round: RoundMode) -> HalResult<()> {
        self.calls.push(HalCall::SetRate(device, rate, round));
        let fail = self.fail.is_some();
        let dev = self.device(device)?;
        if !fail {
            dev.rate = rate;
        }
        self.finish(device, ())
    }

    fn set_state(&mut self, device: ClockDeviceId, state: ClockState) -> HalResult<()> {
        self.calls.push(HalCall::SetState(device, state));
        let fail = self.fail.is_some();
        let dev = self.device(device)?;
        if !fail {
            dev.state = state;
        }
        self.finish(device, ())
    }

    fn get_info(&self, device: ClockDeviceId) -> Result<ClockInfo, HalError> {
        let dev = self.devices.get(device.index()).ok_or(HalError::InvalidParam)?;
        Ok(ClockInfo { range: dev.range })
    }

    fn get_rate_from_index(&self, device: ClockDeviceId, index: u32) -> Result<u64, HalError> {
        let dev = self.devices.get(device.index()).ok_or(HalError::InvalidParam)?;
        dev.rates.get(index as usize).copied().ok_or(HalError::OutOfRange)
    }
}

/// Denies the listed (agent, clock id) pairs and, optionally, protocol access.
#[derive(Default)]
pub struct DenyList {
    pub protocol: HashSet<u32>,
    pub resources: HashSet<(u32, u32)>,
}

impl ResourcePermissions for DenyList {
    fn agent_has_protocol_permission(&self, agent: AgentId, _protocol: u8) -> bool {
        !self.protocol.contains(&agent.0)
    }

    fn agent_has_resource_permission(
        &self,
        agent: AgentId,
        _protocol: u8,
        _message_id: u32,
        resource_id: u32,
    ) -> bool {
        !self.protocol.contains(&agent.0) && !self.resources.contains(&(agent.0, resource_id))
    }
}

/// Three devices, three agents:
/// - agent 0 "psci": [CPU (on)]
/// - agent 1 "ospm": [GPU, CPU (on), DDR]
/// - agent 2 "mcp":  [CPU]
pub fn topology() -> ClockConfig {
    ClockConfig::new(
        4,
        vec!["CPU_CLK".into(), "GPU_CLK".into(), "DDR_CLK".into()],
        vec![
            AgentView::new("psci", vec![ClockDeviceRecord::enabled(CPU)]),
            AgentView::new(
                "ospm",
                vec![
                    ClockDeviceRecord::new(GPU),
                    ClockDeviceRecord::enabled(CPU),
                    ClockDeviceRecord::new(DDR),
                ],
            ),
            AgentView::new("mcp", vec![ClockDeviceRecord::new(CPU)]),
        ],
    )
    .expect("valid topology")
}

pub fn devices() -> Vec<MockDevice> {
    vec![
        MockDevice {
            state: ClockState::Running,
            rate: 1_200_000_000,
            range: RateRange::Discrete { rate_count: 10 },
            rates: (1..=10).map(|i| i * 200_000_000).collect(),
        },
        MockDevice {
            state: ClockState::Stopped,
            rate: 500_000_000,
            range: RateRange::Linear { min: 100_000_000, max: 5_000_000_000, step: 100_000_000 },
            rates: Vec::new(),
        },
        MockDevice {
            state: ClockState::Stopped,
            rate: 800_000_000,
            range: RateRange::Discrete { rate_count: 0 },
            rates: Vec::new(),
        },
    ]
}

/// Services 10, 11, 12 belong to agents 0, 1, 2; service 99 belongs to unconfigured agent 7.
pub fn transport(max_payload: usize) -> MockTransport {
    MockTransport::new(&[(10, 0), (11, 1), (12, 2), (99, 7)], max_payload)
}

pub type Service<P = RefCountPolicy, R = DenyList> = ClockService<MockTransport, MockHal, P, R>;

pub fn service_with(max_payload: usize, deny: DenyList) -> Service {
    let config = topology();
    let policy = RefCountPolicy::new(&config);
    ClockService::with_parts(config, transport(max_payload), MockHal::new(devices()), policy, deny)
}

pub fn service() -> Service {
    service_with(128, DenyList::default())
}

/// Same topology and devices with a caller-provided policy.
pub fn service_with_policy<P: ClockPolicy>(policy: P) -> Service<P> {
    ClockService::with_parts(
        topology(),
        transport(128),
        MockHal::new(devices()),
        policy,
        DenyList::default(),
    )
}

pub const PSCI: ServiceId = ServiceId(10);
pub const OSPM: ServiceId = ServiceId(11);
pub const MCP: ServiceId = ServiceId(12);
pub const STRANGER: ServiceId = ServiceId(99);
pub const UNBOUND: ServiceId = ServiceId(404);

pub fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn word(body: &[u8], idx: usize) -> u32 {
    let at = idx * 4;
    u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
}

pub fn status(body: &[u8]) -> ScmiStatus {
    ScmiStatus::from_word(word(body, 0)).expect("known status")
}

/// Sends a message, drains the work queue and returns the single response it produced.
pub fn call<P, R>(
    svc: &mut Service<P, R>,
    service: ServiceId,
    message_id: u32,
    payload: &[u8],
) -> Vec<u8>
where
    P: ClockPolicy,
    R: ResourcePermissions,
{
    svc.handle_message(service, message_id, payload).expect("transport");
    svc.run_pending().expect("transport");
    let mut out = svc.transport_mut().take();
    assert_eq!(out.len(), 1, "expected exactly one response, got {out:?}");
    let (to, body) = out.remove(0);
    assert_eq!(to, service);
    body
}

pub fn config_set<P, R>(svc: &mut Service<P, R>, service: ServiceId, clock_id: u32, enable: bool) -> ScmiStatus
where
    P: ClockPolicy,
    R: ResourcePermissions,
{
    status(&call(svc, service, 7, &words(&[clock_id, u32::from(enable)])))
}
