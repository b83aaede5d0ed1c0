// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host CLI: validates a clock topology file and prints the per-agent view.

use std::fmt::Write as _;
use std::path::Path;

use log::{error, info};

use crate::config::ClockConfig;

/// Returns the CLI usage string.
pub fn help() -> &'static str {
    "scmi-clock validates SCMI clock topologies. Usage: scmi-clock [--help] | check <config.toml>"
}

/// Executes the CLI using provided arguments.
pub fn execute(args: &[&str]) -> String {
    match args {
        [] => help().to_string(),
        _ if args.iter().any(|arg| *arg == "--help") => help().to_string(),
        ["check", path] => check(Path::new(path)),
        _ => format!("unknown arguments {args:?}\n{}", help()),
    }
}

/// Parses `std::env::args` and prints the execution result.
pub fn run() {
    let owned: Vec<String> = std::env::args().skip(1).collect();
    let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
    println!("{}", execute(&refs));
}

fn check(path: &Path) -> String {
    let config = match ClockConfig::load(path) {
        Ok(config) => config,
        Err(err) => {
            error!("scmi-clock: {err}");
            return format!("invalid: {err}");
        }
    };
    info!("scmi-clock: loaded {}", path.display());
    summary(&config)
}

fn summary(config: &ClockConfig) -> String {
    let mut out = format!(
        "ok: {} devices, {} agents, max_pending_transactions={}",
        config.device_count(),
        config.agent_count(),
        config.max_pending_transactions()
    );
    for (agent, view) in config.agents().iter().enumerate() {
        let _ = write!(out, "\nagent {agent} {}:", view.name());
        for (index, clock) in view.clocks().iter().enumerate() {
            let name = config.device_name(clock.device).unwrap_or("?");
            let state = if clock.starts_enabled { "on" } else { "off" };
            let _ = write!(out, " [{index}]={name}({state})");
        }
    }
    out
}
