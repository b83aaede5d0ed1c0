// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-physical-device request tracker (single outstanding request per device)
//! OWNERS: @firmware
//! STATUS: Experimental
//! API_STABILITY: Internal
//!
//! INVARIANTS:
//! - Exactly one slot per physical device
//! - An owned slot is only released by `release`; a failed `acquire` leaves it untouched

use log::debug;
use nexus_scmi::{AgentId, ServiceId};
use thiserror::Error;

use crate::hal::{ClockDeviceId, ClockState};

/// Kind of deferred work a slot is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    GetState,
    GetRate,
    SetRate,
    SetState,
}

/// Owner of an in-flight request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotOwner {
    pub service: ServiceId,
    pub agent: AgentId,
    /// Agent-relative clock id of the request.
    pub clock_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationSlot {
    pub owner: SlotOwner,
    pub kind: RequestKind,
    /// Requested state for `SetState`; `None` for every other kind.
    pub target_state: Option<ClockState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("device {0:?} has a request in flight")]
    Busy(ClockDeviceId),
    #[error("device {0:?} is not tracked")]
    UnknownDevice(ClockDeviceId),
}

pub struct RequestTracker {
    slots: Vec<Option<OperationSlot>>,
}

impl RequestTracker {
    pub fn new(device_count: usize) -> Self {
        Self { slots: vec![None; device_count] }
    }

    /// Unknown devices are never available.
    pub fn is_available(&self, device: ClockDeviceId) -> bool {
        matches!(self.slots.get(device.index()), Some(None))
    }

    pub fn acquire(
        &mut self,
        device: ClockDeviceId,
        owner: SlotOwner,
        kind: RequestKind,
        target_state: Option<ClockState>,
    ) -> Result<(), TrackerError> {
        let slot = self.slots.get_mut(device.index()).ok_or(TrackerError::UnknownDevice(device))?;
        if slot.is_some() {
            return Err(TrackerError::Busy(device));
        }
        *slot = Some(OperationSlot { owner, kind, target_state });
        debug!("scmi-clock: device {} busy ({:?} for {:?})", device.0, kind, owner.service);
        Ok(())
    }

    pub fn slot(&self, device: ClockDeviceId) -> Option<&OperationSlot> {
        self.slots.get(device.index()).and_then(Option::as_ref)
    }

    pub fn owner(&self, device: ClockDeviceId) -> Option<SlotOwner> {
        self.slot(device).map(|slot| slot.owner)
    }

    pub fn release(&mut self, device: ClockDeviceId) -> Option<OperationSlot> {
        let released = self.slots.get_mut(device.index()).and_then(Option::take);
        if released.is_some() {
            debug!("scmi-clock: device {} available", device.0);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(service: u32) -> SlotOwner {
        SlotOwner { service: ServiceId(service), agent: AgentId(service), clock_index: 0 }
    }

    #[test]
    fn acquire_release_cycle() {
        let mut tracker = RequestTracker::new(2);
        let dev = ClockDeviceId(1);
        assert!(tracker.is_available(dev));
        tracker.acquire(dev, owner(1), RequestKind::GetRate, None).unwrap();
        assert!(!tracker.is_available(dev));
        assert!(tracker.is_available(ClockDeviceId(0)));
        let slot = tracker.release(dev).unwrap();
        assert_eq!(slot.kind, RequestKind::GetRate);
        assert!(tracker.is_available(dev));
        assert_eq!(tracker.release(dev), None);
    }

    #[test]
    fn second_acquire_is_busy_and_keeps_first_owner() {
        let mut tracker = RequestTracker::new(1);
        let dev = ClockDeviceId(0);
        tracker.acquire(dev, owner(1), RequestKind::SetState, Some(ClockState::Running)).unwrap();
        assert_eq!(
            tracker.acquire(dev, owner(2), RequestKind::GetState, None),
            Err(TrackerError::Busy(dev))
        );
        assert_eq!(tracker.owner(dev), Some(owner(1)));
        let slot = tracker.slot(dev).unwrap();
        assert_eq!(slot.kind, RequestKind::SetState);
        assert_eq!(slot.target_state, Some(ClockState::Running));
        assert!(!tracker.is_available(dev));
    }

    #[test]
    fn unknown_device_is_never_available() {
        let mut tracker = RequestTracker::new(1);
        let dev = ClockDeviceId(4);
        assert!(!tracker.is_available(dev));
        assert_eq!(
            tracker.acquire(dev, owner(0), RequestKind::GetRate, None),
            Err(TrackerError::UnknownDevice(dev))
        );
    }
}
