//! Non-fatal outcomes of the playback core.
//!
//! Nothing here aborts a session: every variant describes a request that was
//! declined or an event that was dropped, with state left consistent.

use crate::catalog::ItemId;
use crate::device::DeviceCommand;
use serde::Serialize;
use thiserror::Error;

/// Errors a device adapter reports for a rejected command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device refused the command (autoplay policy, unsupported source, ...)
    #[error("device rejected command: {0}")]
    Rejected(String),

    /// The device is gone
    #[error("device disconnected")]
    Disconnected,
}

/// Why a dispatched action did not change playback.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum Notice {
    /// The selector found nothing playable
    #[error("no playable candidate")]
    NoCandidate,

    /// The device adapter rejected a command; state was left untouched
    #[error("{command} failed: {reason}")]
    DeviceCommandFailed { command: DeviceCommand, reason: String },

    /// A device event referred to an item that is no longer current
    #[error("stale event for {got} (current: {expected:?})")]
    StaleEvent {
        expected: Option<ItemId>,
        got: ItemId,
    },
}

impl Notice {
    pub(crate) fn device_failure(command: DeviceCommand, err: &DeviceError) -> Self {
        Self::DeviceCommandFailed {
            command,
            reason: err.to_string(),
        }
    }

    /// Whether this notice should surface as a warning to the user.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::DeviceCommandFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_failure_carries_reason() {
        let notice = Notice::device_failure(DeviceCommand::Play, &DeviceError::Rejected("autoplay".into()));
        assert!(notice.is_warning());
        assert_eq!(notice.to_string(), "play failed: device rejected command: autoplay");
    }

    #[test]
    fn stale_and_empty_are_not_warnings() {
        assert!(!Notice::NoCandidate.is_warning());
        let stale = Notice::StaleEvent {
            expected: Some(ItemId(2)),
            got: ItemId(1),
        };
        assert!(!stale.is_warning());
        assert!(stale.to_string().contains("#1"));
    }
}
