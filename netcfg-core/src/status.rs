//! Status, operation type and event vocabulary of the state machine.

use crate::traits::AssociationOutcome;
use std::fmt;

/// Externally visible network configuration status.
///
/// Exactly one value is held by an orchestrator at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkStatus {
    ConfigStarted,
    Configuring,
    ConfigSucceeded,
    ConfigFailed,
    ConfigWrongKeyFailed,
    /// Steady-state online.
    LinkSucceeded,
    LinkFailed,
    RecoveryStart,
    RecoverySucceeded,
    RecoveryFailed,
    /// A phone attached to the provisioning channel, credentials pending.
    WaitLogin,
    /// Provisioning was stopped by the caller.
    ConfigExited,
}

impl NetworkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigStarted => "NETWORK_CONFIG_STARTED",
            Self::Configuring => "NETWORK_CONFIGING",
            Self::ConfigSucceeded => "NETWORK_CONFIG_SUCCEEDED",
            Self::ConfigFailed => "NETWORK_CONFIG_FAILED",
            Self::ConfigWrongKeyFailed => "NETWORK_CONFIG_WRONG_KEY_FAILED",
            Self::LinkSucceeded => "NETWORK_LINK_SUCCEEDED",
            Self::LinkFailed => "NETWORK_LINK_FAILED",
            Self::RecoveryStart => "NETWORK_RECOVERY_START",
            Self::RecoverySucceeded => "NETWORK_RECOVERY_SUCCEEDED",
            Self::RecoveryFailed => "NETWORK_RECOVERY_FAILED",
            Self::WaitLogin => "NETWORK_WAIT_LOGIN",
            Self::ConfigExited => "NETWORK_CONFIG_EXITED",
        }
    }

    /// Statuses a provisioning session can end in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ConfigSucceeded | Self::ConfigFailed | Self::ConfigExited
        )
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator is currently doing on behalf of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationType {
    #[default]
    Idle,
    /// Unattended provisioning entered at boot.
    AutoConfig,
    /// Provisioning triggered by the user (key press, app).
    ManualConfig,
    /// The automatic configuration loop gave up.
    AutoEnd,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::AutoConfig => "AUTO_CONFIG",
            Self::ManualConfig => "MANUAL_CONFIG",
            Self::AutoEnd => "AUTO_END",
        };
        f.write_str(s)
    }
}

/// Internal events fed into [`NetworkOrchestrator::notify_transition`].
///
/// [`NetworkOrchestrator::notify_transition`]: crate::NetworkOrchestrator::notify_transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    ConfigStarted,
    ConfigIng,
    WifiFailed,
    WifiWrongKeyFailed,
    LinkFailed,
    RouteFailed,
    ConfigExited,
    WifiSucceed,
    LinkSucceed,
    RecoveryStart,
    RecoverySucceed,
    RecoveryFailed,
    DeviceConnected,
    TransportFailed,
}

impl NotifyEvent {
    /// Fixed event → status table.
    ///
    /// `None` marks the link halves, whose effect depends on whether a
    /// provisioning session is open; the orchestrator resolves those.
    pub fn fixed_status(self) -> Option<NetworkStatus> {
        match self {
            Self::ConfigStarted => Some(NetworkStatus::ConfigStarted),
            Self::ConfigIng => Some(NetworkStatus::Configuring),
            Self::WifiFailed | Self::RouteFailed | Self::TransportFailed => {
                Some(NetworkStatus::ConfigFailed)
            }
            Self::WifiWrongKeyFailed => Some(NetworkStatus::ConfigWrongKeyFailed),
            Self::ConfigExited => Some(NetworkStatus::ConfigExited),
            Self::RecoveryStart => Some(NetworkStatus::RecoveryStart),
            Self::RecoverySucceed => Some(NetworkStatus::RecoverySucceeded),
            Self::RecoveryFailed => Some(NetworkStatus::RecoveryFailed),
            Self::DeviceConnected => Some(NetworkStatus::WaitLogin),
            Self::WifiSucceed | Self::LinkSucceed | Self::LinkFailed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigStarted => "ENetworkConfigStarted",
            Self::ConfigIng => "ENetworkConfigIng",
            Self::WifiFailed => "ENetworkWifiFailed",
            Self::WifiWrongKeyFailed => "ENetworkWifiWrongKeyFailed",
            Self::LinkFailed => "ENetworkLinkFailed",
            Self::RouteFailed => "ENetworkRouteFailed",
            Self::ConfigExited => "ENetworkConfigExited",
            Self::WifiSucceed => "ENetworkWifiSucceed",
            Self::LinkSucceed => "ENetworkLinkSucceed",
            Self::RecoveryStart => "ENetworkRecoveryStart",
            Self::RecoverySucceed => "ENetworkRecoverySucceed",
            Self::RecoveryFailed => "ENetworkRecoveryFailed",
            Self::DeviceConnected => "ENetworkDeviceConnected",
            Self::TransportFailed => "ENetworkTransportFailed",
        }
    }
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half of the Wi-Fi + internet join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSignal {
    /// Completion of a `WifiAssociator::connect` call for the given attempt.
    Association {
        attempt: u64,
        outcome: AssociationOutcome,
    },
    /// Edge reported by the reachability monitor.
    Reachability(bool),
}

impl LinkSignal {
    pub fn event(self) -> NotifyEvent {
        match self {
            Self::Association { outcome, .. } => match outcome {
                AssociationOutcome::Success => NotifyEvent::WifiSucceed,
                AssociationOutcome::Failure => NotifyEvent::WifiFailed,
                AssociationOutcome::WrongKey => NotifyEvent::WifiWrongKeyFailed,
            },
            Self::Reachability(true) => NotifyEvent::LinkSucceed,
            Self::Reachability(false) => NotifyEvent::LinkFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_share_config_failed_but_wrong_key_is_distinct() {
        assert_eq!(
            NotifyEvent::WifiFailed.fixed_status(),
            Some(NetworkStatus::ConfigFailed)
        );
        assert_eq!(
            NotifyEvent::RouteFailed.fixed_status(),
            Some(NetworkStatus::ConfigFailed)
        );
        assert_eq!(
            NotifyEvent::WifiWrongKeyFailed.fixed_status(),
            Some(NetworkStatus::ConfigWrongKeyFailed)
        );
        assert_eq!(
            NetworkStatus::ConfigWrongKeyFailed.to_string(),
            "NETWORK_CONFIG_WRONG_KEY_FAILED"
        );
    }

    #[test]
    fn link_halves_are_resolved_by_the_orchestrator() {
        assert_eq!(NotifyEvent::WifiSucceed.fixed_status(), None);
        assert_eq!(NotifyEvent::LinkSucceed.fixed_status(), None);
        assert_eq!(NotifyEvent::LinkFailed.fixed_status(), None);
    }

    #[test]
    fn association_outcomes_map_to_wifi_events() {
        let wrong_key = LinkSignal::Association {
            attempt: 1,
            outcome: AssociationOutcome::WrongKey,
        };
        assert_eq!(wrong_key.event(), NotifyEvent::WifiWrongKeyFailed);
        assert_eq!(LinkSignal::Reachability(true).event(), NotifyEvent::LinkSucceed);
        assert_eq!(LinkSignal::Reachability(false).event(), NotifyEvent::LinkFailed);
    }

    #[test]
    fn only_session_closing_statuses_are_terminal() {
        assert!(NetworkStatus::ConfigSucceeded.is_terminal());
        assert!(NetworkStatus::ConfigExited.is_terminal());
        assert!(!NetworkStatus::ConfigWrongKeyFailed.is_terminal());
        assert!(!NetworkStatus::Configuring.is_terminal());
    }
}
