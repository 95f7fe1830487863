use crate::credentials::{CredentialIntake, ProvisioningCredentials};
use crate::status::NetworkStatus;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

// 在这里定义核心所依赖的所有外部协作者接口。

/// Status byte sent back over the provisioning channel when configuration succeeded.
pub const STATUS_BYTE_SUCCESS: u8 = 1;
/// Status byte sent back over the provisioning channel on any failure.
pub const STATUS_BYTE_FAILURE: u8 = 2;

/// Result of one association attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationOutcome {
    Success,
    Failure,
    /// The access point rejected the passphrase.
    WrongKey,
}

/// Drives the supplicant to join a network.
#[async_trait]
pub trait WifiAssociator: Send + Sync {
    /// Joins the given network. May block for tens of seconds (association + DHCP).
    ///
    /// An `Err` means the attempt could not be carried out at all and is
    /// treated like [`AssociationOutcome::Failure`].
    async fn connect(&self, credentials: &ProvisioningCredentials)
        -> crate::Result<AssociationOutcome>;

    /// Drops the current station link.
    async fn disconnect(&self) -> crate::Result<()>;

    /// Turns the Wi-Fi radio on or off.
    async fn set_radio_enabled(&self, enabled: bool) -> crate::Result<()>;
}

/// A single ICMP echo measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct PingReply {
    pub destination: IpAddr,
    pub sequence: u16,
    pub rtt: Duration,
    pub ttl: Option<u8>,
}

/// Raw ICMP echo primitive used by the reachability probe.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Sends one echo request and waits up to `timeout` for its reply.
    ///
    /// `Ok(None)` means no reply arrived in time.
    async fn echo(
        &self,
        destination: IpAddr,
        sequence: u16,
        timeout: Duration,
    ) -> crate::Result<Option<PingReply>>;
}

/// Channel over which the companion app delivers credentials (BLE, soft-AP, TCP, UDP).
#[async_trait]
pub trait ProvisioningTransport: Send + Sync {
    /// Opens the channel. Credentials and connection events are pushed into `intake`.
    async fn open(&self, intake: CredentialIntake) -> crate::Result<()>;

    /// Closes the channel. Closing an already closed channel is not an error.
    async fn close(&self) -> crate::Result<()>;

    /// Sends a single status byte to the connected peer.
    async fn send_status_byte(&self, code: u8) -> crate::Result<()>;
}

/// Audio cues played by the speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    ProvisioningStartedAuto,
    ProvisioningStartedManual,
    DeviceConnected,
    Connecting,
    LinkSucceeded,
    WifiFailed,
    AutoConfigFailed,
    WrongKey,
    RouteFailed,
    ProvisioningExited,
    RecoveryStarted,
    RecoverySucceeded,
    RecoveryFailed,
}

/// LED effects requested by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedEffect {
    /// Waiting for credentials.
    Provisioning,
    /// Association in progress.
    Connecting,
    /// Network up.
    Online,
    /// Any failure.
    Failed,
    Off,
}

impl LedEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Failed => "failed",
            Self::Off => "off",
        }
    }
}

/// Audio + LED feedback.
///
/// Both calls are "fire and forget" and should not block the dispatcher for long.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn play_cue(&self, cue: Cue);

    async fn set_led(&self, effect: LedEffect);
}

/// Public event interface for the embedding application.
///
/// Callbacks run on the orchestrator's dispatcher task, never under its lock,
/// so they may call back into [`NetworkOrchestrator::status`].
///
/// [`NetworkOrchestrator::status`]: crate::NetworkOrchestrator::status
pub trait ApplicationCallback: Send + Sync {
    fn status_changed(&self, _status: NetworkStatus) {}

    fn online_changed(&self, _online: bool) {}

    /// Configuration completed and the internet is reachable.
    fn network_ready(&self) {}
}

/// Persisted marker telling whether the device was ever configured.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn has_credentials(&self) -> bool;

    async fn persist(&self, credentials: &ProvisioningCredentials) -> crate::Result<()>;
}
