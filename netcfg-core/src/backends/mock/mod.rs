//! In-memory collaborators for tests and for running the daemon on a desktop.
//!
//! Every mock records what the orchestrator asked of it and can be steered
//! from the outside (outcomes, delays, reachability).

use crate::credentials::{CredentialIntake, ProvisioningCredentials};
use crate::status::NetworkStatus;
use crate::traits::{
    ApplicationCallback, AssociationOutcome, CredentialStore, Cue, LedEffect, NotificationSink,
    PingReply, Pinger, ProvisioningTransport, WifiAssociator,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ============= WifiAssociator =============

/// Associator whose outcome and latency are set by the test.
#[derive(Debug)]
pub struct MockAssociator {
    outcome: Mutex<AssociationOutcome>,
    delay: Mutex<Duration>,
    connects: Mutex<Vec<ProvisioningCredentials>>,
    disconnects: AtomicUsize,
    radio: Mutex<Vec<bool>>,
}

impl MockAssociator {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(AssociationOutcome::Success),
            delay: Mutex::new(Duration::ZERO),
            connects: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            radio: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: AssociationOutcome) {
        *lock(&self.outcome) = outcome;
    }

    /// Simulated association + DHCP time.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    pub fn connects(&self) -> Vec<ProvisioningCredentials> {
        lock(&self.connects).clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn radio_history(&self) -> Vec<bool> {
        lock(&self.radio).clone()
    }
}

impl Default for MockAssociator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WifiAssociator for MockAssociator {
    async fn connect(&self, credentials: &ProvisioningCredentials) -> Result<AssociationOutcome> {
        tracing::info!(ssid = %credentials.ssid, "[MockAssociator] connect");
        lock(&self.connects).push(credentials.clone());
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(*lock(&self.outcome))
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_radio_enabled(&self, enabled: bool) -> Result<()> {
        lock(&self.radio).push(enabled);
        Ok(())
    }
}

// ============= Pinger =============

/// Pinger answering from a reachability table instead of the network.
#[derive(Debug, Default)]
pub struct MockPinger {
    reachable: AtomicBool,
    failing: AtomicBool,
    hosts: Mutex<HashMap<IpAddr, bool>>,
    requested: Mutex<Vec<IpAddr>>,
}

impl MockPinger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default answer for hosts without an override.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_host_reachable(&self, host: IpAddr, reachable: bool) {
        lock(&self.hosts).insert(host, reachable);
    }

    /// Makes every echo fail with a socket error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requested_hosts(&self) -> Vec<IpAddr> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl Pinger for MockPinger {
    async fn echo(
        &self,
        destination: IpAddr,
        sequence: u16,
        _timeout: Duration,
    ) -> Result<Option<PingReply>> {
        lock(&self.requested).push(destination);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Icmp("simulated socket error".into()));
        }
        let reachable = lock(&self.hosts)
            .get(&destination)
            .copied()
            .unwrap_or_else(|| self.reachable.load(Ordering::SeqCst));
        Ok(reachable.then(|| PingReply {
            destination,
            sequence,
            rtt: Duration::from_millis(12),
            ttl: Some(64),
        }))
    }
}

// ============= ProvisioningTransport =============

/// Transport that keeps the intake handle so tests can play the phone app.
#[derive(Debug, Default)]
pub struct MockTransport {
    intake: Mutex<Option<CredentialIntake>>,
    fail_open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    status_bytes: Mutex<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Handle given by the most recent `open`.
    pub fn intake(&self) -> Option<CredentialIntake> {
        lock(&self.intake).clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.intake).is_some()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn status_bytes(&self) -> Vec<u8> {
        lock(&self.status_bytes).clone()
    }
}

#[async_trait]
impl ProvisioningTransport for MockTransport {
    async fn open(&self, intake: CredentialIntake) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Transport("simulated open failure".into()));
        }
        *lock(&self.intake) = Some(intake);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        lock(&self.intake).take();
        Ok(())
    }

    async fn send_status_byte(&self, code: u8) -> Result<()> {
        lock(&self.status_bytes).push(code);
        Ok(())
    }
}

// ============= NotificationSink =============

#[derive(Debug, Default)]
pub struct RecordingSink {
    cues: Mutex<Vec<Cue>>,
    leds: Mutex<Vec<LedEffect>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        lock(&self.cues).clone()
    }

    pub fn count(&self, cue: Cue) -> usize {
        lock(&self.cues).iter().filter(|c| **c == cue).count()
    }

    pub fn leds(&self) -> Vec<LedEffect> {
        lock(&self.leds).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn play_cue(&self, cue: Cue) {
        lock(&self.cues).push(cue);
    }

    async fn set_led(&self, effect: LedEffect) {
        lock(&self.leds).push(effect);
    }
}

// ============= ApplicationCallback =============

/// Callback that records every event and lets tests wait for a status.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    statuses: Mutex<Vec<NetworkStatus>>,
    online: Mutex<Vec<bool>>,
    ready: AtomicUsize,
    changed: Notify,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<NetworkStatus> {
        lock(&self.statuses).clone()
    }

    pub fn online(&self) -> Vec<bool> {
        lock(&self.online).clone()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    /// Waits until `status` has been delivered, up to `timeout`.
    pub async fn wait_for(&self, status: NetworkStatus, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if self.statuses().contains(&status) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl ApplicationCallback for RecordingCallback {
    fn status_changed(&self, status: NetworkStatus) {
        lock(&self.statuses).push(status);
        self.changed.notify_waiters();
    }

    fn online_changed(&self, online: bool) {
        lock(&self.online).push(online);
        self.changed.notify_waiters();
    }

    fn network_ready(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}

// ============= CredentialStore =============

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    configured: AtomicBool,
    persisted: Mutex<Vec<String>>,
}

impl MemoryCredentialStore {
    pub fn new(configured: bool) -> Self {
        Self {
            configured: AtomicBool::new(configured),
            persisted: Mutex::new(Vec::new()),
        }
    }

    pub fn persisted(&self) -> Vec<String> {
        lock(&self.persisted).clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn has_credentials(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn persist(&self, credentials: &ProvisioningCredentials) -> Result<()> {
        lock(&self.persisted).push(credentials.ssid.clone());
        self.configured.store(true, Ordering::SeqCst);
        Ok(())
    }
}
