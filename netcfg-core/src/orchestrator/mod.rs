//! Network configuration / recovery state machine.
//!
//! [`NetworkOrchestrator`] is the single owner of [`NetworkStatus`],
//! [`OperationType`] and the provisioning watchdog. All of them live behind
//! one mutex. Every side effect (callbacks, cues, LEDs, status bytes,
//! transport open/close) is queued while that mutex is held and executed in
//! order by a dispatcher task, so nothing ever runs under the lock.

mod dispatch;
mod provisioning;
mod recovery;
mod transition;

use crate::config::{AppConfig, ProvisioningConfig, RecoveryConfig};
use crate::credentials::{CredentialIntake, IntakeEvent, IntakeReceiver, ProvisioningCredentials};
use crate::reachability::ReachabilityMonitor;
use crate::status::{LinkSignal, NetworkStatus, NotifyEvent, OperationType};
use crate::traits::{
    ApplicationCallback, CredentialStore, NotificationSink, Pinger, ProvisioningTransport,
    WifiAssociator,
};
use dispatch::{Dispatcher, Notification};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub associator: Arc<dyn WifiAssociator>,
    pub transport: Arc<dyn ProvisioningTransport>,
    pub sink: Arc<dyn NotificationSink>,
    pub pinger: Arc<dyn Pinger>,
    pub store: Arc<dyn CredentialStore>,
}

/// One provisioning attempt, from start until success, failure or stop.
#[derive(Debug)]
struct Session {
    id: u64,
    /// Latest credential attempt; older association results are ignored.
    attempt: u64,
    credentials: Option<ProvisioningCredentials>,
    wifi_link: bool,
    net_link: bool,
    watchdog: Option<AbortHandle>,
}

#[derive(Debug)]
struct State {
    status: NetworkStatus,
    operation: OperationType,
    session: Option<Session>,
    next_session: u64,
    next_attempt: u64,
}

pub struct NetworkOrchestrator {
    weak_self: Weak<Self>,
    provisioning: ProvisioningConfig,
    recovery: RecoveryConfig,
    state: Mutex<State>,
    notifications: mpsc::UnboundedSender<Notification>,
    /// Shared with the transport; the draft is dropped at every session edge.
    intake: CredentialIntake,
    associator: Arc<dyn WifiAssociator>,
    store: Arc<dyn CredentialStore>,
    monitor: Arc<ReachabilityMonitor>,
    monitor_started: AtomicBool,
    reachability_tx: mpsc::UnboundedSender<bool>,
    callbacks: Arc<RwLock<Vec<Arc<dyn ApplicationCallback>>>>,
    recovering: AtomicBool,
    recovery_cancel: AtomicBool,
}

impl NetworkOrchestrator {
    /// Builds the orchestrator and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime. The reachability monitor is
    /// not started here; see [`start_recovery`](Self::start_recovery).
    pub fn spawn(config: &AppConfig, collaborators: Collaborators) -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (reach_tx, reach_rx) = mpsc::unbounded_channel();
        let (intake, intake_rx) = CredentialIntake::channel();
        let callbacks: Arc<RwLock<Vec<Arc<dyn ApplicationCallback>>>> = Arc::default();
        let monitor = Arc::new(ReachabilityMonitor::from_config(
            collaborators.pinger.clone(),
            &config.reachability,
        ));

        let this = Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            provisioning: config.provisioning.clone(),
            recovery: config.recovery.clone(),
            state: Mutex::new(State {
                status: NetworkStatus::LinkSucceeded,
                operation: OperationType::Idle,
                session: None,
                next_session: 0,
                next_attempt: 0,
            }),
            notifications: notify_tx,
            intake: intake.clone(),
            associator: collaborators.associator.clone(),
            store: collaborators.store.clone(),
            monitor,
            monitor_started: AtomicBool::new(false),
            reachability_tx: reach_tx,
            callbacks: callbacks.clone(),
            recovering: AtomicBool::new(false),
            recovery_cancel: AtomicBool::new(false),
        });

        let dispatcher = Dispatcher {
            orchestrator: Arc::downgrade(&this),
            intake,
            callbacks,
            associator: collaborators.associator,
            transport: collaborators.transport,
            sink: collaborators.sink,
            store: collaborators.store,
        };
        tokio::spawn(dispatcher.run(notify_rx));
        tokio::spawn(Self::intake_loop(Arc::downgrade(&this), intake_rx));
        tokio::spawn(Self::reachability_loop(Arc::downgrade(&this), reach_rx));

        this
    }

    /// Current status. Never blocks on I/O.
    pub fn status(&self) -> NetworkStatus {
        self.lock_state().status
    }

    pub fn operation_type(&self) -> OperationType {
        self.lock_state().operation
    }

    pub fn is_provisioning(&self) -> bool {
        self.lock_state().session.is_some()
    }

    /// Registers an observer for status / online / ready events.
    pub fn register_callback(&self, callback: Arc<dyn ApplicationCallback>) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    pub fn monitor(&self) -> &ReachabilityMonitor {
        &self.monitor
    }

    /// Starts the reachability monitor; later calls are no-ops.
    pub fn start_monitor(&self) {
        if self.monitor_started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(self.monitor.clone().run(self.reachability_tx.clone()));
    }

    /// Stops provisioning and any running recovery, then waits until the
    /// dispatcher has executed everything queued so far (transport close included).
    pub async fn shutdown(&self) {
        self.stop_recovery();
        self.stop_provisioning();
        let (done_tx, done_rx) = oneshot::channel();
        self.emit(Notification::Flush(done_tx));
        if done_rx.await.is_err() {
            tracing::warn!("Dispatcher stopped before shutdown completed");
        }
    }

    async fn intake_loop(weak: Weak<Self>, mut rx: IntakeReceiver) {
        while let Some(event) = rx.recv().await {
            let Some(this) = weak.upgrade() else { break };
            match event {
                IntakeEvent::DeviceConnected => this.notify_transition(NotifyEvent::DeviceConnected),
                IntakeEvent::Credentials(credentials) => this.on_credentials_received(credentials),
            }
        }
    }

    async fn reachability_loop(weak: Weak<Self>, mut rx: mpsc::UnboundedReceiver<bool>) {
        while let Some(online) = rx.recv().await {
            let Some(this) = weak.upgrade() else { break };
            this.on_association_result(LinkSignal::Reachability(online));
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            tracing::warn!("Notification dispatcher is gone");
        }
    }
}
