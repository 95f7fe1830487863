use super::NetworkOrchestrator;
use crate::credentials::{CredentialIntake, ProvisioningCredentials};
use crate::status::NetworkStatus;
use crate::traits::{
    ApplicationCallback, CredentialStore, Cue, LedEffect, NotificationSink, ProvisioningTransport,
    WifiAssociator,
};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{mpsc, oneshot};

/// Side effects queued by transitions, executed strictly in queue order.
#[derive(Debug)]
pub(super) enum Notification {
    StatusChanged(NetworkStatus),
    OnlineChanged(bool),
    NetworkReady,
    Cue(Cue),
    Led(LedEffect),
    StatusByte(u8),
    /// Drop the station link and open the provisioning channel.
    OpenTransport { session: u64 },
    CloseTransport,
    PersistCredentials(ProvisioningCredentials),
    /// Acknowledged once everything queued before it has run.
    Flush(oneshot::Sender<()>),
}

pub(super) struct Dispatcher {
    pub(super) orchestrator: Weak<NetworkOrchestrator>,
    pub(super) intake: CredentialIntake,
    pub(super) callbacks: Arc<RwLock<Vec<Arc<dyn ApplicationCallback>>>>,
    pub(super) associator: Arc<dyn WifiAssociator>,
    pub(super) transport: Arc<dyn ProvisioningTransport>,
    pub(super) sink: Arc<dyn NotificationSink>,
    pub(super) store: Arc<dyn CredentialStore>,
}

impl Dispatcher {
    pub(super) async fn run(self, mut rx: mpsc::UnboundedReceiver<Notification>) {
        while let Some(notification) = rx.recv().await {
            tracing::trace!(?notification, "Dispatching");
            self.dispatch(notification).await;
        }
        tracing::debug!("Notification dispatcher stopped");
    }

    async fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::StatusChanged(status) => {
                for cb in self.snapshot() {
                    cb.status_changed(status);
                }
            }
            Notification::OnlineChanged(online) => {
                for cb in self.snapshot() {
                    cb.online_changed(online);
                }
            }
            Notification::NetworkReady => {
                for cb in self.snapshot() {
                    cb.network_ready();
                }
            }
            Notification::Cue(cue) => self.sink.play_cue(cue).await,
            Notification::Led(effect) => self.sink.set_led(effect).await,
            Notification::StatusByte(code) => {
                if let Err(e) = self.transport.send_status_byte(code).await {
                    tracing::warn!(code, error = %e, "Failed to send status byte");
                }
            }
            Notification::OpenTransport { session } => {
                if let Err(e) = self.associator.disconnect().await {
                    tracing::warn!(error = %e, "Failed to drop current Wi-Fi link");
                }
                if let Err(e) = self.transport.open(self.intake.clone()).await {
                    tracing::error!(session, error = %e, "Failed to open provisioning transport");
                    if let Some(orchestrator) = self.orchestrator.upgrade() {
                        orchestrator.on_transport_failed(session);
                    }
                }
            }
            Notification::CloseTransport => {
                if let Err(e) = self.transport.close().await {
                    tracing::warn!(error = %e, "Failed to close provisioning transport");
                }
            }
            Notification::PersistCredentials(credentials) => {
                if let Err(e) = self.store.persist(&credentials).await {
                    tracing::error!(ssid = %credentials.ssid, error = %e, "Failed to persist credentials marker");
                }
            }
            Notification::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn ApplicationCallback>> {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
