use super::NetworkOrchestrator;
use crate::status::{NotifyEvent, OperationType};
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl NetworkOrchestrator {
    /// Boot-time recovery.
    ///
    /// Without a credentials marker this enters unattended provisioning.
    /// Otherwise the stored network is given `recovery.retries` reachability
    /// probes to come up. The monitor loop is started afterwards in both cases.
    pub fn start_recovery(&self) {
        if self.recovering.swap(true, Ordering::SeqCst) {
            tracing::warn!("Recovery already running");
            return;
        }
        self.recovery_cancel.store(false, Ordering::SeqCst);
        let Some(this) = self.weak_self.upgrade() else {
            self.recovering.store(false, Ordering::SeqCst);
            return;
        };
        tokio::spawn(async move {
            this.run_recovery().await;
            this.recovering.store(false, Ordering::SeqCst);
            this.start_monitor();
        });
    }

    /// Asks a running recovery to stop before its next probe.
    pub fn stop_recovery(&self) {
        if self.recovering.load(Ordering::SeqCst) {
            tracing::info!("Cancelling recovery");
        }
        self.recovery_cancel.store(true, Ordering::SeqCst);
    }

    async fn run_recovery(self: &Arc<Self>) {
        if let Err(e) = self.associator.set_radio_enabled(true).await {
            tracing::warn!(error = %e, "Failed to enable Wi-Fi radio");
        }

        if !self.store.has_credentials().await {
            tracing::info!("No stored credentials, entering automatic provisioning");
            self.begin_session(
                OperationType::AutoConfig,
                self.provisioning.auto_config_timeout(),
            );
            return;
        }

        self.notify_transition(NotifyEvent::RecoveryStart);
        let retries = self.recovery.retries.max(1);
        for attempt in 1..=retries {
            if self.recovery_cancel.load(Ordering::SeqCst) {
                tracing::info!(attempt, "Recovery cancelled");
                return;
            }
            if self.monitor.probe_handle().check().await {
                tracing::info!(attempt, "Network recovered");
                self.notify_transition(NotifyEvent::RecoverySucceed);
                return;
            }
            tracing::debug!(attempt, retries, "Network not reachable yet");
            if attempt < retries {
                tokio::time::sleep(self.recovery.interval()).await;
            }
        }

        if self.recovery_cancel.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(retries, "Network recovery failed");
        self.notify_transition(NotifyEvent::RecoveryFailed);
    }
}
