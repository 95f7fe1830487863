//! Provisioning sessions: start/stop, credential intake and the watchdog.

use super::dispatch::Notification;
use super::{NetworkOrchestrator, Session};
use crate::credentials::ProvisioningCredentials;
use crate::status::{LinkSignal, NotifyEvent, OperationType};
use crate::traits::AssociationOutcome;
use std::time::Duration;
use tokio::task::AbortHandle;

impl NetworkOrchestrator {
    /// User-triggered provisioning guarded by a watchdog of `timeout`.
    ///
    /// Ignored while a session is already running. Transport failures are
    /// reported asynchronously as `ConfigFailed`.
    pub fn start_provisioning(&self, timeout: Duration) {
        self.begin_session(OperationType::ManualConfig, timeout);
    }

    /// Ends the current session, if any, and makes sure the transport is closed.
    pub fn stop_provisioning(&self) {
        let mut st = self.lock_state();
        if st.session.is_some() {
            tracing::info!("Stopping provisioning");
            self.apply(&mut st, NotifyEvent::ConfigExited);
            self.close_session(&mut st);
        } else {
            self.emit(Notification::CloseTransport);
        }
        st.operation = OperationType::Idle;
    }

    pub(super) fn begin_session(&self, operation: OperationType, timeout: Duration) -> bool {
        let mut st = self.lock_state();
        if let Some(session) = &st.session {
            tracing::warn!(session = session.id, "Provisioning already running, ignoring start");
            return false;
        }
        st.next_session += 1;
        let id = st.next_session;
        tracing::info!(
            session = id,
            %operation,
            timeout_secs = timeout.as_secs(),
            "Starting provisioning"
        );
        st.session = Some(Session {
            id,
            attempt: 0,
            credentials: None,
            wifi_link: false,
            net_link: false,
            watchdog: Some(self.arm_watchdog(id, timeout)),
        });
        st.operation = operation;
        self.intake.reset();
        self.apply(&mut st, NotifyEvent::ConfigStarted);
        self.emit(Notification::OpenTransport { session: id });
        true
    }

    /// Called by the credential intake once a full set arrived.
    pub fn on_credentials_received(&self, credentials: ProvisioningCredentials) {
        let attempt = {
            let mut st = self.lock_state();
            if st.session.is_none() {
                tracing::warn!(ssid = %credentials.ssid, "Credentials received while not provisioning, dropped");
                return;
            }
            st.next_attempt += 1;
            let attempt = st.next_attempt;
            if let Some(session) = st.session.as_mut() {
                session.attempt = attempt;
                session.credentials = Some(credentials.clone());
                session.wifi_link = false;
                session.net_link = false;
            }
            tracing::info!(attempt, ?credentials, "Credentials received");
            self.apply(&mut st, NotifyEvent::ConfigIng);
            attempt
        };

        let associator = self.associator.clone();
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            let outcome = match associator.connect(&credentials).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(ssid = %credentials.ssid, error = %e, "Association could not run");
                    AssociationOutcome::Failure
                }
            };
            if let Some(this) = weak.upgrade() {
                this.on_association_result(LinkSignal::Association { attempt, outcome });
            }
        });
    }

    pub(super) fn on_transport_failed(&self, session_id: u64) {
        let mut st = self.lock_state();
        if st.session.as_ref().map(|s| s.id) != Some(session_id) {
            return;
        }
        self.apply(&mut st, NotifyEvent::TransportFailed);
        self.close_session(&mut st);
    }

    fn arm_watchdog(&self, session_id: u64, timeout: Duration) -> AbortHandle {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(this) = weak.upgrade() {
                this.on_watchdog_fired(session_id);
            }
        })
        .abort_handle()
    }

    /// Whoever takes the lock first, watchdog or success, closes the
    /// session; the other finds no matching session and is dropped.
    fn on_watchdog_fired(&self, session_id: u64) {
        let mut st = self.lock_state();
        let Some(session) = st.session.as_ref().filter(|s| s.id == session_id) else {
            tracing::debug!(session = session_id, "Watchdog fired for a closed session");
            return;
        };
        let event = if session.wifi_link {
            NotifyEvent::RouteFailed
        } else {
            NotifyEvent::WifiFailed
        };
        tracing::warn!(session = session_id, %event, "Provisioning watchdog expired");
        self.apply(&mut st, event);
        st.operation = OperationType::AutoEnd;
        self.close_session(&mut st);
    }
}
