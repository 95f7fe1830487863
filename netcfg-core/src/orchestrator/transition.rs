//! The central transition function and the Wi-Fi + internet AND-join.

use super::dispatch::Notification;
use super::{NetworkOrchestrator, State};
use crate::status::{LinkSignal, NetworkStatus, NotifyEvent, OperationType};
use crate::traits::{Cue, LedEffect, STATUS_BYTE_FAILURE, STATUS_BYTE_SUCCESS};

impl NetworkOrchestrator {
    /// Feeds one internal event into the state machine.
    ///
    /// When the resulting status equals the current one nothing is emitted.
    pub fn notify_transition(&self, event: NotifyEvent) {
        let mut st = self.lock_state();
        self.apply(&mut st, event);
    }

    /// Entry point for both halves of the join: association completions and
    /// reachability edges.
    pub fn on_association_result(&self, signal: LinkSignal) {
        let mut st = self.lock_state();
        match signal {
            LinkSignal::Association { attempt, outcome } => {
                let current = st.session.as_ref().map(|s| s.attempt);
                if current != Some(attempt) {
                    tracing::debug!(attempt, ?current, ?outcome, "Dropping stale association result");
                    return;
                }
                tracing::info!(attempt, ?outcome, "Association finished");
            }
            LinkSignal::Reachability(online) => self.emit(Notification::OnlineChanged(online)),
        }
        self.apply(&mut st, signal.event());
    }

    pub(super) fn apply(&self, st: &mut State, event: NotifyEvent) {
        tracing::debug!(%event, status = %st.status, op = %st.operation, "Network event");
        match event {
            NotifyEvent::WifiSucceed => match st.session.as_mut() {
                Some(session) => {
                    session.wifi_link = true;
                    // 关联成功后立即重新探测外网
                    self.start_monitor();
                    self.monitor.kick();
                    self.try_join(st);
                }
                None => tracing::debug!("Association succeeded outside a provisioning session"),
            },
            NotifyEvent::LinkSucceed => match st.session.as_mut() {
                Some(session) => {
                    session.net_link = true;
                    self.try_join(st);
                }
                None => {
                    self.set_status(st, NetworkStatus::LinkSucceeded);
                }
            },
            NotifyEvent::LinkFailed => match st.session.as_mut() {
                Some(session) => session.net_link = false,
                None => {
                    self.set_status(st, NetworkStatus::LinkFailed);
                }
            },
            NotifyEvent::RecoveryStart | NotifyEvent::RecoverySucceed | NotifyEvent::RecoveryFailed
                if st.session.is_some() =>
            {
                tracing::info!(%event, "Ignoring recovery event during provisioning");
            }
            NotifyEvent::DeviceConnected if st.session.is_none() => {
                tracing::debug!("Peer connected while not provisioning");
            }
            _ => {
                if let Some(status) = event.fixed_status() {
                    if self.set_status(st, status) {
                        self.feedback(st, event);
                    }
                }
            }
        }
    }

    /// Updates the status and queues the status callback. Returns whether it changed.
    fn set_status(&self, st: &mut State, status: NetworkStatus) -> bool {
        if st.status == status {
            tracing::trace!(%status, "Status unchanged, transition suppressed");
            return false;
        }
        tracing::info!(from = %st.status, to = %status, "Network status changed");
        st.status = status;
        self.emit(Notification::StatusChanged(status));
        true
    }

    /// Cue, LED, status byte and side effect of a transition that happened.
    fn feedback(&self, st: &mut State, event: NotifyEvent) {
        match event {
            NotifyEvent::ConfigStarted => {
                let cue = if st.operation == OperationType::AutoConfig {
                    Cue::ProvisioningStartedAuto
                } else {
                    Cue::ProvisioningStartedManual
                };
                self.emit(Notification::Cue(cue));
                self.emit(Notification::Led(LedEffect::Provisioning));
            }
            NotifyEvent::DeviceConnected => self.emit(Notification::Cue(Cue::DeviceConnected)),
            NotifyEvent::ConfigIng => {
                self.emit(Notification::Cue(Cue::Connecting));
                self.emit(Notification::Led(LedEffect::Connecting));
            }
            NotifyEvent::WifiFailed => {
                let cue = if st.operation == OperationType::AutoConfig {
                    st.operation = OperationType::AutoEnd;
                    Cue::AutoConfigFailed
                } else {
                    Cue::WifiFailed
                };
                self.emit_failure(st, cue);
            }
            // 密码错误与 OperationType 无关
            NotifyEvent::WifiWrongKeyFailed => self.emit_failure(st, Cue::WrongKey),
            NotifyEvent::RouteFailed => self.emit_failure(st, Cue::RouteFailed),
            NotifyEvent::TransportFailed => {
                self.emit(Notification::Cue(Cue::WifiFailed));
                self.emit(Notification::Led(LedEffect::Failed));
            }
            NotifyEvent::ConfigExited => {
                self.emit(Notification::Cue(Cue::ProvisioningExited));
                self.emit(Notification::Led(LedEffect::Off));
            }
            NotifyEvent::RecoveryStart => {
                self.emit(Notification::Cue(Cue::RecoveryStarted));
                self.emit(Notification::Led(LedEffect::Connecting));
            }
            NotifyEvent::RecoverySucceed => {
                self.emit(Notification::Cue(Cue::RecoverySucceeded));
                self.emit(Notification::Led(LedEffect::Online));
                self.emit(Notification::NetworkReady);
            }
            NotifyEvent::RecoveryFailed => {
                self.emit(Notification::Cue(Cue::RecoveryFailed));
                self.emit(Notification::Led(LedEffect::Failed));
            }
            NotifyEvent::WifiSucceed | NotifyEvent::LinkSucceed | NotifyEvent::LinkFailed => {}
        }
    }

    fn emit_failure(&self, st: &State, cue: Cue) {
        self.emit(Notification::Cue(cue));
        self.emit(Notification::Led(LedEffect::Failed));
        if st.session.is_some() {
            self.emit(Notification::StatusByte(STATUS_BYTE_FAILURE));
        }
    }

    /// Declares success once both halves arrived, then closes the session.
    fn try_join(&self, st: &mut State) {
        let Some(session) = st.session.as_ref() else {
            return;
        };
        if !(session.wifi_link && session.net_link) {
            tracing::debug!(
                wifi = session.wifi_link,
                net = session.net_link,
                "Waiting for the other half of the link"
            );
            return;
        }
        let credentials = session.credentials.clone();

        self.set_status(st, NetworkStatus::ConfigSucceeded);
        self.emit(Notification::Cue(Cue::LinkSucceeded));
        self.emit(Notification::Led(LedEffect::Online));
        self.emit(Notification::StatusByte(STATUS_BYTE_SUCCESS));
        if let Some(credentials) = credentials {
            self.emit(Notification::PersistCredentials(credentials));
        }
        st.operation = OperationType::Idle;
        self.close_session(st);
        self.emit(Notification::NetworkReady);
    }

    /// Disarms the watchdog and tears the provisioning channel down.
    pub(super) fn close_session(&self, st: &mut State) {
        if let Some(session) = st.session.take() {
            if let Some(watchdog) = session.watchdog {
                watchdog.abort();
            }
            self.intake.reset();
            tracing::info!(session = session.id, "Provisioning session closed");
            self.emit(Notification::CloseTransport);
        }
    }
}
