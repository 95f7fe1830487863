//! Wi-Fi credentials and the handle transports use to hand them to the core.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Wi-Fi security of the target network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityType {
    #[serde(alias = "open")]
    None,
    Wep,
    #[serde(alias = "wpa", alias = "wpa2", alias = "WPA-PSK")]
    WpaPsk,
}

impl SecurityType {
    /// Open networks have no password; everything else defaults to WPA-PSK.
    pub fn infer(password: &str) -> Self {
        if password.is_empty() {
            Self::None
        } else {
            Self::WpaPsk
        }
    }
}

/// A complete credential set delivered by the companion app.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisioningCredentials {
    pub ssid: String,
    pub password: String,
    pub security: SecurityType,
    pub hidden: bool,
}

impl ProvisioningCredentials {
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        security: SecurityType,
        hidden: bool,
    ) -> Result<Self> {
        let ssid = ssid.into();
        if ssid.is_empty() {
            return Err(Error::InvalidCredentials("ssid must not be empty".into()));
        }
        Ok(Self {
            ssid,
            password: password.into(),
            security,
            hidden,
        })
    }
}

// 密码不能出现在日志中
impl fmt::Debug for ProvisioningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningCredentials")
            .field("ssid", &self.ssid)
            .field(
                "password",
                &if self.password.is_empty() { "(empty)" } else { "********" },
            )
            .field("security", &self.security)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Fields received so far, before the app sends "confirm".
#[derive(Debug, Default)]
struct CredentialDraft {
    ssid: Option<String>,
    password: Option<String>,
    security: Option<SecurityType>,
    hidden: bool,
}

impl CredentialDraft {
    fn finish(self) -> Result<ProvisioningCredentials> {
        let ssid = self.ssid.unwrap_or_default();
        let password = self.password.unwrap_or_default();
        let security = self
            .security
            .unwrap_or_else(|| SecurityType::infer(&password));
        ProvisioningCredentials::new(ssid, password, security, self.hidden)
    }
}

/// Events a transport pushes into the orchestrator.
#[derive(Debug)]
pub enum IntakeEvent {
    /// A phone attached to the provisioning channel.
    DeviceConnected,
    Credentials(ProvisioningCredentials),
}

pub type IntakeReceiver = mpsc::UnboundedReceiver<IntakeEvent>;

/// Cloneable handle given to a [`ProvisioningTransport`] on open.
///
/// Fields may arrive one by one (BLE characteristics) and are consumed
/// exactly once by [`confirm`](Self::confirm), or as a whole via
/// [`submit`](Self::submit) (HTTP form).
///
/// [`ProvisioningTransport`]: crate::traits::ProvisioningTransport
#[derive(Debug, Clone)]
pub struct CredentialIntake {
    draft: Arc<Mutex<CredentialDraft>>,
    tx: mpsc::UnboundedSender<IntakeEvent>,
}

impl CredentialIntake {
    pub fn channel() -> (Self, IntakeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let intake = Self {
            draft: Arc::new(Mutex::new(CredentialDraft::default())),
            tx,
        };
        (intake, rx)
    }

    pub fn set_ssid(&self, ssid: impl Into<String>) {
        self.with_draft(|d| d.ssid = Some(ssid.into()));
    }

    pub fn set_password(&self, password: impl Into<String>) {
        self.with_draft(|d| d.password = Some(password.into()));
    }

    pub fn set_security(&self, security: SecurityType) {
        self.with_draft(|d| d.security = Some(security));
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.with_draft(|d| d.hidden = hidden);
    }

    /// Consumes the draft and forwards it. The draft is cleared even when
    /// validation fails.
    pub fn confirm(&self) -> Result<()> {
        let draft = {
            let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        self.submit(draft.finish()?)
    }

    /// Drops any half-filled draft. Called whenever a session opens or closes.
    pub fn reset(&self) {
        self.with_draft(|d| *d = CredentialDraft::default());
    }

    pub fn submit(&self, credentials: ProvisioningCredentials) -> Result<()> {
        self.send(IntakeEvent::Credentials(credentials))
    }

    pub fn device_connected(&self) -> Result<()> {
        self.send(IntakeEvent::DeviceConnected)
    }

    fn send(&self, event: IntakeEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Transport("credential intake closed".into()))
    }

    fn with_draft(&self, f: impl FnOnce(&mut CredentialDraft)) {
        let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_consumes_the_draft_once() {
        let (intake, mut rx) = CredentialIntake::channel();
        intake.set_ssid("HomeNet");
        intake.set_password("pw1234");
        intake.confirm().unwrap();

        match rx.try_recv().unwrap() {
            IntakeEvent::Credentials(c) => {
                assert_eq!(c.ssid, "HomeNet");
                assert_eq!(c.password, "pw1234");
                assert_eq!(c.security, SecurityType::WpaPsk);
                assert!(!c.hidden);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // 草稿已被清空，第二次确认缺少 SSID
        assert!(matches!(intake.confirm(), Err(Error::InvalidCredentials(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reset_discards_partial_fields_for_every_clone() {
        let (intake, mut rx) = CredentialIntake::channel();
        let transport_side = intake.clone();
        transport_side.set_ssid("OldNet");
        transport_side.set_password("oldpw123");

        intake.reset();
        transport_side.set_password("newpw123");
        assert!(matches!(
            transport_side.confirm(),
            Err(Error::InvalidCredentials(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn open_network_is_inferred_from_empty_password() {
        let (intake, mut rx) = CredentialIntake::channel();
        intake.set_ssid("Cafe");
        intake.set_hidden(true);
        intake.confirm().unwrap();

        let IntakeEvent::Credentials(c) = rx.try_recv().unwrap() else {
            panic!("expected credentials");
        };
        assert_eq!(c.security, SecurityType::None);
        assert!(c.hidden);
    }

    #[test]
    fn explicit_security_wins_over_inference() {
        let (intake, mut rx) = CredentialIntake::channel();
        intake.set_ssid("Legacy");
        intake.set_password("abcde");
        intake.set_security(SecurityType::Wep);
        intake.confirm().unwrap();

        let IntakeEvent::Credentials(c) = rx.try_recv().unwrap() else {
            panic!("expected credentials");
        };
        assert_eq!(c.security, SecurityType::Wep);
    }

    #[test]
    fn debug_output_hides_password() {
        let c = ProvisioningCredentials::new("HomeNet", "secret", SecurityType::WpaPsk, false)
            .unwrap();
        let printed = format!("{c:?}");
        assert!(printed.contains("HomeNet"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn submit_fails_once_the_receiver_is_gone() {
        let (intake, rx) = CredentialIntake::channel();
        drop(rx);
        assert!(matches!(intake.device_connected(), Err(Error::Transport(_))));
    }
}
