//! Core library for the speaker's network configuration service.
//!
//! The crate owns the provisioning / recovery state machine
//! ([`orchestrator::NetworkOrchestrator`]) and the adaptive reachability
//! monitor ([`reachability`]). Everything that touches the OS (wpa_cli,
//! hostapd, aplay, LEDs, ICMP sockets) sits behind the traits in
//! [`traits`] and is provided by [`backends`], [`transports`] and
//! [`notifiers`].

pub mod backends;
pub mod config;
pub mod credentials;
pub mod marker;
pub mod notifiers;
pub mod orchestrator;
pub mod reachability;
pub mod status;
pub mod traits;
pub mod transports;

pub use credentials::{CredentialIntake, ProvisioningCredentials, SecurityType};
pub use orchestrator::{Collaborators, NetworkOrchestrator};
pub use status::{LinkSignal, NetworkStatus, NotifyEvent, OperationType};

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Web server error: {0}")]
    WebServer(#[from] axum::BoxError),

    #[error("ICMP error: {0}")]
    Icmp(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
