//! Provisioning channels the phone app talks to.

pub mod http;
#[cfg(feature = "backend_wpa_cli")]
pub mod softap;

pub use http::HttpTransport;
#[cfg(feature = "backend_wpa_cli")]
pub use softap::SoftApTransport;
