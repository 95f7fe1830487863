use crate::Result;
use crate::traits::Cue;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// 编译时嵌入的默认配置
const EMBEDDED_CONFIG: &str = include_str!("../../configs/netcfg.toml");

/// 顶层应用配置
///
/// Every table and every field is optional; missing values fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub wifi: WifiConfig,
    pub provisioning: ProvisioningConfig,
    pub recovery: RecoveryConfig,
    pub reachability: ReachabilityConfig,
    pub ap: ApConfig,
    pub http: HttpConfig,
    pub audio: AudioConfig,
    pub led: LedConfig,
    pub system: SystemConfig,
}

impl AppConfig {
    /// 从 TOML 字符串加载应用配置
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The configuration shipped inside the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_CONFIG)
    }
}

// ============= 无线网卡 / wpa_supplicant =============

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub interface_name: String,
    pub wpa_ctrl_interface: String,
    /// DHCP client started after association (`dhcpcd`, `udhcpc`).
    pub dhcp_client: String,
    /// How long to wait for `wpa_state=COMPLETED`.
    pub connect_timeout_secs: u64,
    /// Marker file written after the first successful configuration.
    pub marker_path: String,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            interface_name: "wlan0".into(),
            wpa_ctrl_interface: "/var/run/wpa_supplicant".into(),
            dhcp_client: "dhcpcd".into(),
            connect_timeout_secs: 30,
            marker_path: "/data/cfg/wifi_configured".into(),
        }
    }
}

impl WifiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============= 配网 =============

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Watchdog for user-triggered provisioning.
    pub manual_timeout_secs: u64,
    /// Watchdog for the unattended provisioning entered at first boot.
    pub auto_config_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            manual_timeout_secs: 300,
            auto_config_timeout_secs: 600,
        }
    }
}

impl ProvisioningConfig {
    pub fn manual_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_timeout_secs)
    }

    pub fn auto_config_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_config_timeout_secs)
    }
}

// ============= 开机恢复 =============

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub retries: u32,
    pub interval_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            interval_secs: 3,
        }
    }
}

impl RecoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ============= 网络可达性探测 =============

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    pub primary_host: IpAddr,
    pub secondary_host: IpAddr,
    /// Echo requests per probe cycle.
    pub max_attempts: u32,
    /// Attempts against the primary host before switching to the secondary.
    pub fallback_after: u32,
    pub reply_timeout_ms: u64,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            primary_host: IpAddr::V4(Ipv4Addr::new(223, 5, 5, 5)),
            secondary_host: IpAddr::V4(Ipv4Addr::new(114, 114, 114, 114)),
            max_attempts: 4,
            fallback_after: 2,
            reply_timeout_ms: 1000,
            min_interval_secs: 1,
            max_interval_secs: 64,
        }
    }
}

impl ReachabilityConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

// ============= AP 配置 =============

/// Soft-AP used as provisioning channel.
///
/// Runs on its own virtual interface so the station side stays usable while
/// the phone is connected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApConfig {
    pub interface_name: String,
    pub gateway_cidr: String,
    pub dhcp_range: String,
    pub hostapd_conf_path: String,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            interface_name: "uap0".into(),
            gateway_cidr: "192.168.4.1/24".into(),
            dhcp_range: "192.168.4.100,192.168.4.200,12h".into(),
            hostapd_conf_path: "/etc/hostapd.conf".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([192, 168, 4, 1], 80)),
        }
    }
}

// ============= 音频配置 =============

/// 音频播放的文件映射
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CueFilesConfig {
    pub provisioning_started_auto: String,
    pub provisioning_started_manual: String,
    pub device_connected: String,
    pub connecting: String,
    pub link_succeeded: String,
    pub wifi_failed: String,
    pub auto_config_failed: String,
    pub wrong_key: String,
    pub route_failed: String,
    pub provisioning_exited: String,
    pub recovery_started: String,
    pub recovery_succeeded: String,
    pub recovery_failed: String,
}

impl Default for CueFilesConfig {
    fn default() -> Self {
        Self {
            provisioning_started_auto: "wifi_config_auto.wav".into(),
            provisioning_started_manual: "wifi_config_start.wav".into(),
            device_connected: "wifi_device_connected.wav".into(),
            connecting: "wifi_connecting.wav".into(),
            link_succeeded: "wifi_link_success.wav".into(),
            wifi_failed: "wifi_config_failed.wav".into(),
            auto_config_failed: "wifi_auto_config_failed.wav".into(),
            wrong_key: "wifi_wrong_key.wav".into(),
            route_failed: "wifi_no_internet.wav".into(),
            provisioning_exited: "wifi_config_exit.wav".into(),
            recovery_started: "wifi_reconnecting.wav".into(),
            recovery_succeeded: "wifi_reconnected.wav".into(),
            recovery_failed: "wifi_reconnect_failed.wav".into(),
        }
    }
}

impl CueFilesConfig {
    pub fn file_for(&self, cue: Cue) -> &str {
        match cue {
            Cue::ProvisioningStartedAuto => &self.provisioning_started_auto,
            Cue::ProvisioningStartedManual => &self.provisioning_started_manual,
            Cue::DeviceConnected => &self.device_connected,
            Cue::Connecting => &self.connecting,
            Cue::LinkSucceeded => &self.link_succeeded,
            Cue::WifiFailed => &self.wifi_failed,
            Cue::AutoConfigFailed => &self.auto_config_failed,
            Cue::WrongKey => &self.wrong_key,
            Cue::RouteFailed => &self.route_failed,
            Cue::ProvisioningExited => &self.provisioning_exited,
            Cue::RecoveryStarted => &self.recovery_started,
            Cue::RecoverySucceeded => &self.recovery_succeeded,
            Cue::RecoveryFailed => &self.recovery_failed,
        }
    }
}

/// 音频配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ALSA device passed to `aplay -D`, or "auto" for the default device.
    pub device: String,
    /// Directory holding the cue files.
    pub dir: String,
    pub files: CueFilesConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "auto".into(),
            dir: "/usr/share/netcfg/audio".into(),
            files: CueFilesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// Control file the LED service reads effect names from. Unset disables LEDs.
    pub effect_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Command run once the network is ready (clock resync).
    pub time_sync_command: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            time_sync_command: vec!["ntpdate".into(), "-u".into(), "pool.ntp.org".into()],
        }
    }
}
