// 后端：通过 wpa_cli 控制 wpa_supplicant 完成 STA 关联
// 关联成功后保存配置并运行 DHCP 客户端

mod parsing;

use crate::config::WifiConfig;
use crate::credentials::{ProvisioningCredentials, SecurityType};
use crate::traits::{AssociationOutcome, WifiAssociator};
use crate::{Error, Result};
use async_trait::async_trait;
use parsing::{Progress, classify, parse_network_id, parse_status, quoted, ssid_hex};
use std::time::Duration;
use tokio::process::Command;

/// 刚 select_network 后 wpa_supplicant 仍可能报告 DISCONNECTED
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WpaCliAssociator {
    config: WifiConfig,
}

impl WpaCliAssociator {
    pub fn new(config: WifiConfig) -> Self {
        Self { config }
    }

    /// 执行一条 wpa_cli 命令并返回 stdout
    async fn wpa_cli(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("wpa_cli")
            .arg("-p")
            .arg(&self.config.wpa_ctrl_interface)
            .arg("-i")
            .arg(&self.config.interface_name)
            .args(args)
            .output()
            .await?;

        let stdout = String::from_utf8(output.stdout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Failed to connect to wpa_supplicant") {
                return Err(Error::CommandFailed(
                    "wpa_supplicant is not running or not accessible".to_string(),
                ));
            }
            return Err(Error::CommandFailed(format!(
                "wpa_cli {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        if stdout.trim_end().ends_with("FAIL") {
            return Err(Error::CommandFailed(format!(
                "wpa_cli {} returned FAIL",
                args.first().copied().unwrap_or_default()
            )));
        }
        Ok(stdout)
    }

    async fn add_network(&self, credentials: &ProvisioningCredentials) -> Result<u32> {
        let output = self.wpa_cli(&["add_network"]).await?;
        let id = parse_network_id(&output).ok_or_else(|| {
            Error::CommandFailed(format!(
                "Failed to parse network ID from wpa_cli: {}",
                output.trim()
            ))
        })?;
        let id_arg = id.to_string();
        let id_arg = id_arg.as_str();

        self.wpa_cli(&["set_network", id_arg, "ssid", &ssid_hex(&credentials.ssid)])
            .await?;
        match credentials.security {
            SecurityType::None => {
                self.wpa_cli(&["set_network", id_arg, "key_mgmt", "NONE"]).await?;
            }
            SecurityType::Wep => {
                self.wpa_cli(&["set_network", id_arg, "key_mgmt", "NONE"]).await?;
                self.wpa_cli(&["set_network", id_arg, "wep_key0", &quoted(&credentials.password)])
                    .await?;
                self.wpa_cli(&["set_network", id_arg, "wep_tx_keyidx", "0"]).await?;
            }
            SecurityType::WpaPsk => {
                self.wpa_cli(&["set_network", id_arg, "psk", &quoted(&credentials.password)])
                    .await?;
            }
        }
        if credentials.hidden {
            self.wpa_cli(&["set_network", id_arg, "scan_ssid", "1"]).await?;
        }
        Ok(id)
    }

    async fn remove_network(&self, id: u32) {
        if let Err(e) = self.wpa_cli(&["remove_network", &id.to_string()]).await {
            tracing::warn!(id, error = %e, "Failed to remove network");
        }
    }

    /// 轮询 status 直到完成、密码错误、失败或超时
    async fn wait_for_association(&self, ssid: &str) -> Result<Progress> {
        let start = tokio::time::Instant::now();
        let timeout = self.config.connect_timeout();
        loop {
            if start.elapsed() > timeout {
                tracing::error!(%ssid, timeout_secs = timeout.as_secs(), "Association timed out");
                return Ok(Progress::Failed);
            }
            tokio::time::sleep(POLL_INTERVAL).await;

            let output = match self.wpa_cli(&["status"]).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to get wpa_cli status, retrying");
                    continue;
                }
            };
            let status = parse_status(&output);
            match classify(&status, start.elapsed() < DISCONNECT_GRACE) {
                Progress::Pending => {
                    tracing::debug!(state = %status.wpa_state, "Association in progress");
                }
                done => {
                    tracing::info!(%ssid, state = %status.wpa_state, outcome = ?done, "Association finished");
                    return Ok(done);
                }
            }
        }
    }

    /// 关联成功后获取地址，失败只记录日志，由可达性探测兜底
    async fn run_dhcp_client(&self) {
        let client = self.config.dhcp_client.as_str();
        let iface = self.config.interface_name.as_str();
        let mut cmd = Command::new(client);
        if client == "udhcpc" {
            cmd.args(["-i", iface, "-q", "-n"]);
        } else {
            cmd.arg(iface);
        }
        match cmd.status().await {
            Ok(status) if status.success() => {
                tracing::info!(%client, "DHCP client obtained an address");
            }
            Ok(status) => tracing::warn!(%client, %status, "DHCP client exited with an error"),
            Err(e) => tracing::error!(%client, error = %e, "Failed to execute DHCP client"),
        }
    }
}

#[async_trait]
impl WifiAssociator for WpaCliAssociator {
    async fn connect(&self, credentials: &ProvisioningCredentials) -> Result<AssociationOutcome> {
        tracing::info!(ssid = %credentials.ssid, security = ?credentials.security, "Associating");
        let id = self.add_network(credentials).await?;
        // select_network 会禁用其他网络，只尝试新加入的这个
        if let Err(e) = self.wpa_cli(&["select_network", &id.to_string()]).await {
            self.remove_network(id).await;
            return Err(e);
        }

        match self.wait_for_association(&credentials.ssid).await? {
            Progress::Completed => {
                if let Err(e) = self.wpa_cli(&["save_config"]).await {
                    tracing::warn!(error = %e, "Failed to save wpa_supplicant config");
                }
                self.run_dhcp_client().await;
                Ok(AssociationOutcome::Success)
            }
            Progress::WrongKey => {
                self.remove_network(id).await;
                Ok(AssociationOutcome::WrongKey)
            }
            Progress::Failed | Progress::Pending => {
                self.remove_network(id).await;
                Ok(AssociationOutcome::Failure)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.wpa_cli(&["disconnect"]).await?;
        Ok(())
    }

    async fn set_radio_enabled(&self, enabled: bool) -> Result<()> {
        let state = if enabled { "up" } else { "down" };
        let output = Command::new("ip")
            .args(["link", "set", "dev", self.config.interface_name.as_str(), state])
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "Failed to set {} {}: {}",
                self.config.interface_name,
                state,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if enabled {
            // 之前 disconnect 过的话需要显式 reconnect
            self.wpa_cli(&["reconnect"]).await?;
        }
        tracing::info!(iface = %self.config.interface_name, %state, "Wi-Fi radio switched");
        Ok(())
    }
}
