// 配网通道：hostapd + dnsmasq 软 AP，上面跑 HTTP 服务

use super::HttpTransport;
use crate::config::{ApConfig, HttpConfig};
use crate::credentials::CredentialIntake;
use crate::traits::ProvisioningTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

pub struct SoftApTransport {
    ap: ApConfig,
    http: HttpTransport,
    hostapd: Mutex<Option<Child>>,
    dnsmasq: Mutex<Option<Child>>,
}

impl SoftApTransport {
    pub fn new(ap: ApConfig, http: HttpConfig) -> Self {
        Self {
            ap,
            http: HttpTransport::new(http),
            hostapd: Mutex::new(None),
            dnsmasq: Mutex::new(None),
        }
    }

    /// 启动 AP：设置 IP，启动 hostapd / dnsmasq
    async fn start_ap(&self) -> Result<()> {
        let iface = self.ap.interface_name.as_str();

        let output = Command::new("ip")
            .args(["link", "set", "dev", iface, "up"])
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "Failed to bring up {}: {}",
                iface,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let output = Command::new("ip")
            .args(["addr", "add", self.ap.gateway_cidr.as_str(), "dev", iface])
            .output()
            .await?;
        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            if !error_msg.contains("File exists") {
                return Err(Error::CommandFailed(format!(
                    "Failed to set IP address: {}",
                    error_msg.trim()
                )));
            }
        }

        let hostapd = Command::new("hostapd")
            .arg(&self.ap.hostapd_conf_path)
            .kill_on_drop(true)
            .spawn()?;
        *self.hostapd.lock().await = Some(hostapd);

        // 所有域名都解析到网关，方便手机弹出配网页面
        let gateway = self.ap.gateway_cidr.split('/').next().unwrap_or_default();
        let dnsmasq = Command::new("dnsmasq")
            .arg(format!("--interface={}", iface))
            .arg(format!("--dhcp-range={}", self.ap.dhcp_range))
            .arg(format!("--address=/#/{}", gateway))
            .arg("--no-resolv")
            .arg("--no-hosts")
            .arg("--no-daemon")
            .kill_on_drop(true)
            .spawn()?;
        *self.dnsmasq.lock().await = Some(dnsmasq);

        tracing::info!(%iface, %gateway, "Soft AP started");
        Ok(())
    }

    /// 停止 AP，已经停止时什么也不做
    async fn stop_ap(&self) -> Result<()> {
        let dnsmasq = self.dnsmasq.lock().await.take();
        let hostapd = self.hostapd.lock().await.take();
        if dnsmasq.is_none() && hostapd.is_none() {
            return Ok(());
        }
        for (name, child) in [("dnsmasq", dnsmasq), ("hostapd", hostapd)] {
            if let Some(mut child) = child {
                if let Err(e) = child.kill().await {
                    tracing::warn!(process = name, error = %e, "Failed to kill");
                }
            }
        }

        let output = Command::new("ip")
            .args([
                "addr",
                "del",
                self.ap.gateway_cidr.as_str(),
                "dev",
                self.ap.interface_name.as_str(),
            ])
            .output()
            .await?;
        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            if !error_msg.contains("Cannot assign requested address") {
                return Err(Error::CommandFailed(format!(
                    "Failed to clean up IP address: {}",
                    error_msg.trim()
                )));
            }
        }
        tracing::info!(iface = %self.ap.interface_name, "Soft AP stopped");
        Ok(())
    }

    /// HTTP 启动失败后回收 AP，返回原始错误
    async fn abandon_open(&self, error: Error) -> Error {
        if let Err(cleanup) = self.stop_ap().await {
            tracing::warn!(error = %cleanup, "Failed to stop soft AP after open failure");
        }
        error
    }
}

#[async_trait]
impl ProvisioningTransport for SoftApTransport {
    async fn open(&self, intake: CredentialIntake) -> Result<()> {
        // 上次残留的进程先清理掉
        self.stop_ap().await?;
        self.start_ap().await?;
        if let Err(e) = self.http.open(intake).await {
            return Err(self.abandon_open(e).await);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let http = self.http.close().await;
        self.stop_ap().await?;
        http
    }

    async fn send_status_byte(&self, code: u8) -> Result<()> {
        self.http.send_status_byte(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_open_keeps_original_error_when_cleanup_fails() {
        let ap = ApConfig {
            interface_name: "nc-missing0".into(),
            ..ApConfig::default()
        };
        let transport = SoftApTransport::new(ap, HttpConfig::default());
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        *transport.hostapd.lock().await = Some(child);

        // 网卡不存在，ip addr del 必然失败
        let err = transport
            .abandon_open(Error::CommandFailed("bind failed".into()))
            .await;
        assert!(matches!(err, Error::CommandFailed(ref msg) if msg == "bind failed"));
        assert!(transport.hostapd.lock().await.is_none());
    }
}
