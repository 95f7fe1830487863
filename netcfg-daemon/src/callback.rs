use netcfg_core::NetworkStatus;
use netcfg_core::traits::ApplicationCallback;
use tokio::process::Command;

/// 记录网络事件，网络就绪后同步系统时间
pub struct LoggingCallback {
    time_sync_command: Vec<String>,
}

impl LoggingCallback {
    pub fn new(time_sync_command: Vec<String>) -> Self {
        Self { time_sync_command }
    }
}

impl ApplicationCallback for LoggingCallback {
    fn status_changed(&self, status: NetworkStatus) {
        tracing::info!(%status, "Network status");
    }

    fn online_changed(&self, online: bool) {
        tracing::info!(online, "Internet reachability changed");
    }

    fn network_ready(&self) {
        let Some((program, args)) = self.time_sync_command.split_first() else {
            return;
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        // 回调在分发任务上执行，不能在这里等待
        tokio::spawn(async move {
            match cmd.status().await {
                Ok(status) if status.success() => tracing::info!("System time synchronized"),
                Ok(status) => tracing::warn!(%status, "Time sync command failed"),
                Err(e) => tracing::warn!(error = %e, "Failed to run time sync command"),
            }
        });
    }
}
