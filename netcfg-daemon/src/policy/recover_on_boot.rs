use netcfg_core::NetworkOrchestrator;
use netcfg_core::config::AppConfig;

/// 开机恢复策略：有已保存的网络就等它恢复，没有则自动进入配网
#[allow(dead_code)]
pub async fn run(orchestrator: &NetworkOrchestrator, _config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!("🚀 Policy: Recover-On-Boot.");
    orchestrator.start_recovery();
    Ok(())
}
