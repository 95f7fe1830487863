use netcfg_core::NetworkOrchestrator;
use netcfg_core::config::AppConfig;

/// On-Start 策略：程序启动时立即进入配网模式
#[allow(dead_code)]
pub async fn run(orchestrator: &NetworkOrchestrator, config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!("🚀 Policy: On-Start. Entering provisioning mode immediately.");
    orchestrator.start_provisioning(config.provisioning.manual_timeout());
    // 配网结束后仍需要持续监测网络
    orchestrator.start_monitor();
    Ok(())
}
