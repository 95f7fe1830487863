use netcfg_core::NetworkOrchestrator;
use netcfg_core::config::AppConfig;

pub mod on_start;
pub mod recover_on_boot;

/// 策略调度器：根据编译时选择的 policy feature 调用对应实现。
pub async fn dispatch(orchestrator: &NetworkOrchestrator, config: &AppConfig) -> anyhow::Result<()> {
    const POLICY_COUNT: usize = cfg!(feature = "policy_on_start") as usize
        + cfg!(feature = "policy_recover_on_boot") as usize;
    const _: () = assert!(
        POLICY_COUNT == 1,
        "Select exactly ONE policy feature (e.g., policy_recover_on_boot)."
    );

    #[cfg(feature = "policy_on_start")]
    {
        on_start::run(orchestrator, config).await?;
    }

    #[cfg(feature = "policy_recover_on_boot")]
    {
        recover_on_boot::run(orchestrator, config).await?;
    }

    Ok(())
}
