use anyhow::Context;
use netcfg_core::config::AppConfig;
use netcfg_core::{Collaborators, NetworkOrchestrator};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};

mod callback;
mod policy;

// --- 1. 选择后端实现 ---
#[cfg(feature = "backend_wpa_cli")]
fn build_collaborators(config: &AppConfig) -> Collaborators {
    use netcfg_core::backends::wpa_cli::WpaCliAssociator;
    use netcfg_core::marker::FileCredentialStore;
    use netcfg_core::notifiers::SystemSink;
    use netcfg_core::reachability::IcmpPinger;
    use netcfg_core::transports::SoftApTransport;

    tracing::info!("Using wpa_cli backend");
    Collaborators {
        associator: Arc::new(WpaCliAssociator::new(config.wifi.clone())),
        transport: Arc::new(SoftApTransport::new(config.ap.clone(), config.http.clone())),
        sink: Arc::new(SystemSink::new(config.audio.clone(), config.led.clone())),
        pinger: Arc::new(IcmpPinger::new()),
        store: Arc::new(FileCredentialStore::new(&config.wifi.marker_path)),
    }
}

#[cfg(feature = "backend_mock")]
fn build_collaborators(config: &AppConfig) -> Collaborators {
    use netcfg_core::backends::mock::{
        MemoryCredentialStore, MockAssociator, MockPinger, RecordingSink,
    };
    use netcfg_core::transports::HttpTransport;

    tracing::info!("Using mock backend");
    let pinger = MockPinger::new();
    pinger.set_reachable(true);
    Collaborators {
        associator: Arc::new(MockAssociator::new()),
        // 桌面调试时 HTTP 接口照常可用
        transport: Arc::new(HttpTransport::new(config.http.clone())),
        sink: Arc::new(RecordingSink::new()),
        pinger: Arc::new(pinger),
        store: Arc::new(MemoryCredentialStore::new(false)),
    }
}

#[cfg(not(any(feature = "backend_wpa_cli", feature = "backend_mock")))]
compile_error!(
    "No backend feature selected. Please choose one, e.g., --features netcfg-daemon/backend_mock"
);

#[cfg(all(feature = "backend_wpa_cli", feature = "backend_mock"))]
compile_error!("Select exactly ONE backend feature.");

/// 配置路径：命令行第一个参数，其次 NETCFG_CONFIG，否则使用内嵌配置
fn load_config() -> anyhow::Result<AppConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NETCFG_CONFIG").ok());
    match path {
        Some(path) => {
            tracing::info!(%path, "Loading config");
            AppConfig::load(&path).with_context(|| format!("failed to load config from {path}"))
        }
        None => {
            tracing::info!("Using embedded default config");
            AppConfig::embedded().context("embedded config is invalid")
        }
    }
}

/// 按键走 SIGUSR1 开始配网，SIGUSR2 退出配网，Ctrl-C 结束进程
async fn run_signal_loop(orchestrator: &NetworkOrchestrator, config: &AppConfig) -> anyhow::Result<()> {
    let mut start = signal(SignalKind::user_defined1())?;
    let mut stop = signal(SignalKind::user_defined2())?;
    loop {
        tokio::select! {
            _ = start.recv() => {
                tracing::info!("Provisioning key pressed");
                orchestrator.start_provisioning(config.provisioning.manual_timeout());
            }
            _ = stop.recv() => {
                tracing::info!("Provisioning stop requested");
                orchestrator.stop_provisioning();
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config()?;

    // 2. 基于特性，在编译时决定实例化哪个后端
    let orchestrator = NetworkOrchestrator::spawn(&config, build_collaborators(&config));
    orchestrator.register_callback(Arc::new(callback::LoggingCallback::new(
        config.system.time_sync_command.clone(),
    )));

    // 3. 启动策略
    policy::dispatch(&orchestrator, &config).await?;

    let result = run_signal_loop(&orchestrator, &config).await;
    // 等待分发任务关闭配网通道
    orchestrator.shutdown().await;
    if let Err(e) = &result {
        tracing::error!("❌ netcfg failed: {}", e);
    }
    result
}
