use crate::config::AudioConfig;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// 启动一个异步任务播放音频，不阻塞通知分发
pub(super) fn play(config: Arc<AudioConfig>, path: PathBuf) {
    tokio::spawn(async move {
        let mut cmd = Command::new("aplay");
        // "auto" 表示使用默认声卡
        if config.device != "auto" {
            cmd.arg("-D").arg(&config.device);
        }
        cmd.arg("-q")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn aplay");
                return;
            }
        };
        if output.status.success() {
            tracing::debug!(file = %path.display(), "Audio playback finished");
        } else {
            tracing::error!(
                file = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "aplay failed"
            );
        }
    });
}
