//! Audio and LED feedback on the real device.

#[cfg(feature = "audio")]
mod aplay;

use crate::config::{AudioConfig, LedConfig};
use crate::traits::{Cue, LedEffect, NotificationSink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Plays cues through `aplay` (with the `audio` feature) and writes LED
/// effect names to the LED service's control file.
pub struct SystemSink {
    audio: Arc<AudioConfig>,
    led_path: Option<PathBuf>,
}

impl SystemSink {
    pub fn new(audio: AudioConfig, led: LedConfig) -> Self {
        Self {
            audio: Arc::new(audio),
            led_path: led.effect_path.map(PathBuf::from),
        }
    }

    fn cue_path(&self, cue: Cue) -> PathBuf {
        PathBuf::from(&self.audio.dir).join(self.audio.files.file_for(cue))
    }
}

#[async_trait]
impl NotificationSink for SystemSink {
    async fn play_cue(&self, cue: Cue) {
        let path = self.cue_path(cue);
        tracing::info!(?cue, file = %path.display(), "Playing cue");
        #[cfg(feature = "audio")]
        aplay::play(self.audio.clone(), path);
    }

    async fn set_led(&self, effect: LedEffect) {
        let Some(path) = &self.led_path else {
            tracing::debug!(effect = effect.as_str(), "LED control disabled");
            return;
        };
        if let Err(e) = tokio::fs::write(path, effect.as_str()).await {
            tracing::warn!(effect = effect.as_str(), path = %path.display(), error = %e, "Failed to set LED effect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_files_resolve_under_audio_dir() {
        let sink = SystemSink::new(AudioConfig::default(), LedConfig::default());
        assert_eq!(
            sink.cue_path(Cue::RouteFailed),
            PathBuf::from("/usr/share/netcfg/audio/wifi_no_internet.wav")
        );
    }

    #[tokio::test]
    async fn led_effect_is_written_to_control_file() {
        let path = std::env::temp_dir().join(format!("netcfg-led-{}", std::process::id()));
        let sink = SystemSink::new(
            AudioConfig::default(),
            LedConfig {
                effect_path: Some(path.to_string_lossy().into_owned()),
            },
        );
        sink.set_led(LedEffect::Connecting).await;
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "connecting");
        sink.set_led(LedEffect::Online).await;
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "online");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
