//! Internet reachability: ICMP probing and the adaptive monitor loop.

pub mod icmp;
mod interval;

pub use icmp::IcmpPinger;
pub use interval::AdaptiveInterval;

use crate::config::ReachabilityConfig;
use crate::traits::Pinger;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Sent/received counters of one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub sent: u32,
    pub received: u32,
}

impl ProbeStats {
    pub fn available(&self) -> bool {
        self.received > 0
    }
}

/// Sends echo requests to the primary host, then to the secondary one.
pub struct ReachabilityProbe {
    pinger: Arc<dyn Pinger>,
    config: ReachabilityConfig,
    sequence: AtomicU16,
}

impl ReachabilityProbe {
    pub fn new(pinger: Arc<dyn Pinger>, config: ReachabilityConfig) -> Self {
        Self {
            pinger,
            config,
            sequence: AtomicU16::new(0),
        }
    }

    /// Runs one probe cycle, stopping at the first reply.
    pub async fn probe(&self) -> ProbeStats {
        let mut stats = ProbeStats::default();
        for attempt in 0..self.config.max_attempts.max(1) {
            let host = if attempt < self.config.fallback_after {
                self.config.primary_host
            } else {
                self.config.secondary_host
            };
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            stats.sent += 1;
            match self.pinger.echo(host, seq, self.config.reply_timeout()).await {
                Ok(Some(reply)) => {
                    stats.received += 1;
                    tracing::trace!(
                        host = %reply.destination,
                        seq = reply.sequence,
                        rtt_ms = reply.rtt.as_millis() as u64,
                        ttl = ?reply.ttl,
                        "Echo reply"
                    );
                    break;
                }
                Ok(None) => tracing::trace!(%host, seq, "Echo timed out"),
                // 套接字错误按丢包处理
                Err(e) => tracing::debug!(%host, seq, error = %e, "Echo failed"),
            }
        }
        stats
    }

    pub async fn check(&self) -> bool {
        let stats = self.probe().await;
        tracing::debug!(sent = stats.sent, received = stats.received, "Reachability probe");
        stats.available()
    }
}

/// Periodic reachability check with an adaptive interval.
///
/// Only edges (and the first result after [`kick`](Self::kick)) are reported.
pub struct ReachabilityMonitor {
    probe: ReachabilityProbe,
    interval: Mutex<AdaptiveInterval>,
    interval_tx: watch::Sender<u64>,
    force_report: AtomicBool,
}

impl ReachabilityMonitor {
    pub fn new(probe: ReachabilityProbe, min_secs: u64, max_secs: u64) -> Self {
        let interval = AdaptiveInterval::new(min_secs, max_secs);
        let (interval_tx, _) = watch::channel(interval.current());
        Self {
            probe,
            interval: Mutex::new(interval),
            interval_tx,
            force_report: AtomicBool::new(false),
        }
    }

    pub fn from_config(pinger: Arc<dyn Pinger>, config: &ReachabilityConfig) -> Self {
        Self::new(
            ReachabilityProbe::new(pinger, config.clone()),
            config.min_interval_secs,
            config.max_interval_secs,
        )
    }

    pub fn probe_handle(&self) -> &ReachabilityProbe {
        &self.probe
    }

    /// Current poll interval in seconds.
    pub fn current_interval(&self) -> u64 {
        self.lock_interval().current()
    }

    pub fn last_known_available(&self) -> Option<bool> {
        self.lock_interval().last_available()
    }

    /// Probes once and adapts the interval.
    pub async fn probe_once(&self) -> bool {
        let available = self.probe.check().await;
        let next = self.lock_interval().record(available);
        self.interval_tx.send_replace(next);
        available
    }

    /// Requests a prompt re-check: drops the interval to the minimum, wakes
    /// the sleeping loop and reports the next result even if unchanged.
    pub fn kick(&self) {
        let min = {
            let mut interval = self.lock_interval();
            interval.reset();
            interval.min()
        };
        self.force_report.store(true, Ordering::SeqCst);
        self.interval_tx.send_replace(min);
    }

    /// Monitor loop. Returns once `reports` is closed.
    pub async fn run(self: Arc<Self>, reports: mpsc::UnboundedSender<bool>) {
        let mut interval_rx = self.interval_tx.subscribe();
        let mut last: Option<bool> = None;
        tracing::info!("Reachability monitor started");

        loop {
            let available = self.probe_once().await;
            let forced = self.force_report.swap(false, Ordering::SeqCst);
            if forced || last != Some(available) {
                tracing::info!(available, "Reachability changed");
                if reports.send(available).is_err() {
                    break;
                }
            }
            last = Some(available);

            let secs = *interval_rx.borrow_and_update();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tracing::debug!("Monitor woken early by interval change");
                }
            }
        }
        tracing::info!("Reachability monitor stopped");
    }

    fn lock_interval(&self) -> std::sync::MutexGuard<'_, AdaptiveInterval> {
        self.interval.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockPinger;
    use std::net::{IpAddr, Ipv4Addr};

    fn config() -> ReachabilityConfig {
        ReachabilityConfig {
            primary_host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            secondary_host: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            max_attempts: 4,
            fallback_after: 2,
            reply_timeout_ms: 100,
            min_interval_secs: 1,
            max_interval_secs: 64,
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_host() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_host_reachable(config().primary_host, false);
        pinger.set_host_reachable(config().secondary_host, true);
        let probe = ReachabilityProbe::new(pinger.clone(), config());

        let stats = probe.probe().await;
        assert_eq!(stats, ProbeStats { sent: 3, received: 1 });
        let hosts = pinger.requested_hosts();
        assert_eq!(
            hosts,
            vec![
                config().primary_host,
                config().primary_host,
                config().secondary_host
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_first_reply() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_reachable(true);
        let probe = ReachabilityProbe::new(pinger.clone(), config());
        assert_eq!(probe.probe().await, ProbeStats { sent: 1, received: 1 });
    }

    #[tokio::test]
    async fn socket_errors_count_as_loss() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_failing(true);
        let probe = ReachabilityProbe::new(pinger, config());
        let stats = probe.probe().await;
        assert_eq!(stats, ProbeStats { sent: 4, received: 0 });
        assert!(!stats.available());
    }

    #[tokio::test]
    async fn probe_once_adapts_interval() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_reachable(true);
        let monitor = ReachabilityMonitor::from_config(pinger.clone(), &config());

        let mut seen = vec![monitor.current_interval()];
        for _ in 0..3 {
            assert!(monitor.probe_once().await);
            seen.push(monitor.current_interval());
        }
        assert_eq!(seen, vec![1, 2, 4, 8]);

        pinger.set_reachable(false);
        assert!(!monitor.probe_once().await);
        assert_eq!(monitor.current_interval(), 1);
        assert_eq!(monitor.last_known_available(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_reports_edges_only() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_reachable(true);
        let monitor = Arc::new(ReachabilityMonitor::from_config(pinger.clone(), &config()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(monitor.clone().run(tx));

        assert_eq!(rx.recv().await, Some(true));
        // 连续成功不会重复上报
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(monitor.current_interval() > 2);

        pinger.set_reachable(false);
        assert_eq!(rx.recv().await, Some(false));
        assert_eq!(monitor.current_interval(), 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn kick_cuts_long_sleep_and_forces_report() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_reachable(true);
        let mut cfg = config();
        cfg.min_interval_secs = 600;
        cfg.max_interval_secs = 600;
        let monitor = Arc::new(ReachabilityMonitor::from_config(pinger.clone(), &cfg));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(monitor.clone().run(tx));

        assert_eq!(rx.recv().await, Some(true));
        let before = pinger.requested_hosts().len();

        monitor.kick();
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(report.unwrap(), Some(true));
        assert!(pinger.requested_hosts().len() > before);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ends_when_receiver_is_dropped() {
        let pinger = Arc::new(MockPinger::new());
        pinger.set_reachable(true);
        let monitor = Arc::new(ReachabilityMonitor::from_config(pinger, &config()));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), monitor.run(tx))
            .await
            .unwrap();
    }
}
