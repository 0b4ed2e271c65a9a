use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// One-shot timer re-armed by its owner after every fire. The owner decides
/// on each fire whether the reliable channel is still open; if it is not,
/// the loop is simply not re-armed.
#[derive(Debug)]
pub struct TimeSyncLoop {
    interval: Duration,
    timer: Option<JoinHandle<()>>,
}

impl TimeSyncLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    /// Posts `due` to `sink` once the interval elapses. A zero interval
    /// disables the loop.
    pub fn arm<M>(&mut self, sink: UnboundedSender<M>, due: M)
    where
        M: Send + 'static,
    {
        self.stop();
        if self.interval.is_zero() {
            return;
        }

        let interval = self.interval;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = sink.send(due);
        }));
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TimeSyncLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_fires_once_per_arm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = TimeSyncLoop::new(Duration::from_millis(20));

        sync.arm(tx.clone(), 1u32);
        assert!(sync.is_armed());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.try_recv().ok(), Some(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        sync.arm(tx, 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.try_recv().ok(), Some(2));
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = TimeSyncLoop::new(Duration::from_millis(20));

        sync.arm(tx, ());
        sync.stop();
        sync.stop();
        assert!(!sync.is_armed());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_zero_interval_never_arms() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sync = TimeSyncLoop::new(Duration::ZERO);
        sync.arm(tx, ());
        assert!(!sync.is_armed());
    }
}
