//! SweepLoop - 定期的な回収パス
//!
//! # フロー
//! 1. `period` ごとに `pass()` を呼ぶ
//! 2. `pass()` が false を返したら（Supervisor が消えたら）終了
//! 3. shutdown 要求が来たら次の tick を待たずに終了

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task handle.
/// - `shutdown_tx` を drop するとループは止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct SweepLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweepLoop {
    pub fn spawn<F>(runtime: &Handle, period: Duration, mut pass: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 最初の tick は即時に完了するので捨てる
            ticker.tick().await;

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            // sender dropped
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !pass() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("sweep loop stopped");
        });

        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_passes_until_shutdown() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);

        let sweep_loop = SweepLoop::spawn(&Handle::current(), Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        sweep_loop.shutdown_and_join().await;

        let seen = passes.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several passes, saw {seen}");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(passes.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn stops_when_pass_returns_false() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);

        let sweep_loop = SweepLoop::spawn(&Handle::current(), Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::timeout(Duration::from_secs(1), sweep_loop.join)
            .await
            .expect("loop should exit on its own")
            .unwrap();
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }
}
