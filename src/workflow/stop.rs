//! 协作式停止信号
//!
//! 只在挂起点之间检查，不会打断正在进行的平台调用。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 停止信号（可克隆，所有克隆共享同一状态）
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 请求停止，重复调用无副作用
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待停止请求
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// 休眠指定时间，期间收到停止请求则提前返回 false
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = self.stopped() => false,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let signal = StopSignal::new();
        let sleeper = signal.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.stop();
        assert!(!handle.await.unwrap());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let signal = StopSignal::new();
        assert!(signal.sleep(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_stopped_resolves_if_already_stopped() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stopped().await;
    }
}
