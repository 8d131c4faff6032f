// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 取消信号 (Cancellation tokens)
//!
//! 基于 crossbeam 通道断开实现: 触发端被丢弃或调用 [`ShutdownTrigger::trigger`] 后,
//! 所有 [`Shutdown`] 副本立即观察到取消. `wait` 同时充当退避睡眠.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// 触发端
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

/// 监听端 (可克隆, 发给每个工作线程)
#[derive(Clone)]
pub struct Shutdown {
    rx: Receiver<()>,
}

/// 创建一对取消信号
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (
        ShutdownTrigger {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        Shutdown { rx },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_triggered(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Shutdown {
    /// 永不触发的信号 (测试与单次调用使用)
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// 等待 `timeout`; 期间被取消则立即返回 true
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            // 通道只用于断开通知, 收到消息也视为取消
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// 供 `crossbeam_channel::select!` 使用
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_trigger() {
        let (_trigger, shutdown) = channel();
        assert!(!shutdown.wait(Duration::from_millis(10)));
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn trigger_wakes_waiters() {
        let (trigger, shutdown) = channel();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            assert!(shutdown.wait(Duration::from_secs(10)));
            start.elapsed()
        });
        thread::sleep(Duration::from_millis(20));
        trigger.trigger();
        assert!(waiter.join().unwrap() < Duration::from_secs(5));
        assert!(trigger.is_triggered());
    }

    #[test]
    fn never_is_not_cancelled() {
        let shutdown = Shutdown::never();
        assert!(!shutdown.is_cancelled());
        assert!(!shutdown.wait(Duration::from_millis(1)));
    }
}
