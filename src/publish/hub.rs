// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 事件分发 (Event hub)
//!
//! 每个订阅者一个有界队列. 事件只序列化一次, 以 `Arc<str>` 行分发;
//! 队列满时丢弃该订阅者的这条事件, 接收端断开时移除订阅者.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::control::OutboundEvent;

/// 一行已序列化的事件 (不含换行)
pub type EventLine = Arc<str>;

struct Subscriber {
    id: u64,
    tx: Sender<EventLine>,
}

/// 订阅句柄
pub struct Subscription {
    pub id: u64,
    pub rx: Receiver<EventLine>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    pub delivered: u64,
    pub dropped: u64,
    pub pruned: u64,
}

pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
    queue_depth: usize,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    pruned: AtomicU64,
}

impl EventHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            queue_depth: queue_depth.max(1),
            next_id: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber { id, tx });
        debug!(subscriber = id, "新订阅者");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.lock().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.lock().is_empty()
    }

    /// 广播给所有订阅者, 返回成功入队的数量
    pub fn broadcast(&self, event: &OutboundEvent) -> usize {
        let line: EventLine = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!("序列化 {} 失败: {}", event.name(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        self.lock().retain(|s| match s.tx.try_send(Arc::clone(&line)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(subscriber = s.id, "订阅者已断开, 移除");
                self.pruned.fetch_add(1, Ordering::Relaxed);
                false
            }
        });
        self.delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
