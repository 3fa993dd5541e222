//! 有界 TTL 缓存：健康记录与 DNS 结果共用的底层容器。

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

/// 当前 Unix epoch 毫秒。
pub fn current_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// `None` 表示永不过期（字面量 IP 条目）。
    expires_at_ms: Option<i64>,
    touched: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires_at_ms {
            Some(expires) => expires <= now_ms,
            None => false,
        }
    }
}

#[derive(Debug)]
struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    clock: u64,
}

/// 容量受限的字符串键 TTL 缓存。
///
/// 访问命中已过期条目时当场删除；写入超出容量时淘汰最久未触碰的条目。
/// 所有操作内部加锁，可在并发拨号任务间共享。
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn set(&self, key: &str, value: V, expires_at_ms: Option<i64>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.clock += 1;
            let touched = guard.clock;
            if !guard.map.contains_key(key) && guard.map.len() >= self.capacity {
                let oldest = guard
                    .map
                    .iter()
                    .min_by_key(|(_, entry)| entry.touched)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    guard.map.remove(&oldest);
                }
            }
            guard.map.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at_ms,
                    touched,
                },
            );
        }
    }

    /// 读取并刷新最近使用时间。
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, current_epoch_ms())
    }

    /// 读取但不触碰最近使用时间，供选址分层查询使用。
    pub fn get_quiet(&self, key: &str) -> Option<V> {
        self.get_quiet_at(key, current_epoch_ms())
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.map.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.map.clear();
        }
    }

    pub(crate) fn get_at(&self, key: &str, now_ms: i64) -> Option<V> {
        let mut guard = self.inner.lock().ok()?;
        guard.clock += 1;
        let touched = guard.clock;
        let found = match guard.map.get_mut(key) {
            Some(entry) => {
                if entry.is_expired(now_ms) {
                    None
                } else {
                    entry.touched = touched;
                    Some(entry.value.clone())
                }
            }
            None => return None,
        };
        if found.is_none() {
            guard.map.remove(key);
        }
        found
    }

    pub(crate) fn get_quiet_at(&self, key: &str, now_ms: i64) -> Option<V> {
        let mut guard = self.inner.lock().ok()?;
        let found = match guard.map.get(key) {
            Some(entry) => {
                if entry.is_expired(now_ms) {
                    None
                } else {
                    Some(entry.value.clone())
                }
            }
            None => return None,
        };
        if found.is_none() {
            guard.map.remove(key);
        }
        found
    }
}
