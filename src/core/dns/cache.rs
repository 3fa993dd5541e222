//! 域名到 IP 列表的缓存。字面量 IP 写入零过期条目，不随时间淘汰。

use std::net::IpAddr;

use crate::core::cache::TtlCache;

#[derive(Debug)]
pub struct DnsCache {
    entries: TtlCache<Vec<IpAddr>>,
}

impl DnsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: TtlCache::new(capacity),
        }
    }

    pub fn get(&self, host: &str) -> Option<Vec<IpAddr>> {
        self.entries.get(host)
    }

    pub fn set(&self, host: &str, addrs: Vec<IpAddr>, expires_at_ms: Option<i64>) {
        self.entries.set(host, addrs, expires_at_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn get_at(&self, host: &str, now_ms: i64) -> Option<Vec<IpAddr>> {
        self.entries.get_at(host, now_ms)
    }
}
