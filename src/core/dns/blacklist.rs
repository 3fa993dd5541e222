//! IP 黑名单：存在即禁用，带 TTL，解析结果全部经过它过滤。

use std::net::IpAddr;

use crate::core::cache::TtlCache;

#[derive(Debug)]
pub struct IpBlacklist {
    entries: TtlCache<()>,
}

impl IpBlacklist {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: TtlCache::new(capacity),
        }
    }

    /// 封禁一个 IP；`expires_at_ms` 为 `None` 时永久生效。
    pub fn ban(&self, ip: IpAddr, expires_at_ms: Option<i64>) {
        self.entries.set(&ip.to_string(), (), expires_at_ms);
    }

    pub fn unban(&self, ip: IpAddr) {
        self.entries.remove(&ip.to_string());
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.entries.get_quiet(&ip.to_string()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::current_epoch_ms;

    #[test]
    fn banned_ip_is_visible_until_expiry() {
        let list = IpBlacklist::new(16);
        let ip: IpAddr = "9.10.11.12".parse().unwrap();
        list.ban(ip, Some(current_epoch_ms() + 60_000));
        assert!(list.contains(ip));
        list.unban(ip);
        assert!(!list.contains(ip));
    }

    #[test]
    fn expired_ban_is_lifted() {
        let list = IpBlacklist::new(16);
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        list.ban(ip, Some(current_epoch_ms() - 1));
        assert!(!list.contains(ip));
    }
}
