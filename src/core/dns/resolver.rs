//! 域名解析：系统解析路径与指定上游的直连 UDP 路径。
//!
//! 两条路径共用同一套过滤规则：先按 IPv6-only 开关筛地址族，再剔除黑名单，
//! 最后去重。过滤后为空视为 `NoAddresses`，传输层失败视为 `Resolver`。

use std::{net::IpAddr, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::net::lookup_host;
use trust_dns_resolver::{
    config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};

use super::blacklist::IpBlacklist;
use crate::core::errors::DialError;

/// Resolver retry policy tuned to avoid long blocking waits.
const DNS_REQUEST_TIMEOUT_MS: u64 = 1_500;
const DNS_MAX_ATTEMPTS: usize = 2;

/// 注入式直连解析函数，便于离线测试别名扩张逻辑。
pub type DirectResolveFn = Arc<
    dyn Fn(String, IpAddr) -> BoxFuture<'static, Result<Vec<IpAddr>, DialError>> + Send + Sync,
>;

#[derive(Clone)]
pub struct Resolver {
    ipv6_only: bool,
    blacklist: Arc<IpBlacklist>,
}

impl Resolver {
    pub fn new(ipv6_only: bool, blacklist: Arc<IpBlacklist>) -> Self {
        Self {
            ipv6_only,
            blacklist,
        }
    }

    /// 使用宿主机默认名字服务解析。
    pub async fn resolve_system(&self, host: &str) -> Result<Vec<IpAddr>, DialError> {
        let resolved: Vec<IpAddr> = lookup_host((host, 0))
            .await
            .map_err(|err| DialError::Resolver {
                host: host.to_string(),
                message: err.to_string(),
            })?
            .map(|addr| addr.ip())
            .collect();
        self.admit(host, resolved)
    }

    /// 绕过系统配置，向指定 DNS 服务器的 53 端口发起 UDP 查询。
    pub async fn resolve_direct(
        &self,
        host: &str,
        server: IpAddr,
    ) -> Result<Vec<IpAddr>, DialError> {
        let group = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.ip_strategy = if self.ipv6_only {
            LookupIpStrategy::Ipv6Only
        } else {
            LookupIpStrategy::Ipv4Only
        };
        opts.cache_size = 0;
        opts.attempts = DNS_MAX_ATTEMPTS;
        opts.timeout = Duration::from_millis(DNS_REQUEST_TIMEOUT_MS);
        opts.try_tcp_on_error = false;

        let resolver = TokioAsyncResolver::tokio(config, opts);
        let response = resolver
            .lookup_ip(host)
            .await
            .map_err(|err| DialError::Resolver {
                host: host.to_string(),
                message: err.to_string(),
            })?;
        self.admit(host, response.iter().collect())
    }

    /// 地址族与黑名单过滤，去重后为空报 `NoAddresses`。
    fn admit(&self, host: &str, resolved: Vec<IpAddr>) -> Result<Vec<IpAddr>, DialError> {
        let mut addrs: Vec<IpAddr> = resolved
            .into_iter()
            .filter(|ip| self.family_matches(*ip))
            .filter(|ip| !self.blacklist.contains(*ip))
            .collect();
        addrs.sort();
        addrs.dedup();
        if addrs.is_empty() {
            return Err(DialError::NoAddresses(host.to_string()));
        }
        Ok(addrs)
    }

    fn family_matches(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(_) => !self.ipv6_only,
            IpAddr::V6(_) => self.ipv6_only,
        }
    }

    /// 默认的注入式直连解析实现，别名刷新用。
    pub fn direct_resolve_fn(&self) -> DirectResolveFn {
        let resolver = self.clone();
        Arc::new(move |host: String, server: IpAddr| {
            let resolver = resolver.clone();
            Box::pin(async move { resolver.resolve_direct(&host, server).await })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::current_epoch_ms;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn ipv4_mode_drops_ipv6_answers() {
        let resolver = Resolver::new(false, Arc::new(IpBlacklist::new(4)));
        let out = resolver
            .admit("host.example", ips(&["5.6.7.8", "2001:db8::1"]))
            .unwrap();
        assert_eq!(out, ips(&["5.6.7.8"]));
    }

    #[test]
    fn ipv6_mode_drops_ipv4_answers() {
        let resolver = Resolver::new(true, Arc::new(IpBlacklist::new(4)));
        let out = resolver
            .admit("host.example", ips(&["5.6.7.8", "2001:db8::1"]))
            .unwrap();
        assert_eq!(out, ips(&["2001:db8::1"]));
    }

    #[test]
    fn blacklisted_answers_are_filtered() {
        let blacklist = Arc::new(IpBlacklist::new(4));
        blacklist.ban(
            "9.10.11.12".parse().unwrap(),
            Some(current_epoch_ms() + 60_000),
        );
        let resolver = Resolver::new(false, blacklist);
        let out = resolver
            .admit("host.example", ips(&["5.6.7.8", "9.10.11.12"]))
            .unwrap();
        assert_eq!(out, ips(&["5.6.7.8"]));
    }

    #[test]
    fn empty_after_filtering_is_no_addresses() {
        let resolver = Resolver::new(true, Arc::new(IpBlacklist::new(4)));
        let err = resolver
            .admit("host.example", ips(&["5.6.7.8"]))
            .unwrap_err();
        assert!(matches!(err, DialError::NoAddresses(_)));
    }

    #[test]
    fn duplicate_answers_collapse() {
        let resolver = Resolver::new(false, Arc::new(IpBlacklist::new(4)));
        let out = resolver
            .admit("host.example", ips(&["5.6.7.8", "5.6.7.8"]))
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
