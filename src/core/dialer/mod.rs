//! 多路拨号器：别名命中的站点走 IP 池竞速，未命中回退直连。

mod alias;
pub mod matcher;
mod picker;
mod race;

use std::{
    collections::HashMap,
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use rustls::{ClientConfig, ServerName};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::core::{
    cache::{current_epoch_ms, TtlCache},
    config::model::DialerConfig,
    dns::{DnsCache, IpBlacklist, Resolver},
    errors::DialError,
    tls::{create_insecure_client_config, create_verified_client_config, pick_fake_server_name},
};

use matcher::HostMatcher;
use picker::pick_addrs;
use race::run_race;

/// 中继托管方的别名前缀，命中时握手改用伪装服务器名。
const CAMOUFLAGE_ALIAS_PREFIX: &str = "google_";

pub struct MultiDialer {
    pub(super) ipv6_only: bool,
    pub(super) level: usize,
    pub(super) dial_timeout_ms: u64,
    pub(super) conn_expiry_ms: i64,
    pub(super) dns_cache_expiry_ms: i64,
    pub(super) site_to_alias: HostMatcher,
    pub(super) host_map: HashMap<String, Vec<String>>,
    pub(super) dns_servers: Vec<IpAddr>,
    pub(super) fake_server_names: Vec<String>,
    pub(super) resolver: Resolver,
    pub(super) blacklist: Arc<IpBlacklist>,
    pub(super) dns_cache: DnsCache,
    tcp_duration: Arc<TtlCache<Duration>>,
    tcp_error: Arc<TtlCache<String>>,
    tls_duration: Arc<TtlCache<Duration>>,
    tls_error: Arc<TtlCache<String>>,
    tls_default: Arc<ClientConfig>,
    tls_insecure: Arc<ClientConfig>,
}

impl fmt::Debug for MultiDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDialer")
            .field("ipv6_only", &self.ipv6_only)
            .field("level", &self.level)
            .field("aliases", &self.host_map.len())
            .field("dns_entries", &self.dns_cache.len())
            .finish()
    }
}

impl MultiDialer {
    pub fn new(cfg: DialerConfig) -> Self {
        let capacity = cfg.cache_capacity;
        let blacklist = Arc::new(IpBlacklist::new(capacity));
        let resolver = Resolver::new(cfg.ipv6_only, blacklist.clone());
        Self {
            ipv6_only: cfg.ipv6_only,
            level: cfg.level.max(1),
            dial_timeout_ms: cfg.dial_timeout_ms,
            conn_expiry_ms: (cfg.conn_expiry_secs as i64).saturating_mul(1_000),
            dns_cache_expiry_ms: (cfg.dns_cache_expiry_secs as i64).saturating_mul(1_000),
            site_to_alias: HostMatcher::new(&cfg.site_to_alias),
            host_map: cfg.host_map,
            dns_servers: cfg.dns_servers,
            fake_server_names: cfg.fake_server_names,
            resolver,
            blacklist,
            dns_cache: DnsCache::new(capacity),
            tcp_duration: Arc::new(TtlCache::new(capacity)),
            tcp_error: Arc::new(TtlCache::new(capacity)),
            tls_duration: Arc::new(TtlCache::new(capacity)),
            tls_error: Arc::new(TtlCache::new(capacity)),
            tls_default: Arc::new(create_verified_client_config()),
            tls_insecure: Arc::new(create_insecure_client_config()),
        }
    }

    /// 黑名单由上层维护，这里只暴露句柄。
    pub fn blacklist(&self) -> &IpBlacklist {
        &self.blacklist
    }

    pub fn dns_cache(&self) -> &DnsCache {
        &self.dns_cache
    }

    pub fn tcp_conn_duration(&self) -> &TtlCache<Duration> {
        &self.tcp_duration
    }

    pub fn tcp_conn_error(&self) -> &TtlCache<String> {
        &self.tcp_error
    }

    pub fn tls_conn_duration(&self) -> &TtlCache<Duration> {
        &self.tls_duration
    }

    pub fn tls_conn_error(&self) -> &TtlCache<String> {
        &self.tls_error
    }

    /// 清空四个健康缓存；DNS 缓存保留。
    pub fn clear_cache(&self) {
        self.tcp_duration.clear();
        self.tcp_error.clear();
        self.tls_duration.clear();
        self.tls_error.clear();
    }

    pub async fn lookup_alias(&self, alias: &str) -> Result<Vec<IpAddr>, DialError> {
        alias::lookup_alias(self, alias).await
    }

    /// 向所有配置的 DNS 上游做一轮广刷新，结果并入 DNS 缓存。
    pub async fn expand_alias(&self, alias: &str) -> Result<(), DialError> {
        alias::expand_alias(self, alias, self.resolver.direct_resolve_fn()).await
    }

    /// 建立明文 TCP 连接。站点命中别名表时在候选 IP 上竞速，
    /// 未命中或别名解析失败则回退系统解析直连。
    pub async fn dial(&self, address: &str) -> Result<TcpStream, DialError> {
        tracing::debug!(
            target = "dialer",
            address,
            good = self.tcp_duration.len(),
            bad = self.tcp_error.len(),
            "dial"
        );
        if let Some((host, port)) = split_host_port(address) {
            if let Some(alias) = self.site_to_alias.lookup(host) {
                let alias = alias.to_string();
                match alias::lookup_alias(self, &alias).await {
                    Ok(ips) => {
                        let picked = pick_addrs(
                            join_port(ips, port),
                            self.level,
                            &self.tcp_duration,
                            &self.tcp_error,
                        );
                        return self.race_tcp(address, picked).await;
                    }
                    Err(err) => tracing::warn!(
                        target = "dialer",
                        alias = alias.as_str(),
                        error = %err,
                        "alias lookup failed; falling back to direct dial"
                    ),
                }
            }
        }
        self.connect_direct(address).await
    }

    /// 建立 TLS 连接。`google_` 前缀的别名换用伪装服务器名与免验证配置，
    /// 其余别名用免验证配置加真实主机名。
    pub async fn dial_tls(&self, address: &str) -> Result<TlsStream<TcpStream>, DialError> {
        tracing::debug!(
            target = "dialer",
            address,
            good = self.tls_duration.len(),
            bad = self.tls_error.len(),
            "dial_tls"
        );
        if let Some((host, port)) = split_host_port(address) {
            if let Some(alias) = self.site_to_alias.lookup(host) {
                let alias = alias.to_string();
                match alias::lookup_alias(self, &alias).await {
                    Ok(ips) => {
                        let (config, server_name) = self.tls_setup_for_alias(&alias, host)?;
                        let picked = pick_addrs(
                            join_port(ips, port),
                            self.level,
                            &self.tls_duration,
                            &self.tls_error,
                        );
                        return self.race_tls(address, picked, config, server_name).await;
                    }
                    Err(err) => tracing::warn!(
                        target = "dialer",
                        alias = alias.as_str(),
                        error = %err,
                        "alias lookup failed; falling back to direct tls dial"
                    ),
                }
            }
        }
        self.connect_direct_tls(address, self.tls_default.clone(), None)
            .await
    }

    /// 同 `dial_tls`，但调用方提供 TLS 配置；仅 `google_` 别名会被伪装配置覆盖。
    pub async fn dial_tls_with(
        &self,
        address: &str,
        config: Arc<ClientConfig>,
        server_name: Option<ServerName>,
    ) -> Result<TlsStream<TcpStream>, DialError> {
        if let Some((host, port)) = split_host_port(address) {
            if let Some(alias) = self.site_to_alias.lookup(host) {
                let alias = alias.to_string();
                match alias::lookup_alias(self, &alias).await {
                    Ok(ips) => {
                        let (config, server_name) =
                            if alias.starts_with(CAMOUFLAGE_ALIAS_PREFIX) {
                                self.tls_setup_for_alias(&alias, host)?
                            } else {
                                let name = match server_name {
                                    Some(name) => name,
                                    None => dns_server_name(host)?,
                                };
                                (config, name)
                            };
                        let picked = pick_addrs(
                            join_port(ips, port),
                            self.level,
                            &self.tls_duration,
                            &self.tls_error,
                        );
                        return self.race_tls(address, picked, config, server_name).await;
                    }
                    Err(err) => tracing::warn!(
                        target = "dialer",
                        alias = alias.as_str(),
                        error = %err,
                        "alias lookup failed; falling back to direct tls dial"
                    ),
                }
            }
        }
        self.connect_direct_tls(address, config, server_name).await
    }

    fn tls_setup_for_alias(
        &self,
        alias: &str,
        host: &str,
    ) -> Result<(Arc<ClientConfig>, ServerName), DialError> {
        let name = if alias.starts_with(CAMOUFLAGE_ALIAS_PREFIX) {
            pick_fake_server_name(&self.fake_server_names).unwrap_or(host)
        } else {
            host
        };
        Ok((self.tls_insecure.clone(), dns_server_name(name)?))
    }

    pub(crate) async fn race_tcp(
        &self,
        target: &str,
        addrs: Vec<SocketAddr>,
    ) -> Result<TcpStream, DialError> {
        let durations = self.tcp_duration.clone();
        let errors = self.tcp_error.clone();
        let timeout_ms = self.dial_timeout_ms;
        let conn_expiry_ms = self.conn_expiry_ms;
        run_race(target, addrs, move |addr| {
            let durations = durations.clone();
            let errors = errors.clone();
            async move {
                let key = addr.to_string();
                let start = Instant::now();
                let result =
                    timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr)).await;
                let elapsed = start.elapsed();
                let expires = Some(current_epoch_ms() + conn_expiry_ms);
                match result {
                    Ok(Ok(stream)) => {
                        durations.set(&key, elapsed, expires);
                        errors.remove(&key);
                        Ok(stream)
                    }
                    Ok(Err(source)) => {
                        durations.remove(&key);
                        errors.set(&key, source.to_string(), expires);
                        Err(DialError::Connect { addr: key, source })
                    }
                    Err(_) => {
                        durations.remove(&key);
                        let err = DialError::Timeout {
                            addr: key.clone(),
                            timeout_ms,
                        };
                        errors.set(&key, err.to_string(), expires);
                        Err(err)
                    }
                }
            }
        })
        .await
    }

    pub(crate) async fn race_tls(
        &self,
        target: &str,
        addrs: Vec<SocketAddr>,
        config: Arc<ClientConfig>,
        server_name: ServerName,
    ) -> Result<TlsStream<TcpStream>, DialError> {
        let durations = self.tls_duration.clone();
        let errors = self.tls_error.clone();
        let timeout_ms = self.dial_timeout_ms;
        let conn_expiry_ms = self.conn_expiry_ms;
        run_race(target, addrs, move |addr| {
            let durations = durations.clone();
            let errors = errors.clone();
            let config = config.clone();
            let server_name = server_name.clone();
            async move {
                let key = addr.to_string();
                let tcp = match timeout(
                    Duration::from_millis(timeout_ms),
                    TcpStream::connect(addr),
                )
                .await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(source)) => {
                        let expires = Some(current_epoch_ms() + conn_expiry_ms);
                        durations.remove(&key);
                        errors.set(&key, source.to_string(), expires);
                        return Err(DialError::Connect { addr: key, source });
                    }
                    Err(_) => {
                        let expires = Some(current_epoch_ms() + conn_expiry_ms);
                        durations.remove(&key);
                        let err = DialError::Timeout {
                            addr: key.clone(),
                            timeout_ms,
                        };
                        errors.set(&key, err.to_string(), expires);
                        return Err(err);
                    }
                };

                // 只计握手用时，不含 TCP 建连
                let connector = TlsConnector::from(config);
                let start = Instant::now();
                let handshake = timeout(
                    Duration::from_millis(timeout_ms),
                    connector.connect(server_name, tcp),
                )
                .await;
                let elapsed = start.elapsed();
                let expires = Some(current_epoch_ms() + conn_expiry_ms);
                match handshake {
                    Ok(Ok(stream)) => {
                        durations.set(&key, elapsed, expires);
                        errors.remove(&key);
                        Ok(stream)
                    }
                    Ok(Err(source)) => {
                        durations.remove(&key);
                        errors.set(&key, source.to_string(), expires);
                        Err(DialError::Handshake { addr: key, source })
                    }
                    Err(_) => {
                        durations.remove(&key);
                        let err = DialError::Timeout {
                            addr: key.clone(),
                            timeout_ms,
                        };
                        errors.set(&key, err.to_string(), expires);
                        Err(err)
                    }
                }
            }
        })
        .await
    }

    async fn connect_direct(&self, address: &str) -> Result<TcpStream, DialError> {
        timeout(
            Duration::from_millis(self.dial_timeout_ms),
            TcpStream::connect(address),
        )
        .await
        .map_err(|_| DialError::Timeout {
            addr: address.to_string(),
            timeout_ms: self.dial_timeout_ms,
        })?
        .map_err(|source| DialError::Connect {
            addr: address.to_string(),
            source,
        })
    }

    async fn connect_direct_tls(
        &self,
        address: &str,
        config: Arc<ClientConfig>,
        server_name: Option<ServerName>,
    ) -> Result<TlsStream<TcpStream>, DialError> {
        let (host, _) = split_host_port(address)
            .ok_or_else(|| DialError::InvalidAddress(address.to_string()))?;
        let server_name = match server_name {
            Some(name) => name,
            None => dns_server_name(host)?,
        };
        let tcp = self.connect_direct(address).await?;
        let connector = TlsConnector::from(config);
        timeout(
            Duration::from_millis(self.dial_timeout_ms),
            connector.connect(server_name, tcp),
        )
        .await
        .map_err(|_| DialError::Timeout {
            addr: address.to_string(),
            timeout_ms: self.dial_timeout_ms,
        })?
        .map_err(|source| DialError::Handshake {
            addr: address.to_string(),
            source,
        })
    }
}

fn dns_server_name(host: &str) -> Result<ServerName, DialError> {
    ServerName::try_from(host).map_err(|_| DialError::InvalidAddress(host.to_string()))
}

/// 拆出主机与端口，兼容 `[::1]:443` 的括号写法。
fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

fn join_port(ips: Vec<IpAddr>, port: u16) -> Vec<SocketAddr> {
    ips.into_iter()
        .map(|ip| SocketAddr::new(ip, port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::model::DialerConfig;
    use tokio::net::TcpListener;

    fn test_dialer() -> MultiDialer {
        MultiDialer::new(DialerConfig::default())
    }

    #[test]
    fn split_host_port_handles_both_families() {
        assert_eq!(split_host_port("host.example:443"), Some(("host.example", 443)));
        assert_eq!(split_host_port("[2001:db8::1]:443"), Some(("2001:db8::1", 443)));
        assert_eq!(split_host_port("host.example"), None);
        assert_eq!(split_host_port("host.example:http"), None);
    }

    #[tokio::test]
    async fn race_tcp_updates_health_both_ways() {
        let d = test_dialer();
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap();
        let dead_addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = l.local_addr().unwrap();
            drop(l);
            addr
        };

        let conn = d
            .race_tcp("race.test:443", vec![live_addr, dead_addr])
            .await
            .unwrap();
        assert_eq!(conn.peer_addr().unwrap(), live_addr);

        // give the losing attempt time to publish its outcome
        tokio::time::sleep(Duration::from_millis(100)).await;

        let live_key = live_addr.to_string();
        let dead_key = dead_addr.to_string();
        assert!(d.tcp_conn_duration().get_quiet(&live_key).is_some());
        assert!(d.tcp_conn_error().get_quiet(&live_key).is_none());
        assert!(d.tcp_conn_error().get_quiet(&dead_key).is_some());
        assert!(d.tcp_conn_duration().get_quiet(&dead_key).is_none());
    }

    #[tokio::test]
    async fn dial_routes_through_alias_table() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = live.local_addr().unwrap().port();

        let mut cfg = DialerConfig::default();
        cfg.site_to_alias
            .insert("relay.test".into(), "relay_primary".into());
        cfg.host_map
            .insert("relay_primary".into(), vec!["127.0.0.1".into()]);
        let d = MultiDialer::new(cfg);

        let conn = d.dial(&format!("relay.test:{port}")).await.unwrap();
        assert_eq!(conn.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn dial_falls_back_without_alias_match() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = live.local_addr().unwrap();
        let d = test_dialer();
        let conn = d.dial(&addr.to_string()).await.unwrap();
        assert_eq!(conn.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn clear_cache_keeps_dns_entries() {
        let d = test_dialer();
        d.tcp_conn_duration()
            .set("1.2.3.4:443", Duration::from_millis(5), None);
        d.tls_conn_error().set("1.2.3.4:443", "bad".into(), None);
        d.dns_cache()
            .set("host.example", vec!["5.6.7.8".parse().unwrap()], None);

        d.clear_cache();
        assert!(d.tcp_conn_duration().is_empty());
        assert!(d.tls_conn_error().is_empty());
        assert_eq!(d.dns_cache().len(), 1);
    }
}
