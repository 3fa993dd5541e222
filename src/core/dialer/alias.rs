//! 别名展开：把一个逻辑别名摊开成成员主机的 IP 并集。

use std::{collections::HashSet, net::IpAddr};

use crate::core::{cache::current_epoch_ms, dns::resolver::DirectResolveFn, errors::DialError};

use super::MultiDialer;

/// 广刷新写回缓存的有效期。
const EXPAND_EXPIRY_MS: i64 = 24 * 60 * 60 * 1_000;

/// 缓存优先的单服务器路径：字面量成员直接取用，主机名成员先查 DNS 缓存，
/// 未命中时解析一次（IPv6-only 走首个直连上游，否则走系统解析）并写回。
/// 单个成员解析失败只记日志，不中断整条别名。
pub(super) async fn lookup_alias(d: &MultiDialer, alias: &str) -> Result<Vec<IpAddr>, DialError> {
    let names = d
        .host_map
        .get(alias)
        .ok_or_else(|| DialError::UnknownAlias(alias.to_string()))?;

    let expires_at_ms = Some(current_epoch_ms() + d.dns_cache_expiry_ms);
    let mut seen: HashSet<IpAddr> = HashSet::new();

    for name in names {
        if let Ok(ip) = name.parse::<IpAddr>() {
            seen.insert(ip);
            continue;
        }
        if let Some(cached) = d.dns_cache.get(name) {
            seen.extend(cached);
            continue;
        }

        let resolved = if d.ipv6_only {
            match d.dns_servers.first() {
                Some(server) => d.resolver.resolve_direct(name, *server).await,
                None => Err(DialError::Resolver {
                    host: name.clone(),
                    message: "no dns servers configured".into(),
                }),
            }
        } else {
            d.resolver.resolve_system(name).await
        };
        let addrs = match resolved {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::warn!(
                    target = "dns",
                    host = name.as_str(),
                    error = %err,
                    "alias member resolution failed"
                );
                Vec::new()
            }
        };
        d.dns_cache.set(name, addrs.clone(), expires_at_ms);
        seen.extend(addrs);
    }

    let addrs: Vec<IpAddr> = seen
        .into_iter()
        .filter(|ip| !d.blacklist.contains(*ip))
        .collect();
    if addrs.is_empty() {
        tracing::error!(target = "dns", alias, "alias has no usable addresses");
        return Err(DialError::NoAddresses(alias.to_string()));
    }
    Ok(addrs)
}

/// 全服务器广刷新：对每个成员逐一询问所有配置的直连上游，与现有缓存条目
/// 取并集后写回。预热与后台刷新用，失败的上游静默跳过。
pub(super) async fn expand_alias(
    d: &MultiDialer,
    alias: &str,
    resolve: DirectResolveFn,
) -> Result<(), DialError> {
    let names = d
        .host_map
        .get(alias)
        .ok_or_else(|| DialError::UnknownAlias(alias.to_string()))?;

    let expires_at_ms = Some(current_epoch_ms() + EXPAND_EXPIRY_MS);

    for name in names {
        let mut seen: HashSet<IpAddr> = HashSet::new();
        let mut literal = false;

        if let Ok(ip) = name.parse::<IpAddr>() {
            seen.insert(ip);
            literal = true;
        } else {
            for server in &d.dns_servers {
                match resolve(name.clone(), *server).await {
                    Ok(addrs) => {
                        seen.extend(addrs);
                    }
                    Err(err) => {
                        tracing::debug!(
                            target = "dns",
                            host = name.as_str(),
                            server = %server,
                            error = %err,
                            "broad refresh query failed"
                        );
                    }
                }
            }
        }

        if seen.is_empty() {
            continue;
        }
        if let Some(existing) = d.dns_cache.get(name) {
            seen.extend(existing);
        }

        let mut addrs: Vec<IpAddr> = seen.into_iter().collect();
        addrs.sort();
        tracing::debug!(
            target = "dns",
            host = name.as_str(),
            count = addrs.len(),
            "broad refresh stored"
        );
        d.dns_cache
            .set(name, addrs, if literal { None } else { expires_at_ms });
    }

    Ok(())
}
