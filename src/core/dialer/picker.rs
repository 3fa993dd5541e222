//! 候选地址分层挑选：已知好、未知、已知坏。
//!
//! 好地址按实测时延升序，最多占预算的一半，留出探索空间；未知地址随机洗牌
//! 防止固定优先；坏地址在 TTL 窗口内一律不选，结果短于预算也接受。

use std::{net::SocketAddr, time::Duration};

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::core::cache::TtlCache;

pub(crate) fn pick_addrs(
    addrs: Vec<SocketAddr>,
    n: usize,
    durations: &TtlCache<Duration>,
    errors: &TtlCache<String>,
) -> Vec<SocketAddr> {
    if addrs.len() <= n {
        return addrs;
    }

    let mut good: Vec<(SocketAddr, Duration)> = Vec::new();
    let mut unknown: Vec<SocketAddr> = Vec::new();

    for addr in addrs {
        let key = addr.to_string();
        if let Some(duration) = durations.get_quiet(&key) {
            good.push((addr, duration));
        } else if errors.get_quiet(&key).is_some() {
            // known-bad: skipped for the whole TTL window
        } else {
            unknown.push(addr);
        }
    }

    good.sort_by_key(|(_, duration)| *duration);
    good.truncate(n / 2);

    unknown.shuffle(&mut thread_rng());

    let mut picked: Vec<SocketAddr> = good.into_iter().map(|(addr, _)| addr).collect();
    for addr in unknown {
        if picked.len() >= n {
            break;
        }
        picked.push(addr);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::current_epoch_ms;

    fn addr(last_octet: u8) -> SocketAddr {
        format!("10.0.0.{last_octet}:443").parse().unwrap()
    }

    fn caches() -> (TtlCache<Duration>, TtlCache<String>) {
        (TtlCache::new(64), TtlCache::new(64))
    }

    fn mark_good(cache: &TtlCache<Duration>, addr: SocketAddr, millis: u64) {
        cache.set(
            &addr.to_string(),
            Duration::from_millis(millis),
            Some(current_epoch_ms() + 60_000),
        );
    }

    fn mark_bad(cache: &TtlCache<String>, addr: SocketAddr) {
        cache.set(
            &addr.to_string(),
            "connection refused".into(),
            Some(current_epoch_ms() + 60_000),
        );
    }

    #[test]
    fn small_pools_pass_through() {
        let (durations, errors) = caches();
        let pool = vec![addr(1), addr(2)];
        assert_eq!(pick_addrs(pool.clone(), 4, &durations, &errors), pool);
    }

    #[test]
    fn good_tier_caps_at_half_budget_and_bad_never_appears() {
        let (durations, errors) = caches();
        let goods = [addr(1), addr(2), addr(3)];
        mark_good(&durations, goods[0], 10);
        mark_good(&durations, goods[1], 20);
        mark_good(&durations, goods[2], 30);
        let unknowns = [addr(4), addr(5)];
        let bad = addr(6);
        mark_bad(&errors, bad);

        let pool = vec![goods[0], goods[1], goods[2], unknowns[0], unknowns[1], bad];
        let picked = pick_addrs(pool, 4, &durations, &errors);

        assert_eq!(picked.len(), 4);
        // fastest two goods, in latency order
        assert_eq!(&picked[..2], &[goods[0], goods[1]]);
        assert!(!picked.contains(&goods[2]));
        assert!(picked.contains(&unknowns[0]));
        assert!(picked.contains(&unknowns[1]));
        assert!(!picked.contains(&bad));
    }

    #[test]
    fn result_may_be_shorter_than_budget() {
        let (durations, errors) = caches();
        let good = addr(1);
        mark_good(&durations, good, 15);
        for i in 2..=6 {
            mark_bad(&errors, addr(i));
        }
        let pool = vec![good, addr(2), addr(3), addr(4), addr(5), addr(6)];
        let picked = pick_addrs(pool, 4, &durations, &errors);
        assert_eq!(picked, vec![good]);
    }

    #[test]
    fn all_bad_yields_empty() {
        let (durations, errors) = caches();
        for i in 1..=4 {
            mark_bad(&errors, addr(i));
        }
        let pool = vec![addr(1), addr(2), addr(3), addr(4)];
        assert!(pick_addrs(pool, 2, &durations, &errors).is_empty());
    }

    #[test]
    fn expired_error_records_return_to_unknown() {
        let (durations, errors) = caches();
        let stale = addr(1);
        errors.set(&stale.to_string(), "old failure".into(), Some(1));
        let pool = vec![stale, addr(2), addr(3)];
        let picked = pick_addrs(pool, 2, &durations, &errors);
        assert_eq!(picked.len(), 2);
    }
}
