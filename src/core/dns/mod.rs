//! DNS 解析、结果缓存与 IP 黑名单。

pub mod blacklist;
pub mod cache;
pub mod resolver;

pub use blacklist::IpBlacklist;
pub use cache::DnsCache;
pub use resolver::{DirectResolveFn, Resolver};
