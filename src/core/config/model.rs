//! 配置模型。字段全部可缺省，便于最小配置文件起步。

use std::{collections::HashMap, net::IpAddr};

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_dns_cache_expiry_secs() -> u64 {
    600
}

fn default_conn_expiry_secs() -> u64 {
    600
}

fn default_level() -> usize {
    2
}

fn default_dial_timeout_ms() -> u64 {
    4_000
}

fn default_cache_capacity() -> usize {
    8_192
}

fn default_deadline_secs() -> u64 {
    30
}

/// 拨号器配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DialerConfig {
    /// 仅解析与拨号 IPv6 地址。
    #[serde(default)]
    pub ipv6_only: bool,
    /// 站点到别名的匹配表，键支持 `*.` 前缀通配。
    #[serde(default)]
    pub site_to_alias: HashMap<String, String>,
    /// 伪装握手的候选服务器名。
    #[serde(default)]
    pub fake_server_names: Vec<String>,
    /// 别名到成员列表；成员是字面量 IP 或主机名。
    #[serde(default)]
    pub host_map: HashMap<String, Vec<String>>,
    /// 直连 UDP 查询的上游 DNS。
    #[serde(default)]
    pub dns_servers: Vec<IpAddr>,
    #[serde(default = "default_dns_cache_expiry_secs")]
    pub dns_cache_expiry_secs: u64,
    /// 健康记录的存活窗口。
    #[serde(default = "default_conn_expiry_secs")]
    pub conn_expiry_secs: u64,
    /// 单次拨号的最大并发竞速数。
    #[serde(default = "default_level")]
    pub level: usize,
    /// 单个连接或握手尝试的期限。
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            ipv6_only: false,
            site_to_alias: HashMap::new(),
            fake_server_names: Vec::new(),
            host_map: HashMap::new(),
            dns_servers: Vec::new(),
            dns_cache_expiry_secs: default_dns_cache_expiry_secs(),
            conn_expiry_secs: default_conn_expiry_secs(),
            level: default_level(),
            dial_timeout_ms: default_dial_timeout_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// 中继端点配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
    /// 传给服务端抓取的秒数上限，0 表示不下发。
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: String::new(),
            ssl_verify: true,
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// 组合配置，`loader` 读写的就是它。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub dialer: DialerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}
