//! 站点到别名的匹配表，支持精确域名与 `*.` 前缀通配。

use std::collections::HashMap;

/// 不可变匹配表，构造后只读。
#[derive(Debug, Default)]
pub struct HostMatcher {
    exact: HashMap<String, String>,
    /// 通配条目保存去掉 `*.` 的后缀。
    wildcard: Vec<(String, String)>,
}

impl HostMatcher {
    pub fn new(table: &HashMap<String, String>) -> Self {
        let mut exact = HashMap::new();
        let mut wildcard = Vec::new();
        for (pattern, alias) in table {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_prefix("*.") {
                Some(suffix) => wildcard.push((suffix.to_string(), alias.clone())),
                None => {
                    exact.insert(pattern, alias.clone());
                }
            }
        }
        Self { exact, wildcard }
    }

    /// 查找主机对应的别名。通配模式要求至少一级子域：`*.example.org`
    /// 匹配 `www.example.org` 而不匹配 `example.org` 本身。
    pub fn lookup(&self, host: &str) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        if let Some(alias) = self.exact.get(&host) {
            return Some(alias);
        }
        for (suffix, alias) in &self.wildcard {
            if host.len() > suffix.len()
                && host.ends_with(suffix.as_str())
                && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            {
                return Some(alias);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }
}
