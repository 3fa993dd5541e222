//! Error types for the dialer and the relay codec.

use std::io;

use thiserror::Error;

/// 拨号链路上的错误分类：别名解析、DNS、连接与 TLS 握手。
#[derive(Debug, Error)]
pub enum DialError {
    #[error("alias {0:?} not exists")]
    UnknownAlias(String),

    /// 过滤黑名单与地址族之后没有剩余候选。
    #[error("no usable addresses for {0:?}")]
    NoAddresses(String),

    #[error("resolver failure for {host:?}: {message}")]
    Resolver { host: String, message: String },

    #[error("invalid dial address {0:?}")]
    InvalidAddress(String),

    #[error("connect {addr} failed: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("tls handshake with {addr} failed: {source}")]
    Handshake { addr: String, source: io::Error },

    #[error("dial {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u64 },
}

impl DialError {
    /// Get error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            DialError::UnknownAlias(_) => "alias",
            DialError::NoAddresses(_) => "no_addresses",
            DialError::Resolver { .. } => "resolver",
            DialError::InvalidAddress(_) => "address",
            DialError::Connect { .. } => "connect",
            DialError::Handshake { .. } => "handshake",
            DialError::Timeout { .. } => "timeout",
        }
    }
}

/// 中继信封编解码错误。非 200 的外层响应不是错误，按原样透传。
#[derive(Debug, Error)]
pub enum RelayCodecError {
    /// 压缩后的请求头超出 2 字节长度前缀的上限。
    #[error("compressed header block is {0} bytes, exceeds 65535")]
    HeaderTooLarge(usize),

    #[error("malformed relay response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
