//! relay-tunnel：绕过封锁的 HTTPS 隧道拨号核心。
//!
//! 两个子系统：`MultiDialer` 把别名摊开成 IP 池并在其上并行竞速建连；
//! `RelayServer` 负责中继信封的编解码。外层代理的路由、CLI 与进程装配
//! 不在本 crate 范围内。

pub mod core;
pub mod logging;

pub use crate::core::config::model::{AppConfig, DialerConfig, RelayConfig};
pub use crate::core::dialer::MultiDialer;
pub use crate::core::errors::{DialError, RelayCodecError};
pub use crate::core::relay::RelayServer;
