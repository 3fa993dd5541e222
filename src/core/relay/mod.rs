//! 中继信封编解码。
//!
//! 把内层 HTTP 请求压进一个 POST 外壳：2 字节大端长度 + deflate 压缩的
//! 请求头块 + 原始请求体；中继的 200 响应按同样的框架拆开，非 200 原样
//! 透传给调用方。

mod decode;
mod encode;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use http::Uri;
use hyper::{Body, Request, Response};
use rustls::ClientConfig;

use crate::core::{
    config::model::RelayConfig,
    errors::RelayCodecError,
    tls::{create_insecure_client_config, create_verified_client_config},
};

/// 中继端点：URL、共享口令、证书校验开关与服务端抓取期限。
#[derive(Debug, Clone)]
pub struct RelayServer {
    pub url: Uri,
    pub password: String,
    pub ssl_verify: bool,
    pub deadline: Duration,
}

impl RelayServer {
    pub fn from_config(cfg: &RelayConfig) -> Result<Self> {
        let url: Uri = cfg.url.parse().context("parse relay url")?;
        Ok(Self {
            url,
            password: cfg.password.clone(),
            ssl_verify: cfg.ssl_verify,
            deadline: Duration::from_secs(cfg.deadline_secs),
        })
    }

    /// 编码内层请求为发往中继的外层 POST。请求体只做流式拼接，不落内存。
    pub fn encode_request(&self, req: Request<Body>) -> Result<Request<Body>, RelayCodecError> {
        encode::encode_request(self, req)
    }

    /// 解码中继返回的外层响应。
    pub async fn decode_response(
        &self,
        resp: Response<Body>,
    ) -> Result<Response<Body>, RelayCodecError> {
        decode::decode_response(resp).await
    }

    /// 外层连接用的 TLS 配置，跟随 `ssl_verify` 开关。
    pub fn outer_tls_config(&self) -> Arc<ClientConfig> {
        if self.ssl_verify {
            Arc::new(create_verified_client_config())
        } else {
            Arc::new(create_insecure_client_config())
        }
    }
}
