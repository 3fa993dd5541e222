//! 出站 TLS 配置。
//!
//! 中继链路刻意支持两种降级形态：握手时报伪装服务器名，以及完全跳过证书
//! 校验。这里只构造配置；选哪一种由拨号器按别名前缀决定。

use std::sync::Arc;
use std::time::SystemTime;

use rand::seq::SliceRandom;
use rand::thread_rng;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, Error as TlsError, OwnedTrustAnchor, RootCertStore, ServerName};

/// 接受任意证书链的验证器，配合伪装 SNI 或 IP 直连使用。
struct DisabledCertVerifier;

impl ServerCertVerifier for DisabledCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }
}

fn webpki_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    root_store
}

/// 带系统信任锚的常规验证配置，回退直连与开启校验的中继外层用它。
pub fn create_verified_client_config() -> ClientConfig {
    ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth()
}

/// 免验证配置。信任锚照常装入，但验证器一律放行。
pub fn create_insecure_client_config() -> ClientConfig {
    let mut cfg = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth();
    cfg.dangerous()
        .set_certificate_verifier(Arc::new(DisabledCertVerifier));
    cfg
}

/// 每次握手从候选伪装名里随机挑一个，摊薄单一 SNI 的指纹。
pub fn pick_fake_server_name(names: &[String]) -> Option<&str> {
    names
        .choose(&mut thread_rng())
        .map(|name| name.as_str())
        .filter(|name| !name.is_empty())
}
