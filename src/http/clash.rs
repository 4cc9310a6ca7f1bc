//! Client documents for the encrypted mode.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::crypto::CipherKind;

/// Everything a client needs to reach one user port.
#[derive(Debug, Clone)]
pub struct ClientEndpoint<'a> {
    pub user_id: usize,
    pub host: &'a str,
    pub port: u16,
    pub cipher: CipherKind,
    pub credential: &'a str,
}

impl ClientEndpoint<'_> {
    /// Clash configuration with a single proxy and a CN-direct rule set.
    pub fn clash_yaml(&self) -> String {
        format!(
            "mixed-port: 7890
allow-lan: false
mode: rule
log-level: info

proxies:
  - name: gateway-user{id}
    type: ss
    server: {host}
    port: {port}
    cipher: {cipher}
    password: \"{password}\"

proxy-groups:
  - name: PROXY
    type: select
    proxies:
      - gateway-user{id}

rules:
  - GEOIP,CN,DIRECT
  - MATCH,PROXY
",
            id = self.user_id,
            host = self.host,
            port = self.port,
            cipher = self.cipher.client_name(),
            password = self.credential,
        )
    }

    /// One-click `ss://` URI: `base64(method:password)@host:port#userN`.
    pub fn ss_uri(&self) -> String {
        let userinfo = format!("{}:{}", self.cipher.client_name(), self.credential);
        format!(
            "ss://{}@{}:{}#user{}",
            URL_SAFE_NO_PAD.encode(userinfo),
            self.host,
            self.port,
            self.user_id
        )
    }
}

/// Decode the userinfo of an `ss://` URI back to `method:password`.
pub fn decode_userinfo(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("ss://")?;
    let (userinfo, _) = rest.split_once('@')?;
    let bytes = URL_SAFE_NO_PAD
        .decode(userinfo)
        .or_else(|_| STANDARD.decode(userinfo))
        .ok()?;
    String::from_utf8(bytes).ok()
}
