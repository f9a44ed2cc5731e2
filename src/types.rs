//! Core types shared by the registry, resolver, mapper and link decoder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Section type of outbound entries in the flat store.
pub const OUTBOUND_SECTION: &str = "outbound";

/// Section type holding reverse-proxy bridges and portals.
pub const REVERSE_SECTION: &str = "reverse";

/// Virtual field carrying the global "core supports REALITY" flag.
///
/// It lives in the main section of the store, never in an outbound section,
/// and is supplied to the resolver through [`ResolveOptions`].
pub const REALITY_CHECK: &str = "reality_check";

/// Outbound protocols understood by the proxy daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Blackhole,
    Dns,
    Freedom,
    Http,
    Hysteria2,
    Loopback,
    Mtproto,
    Shadowsocks,
    Socks,
    Trojan,
    Vless,
    Vmess,
    Wireguard,
}

impl Protocol {
    pub const ALL: [Protocol; 13] = [
        Protocol::Blackhole,
        Protocol::Dns,
        Protocol::Freedom,
        Protocol::Http,
        Protocol::Hysteria2,
        Protocol::Loopback,
        Protocol::Mtproto,
        Protocol::Shadowsocks,
        Protocol::Socks,
        Protocol::Trojan,
        Protocol::Vless,
        Protocol::Vmess,
        Protocol::Wireguard,
    ];

    /// The value stored under the `protocol` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Blackhole => "blackhole",
            Protocol::Dns => "dns",
            Protocol::Freedom => "freedom",
            Protocol::Http => "http",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Loopback => "loopback",
            Protocol::Mtproto => "mtproto",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Socks => "socks",
            Protocol::Trojan => "trojan",
            Protocol::Vless => "vless",
            Protocol::Vmess => "vmess",
            Protocol::Wireguard => "wireguard",
        }
    }

    /// Parse a stored protocol name. Matching is exact.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Whether the protocol carries stream (transport + security) settings.
    pub fn supports_stream(&self) -> bool {
        matches!(
            self,
            Protocol::Http | Protocol::Trojan | Protocol::Vless | Protocol::Vmess
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport (`ss_network`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Kcp,
    Ws,
    H2,
    Grpc,
    HttpUpgrade,
    DomainSocket,
    Quic,
}

impl Network {
    pub const ALL: [Network; 8] = [
        Network::Tcp,
        Network::Kcp,
        Network::Ws,
        Network::H2,
        Network::Grpc,
        Network::HttpUpgrade,
        Network::DomainSocket,
        Network::Quic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Kcp => "kcp",
            Network::Ws => "ws",
            Network::H2 => "h2",
            Network::Grpc => "grpc",
            Network::HttpUpgrade => "httpupgrade",
            Network::DomainSocket => "domainsocket",
            Network::Quic => "quic",
        }
    }

    /// Parse a stored network name.
    ///
    /// `http` is accepted as the older spelling of the HTTP/2 transport.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "http" {
            return Some(Network::H2);
        }
        Self::ALL.into_iter().find(|n| n.as_str() == s)
    }

    /// Whether mux may be enabled on top of this transport.
    pub fn supports_mux(&self) -> bool {
        matches!(
            self,
            Network::Ws | Network::Tcp | Network::Grpc | Network::H2 | Network::HttpUpgrade
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream security mode (`ss_security`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    #[default]
    None,
    Tls,
    Xtls,
    Reality,
}

impl Security {
    pub const ALL: [Security; 4] = [
        Security::None,
        Security::Tls,
        Security::Xtls,
        Security::Reality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Security::None => "none",
            Security::Tls => "tls",
            Security::Xtls => "xtls",
            Security::Reality => "reality",
        }
    }

    /// Parse a stored security mode. An empty value means `none`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(Security::None);
        }
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored option value: a scalar string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Scalar view of the value; lists yield their first item.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::List(items) => items.first().map(String::as_str),
        }
    }

    /// List view of the value; a scalar becomes a one-item list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            FieldValue::Scalar(s) => vec![s.clone()],
            FieldValue::List(items) => items.clone(),
        }
    }

    /// Unset-equivalent: empty string, `"0"`, or an empty list.
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty() || s == "0",
            FieldValue::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Scalar(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Scalar(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// One section of the flat store: its type plus its options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlatSection {
    #[serde(rename = ".type")]
    pub kind: String,
    #[serde(flatten)]
    pub options: BTreeMap<String, FieldValue>,
}

impl FlatSection {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.options.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(FieldValue::as_scalar)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.options.remove(key)
    }

    /// Builder form of [`FlatSection::set`], handy for fixtures.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }
}

/// The whole flat store: section id to section.
pub type FlatRecord = BTreeMap<String, FlatSection>;

/// Visibility of a field after dependency resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// No rule holds: the field is hidden and its value is not applicable.
    Omit,
    /// Active and must carry a value.
    Required,
    /// Active, value optional.
    Optional,
}

/// Options for dependency resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Value of the global REALITY capability flag (`reality_check`).
    pub reality: bool,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REALITY capability flag.
    pub fn reality(mut self, reality: bool) -> Self {
        self.reality = reality;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parse_is_exact() {
        assert_eq!(Protocol::parse("vless"), Some(Protocol::Vless));
        assert_eq!(Protocol::parse("vlessx"), None);
        assert_eq!(Protocol::parse("VLESS"), None);
        assert_eq!(Protocol::parse(""), None);
    }

    #[test]
    fn stream_protocols() {
        let stream: Vec<_> = Protocol::ALL
            .into_iter()
            .filter(Protocol::supports_stream)
            .collect();
        assert_eq!(
            stream,
            vec![
                Protocol::Http,
                Protocol::Trojan,
                Protocol::Vless,
                Protocol::Vmess
            ]
        );
    }

    #[test]
    fn network_parse_accepts_http_alias() {
        assert_eq!(Network::parse("http"), Some(Network::H2));
        assert_eq!(Network::parse("h2"), Some(Network::H2));
        assert_eq!(Network::parse("httpupgrade"), Some(Network::HttpUpgrade));
        assert_eq!(Network::parse("mkcp"), None);
    }

    #[test]
    fn security_empty_means_none() {
        assert_eq!(Security::parse(""), Some(Security::None));
        assert_eq!(Security::parse("reality"), Some(Security::Reality));
        assert_eq!(Security::parse("ssl"), None);
    }

    #[test]
    fn falsy_values() {
        assert!(FieldValue::from("").is_falsy());
        assert!(FieldValue::from("0").is_falsy());
        assert!(FieldValue::List(vec![]).is_falsy());
        assert!(!FieldValue::from("1").is_falsy());
        assert!(!FieldValue::from("false").is_falsy());
    }

    #[test]
    fn flat_section_json_shape() {
        let section = FlatSection::new("outbound")
            .with("protocol", "vmess")
            .with("ss_http_host", vec!["a.com".to_string()]);
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json[".type"], "outbound");
        assert_eq!(json["protocol"], "vmess");
        assert_eq!(json["ss_http_host"][0], "a.com");

        let back: FlatSection = serde_json::from_value(json).unwrap();
        assert_eq!(back, section);
    }
}
