//! Protocol schema registry.
//!
//! A static catalogue of every flat key an outbound section may carry: its
//! value kind, default, required status, fixed choices, the validation kind
//! the external validator applies to it, which protocol/transport/security
//! combination it belongs to, and the dependency rules that decide whether
//! the form shows it.
//!
//! Key strings are the wire contract with the store and the daemon config
//! generator. They are reproduced exactly, typos included.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::UnknownProtocol;
use crate::resolver::{Constraint, Rule};
use crate::types::{Network, Protocol, Security, REALITY_CHECK};

/// How a field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Single string.
    Scalar,
    /// Ordered list of strings.
    List,
    /// `"0"` or `"1"`.
    Flag,
}

/// Validation kinds understood by the external validation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationKind {
    Port,
    UInteger,
    Host,
    Path,
    Sni,
    Domain,
    WgKeys,
    WgReserved,
    FragmentLength,
    FragmentInterval,
    FragmentPackets,
    GrpcServiceName,
    ShortId,
    RealityPublicKey,
    IpOrCidr,
}

impl ValidationKind {
    /// Tag passed to the validation service.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationKind::Port => "port",
            ValidationKind::UInteger => "uinteger",
            ValidationKind::Host => "host",
            ValidationKind::Path => "path",
            ValidationKind::Sni => "sni",
            ValidationKind::Domain => "domain",
            ValidationKind::WgKeys => "wg-keys",
            ValidationKind::WgReserved => "wg-reserved",
            ValidationKind::FragmentLength => "fragment-length",
            ValidationKind::FragmentInterval => "fragment-interval",
            ValidationKind::FragmentPackets => "fragment-packets",
            ValidationKind::GrpcServiceName => "grpc-service-name",
            ValidationKind::ShortId => "short-id",
            ValidationKind::RealityPublicKey => "reality-public-key",
            ValidationKind::IpOrCidr => "ip-or-cidr",
        }
    }
}

/// Which entries a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every outbound.
    Common,
    /// Settings namespace of one protocol (`s_<protocol>_*`).
    Protocol(Protocol),
    /// A fixed protocol subset.
    Protocols(&'static [Protocol]),
    /// Every protocol except the listed ones.
    ExceptProtocols(&'static [Protocol]),
    /// Every protocol that carries stream settings.
    Stream,
    /// One transport's settings (`ss_<transport>_*`).
    Network(Network),
    /// Security-mode settings (`ss_tls_*`, `ss_reality_*`).
    Security(&'static [Security]),
    /// Multiplexing (`mux_*`, `xudp_*`).
    Mux,
    /// Known to the resolver but never stored in an outbound section.
    Virtual,
}

/// Descriptor of one flat key.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub kind: ValueKind,
    pub scope: Scope,
    pub default: Option<&'static str>,
    pub required: bool,
    pub choices: &'static [&'static str],
    pub validation: Option<ValidationKind>,
    /// Dependency rules, OR-combined. Empty means always active.
    pub rules: &'static [Rule],
    /// The value names another outbound's tag.
    pub reference: bool,
}

impl FieldDescriptor {
    const fn new(key: &'static str, kind: ValueKind, scope: Scope, rules: &'static [Rule]) -> Self {
        Self {
            key,
            kind,
            scope,
            default: None,
            required: false,
            choices: &[],
            validation: None,
            rules,
            reference: false,
        }
    }

    const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    const fn default_value(self, value: &'static str) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }

    const fn choices(self, choices: &'static [&'static str]) -> Self {
        Self { choices, ..self }
    }

    const fn validate(self, kind: ValidationKind) -> Self {
        Self {
            validation: Some(kind),
            ..self
        }
    }

    const fn reference(self) -> Self {
        Self {
            reference: true,
            ..self
        }
    }
}

const fn scalar(key: &'static str, scope: Scope, rules: &'static [Rule]) -> FieldDescriptor {
    FieldDescriptor::new(key, ValueKind::Scalar, scope, rules)
}

const fn list(key: &'static str, scope: Scope, rules: &'static [Rule]) -> FieldDescriptor {
    FieldDescriptor::new(key, ValueKind::List, scope, rules)
}

const fn flag(key: &'static str, scope: Scope, rules: &'static [Rule]) -> FieldDescriptor {
    FieldDescriptor::new(key, ValueKind::Flag, scope, rules)
}

const STREAM_PROTOCOLS: &[&str] = &["http", "trojan", "vless", "vmess"];
const MUX_NETWORKS: &[&str] = &["ws", "tcp", "grpc", "h2", "http", "httpupgrade"];
const FLOW_NETWORKS: &[&str] = &["tcp", "kcp", "domainsocket", "ws", "grpc", "httpupgrade"];
const DOMAIN_STRATEGIES: &[&str] = &["AsIs", "UseIP", "UseIPv4", "UseIPv6"];
const HEADER_TYPES: &[&str] = &["", "none", "srtp", "utp", "wechat-video", "dtls", "wireguard"];
const BOOLEAN_CHOICES: &[&str] = &["false", "true"];
const BINARY_CHOICES: &[&str] = &["0", "1"];

const ON_BLACKHOLE: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("blackhole"))])];
const ON_DNS: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("dns"))])];
const ON_FREEDOM: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("freedom"))])];
const ON_FRAGMENT: &[Rule] = &[Rule::all(&[("s_freedom_fragment_enabled", Constraint::Equals("1"))])];
const ON_HTTP: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("http"))])];
const ON_HYSTERIA2: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("hysteria2"))])];
const ON_LOOPBACK: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("loopback"))])];
const ON_SHADOWSOCKS: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("shadowsocks"))])];
const ON_SOCKS: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("socks"))])];
const ON_TROJAN: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("trojan"))])];
const ON_VLESS: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("vless"))])];
const ON_VMESS: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("vmess"))])];
const ON_WIREGUARD: &[Rule] = &[Rule::all(&[("protocol", Constraint::Equals("wireguard"))])];
const ON_STREAM: &[Rule] = &[Rule::all(&[("protocol", Constraint::OneOf(STREAM_PROTOCOLS))])];

const ON_TLS: &[Rule] = &[Rule::all(&[("ss_security", Constraint::OneOf(&["tls", "xtls"]))])];
const ON_REALITY: &[Rule] = &[Rule::all(&[("ss_security", Constraint::Equals("reality"))])];
const ON_FINGERPRINT: &[Rule] = &[Rule::all(&[("ss_security", Constraint::OneOf(&["reality", "tls", "xtls"]))])];

const ON_TCP: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("tcp"))])];
const ON_TCP_HTTP_HEADER: &[Rule] = &[Rule::all(&[("ss_tcp_header_type", Constraint::Equals("http"))])];
const ON_KCP: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("kcp"))])];
const ON_WS: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("ws"))])];
const ON_GRPC: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("grpc"))])];
const ON_GRPC_HEALTH: &[Rule] = &[Rule::all(&[("ss_grpc_permit_without_stream", Constraint::Equals("1"))])];
const ON_H2: &[Rule] = &[Rule::all(&[("ss_network", Constraint::OneOf(&["h2", "http"]))])];
const ON_HTTPUPGRADE: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("httpupgrade"))])];
const ON_DOMAINSOCKET: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("domainsocket"))])];
const ON_QUIC: &[Rule] = &[Rule::all(&[("ss_network", Constraint::Equals("quic"))])];
const ON_QUIC_KEY: &[Rule] = &[Rule::all(&[("ss_quic_security", Constraint::OneOf(&["aes-128-gcm", "chacha20-poly1305"]))])];

const FLOW_RULES: &[Rule] = &[
    Rule::all(&[
        ("protocol", Constraint::Equals("vless")),
        ("ss_network", Constraint::OneOf(&["tcp", "kcp", "domainsocket"])),
        (REALITY_CHECK, Constraint::Equals("0")),
        ("ss_security", Constraint::Equals("xtls")),
    ]),
    Rule::all(&[
        ("protocol", Constraint::Equals("vless")),
        ("ss_network", Constraint::OneOf(FLOW_NETWORKS)),
        (REALITY_CHECK, Constraint::Equals("1")),
        ("ss_security", Constraint::Equals("tls")),
    ]),
    Rule::all(&[
        ("protocol", Constraint::Equals("vless")),
        ("ss_network", Constraint::OneOf(FLOW_NETWORKS)),
        (REALITY_CHECK, Constraint::Equals("1")),
        ("ss_security", Constraint::Equals("reality")),
    ]),
];

const NOT_WIREGUARD_OR_HYSTERIA2: &[Rule] =
    &[Rule::any_but(&[("protocol", Constraint::OneOf(&["wireguard", "hysteria2"]))])];
const NOT_WIREGUARD: &[Rule] = &[Rule::any_but(&[("protocol", Constraint::Equals("wireguard"))])];
const NOT_HYSTERIA2: &[Rule] = &[Rule::any_but(&[("protocol", Constraint::Equals("hysteria2"))])];
const ON_SOCKOPT_DOMAIN_STRATEGY: &[Rule] = &[Rule::all(&[("protocol", Constraint::OneOf(&["http", "loopback", "mtproto", "shadowsocks", "socks", "trojan", "vless", "vmess"]))])];
const ON_CONGESTION: &[Rule] = &[
    Rule::all(&[
        ("protocol", Constraint::OneOf(STREAM_PROTOCOLS)),
        ("ss_network", Constraint::OneOf(&["grpc", "h2", "http", "tcp", "ws", "httpupgrade"])),
    ]),
    Rule::all(&[("protocol", Constraint::OneOf(&["freedom", "mtproto", "socks"]))]),
];

// An unset security reads as `none`.
const ON_MUX: &[Rule] = &[
    Rule::all(&[
        ("protocol", Constraint::OneOf(STREAM_PROTOCOLS)),
        ("ss_network", Constraint::OneOf(MUX_NETWORKS)),
        ("ss_security", Constraint::OneOf(&["tls", "none"])),
    ]),
    Rule::all(&[
        ("protocol", Constraint::OneOf(STREAM_PROTOCOLS)),
        ("ss_network", Constraint::OneOf(MUX_NETWORKS)),
        ("ss_security", Constraint::Unset),
    ]),
];
const ON_MUX_ENABLED: &[Rule] = &[Rule::all(&[("mux_enabled", Constraint::Equals("1"))])];
const ON_XUDP: &[Rule] = &[Rule::all(&[("mux_enabled", Constraint::Equals("1")), (REALITY_CHECK, Constraint::Equals("1"))])];

const EXCEPT_WG_HY2: Scope = Scope::ExceptProtocols(&[Protocol::Wireguard, Protocol::Hysteria2]);
const TLS_MODES: Scope = Scope::Security(&[Security::Tls, Security::Xtls]);
const REALITY_MODE: Scope = Scope::Security(&[Security::Reality]);

use ValidationKind as V;

static FIELDS: &[FieldDescriptor] = &[
    // Common
    scalar("alias", Scope::Common, &[]).required(),
    scalar("tag", Scope::Common, &[]).required(),
    scalar("send_through", Scope::Common, &[]),
    scalar("protocol", Scope::Common, &[])
        .required()
        .choices(&[
            "blackhole",
            "dns",
            "freedom",
            "http",
            "hysteria2",
            "loopback",
            "mtproto",
            "shadowsocks",
            "socks",
            "trojan",
            "vless",
            "vmess",
            "wireguard",
        ]),
    scalar(
        "proxy_settings_tag",
        Scope::ExceptProtocols(&[Protocol::Hysteria2]),
        NOT_HYSTERIA2,
    )
    .reference(),
    // Blackhole
    scalar(
        "s_blackhole_reponse_type",
        Scope::Protocol(Protocol::Blackhole),
        ON_BLACKHOLE,
    )
    .choices(&["", "none", "http"]),
    // DNS
    scalar("s_dns_network", Scope::Protocol(Protocol::Dns), ON_DNS).choices(&["", "tcp", "udp"]),
    scalar("s_dns_address", Scope::Protocol(Protocol::Dns), ON_DNS),
    scalar("s_dns_port", Scope::Protocol(Protocol::Dns), ON_DNS).validate(V::Port),
    scalar("s_dns_non_ip_query", Scope::Protocol(Protocol::Dns), ON_DNS)
        .choices(&["", "drop", "skip"]),
    // Freedom
    scalar(
        "s_freedom_domain_strategy",
        Scope::Protocol(Protocol::Freedom),
        ON_FREEDOM,
    )
    .choices(&[
        "",
        "AsIs",
        "ForceIP",
        "ForceIPv4",
        "ForceIPv6",
        "ForceIPv4v6",
        "ForceIPv6v4",
        "UseIP",
        "UseIPv4",
        "UseIPv6",
        "UseIPv4v6",
        "UseIPv6v4",
    ]),
    scalar("s_freedom_redirect", Scope::Protocol(Protocol::Freedom), ON_FREEDOM),
    flag(
        "s_freedom_fragment_enabled",
        Scope::Protocol(Protocol::Freedom),
        ON_FREEDOM,
    ),
    scalar(
        "s_freedom_fragment_length",
        Scope::Protocol(Protocol::Freedom),
        ON_FRAGMENT,
    )
    .validate(V::FragmentLength),
    scalar(
        "s_freedom_fragment_interval",
        Scope::Protocol(Protocol::Freedom),
        ON_FRAGMENT,
    )
    .validate(V::FragmentInterval),
    scalar(
        "s_freedom_fragment_packets",
        Scope::Protocol(Protocol::Freedom),
        ON_FRAGMENT,
    )
    .validate(V::FragmentPackets),
    scalar("s_freedom_user_level", Scope::Protocol(Protocol::Freedom), ON_FREEDOM)
        .validate(V::UInteger),
    // HTTP
    scalar("s_http_address", Scope::Protocol(Protocol::Http), ON_HTTP).validate(V::Host),
    scalar("s_http_server_port", Scope::Protocol(Protocol::Http), ON_HTTP).validate(V::Port),
    scalar("s_http_account_user", Scope::Protocol(Protocol::Http), ON_HTTP),
    scalar("s_http_account_pass", Scope::Protocol(Protocol::Http), ON_HTTP),
    list("s_http_headers", Scope::Protocol(Protocol::Http), ON_HTTP),
    // Hysteria2
    scalar("s_hysteria2_address", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2)
        .validate(V::Host),
    scalar("s_hysteria2_port", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2)
        .validate(V::Port),
    scalar("s_hysteria2_auth", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2),
    scalar("s_hysteria2_tls_sni", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2)
        .validate(V::Host),
    scalar(
        "s_hysteria2_tls_insecure",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .choices(BOOLEAN_CHOICES),
    scalar(
        "s_hysteria2_tls_pinsha256",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    ),
    scalar("s_hysteria2_tls_ca", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2),
    scalar(
        "s_hysteria2_domain_strategy",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .choices(&["UseIP", "UseIPv4", "UseIPv6"]),
    scalar(
        "s_hysteria2_udp_hopinterval",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("30")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_initStreamRW",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("8388608")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_maxStreamRW",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("8388608")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_initConnRW",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("20971520")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_maxConnRW",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("20971520")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_maxIdleTO",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("30")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_keepalive",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .default_value("10")
    .validate(V::UInteger),
    scalar(
        "s_hysteria2_quic_disableMTU",
        Scope::Protocol(Protocol::Hysteria2),
        ON_HYSTERIA2,
    )
    .choices(BOOLEAN_CHOICES),
    scalar("s_hysteria2_bw_up", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2)
        .required()
        .default_value("50")
        .validate(V::UInteger),
    scalar("s_hysteria2_bw_down", Scope::Protocol(Protocol::Hysteria2), ON_HYSTERIA2)
        .required()
        .default_value("100")
        .validate(V::UInteger),
    // Loopback
    scalar(
        "s_loopback_inboundtag",
        Scope::Protocol(Protocol::Loopback),
        ON_LOOPBACK,
    ),
    // Shadowsocks
    scalar(
        "s_shadowsocks_email",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    ),
    scalar(
        "s_shadowsocks_address",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    )
    .validate(V::Host),
    scalar(
        "s_shadowsocks_port",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    )
    .validate(V::Port),
    scalar(
        "s_shadowsocks_method",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    )
    .choices(&[
        "",
        "aes-256-cfb",
        "aes-128-cfb",
        "chacha20",
        "chacha20-ietf",
        "aes-256-gcm",
        "aes-128-gcm",
        "chacha20-poly1305",
        "chacha20-ietf-poly1305",
    ]),
    scalar(
        "s_shadowsocks_password",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    ),
    scalar(
        "s_shadowsocks_level",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    )
    .validate(V::UInteger),
    flag(
        "s_shadowsocks_ota",
        Scope::Protocol(Protocol::Shadowsocks),
        ON_SHADOWSOCKS,
    ),
    // Socks
    scalar("s_socks_server_address", Scope::Protocol(Protocol::Socks), ON_SOCKS)
        .validate(V::Host),
    scalar("s_socks_server_port", Scope::Protocol(Protocol::Socks), ON_SOCKS).validate(V::Port),
    scalar("s_socks_account_user", Scope::Protocol(Protocol::Socks), ON_SOCKS),
    scalar("s_socks_account_pass", Scope::Protocol(Protocol::Socks), ON_SOCKS),
    scalar("s_socks_user_level", Scope::Protocol(Protocol::Socks), ON_SOCKS)
        .validate(V::UInteger),
    // Trojan
    scalar("s_trojan_address", Scope::Protocol(Protocol::Trojan), ON_TROJAN).validate(V::Host),
    scalar("s_trojan_port", Scope::Protocol(Protocol::Trojan), ON_TROJAN).validate(V::Port),
    scalar("s_trojan_password", Scope::Protocol(Protocol::Trojan), ON_TROJAN),
    // VLESS
    scalar("s_vless_address", Scope::Protocol(Protocol::Vless), ON_VLESS).validate(V::Host),
    scalar("s_vless_port", Scope::Protocol(Protocol::Vless), ON_VLESS).validate(V::Port),
    scalar("s_vless_user_id", Scope::Protocol(Protocol::Vless), ON_VLESS),
    scalar("s_vless_user_level", Scope::Protocol(Protocol::Vless), ON_VLESS)
        .validate(V::UInteger),
    scalar("s_vless_user_encryption", Scope::Protocol(Protocol::Vless), ON_VLESS)
        .default_value("none")
        .choices(&["none"]),
    scalar("s_xtls_flow", Scope::Protocol(Protocol::Vless), FLOW_RULES),
    // VMess
    scalar("s_vmess_address", Scope::Protocol(Protocol::Vmess), ON_VMESS).validate(V::Host),
    scalar("s_vmess_port", Scope::Protocol(Protocol::Vmess), ON_VMESS).validate(V::Port),
    scalar("s_vmess_user_id", Scope::Protocol(Protocol::Vmess), ON_VMESS),
    scalar("s_vmess_user_alter_id", Scope::Protocol(Protocol::Vmess), ON_VMESS)
        .validate(V::UInteger),
    scalar("s_vmess_user_security", Scope::Protocol(Protocol::Vmess), ON_VMESS).choices(&[
        "",
        "auto",
        "aes-128-gcm",
        "chacha20-poly1305",
        "none",
    ]),
    scalar("s_vmess_user_level", Scope::Protocol(Protocol::Vmess), ON_VMESS)
        .validate(V::UInteger),
    // WireGuard
    scalar(
        "s_wireguard_secret_key",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .required()
    .validate(V::WgKeys),
    list(
        "s_wireguard_address",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .validate(V::IpOrCidr),
    scalar(
        "s_wireguard_endpoint",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .required(),
    scalar(
        "s_wireguard_public_key",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .required()
    .validate(V::WgKeys),
    scalar(
        "s_wireguard_preshared_key",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    ),
    list(
        "s_wireguard_allowed_ips",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .validate(V::IpOrCidr),
    scalar(
        "s_wireguard_keep_alive",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .validate(V::UInteger),
    scalar("s_wireguard_mtu", Scope::Protocol(Protocol::Wireguard), ON_WIREGUARD)
        .validate(V::UInteger),
    scalar(
        "s_wireguard_reserved_bytes",
        Scope::Protocol(Protocol::Wireguard),
        ON_WIREGUARD,
    )
    .validate(V::WgReserved),
    // Stream
    scalar("ss_network", Scope::Stream, ON_STREAM).choices(&[
        "",
        "grpc",
        "tcp",
        "kcp",
        "ws",
        "h2",
        "http",
        "httpupgrade",
        "domainsocket",
        "quic",
    ]),
    scalar("ss_security", Scope::Stream, ON_STREAM)
        .required()
        .default_value("none")
        .choices(&["none", "tls", "xtls", "reality"]),
    // TLS
    scalar("ss_tls_server_name", TLS_MODES, ON_TLS).validate(V::Sni),
    list("ss_tls_alpn", TLS_MODES, ON_TLS).choices(&["h2", "http/1.1"]),
    flag("ss_tls_allow_insecure", TLS_MODES, ON_TLS),
    flag("ss_tls_allow_insecure_ciphers", TLS_MODES, ON_TLS),
    flag("ss_tls_disable_system_root", TLS_MODES, ON_TLS),
    scalar("ss_tls_cert_usage", TLS_MODES, ON_TLS).choices(&[
        "",
        "encipherment",
        "verify",
        "issue",
    ]),
    scalar("ss_tls_cert_fiile", TLS_MODES, ON_TLS),
    scalar("ss_tls_key_file", TLS_MODES, ON_TLS),
    // REALITY
    scalar("ss_reality_show", REALITY_MODE, ON_REALITY).choices(BINARY_CHOICES),
    scalar(
        "ss_reality_fingerprint",
        Scope::Security(&[Security::Tls, Security::Xtls, Security::Reality]),
        ON_FINGERPRINT,
    )
    .choices(&[
        "",
        "360",
        "chrome",
        "edge",
        "firefox",
        "ios",
        "qq",
        "random",
        "randomized",
        "safari",
    ]),
    scalar("ss_reality_server_name", REALITY_MODE, ON_REALITY).validate(V::Sni),
    scalar("ss_reality_public_key", REALITY_MODE, ON_REALITY).validate(V::RealityPublicKey),
    scalar("ss_reality_short_id", REALITY_MODE, ON_REALITY).validate(V::ShortId),
    scalar("ss_reality_spiderx", REALITY_MODE, ON_REALITY),
    // TCP
    scalar("ss_tcp_header_type", Scope::Network(Network::Tcp), ON_TCP)
        .choices(&["", "none", "http"]),
    scalar(
        "ss_tcp_header_request_version",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    scalar(
        "ss_tcp_header_request_method",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    )
    .choices(&[
        "", "GET", "HEAD", "POST", "DELETE", "PUT", "PATCH", "OPTIONS",
    ]),
    scalar(
        "ss_tcp_header_request_path",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    )
    .validate(V::Path),
    list(
        "ss_tcp_header_request_headers",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    scalar(
        "ss_tcp_header_response_version",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    scalar(
        "ss_tcp_header_response_status",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    scalar(
        "ss_tcp_header_response_reason",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    list(
        "ss_tcp_header_response_headers",
        Scope::Network(Network::Tcp),
        ON_TCP_HTTP_HEADER,
    ),
    // mKCP
    scalar("ss_kcp_mtu", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("1350")
        .validate(V::UInteger),
    scalar("ss_kcp_tti", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("50")
        .validate(V::UInteger),
    scalar("ss_kcp_uplink_capacity", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("5")
        .validate(V::UInteger),
    scalar("ss_kcp_downlink_capacity", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("20")
        .validate(V::UInteger),
    flag("ss_kcp_congestion", Scope::Network(Network::Kcp), ON_KCP),
    scalar("ss_kcp_read_buffer_size", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("2")
        .validate(V::UInteger),
    scalar("ss_kcp_write_buffer_size", Scope::Network(Network::Kcp), ON_KCP)
        .default_value("2")
        .validate(V::UInteger),
    scalar("ss_kcp_header_type", Scope::Network(Network::Kcp), ON_KCP).choices(HEADER_TYPES),
    // WebSocket
    scalar("ss_websocket_path", Scope::Network(Network::Ws), ON_WS).validate(V::Path),
    scalar("ss_websocket_headers", Scope::Network(Network::Ws), ON_WS).validate(V::Sni),
    // gRPC
    scalar("ss_grpc_authority", Scope::Network(Network::Grpc), ON_GRPC).validate(V::Host),
    scalar("ss_grpc_service_name", Scope::Network(Network::Grpc), ON_GRPC)
        .required()
        .validate(V::GrpcServiceName),
    scalar("ss_grpc_multi_mode", Scope::Network(Network::Grpc), ON_GRPC)
        .choices(BINARY_CHOICES),
    scalar(
        "ss_grpc_permit_without_stream",
        Scope::Network(Network::Grpc),
        ON_GRPC,
    )
    .choices(BINARY_CHOICES),
    scalar("ss_grpc_idle_timeout", Scope::Network(Network::Grpc), ON_GRPC)
        .default_value("10")
        .validate(V::UInteger),
    scalar(
        "ss_grpc_health_check_timeout",
        Scope::Network(Network::Grpc),
        ON_GRPC_HEALTH,
    )
    .default_value("20")
    .validate(V::UInteger),
    scalar(
        "ss_grpc_initial_windows_size",
        Scope::Network(Network::Grpc),
        ON_GRPC,
    )
    .validate(V::UInteger),
    // HTTP/2
    list("ss_http_host", Scope::Network(Network::H2), ON_H2).validate(V::Domain),
    scalar("ss_http_path", Scope::Network(Network::H2), ON_H2)
        .default_value("/")
        .validate(V::Path),
    // HTTPUpgrade
    scalar(
        "ss_httpupgrade_accept_proxy_protocol",
        Scope::Network(Network::HttpUpgrade),
        ON_HTTPUPGRADE,
    )
    .choices(BINARY_CHOICES),
    scalar(
        "ss_httpupgrade_path",
        Scope::Network(Network::HttpUpgrade),
        ON_HTTPUPGRADE,
    )
    .required()
    .default_value("/")
    .validate(V::Path),
    scalar(
        "ss_httpupgrade_host",
        Scope::Network(Network::HttpUpgrade),
        ON_HTTPUPGRADE,
    )
    .validate(V::Sni),
    // Domain socket
    scalar(
        "ss_domainsocket_path",
        Scope::Network(Network::DomainSocket),
        ON_DOMAINSOCKET,
    )
    .validate(V::Path),
    // QUIC
    scalar("ss_quic_security", Scope::Network(Network::Quic), ON_QUIC).choices(&[
        "none",
        "aes-128-gcm",
        "chacha20-poly1305",
    ]),
    scalar("ss_quic_key", Scope::Network(Network::Quic), ON_QUIC_KEY),
    scalar("ss_quic_header_type", Scope::Network(Network::Quic), ON_QUIC)
        .choices(HEADER_TYPES),
    // Socket options
    scalar("ss_sockopt_mark", EXCEPT_WG_HY2, NOT_WIREGUARD_OR_HYSTERIA2)
        .default_value("255")
        .validate(V::UInteger),
    scalar(
        "ss_sockopt_iface",
        Scope::ExceptProtocols(&[Protocol::Wireguard]),
        NOT_WIREGUARD,
    ),
    scalar(
        "ss_sockopt_domain_strategy",
        Scope::Protocols(&[
            Protocol::Http,
            Protocol::Loopback,
            Protocol::Mtproto,
            Protocol::Shadowsocks,
            Protocol::Socks,
            Protocol::Trojan,
            Protocol::Vless,
            Protocol::Vmess,
        ]),
        ON_SOCKOPT_DOMAIN_STRATEGY,
    )
    .choices(DOMAIN_STRATEGIES),
    scalar(
        "ss_sockopt_tcp_fast_open",
        EXCEPT_WG_HY2,
        NOT_WIREGUARD_OR_HYSTERIA2,
    )
    .choices(&["", "0", "1"]),
    scalar(
        "ss_sockopt_tcp_no_Delay",
        Scope::Protocol(Protocol::Freedom),
        ON_FRAGMENT,
    )
    .choices(BINARY_CHOICES),
    scalar(
        "ss_sockopt_dialer_proxy",
        EXCEPT_WG_HY2,
        NOT_WIREGUARD_OR_HYSTERIA2,
    )
    .reference(),
    scalar(
        "ss_sockopt_tcp_congestion",
        Scope::Protocols(&[
            Protocol::Http,
            Protocol::Trojan,
            Protocol::Vless,
            Protocol::Vmess,
            Protocol::Freedom,
            Protocol::Mtproto,
            Protocol::Socks,
        ]),
        ON_CONGESTION,
    ),
    // Mux
    flag("mux_enabled", Scope::Mux, ON_MUX),
    scalar("mux_concurrency", Scope::Mux, ON_MUX_ENABLED).default_value("8"),
    scalar("xudp_concurrency", Scope::Mux, ON_XUDP).default_value("8"),
    scalar("xudp_proxy_udp443", Scope::Mux, ON_XUDP).choices(&["reject", "allow", "skip"]),
    // Virtual
    flag(REALITY_CHECK, Scope::Virtual, &[]),
];

/// Every registered field, in registry order.
pub fn fields() -> &'static [FieldDescriptor] {
    FIELDS
}

/// Look up a single field by its flat key.
pub fn field(key: &str) -> Option<&'static FieldDescriptor> {
    FIELDS.iter().find(|f| f.key == key)
}

/// The protocol-to-stream/security combination that decides which keys an
/// outbound section may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combination {
    pub protocol: Protocol,
    /// Ignored for protocols without stream settings.
    pub network: Option<Network>,
    /// Ignored for protocols without stream settings.
    pub security: Security,
}

impl Combination {
    pub fn new(protocol: Protocol, network: Option<Network>, security: Security) -> Self {
        Self {
            protocol,
            network,
            security,
        }
    }

    /// Whether mux settings apply to this combination.
    pub fn supports_mux(&self) -> bool {
        self.protocol.supports_stream()
            && self.network.is_some_and(|n| n.supports_mux())
            && matches!(self.security, Security::Tls | Security::None)
    }

    /// Whether a field belongs to this combination.
    pub fn applies(&self, field: &FieldDescriptor) -> bool {
        let stream = self.protocol.supports_stream();
        match field.scope {
            Scope::Common => true,
            Scope::Protocol(p) => p == self.protocol,
            Scope::Protocols(set) => set.contains(&self.protocol),
            Scope::ExceptProtocols(set) => !set.contains(&self.protocol),
            Scope::Stream => stream,
            Scope::Network(n) => stream && self.network == Some(n),
            Scope::Security(set) => stream && set.contains(&self.security),
            Scope::Mux => self.supports_mux(),
            Scope::Virtual => false,
        }
    }

    /// All fields of this combination, in registry order.
    pub fn fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> + '_ {
        FIELDS.iter().filter(move |f| self.applies(f))
    }
}

/// Settings fields of one protocol (`s_<protocol>_*` and protocol-only keys).
///
/// # Errors
///
/// Returns `UnknownProtocol` for names outside the protocol enumeration.
pub fn protocol_fields(protocol: &str) -> Result<Vec<&'static FieldDescriptor>, UnknownProtocol> {
    let protocol = parse_protocol(protocol)?;
    Ok(FIELDS
        .iter()
        .filter(|f| f.scope == Scope::Protocol(protocol))
        .collect())
}

/// Stream-settings fields for a protocol/transport/security triple.
///
/// Empty for protocols without stream settings.
///
/// # Errors
///
/// Returns `UnknownProtocol` for names outside the protocol enumeration.
pub fn stream_fields(
    protocol: &str,
    network: Option<Network>,
    security: Security,
) -> Result<Vec<&'static FieldDescriptor>, UnknownProtocol> {
    let combination = Combination::new(parse_protocol(protocol)?, network, security);
    Ok(combination
        .fields()
        .filter(|f| {
            matches!(
                f.scope,
                Scope::Stream | Scope::Network(_) | Scope::Security(_)
            )
        })
        .collect())
}

/// Every key valid for a combination: common, protocol, stream, sockopt, mux.
pub fn applicable_keys(combination: &Combination) -> Vec<&'static str> {
    combination.fields().map(|f| f.key).collect()
}

/// JSON Schema describing one flat section of the given combination.
///
/// Properties are typed strings or string arrays with `enum` for fixed
/// choices; required fields of the combination are listed in `required`.
/// Unknown keys are allowed: stale keys are reported by the mapper instead.
pub fn section_schema(combination: &Combination) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    properties.insert(".type".to_string(), json!({ "type": "string" }));

    for field in combination.fields() {
        let item = match field.kind {
            ValueKind::Flag => json!({ "type": "string", "enum": ["0", "1"] }),
            ValueKind::Scalar | ValueKind::List => {
                let mut item = json!({ "type": "string" });
                if !field.choices.is_empty() {
                    item["enum"] = json!(field.choices);
                }
                item
            }
        };
        // A one-item list may be stored as a plain string.
        let property = match field.kind {
            ValueKind::List => json!({ "anyOf": [item.clone(), { "type": "array", "items": item }] }),
            _ => item,
        };
        properties.insert(field.key.to_string(), property);

        if field.required {
            required.push(Value::String(field.key.to_string()));
        }
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": format!("{} outbound", combination.protocol),
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn parse_protocol(name: &str) -> Result<Protocol, UnknownProtocol> {
    Protocol::parse(name).ok_or_else(|| UnknownProtocol {
        name: name.to_string(),
    })
}
