//! Flat-config mapper.
//!
//! Converts one outbound section of a [`FlatRecord`] into a typed
//! [`OutboundEntry`] and back. This is the only place that knows flat key
//! names; every key read or written is gated by the [`Combination`] of the
//! entry, so settings of another protocol, transport or security mode can
//! never leak through a round trip.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, StoreError};
use crate::schema::{self, Combination, Scope};
use crate::store::Store;
use crate::types::{
    FieldValue, FlatRecord, FlatSection, Network, Protocol, Security, OUTBOUND_SECTION,
    REVERSE_SECTION,
};

/// Rust type of a flat value kind.
macro_rules! flat_type {
    (scalar) => { Option<String> };
    (list) => { Vec<String> };
    (flag) => { Option<bool> };
}

/// Declares a settings record together with its flat key mapping.
macro_rules! flat_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$field_meta:meta])* $field:ident: $kind:ident = $key:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: flat_type!($kind), )*
        }

        impl FlatFields for $name {
            fn read(r: &mut Reader<'_>) -> Self {
                Self { $( $field: r.$kind($key), )* }
            }

            fn write(&self, w: &mut Writer) {
                $( w.$kind($key, &self.$field); )*
            }
        }
    };
}

trait FlatFields {
    fn read(r: &mut Reader<'_>) -> Self;
    fn write(&self, w: &mut Writer);
}

// --- Protocol settings ---

flat_struct! {
    pub struct BlackholeSettings {
        response_type: scalar = "s_blackhole_reponse_type",
    }
}

flat_struct! {
    pub struct DnsSettings {
        network: scalar = "s_dns_network",
        address: scalar = "s_dns_address",
        port: scalar = "s_dns_port",
        non_ip_query: scalar = "s_dns_non_ip_query",
    }
}

flat_struct! {
    pub struct FreedomSettings {
        domain_strategy: scalar = "s_freedom_domain_strategy",
        redirect: scalar = "s_freedom_redirect",
        fragment: flag = "s_freedom_fragment_enabled",
        fragment_length: scalar = "s_freedom_fragment_length",
        fragment_interval: scalar = "s_freedom_fragment_interval",
        fragment_packets: scalar = "s_freedom_fragment_packets",
        user_level: scalar = "s_freedom_user_level",
    }
}

flat_struct! {
    pub struct HttpSettings {
        address: scalar = "s_http_address",
        port: scalar = "s_http_server_port",
        user: scalar = "s_http_account_user",
        pass: scalar = "s_http_account_pass",
        /// `Name=value` items.
        headers: list = "s_http_headers",
    }
}

flat_struct! {
    pub struct Hysteria2Settings {
        address: scalar = "s_hysteria2_address",
        port: scalar = "s_hysteria2_port",
        auth: scalar = "s_hysteria2_auth",
        tls_sni: scalar = "s_hysteria2_tls_sni",
        tls_insecure: scalar = "s_hysteria2_tls_insecure",
        tls_pin_sha256: scalar = "s_hysteria2_tls_pinsha256",
        tls_ca: scalar = "s_hysteria2_tls_ca",
        domain_strategy: scalar = "s_hysteria2_domain_strategy",
        udp_hop_interval: scalar = "s_hysteria2_udp_hopinterval",
        init_stream_receive_window: scalar = "s_hysteria2_quic_initStreamRW",
        max_stream_receive_window: scalar = "s_hysteria2_quic_maxStreamRW",
        init_conn_receive_window: scalar = "s_hysteria2_quic_initConnRW",
        max_conn_receive_window: scalar = "s_hysteria2_quic_maxConnRW",
        max_idle_timeout: scalar = "s_hysteria2_quic_maxIdleTO",
        keep_alive_period: scalar = "s_hysteria2_quic_keepalive",
        disable_path_mtu_discovery: scalar = "s_hysteria2_quic_disableMTU",
        bandwidth_up: scalar = "s_hysteria2_bw_up",
        bandwidth_down: scalar = "s_hysteria2_bw_down",
    }
}

flat_struct! {
    pub struct LoopbackSettings {
        inbound_tag: scalar = "s_loopback_inboundtag",
    }
}

flat_struct! {
    pub struct ShadowsocksSettings {
        email: scalar = "s_shadowsocks_email",
        address: scalar = "s_shadowsocks_address",
        port: scalar = "s_shadowsocks_port",
        method: scalar = "s_shadowsocks_method",
        password: scalar = "s_shadowsocks_password",
        level: scalar = "s_shadowsocks_level",
        ota: flag = "s_shadowsocks_ota",
    }
}

flat_struct! {
    pub struct SocksSettings {
        address: scalar = "s_socks_server_address",
        port: scalar = "s_socks_server_port",
        user: scalar = "s_socks_account_user",
        pass: scalar = "s_socks_account_pass",
        user_level: scalar = "s_socks_user_level",
    }
}

flat_struct! {
    pub struct TrojanSettings {
        address: scalar = "s_trojan_address",
        port: scalar = "s_trojan_port",
        password: scalar = "s_trojan_password",
    }
}

flat_struct! {
    pub struct VlessSettings {
        address: scalar = "s_vless_address",
        port: scalar = "s_vless_port",
        user_id: scalar = "s_vless_user_id",
        user_level: scalar = "s_vless_user_level",
        encryption: scalar = "s_vless_user_encryption",
        flow: scalar = "s_xtls_flow",
    }
}

flat_struct! {
    pub struct VmessSettings {
        address: scalar = "s_vmess_address",
        port: scalar = "s_vmess_port",
        user_id: scalar = "s_vmess_user_id",
        alter_id: scalar = "s_vmess_user_alter_id",
        security: scalar = "s_vmess_user_security",
        user_level: scalar = "s_vmess_user_level",
    }
}

flat_struct! {
    pub struct WireguardSettings {
        secret_key: scalar = "s_wireguard_secret_key",
        address: list = "s_wireguard_address",
        endpoint: scalar = "s_wireguard_endpoint",
        public_key: scalar = "s_wireguard_public_key",
        preshared_key: scalar = "s_wireguard_preshared_key",
        allowed_ips: list = "s_wireguard_allowed_ips",
        keep_alive: scalar = "s_wireguard_keep_alive",
        mtu: scalar = "s_wireguard_mtu",
        /// Comma-separated triplet.
        reserved_bytes: scalar = "s_wireguard_reserved_bytes",
    }
}

/// Protocol settings. The variant is the entry's protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Settings {
    Blackhole(BlackholeSettings),
    Dns(DnsSettings),
    Freedom(FreedomSettings),
    Http(HttpSettings),
    Hysteria2(Hysteria2Settings),
    Loopback(LoopbackSettings),
    Mtproto,
    Shadowsocks(ShadowsocksSettings),
    Socks(SocksSettings),
    Trojan(TrojanSettings),
    Vless(VlessSettings),
    Vmess(VmessSettings),
    Wireguard(WireguardSettings),
}

impl Settings {
    /// Empty settings for a protocol.
    pub fn empty(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Blackhole => Settings::Blackhole(Default::default()),
            Protocol::Dns => Settings::Dns(Default::default()),
            Protocol::Freedom => Settings::Freedom(Default::default()),
            Protocol::Http => Settings::Http(Default::default()),
            Protocol::Hysteria2 => Settings::Hysteria2(Default::default()),
            Protocol::Loopback => Settings::Loopback(Default::default()),
            Protocol::Mtproto => Settings::Mtproto,
            Protocol::Shadowsocks => Settings::Shadowsocks(Default::default()),
            Protocol::Socks => Settings::Socks(Default::default()),
            Protocol::Trojan => Settings::Trojan(Default::default()),
            Protocol::Vless => Settings::Vless(Default::default()),
            Protocol::Vmess => Settings::Vmess(Default::default()),
            Protocol::Wireguard => Settings::Wireguard(Default::default()),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Settings::Blackhole(_) => Protocol::Blackhole,
            Settings::Dns(_) => Protocol::Dns,
            Settings::Freedom(_) => Protocol::Freedom,
            Settings::Http(_) => Protocol::Http,
            Settings::Hysteria2(_) => Protocol::Hysteria2,
            Settings::Loopback(_) => Protocol::Loopback,
            Settings::Mtproto => Protocol::Mtproto,
            Settings::Shadowsocks(_) => Protocol::Shadowsocks,
            Settings::Socks(_) => Protocol::Socks,
            Settings::Trojan(_) => Protocol::Trojan,
            Settings::Vless(_) => Protocol::Vless,
            Settings::Vmess(_) => Protocol::Vmess,
            Settings::Wireguard(_) => Protocol::Wireguard,
        }
    }

    fn read(protocol: Protocol, r: &mut Reader<'_>) -> Self {
        match protocol {
            Protocol::Blackhole => Settings::Blackhole(FlatFields::read(r)),
            Protocol::Dns => Settings::Dns(FlatFields::read(r)),
            Protocol::Freedom => Settings::Freedom(FlatFields::read(r)),
            Protocol::Http => Settings::Http(FlatFields::read(r)),
            Protocol::Hysteria2 => Settings::Hysteria2(FlatFields::read(r)),
            Protocol::Loopback => Settings::Loopback(FlatFields::read(r)),
            Protocol::Mtproto => Settings::Mtproto,
            Protocol::Shadowsocks => Settings::Shadowsocks(FlatFields::read(r)),
            Protocol::Socks => Settings::Socks(FlatFields::read(r)),
            Protocol::Trojan => Settings::Trojan(FlatFields::read(r)),
            Protocol::Vless => Settings::Vless(FlatFields::read(r)),
            Protocol::Vmess => Settings::Vmess(FlatFields::read(r)),
            Protocol::Wireguard => Settings::Wireguard(FlatFields::read(r)),
        }
    }

    fn write(&self, w: &mut Writer) {
        match self {
            Settings::Blackhole(s) => s.write(w),
            Settings::Dns(s) => s.write(w),
            Settings::Freedom(s) => s.write(w),
            Settings::Http(s) => s.write(w),
            Settings::Hysteria2(s) => s.write(w),
            Settings::Loopback(s) => s.write(w),
            Settings::Mtproto => {}
            Settings::Shadowsocks(s) => s.write(w),
            Settings::Socks(s) => s.write(w),
            Settings::Trojan(s) => s.write(w),
            Settings::Vless(s) => s.write(w),
            Settings::Vmess(s) => s.write(w),
            Settings::Wireguard(s) => s.write(w),
        }
    }
}

// --- Stream settings ---

flat_struct! {
    pub struct TcpSettings {
        header_type: scalar = "ss_tcp_header_type",
        request_version: scalar = "ss_tcp_header_request_version",
        request_method: scalar = "ss_tcp_header_request_method",
        request_path: scalar = "ss_tcp_header_request_path",
        request_headers: list = "ss_tcp_header_request_headers",
        response_version: scalar = "ss_tcp_header_response_version",
        response_status: scalar = "ss_tcp_header_response_status",
        response_reason: scalar = "ss_tcp_header_response_reason",
        response_headers: list = "ss_tcp_header_response_headers",
    }
}

flat_struct! {
    pub struct KcpSettings {
        mtu: scalar = "ss_kcp_mtu",
        tti: scalar = "ss_kcp_tti",
        uplink_capacity: scalar = "ss_kcp_uplink_capacity",
        downlink_capacity: scalar = "ss_kcp_downlink_capacity",
        congestion: flag = "ss_kcp_congestion",
        read_buffer_size: scalar = "ss_kcp_read_buffer_size",
        write_buffer_size: scalar = "ss_kcp_write_buffer_size",
        header_type: scalar = "ss_kcp_header_type",
    }
}

flat_struct! {
    pub struct WsSettings {
        path: scalar = "ss_websocket_path",
        /// Value of the `Host` header.
        host: scalar = "ss_websocket_headers",
    }
}

flat_struct! {
    pub struct GrpcSettings {
        authority: scalar = "ss_grpc_authority",
        service_name: scalar = "ss_grpc_service_name",
        multi_mode: scalar = "ss_grpc_multi_mode",
        permit_without_stream: scalar = "ss_grpc_permit_without_stream",
        idle_timeout: scalar = "ss_grpc_idle_timeout",
        health_check_timeout: scalar = "ss_grpc_health_check_timeout",
        initial_windows_size: scalar = "ss_grpc_initial_windows_size",
    }
}

flat_struct! {
    pub struct H2Settings {
        host: list = "ss_http_host",
        path: scalar = "ss_http_path",
    }
}

flat_struct! {
    pub struct HttpUpgradeSettings {
        accept_proxy_protocol: scalar = "ss_httpupgrade_accept_proxy_protocol",
        path: scalar = "ss_httpupgrade_path",
        host: scalar = "ss_httpupgrade_host",
    }
}

flat_struct! {
    pub struct DomainSocketSettings {
        path: scalar = "ss_domainsocket_path",
    }
}

flat_struct! {
    pub struct QuicSettings {
        security: scalar = "ss_quic_security",
        key: scalar = "ss_quic_key",
        header_type: scalar = "ss_quic_header_type",
    }
}

/// Stream transport with its settings. The variant is `ss_network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "network", rename_all = "lowercase")]
pub enum Transport {
    Tcp(TcpSettings),
    Kcp(KcpSettings),
    Ws(WsSettings),
    H2(H2Settings),
    Grpc(GrpcSettings),
    HttpUpgrade(HttpUpgradeSettings),
    DomainSocket(DomainSocketSettings),
    Quic(QuicSettings),
}

impl Transport {
    /// Empty settings for a transport.
    pub fn empty(network: Network) -> Self {
        match network {
            Network::Tcp => Transport::Tcp(Default::default()),
            Network::Kcp => Transport::Kcp(Default::default()),
            Network::Ws => Transport::Ws(Default::default()),
            Network::H2 => Transport::H2(Default::default()),
            Network::Grpc => Transport::Grpc(Default::default()),
            Network::HttpUpgrade => Transport::HttpUpgrade(Default::default()),
            Network::DomainSocket => Transport::DomainSocket(Default::default()),
            Network::Quic => Transport::Quic(Default::default()),
        }
    }

    pub fn network(&self) -> Network {
        match self {
            Transport::Tcp(_) => Network::Tcp,
            Transport::Kcp(_) => Network::Kcp,
            Transport::Ws(_) => Network::Ws,
            Transport::H2(_) => Network::H2,
            Transport::Grpc(_) => Network::Grpc,
            Transport::HttpUpgrade(_) => Network::HttpUpgrade,
            Transport::DomainSocket(_) => Network::DomainSocket,
            Transport::Quic(_) => Network::Quic,
        }
    }

    fn read(network: Network, r: &mut Reader<'_>) -> Self {
        match network {
            Network::Tcp => Transport::Tcp(FlatFields::read(r)),
            Network::Kcp => Transport::Kcp(FlatFields::read(r)),
            Network::Ws => Transport::Ws(FlatFields::read(r)),
            Network::H2 => Transport::H2(FlatFields::read(r)),
            Network::Grpc => Transport::Grpc(FlatFields::read(r)),
            Network::HttpUpgrade => Transport::HttpUpgrade(FlatFields::read(r)),
            Network::DomainSocket => Transport::DomainSocket(FlatFields::read(r)),
            Network::Quic => Transport::Quic(FlatFields::read(r)),
        }
    }

    fn write(&self, w: &mut Writer) {
        match self {
            Transport::Tcp(s) => s.write(w),
            Transport::Kcp(s) => s.write(w),
            Transport::Ws(s) => s.write(w),
            Transport::H2(s) => s.write(w),
            Transport::Grpc(s) => s.write(w),
            Transport::HttpUpgrade(s) => s.write(w),
            Transport::DomainSocket(s) => s.write(w),
            Transport::Quic(s) => s.write(w),
        }
    }
}

flat_struct! {
    /// Shared by `tls` and `xtls`.
    pub struct TlsSettings {
        server_name: scalar = "ss_tls_server_name",
        alpn: list = "ss_tls_alpn",
        allow_insecure: flag = "ss_tls_allow_insecure",
        allow_insecure_ciphers: flag = "ss_tls_allow_insecure_ciphers",
        disable_system_root: flag = "ss_tls_disable_system_root",
        cert_usage: scalar = "ss_tls_cert_usage",
        cert_file: scalar = "ss_tls_cert_fiile",
        key_file: scalar = "ss_tls_key_file",
        fingerprint: scalar = "ss_reality_fingerprint",
    }
}

flat_struct! {
    pub struct RealitySettings {
        show: scalar = "ss_reality_show",
        fingerprint: scalar = "ss_reality_fingerprint",
        server_name: scalar = "ss_reality_server_name",
        public_key: scalar = "ss_reality_public_key",
        short_id: scalar = "ss_reality_short_id",
        spider_x: scalar = "ss_reality_spiderx",
    }
}

/// Security mode with its settings. The variant is `ss_security`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "security", rename_all = "lowercase")]
pub enum SecuritySettings {
    #[default]
    None,
    Tls(TlsSettings),
    Xtls(TlsSettings),
    Reality(RealitySettings),
}

impl SecuritySettings {
    pub fn security(&self) -> Security {
        match self {
            SecuritySettings::None => Security::None,
            SecuritySettings::Tls(_) => Security::Tls,
            SecuritySettings::Xtls(_) => Security::Xtls,
            SecuritySettings::Reality(_) => Security::Reality,
        }
    }

    fn read(security: Security, r: &mut Reader<'_>) -> Self {
        match security {
            Security::None => SecuritySettings::None,
            Security::Tls => SecuritySettings::Tls(FlatFields::read(r)),
            Security::Xtls => SecuritySettings::Xtls(FlatFields::read(r)),
            Security::Reality => SecuritySettings::Reality(FlatFields::read(r)),
        }
    }

    fn write(&self, w: &mut Writer) {
        match self {
            SecuritySettings::None => {}
            SecuritySettings::Tls(s) | SecuritySettings::Xtls(s) => s.write(w),
            SecuritySettings::Reality(s) => s.write(w),
        }
    }
}

/// Transport and security of a stream-capable protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// `None` when `ss_network` is unset.
    pub transport: Option<Transport>,
    pub security: SecuritySettings,
}

impl StreamSettings {
    pub fn network(&self) -> Option<Network> {
        self.transport.as_ref().map(Transport::network)
    }

    pub fn security(&self) -> Security {
        self.security.security()
    }

    /// TLS server name implied by an HTTP/2 host list.
    ///
    /// Only applies to `tls` without an explicit server name.
    pub fn derived_server_name(&self) -> Option<&str> {
        let (Some(Transport::H2(h2)), SecuritySettings::Tls(tls)) = (&self.transport, &self.security)
        else {
            return None;
        };
        if tls.server_name.as_deref().is_some_and(|s| !s.is_empty()) {
            return None;
        }
        h2.host.first().map(String::as_str)
    }

    fn write(&self, w: &mut Writer) {
        if let Some(transport) = &self.transport {
            w.set("ss_network", transport.network().as_str().into());
            transport.write(w);
        }
        w.set("ss_security", self.security().as_str().into());
        self.security.write(w);

        if let Some(name) = self.derived_server_name() {
            w.set("ss_tls_server_name", name.into());
        }
    }
}

// --- Socket options and mux ---

flat_struct! {
    /// Socket options; each applies to its own protocol subset.
    pub struct SockoptSettings {
        mark: scalar = "ss_sockopt_mark",
        interface: scalar = "ss_sockopt_iface",
        domain_strategy: scalar = "ss_sockopt_domain_strategy",
        tcp_fast_open: scalar = "ss_sockopt_tcp_fast_open",
        tcp_no_delay: scalar = "ss_sockopt_tcp_no_Delay",
        /// Tag of the outbound to dial through.
        dialer_proxy: scalar = "ss_sockopt_dialer_proxy",
        tcp_congestion: scalar = "ss_sockopt_tcp_congestion",
    }
}

impl SockoptSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

flat_struct! {
    pub struct MuxSettings {
        enabled: flag = "mux_enabled",
        concurrency: scalar = "mux_concurrency",
        xudp_concurrency: scalar = "xudp_concurrency",
        xudp_proxy_udp443: scalar = "xudp_proxy_udp443",
    }
}

impl MuxSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Entry ---

/// One configured outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEntry {
    /// Store section id; `None` until the entry is committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_through: Option<String>,
    pub settings: Settings,
    /// Present only for protocols with stream settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamSettings>,
    #[serde(default, skip_serializing_if = "SockoptSettings::is_empty")]
    pub sockopt: SockoptSettings,
    /// `proxy_settings_tag`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_tag: Option<String>,
    /// Present only when the transport and security allow mux and a mux
    /// option is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux: Option<MuxSettings>,
}

impl OutboundEntry {
    /// New entry with empty settings; stream settings are created for
    /// protocols that carry them.
    pub fn new(alias: impl Into<String>, tag: impl Into<String>, settings: Settings) -> Self {
        let stream = settings
            .protocol()
            .supports_stream()
            .then(StreamSettings::default);
        Self {
            id: None,
            alias: alias.into(),
            tag: tag.into(),
            send_through: None,
            settings,
            stream,
            sockopt: SockoptSettings::default(),
            proxy_tag: None,
            mux: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    /// Protocol, transport and security of this entry.
    pub fn combination(&self) -> Combination {
        match &self.stream {
            Some(stream) => Combination::new(self.protocol(), stream.network(), stream.security()),
            None => Combination::new(self.protocol(), None, Security::None),
        }
    }
}

/// Something the mapper skipped instead of failing on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapWarning {
    /// The key does not belong to the entry's combination.
    DroppedKey { key: String },
    /// A flag holding something other than `0`/`1`.
    MalformedFlag { key: String, value: String },
    UnknownNetwork { value: String },
    UnknownSecurity { value: String },
}

impl fmt::Display for MapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapWarning::DroppedKey { key } => write!(f, "dropped key {key}"),
            MapWarning::MalformedFlag { key, value } => {
                write!(f, "ignored malformed flag {key}={value:?}")
            }
            MapWarning::UnknownNetwork { value } => write!(f, "unknown network {value:?}"),
            MapWarning::UnknownSecurity { value } => {
                write!(f, "unknown security {value:?}, using none")
            }
        }
    }
}

/// Result of [`to_structured`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapped {
    pub entry: OutboundEntry,
    pub warnings: Vec<MapWarning>,
}

/// Read one outbound section into a structured entry.
///
/// Keys outside the entry's protocol/transport/security combination are
/// dropped and reported in [`Mapped::warnings`].
///
/// # Errors
///
/// Returns `MapError::SectionNotFound`, `MapError::MissingProtocol` or
/// `MapError::UnknownProtocol`.
pub fn to_structured(record: &FlatRecord, section_id: &str) -> Result<Mapped, MapError> {
    let section = record
        .get(section_id)
        .ok_or_else(|| MapError::SectionNotFound {
            section: section_id.to_string(),
        })?;

    let name = section
        .get_str("protocol")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MapError::MissingProtocol {
            section: section_id.to_string(),
        })?;
    let protocol = Protocol::parse(name).ok_or_else(|| MapError::UnknownProtocol {
        section: section_id.to_string(),
        protocol: name.to_string(),
    })?;

    let mut warnings = Vec::new();
    let (network, security) = if protocol.supports_stream() {
        stream_mode(section, &mut warnings)
    } else {
        (None, Security::None)
    };
    let combination = Combination::new(protocol, network, security);

    let mut r = Reader::new(section, combination);
    r.consume("protocol");
    if protocol.supports_stream() {
        r.consume("ss_network");
        r.consume("ss_security");
    }

    let entry = OutboundEntry {
        id: Some(section_id.to_string()),
        alias: r.scalar("alias").unwrap_or_default(),
        tag: r.scalar("tag").unwrap_or_default(),
        send_through: r.scalar("send_through"),
        settings: Settings::read(protocol, &mut r),
        stream: protocol.supports_stream().then(|| StreamSettings {
            transport: network.map(|n| Transport::read(n, &mut r)),
            security: SecuritySettings::read(security, &mut r),
        }),
        sockopt: SockoptSettings::read(&mut r),
        proxy_tag: r.scalar("proxy_settings_tag"),
        mux: if combination.supports_mux() {
            Some(MuxSettings::read(&mut r)).filter(|m| !m.is_empty())
        } else {
            None
        },
    };

    warnings.extend(r.finish());
    for warning in &warnings {
        tracing::warn!(section = section_id, "{warning}");
    }

    Ok(Mapped { entry, warnings })
}

/// Single flat store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Remove { key: String },
    Set { key: String, value: FieldValue },
}

/// Ordered operations turning a section into the flat form of an entry.
///
/// Removals come first, then `protocol`, then the remaining keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatPatch {
    pub ops: Vec<PatchOp>,
}

impl FlatPatch {
    /// Value this patch sets for a key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.ops.iter().find_map(|op| match op {
            PatchOp::Set { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    /// Whether this patch removes a key.
    pub fn removes(&self, key: &str) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, PatchOp::Remove { key: k } if k == key))
    }

    /// Apply to an in-memory section, in order.
    pub fn apply(&self, section: &mut FlatSection) {
        for op in &self.ops {
            match op {
                PatchOp::Remove { key } => {
                    section.remove(key);
                }
                PatchOp::Set { key, value } => section.set(key.clone(), value.clone()),
            }
        }
    }

    /// Apply to a section of a store, in order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SectionNotFound` if the store has no such section.
    pub fn apply_to<S: Store + ?Sized>(&self, store: &mut S, section: &str) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                PatchOp::Remove { key } => store.unset(section, key)?,
                PatchOp::Set { key, value } => store.set(section, key, value.clone())?,
            }
        }
        Ok(())
    }
}

/// Produce the flat patch for an entry.
///
/// Every registry key the entry does not write is removed explicitly, so
/// switching protocol or transport clears the old namespace. Keys unknown
/// to the registry are left alone.
pub fn to_flat(entry: &OutboundEntry) -> FlatPatch {
    let mut w = Writer::new(entry.combination());

    w.scalar("alias", &non_empty(&entry.alias));
    w.scalar("tag", &non_empty(&entry.tag));
    w.scalar("send_through", &entry.send_through);
    entry.settings.write(&mut w);
    if let Some(stream) = &entry.stream {
        stream.write(&mut w);
    }
    entry.sockopt.write(&mut w);
    w.scalar("proxy_settings_tag", &entry.proxy_tag);
    if let Some(mux) = &entry.mux {
        mux.write(&mut w);
    }

    w.finish(entry.protocol())
}

/// Check that no other outbound or reverse endpoint already uses `tag`.
///
/// # Errors
///
/// Returns `MapError::DuplicateTag` naming the owner of the tag.
pub fn ensure_unique_tag(
    record: &FlatRecord,
    tag: &str,
    except_section: Option<&str>,
) -> Result<(), MapError> {
    match tag_owner(record, tag, except_section) {
        Some(owner) => Err(MapError::DuplicateTag {
            tag: tag.to_string(),
            owner,
        }),
        None => Ok(()),
    }
}

/// Description of whatever already uses `tag`, if anything.
pub(crate) fn tag_owner(record: &FlatRecord, tag: &str, except_section: Option<&str>) -> Option<String> {
    if tag.is_empty() {
        return None;
    }
    let outbound = outbounds(record)
        .filter(|(id, _)| Some(*id) != except_section)
        .find(|(_, section)| section.get_str("tag") == Some(tag))
        .map(|(id, _)| format!("outbound {id}"));

    outbound.or_else(|| {
        reverse_endpoints(record)
            .into_iter()
            .find(|e| e.tag == tag)
            .map(|e| format!("reverse {} {}", e.section, e.kind))
    })
}

/// Kind of a reverse-proxy endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Bridge,
    Portal,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Bridge => f.write_str("bridge"),
            EndpointKind::Portal => f.write_str("portal"),
        }
    }
}

/// A bridge or portal of a `reverse` section, stored as `tag|domain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReverseEndpoint {
    pub section: String,
    pub kind: EndpointKind,
    pub tag: String,
    pub domain: String,
}

/// All bridges and portals in the record.
pub fn reverse_endpoints(record: &FlatRecord) -> Vec<ReverseEndpoint> {
    let mut endpoints = Vec::new();
    for (id, section) in record.iter().filter(|(_, s)| s.kind == REVERSE_SECTION) {
        for (key, kind) in [("bridges", EndpointKind::Bridge), ("portals", EndpointKind::Portal)] {
            let items = section.get(key).map(FieldValue::to_list).unwrap_or_default();
            // Older records join several endpoints into one comma-separated item.
            for item in items.iter().flat_map(|i| i.split(',')) {
                let (tag, domain) = item.split_once('|').unwrap_or((item, ""));
                if tag.is_empty() {
                    continue;
                }
                endpoints.push(ReverseEndpoint {
                    section: id.clone(),
                    kind,
                    tag: tag.to_string(),
                    domain: domain.to_string(),
                });
            }
        }
    }
    endpoints
}

/// A tag an outbound may name in `ss_sockopt_dialer_proxy` or
/// `proxy_settings_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceCandidate {
    pub tag: String,
    /// `alias(tag)` for outbounds, `tag|domain` for portals.
    pub label: String,
}

/// Outbound tags followed by reverse portal tags, in record order.
pub fn reference_candidates(record: &FlatRecord) -> Vec<ReferenceCandidate> {
    let outbounds = outbounds(record).filter_map(|(_, section)| {
        let tag = section.get_str("tag").filter(|t| !t.is_empty())?;
        let alias = section.get_str("alias").unwrap_or_default();
        Some(ReferenceCandidate {
            tag: tag.to_string(),
            label: format!("{alias}({tag})"),
        })
    });
    let portals = reverse_endpoints(record)
        .into_iter()
        .filter(|e| e.kind == EndpointKind::Portal)
        .map(|e| ReferenceCandidate {
            label: format!("{}|{}", e.tag, e.domain),
            tag: e.tag,
        });
    outbounds.chain(portals).collect()
}

/// A reference field naming a tag nothing carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub section: String,
    pub field: &'static str,
    pub tag: String,
}

/// Reference fields of every outbound that name no existing candidate.
pub fn dangling_references(record: &FlatRecord) -> Vec<DanglingReference> {
    let known: BTreeSet<String> = reference_candidates(record)
        .into_iter()
        .map(|c| c.tag)
        .collect();

    let mut dangling = Vec::new();
    for (id, section) in outbounds(record) {
        for field in schema::fields().iter().filter(|f| f.reference) {
            let Some(tag) = section.get_str(field.key).filter(|t| !t.is_empty()) else {
                continue;
            };
            if !known.contains(tag) {
                dangling.push(DanglingReference {
                    section: id.to_string(),
                    field: field.key,
                    tag: tag.to_string(),
                });
            }
        }
    }
    dangling
}

/// Outbound sections of a record.
pub fn outbounds(record: &FlatRecord) -> impl Iterator<Item = (&str, &FlatSection)> {
    record
        .iter()
        .filter(|(_, s)| s.kind == OUTBOUND_SECTION)
        .map(|(id, s)| (id.as_str(), s))
}

// --- Internal implementation ---

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn stream_mode(section: &FlatSection, warnings: &mut Vec<MapWarning>) -> (Option<Network>, Security) {
    let network = match section.get_str("ss_network").unwrap_or_default() {
        "" => None,
        value => {
            let network = Network::parse(value);
            if network.is_none() {
                warnings.push(MapWarning::UnknownNetwork {
                    value: value.to_string(),
                });
            }
            network
        }
    };

    let value = section.get_str("ss_security").unwrap_or_default();
    let security = Security::parse(value).unwrap_or_else(|| {
        warnings.push(MapWarning::UnknownSecurity {
            value: value.to_string(),
        });
        Security::None
    });

    (network, security)
}

fn applies(combination: &Combination, key: &str) -> bool {
    schema::field(key).is_some_and(|f| combination.applies(f))
}

/// Reads keys of one section, remembering which ones were used.
struct Reader<'a> {
    section: &'a FlatSection,
    combination: Combination,
    consumed: BTreeSet<&'static str>,
    warnings: Vec<MapWarning>,
}

impl<'a> Reader<'a> {
    fn new(section: &'a FlatSection, combination: Combination) -> Self {
        Self {
            section,
            combination,
            consumed: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    fn consume(&mut self, key: &'static str) {
        self.consumed.insert(key);
    }

    fn value(&mut self, key: &'static str) -> Option<&'a FieldValue> {
        if !applies(&self.combination, key) {
            return None;
        }
        let value = self.section.get(key)?;
        self.consumed.insert(key);
        Some(value)
    }

    fn scalar(&mut self, key: &'static str) -> Option<String> {
        self.value(key)
            .and_then(FieldValue::as_scalar)
            .map(str::to_string)
    }

    fn list(&mut self, key: &'static str) -> Vec<String> {
        self.value(key).map(FieldValue::to_list).unwrap_or_default()
    }

    fn flag(&mut self, key: &'static str) -> Option<bool> {
        match self.value(key)?.as_scalar()? {
            "1" => Some(true),
            "0" => Some(false),
            "" => None,
            other => {
                self.warnings.push(MapWarning::MalformedFlag {
                    key: key.to_string(),
                    value: other.to_string(),
                });
                None
            }
        }
    }

    /// Warnings collected so far plus one per unread key.
    fn finish(self) -> Vec<MapWarning> {
        let mut warnings = self.warnings;
        warnings.extend(
            self.section
                .options
                .keys()
                .filter(|k| !self.consumed.contains(k.as_str()))
                .map(|k| MapWarning::DroppedKey { key: k.clone() }),
        );
        warnings
    }
}

/// Collects the keys an entry writes.
struct Writer {
    combination: Combination,
    sets: Vec<(&'static str, FieldValue)>,
}

impl Writer {
    fn new(combination: Combination) -> Self {
        Self {
            combination,
            sets: Vec::new(),
        }
    }

    fn set(&mut self, key: &'static str, value: FieldValue) {
        if !applies(&self.combination, key) {
            tracing::debug!(key, "not written: outside {:?}", self.combination);
            return;
        }
        match self.sets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.sets.push((key, value)),
        }
    }

    fn scalar(&mut self, key: &'static str, value: &Option<String>) {
        if let Some(value) = value {
            self.set(key, value.as_str().into());
        }
    }

    fn list(&mut self, key: &'static str, value: &[String]) {
        if !value.is_empty() {
            self.set(key, value.to_vec().into());
        }
    }

    fn flag(&mut self, key: &'static str, value: &Option<bool>) {
        if let Some(value) = value {
            self.set(key, if *value { "1" } else { "0" }.into());
        }
    }

    fn finish(self, protocol: Protocol) -> FlatPatch {
        let written: BTreeSet<&str> = self.sets.iter().map(|(k, _)| *k).collect();

        let mut ops: Vec<PatchOp> = schema::fields()
            .iter()
            .filter(|f| f.scope != Scope::Virtual && f.key != "protocol")
            .filter(|f| !written.contains(f.key))
            .map(|f| PatchOp::Remove {
                key: f.key.to_string(),
            })
            .collect();

        ops.push(PatchOp::Set {
            key: "protocol".to_string(),
            value: protocol.as_str().into(),
        });
        ops.extend(self.sets.into_iter().map(|(key, value)| PatchOp::Set {
            key: key.to_string(),
            value,
        }));

        FlatPatch { ops }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sections: Vec<(&str, FlatSection)>) -> FlatRecord {
        sections
            .into_iter()
            .map(|(id, s)| (id.to_string(), s))
            .collect()
    }

    fn vmess_ws_tls() -> FlatSection {
        FlatSection::new(OUTBOUND_SECTION)
            .with("alias", "edge")
            .with("tag", "edge")
            .with("protocol", "vmess")
            .with("s_vmess_address", "1.2.3.4")
            .with("s_vmess_port", "443")
            .with("s_vmess_user_id", "uuid")
            .with("ss_network", "ws")
            .with("ss_websocket_path", "/x")
            .with("ss_security", "tls")
            .with("ss_tls_server_name", "example.com")
            .with("mux_enabled", "1")
    }

    // === to_structured Tests ===

    #[test]
    fn reads_vmess_ws_tls() {
        let rec = record(vec![("cfg000001", vmess_ws_tls())]);
        let mapped = to_structured(&rec, "cfg000001").unwrap();
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);

        let entry = mapped.entry;
        assert_eq!(entry.id.as_deref(), Some("cfg000001"));
        assert_eq!(entry.protocol(), Protocol::Vmess);
        let Settings::Vmess(vmess) = &entry.settings else {
            panic!("expected vmess settings");
        };
        assert_eq!(vmess.address.as_deref(), Some("1.2.3.4"));

        let stream = entry.stream.as_ref().unwrap();
        assert_eq!(
            stream.transport,
            Some(Transport::Ws(WsSettings {
                path: Some("/x".into()),
                host: None,
            }))
        );
        let SecuritySettings::Tls(tls) = &stream.security else {
            panic!("expected tls");
        };
        assert_eq!(tls.server_name.as_deref(), Some("example.com"));
        assert_eq!(entry.mux.as_ref().unwrap().enabled, Some(true));
    }

    #[test]
    fn missing_section() {
        let err = to_structured(&FlatRecord::new(), "cfg000009").unwrap_err();
        assert!(matches!(err, MapError::SectionNotFound { .. }));
    }

    #[test]
    fn missing_protocol() {
        let rec = record(vec![("a", FlatSection::new(OUTBOUND_SECTION).with("tag", "a"))]);
        assert!(matches!(
            to_structured(&rec, "a").unwrap_err(),
            MapError::MissingProtocol { .. }
        ));

        let rec = record(vec![("a", FlatSection::new(OUTBOUND_SECTION).with("protocol", ""))]);
        assert!(matches!(
            to_structured(&rec, "a").unwrap_err(),
            MapError::MissingProtocol { .. }
        ));
    }

    #[test]
    fn unknown_protocol() {
        let rec = record(vec![(
            "a",
            FlatSection::new(OUTBOUND_SECTION).with("protocol", "vlessx"),
        )]);
        match to_structured(&rec, "a").unwrap_err() {
            MapError::UnknownProtocol { protocol, .. } => assert_eq!(protocol, "vlessx"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn foreign_keys_are_dropped_with_warning() {
        let section = FlatSection::new(OUTBOUND_SECTION)
            .with("tag", "free")
            .with("protocol", "freedom")
            .with("s_vmess_address", "1.2.3.4")
            .with("ss_network", "ws")
            .with("custom_note", "kept");
        let rec = record(vec![("a", section)]);
        let mapped = to_structured(&rec, "a").unwrap();

        assert!(mapped.entry.stream.is_none());
        assert!(mapped.entry.mux.is_none());
        let dropped: Vec<_> = mapped
            .warnings
            .iter()
            .filter_map(|w| match w {
                MapWarning::DroppedKey { key } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(dropped, vec!["custom_note", "s_vmess_address", "ss_network"]);
    }

    #[test]
    fn malformed_flag_warns() {
        let section = FlatSection::new(OUTBOUND_SECTION)
            .with("protocol", "shadowsocks")
            .with("s_shadowsocks_ota", "yes");
        let mapped = to_structured(&record(vec![("a", section)]), "a").unwrap();
        let Settings::Shadowsocks(ss) = &mapped.entry.settings else {
            panic!("expected shadowsocks");
        };
        assert_eq!(ss.ota, None);
        assert_eq!(
            mapped.warnings,
            vec![MapWarning::MalformedFlag {
                key: "s_shadowsocks_ota".into(),
                value: "yes".into()
            }]
        );
    }

    #[test]
    fn http_network_alias_reads_as_h2() {
        let section = FlatSection::new(OUTBOUND_SECTION)
            .with("protocol", "vless")
            .with("ss_network", "http")
            .with("ss_http_host", vec!["a.com".to_string()]);
        let mapped = to_structured(&record(vec![("a", section)]), "a").unwrap();
        let stream = mapped.entry.stream.unwrap();
        assert_eq!(stream.network(), Some(Network::H2));
    }

    #[test]
    fn mux_absent_for_reality() {
        let section = vmess_ws_tls()
            .with("protocol", "vless")
            .with("ss_security", "reality");
        let mapped = to_structured(&record(vec![("a", section)]), "a").unwrap();
        assert!(mapped.entry.mux.is_none());
        assert!(mapped
            .warnings
            .contains(&MapWarning::DroppedKey { key: "mux_enabled".into() }));
    }

    // === to_flat Tests ===

    #[test]
    fn patch_orders_removals_then_protocol() {
        let rec = record(vec![("a", vmess_ws_tls())]);
        let patch = to_flat(&to_structured(&rec, "a").unwrap().entry);

        let protocol_at = patch
            .ops
            .iter()
            .position(|op| matches!(op, PatchOp::Set { key, .. } if key == "protocol"))
            .unwrap();
        assert!(patch.ops[..protocol_at]
            .iter()
            .all(|op| matches!(op, PatchOp::Remove { .. })));
        assert!(patch.ops[protocol_at + 1..]
            .iter()
            .all(|op| matches!(op, PatchOp::Set { .. })));
        assert!(patch.removes("s_vless_address"));
        assert!(!patch.removes("custom_note"));
    }

    #[test]
    fn protocol_switch_clears_old_namespace() {
        let rec = record(vec![("a", vmess_ws_tls())]);
        let mut entry = to_structured(&rec, "a").unwrap().entry;
        entry.settings = Settings::Trojan(TrojanSettings {
            address: Some("5.6.7.8".into()),
            ..Default::default()
        });

        let mut section = rec["a"].clone().with("custom_note", "kept");
        to_flat(&entry).apply(&mut section);

        assert_eq!(section.get_str("protocol"), Some("trojan"));
        assert_eq!(section.get_str("s_trojan_address"), Some("5.6.7.8"));
        assert!(section.options.keys().all(|k| !k.starts_with("s_vmess_")));
        assert_eq!(section.get_str("ss_websocket_path"), Some("/x"));
        assert_eq!(section.get_str("custom_note"), Some("kept"));
    }

    #[test]
    fn derived_server_name_from_h2_host() {
        let mut entry = OutboundEntry::new("h2", "h2", Settings::empty(Protocol::Vless));
        entry.stream = Some(StreamSettings {
            transport: Some(Transport::H2(H2Settings {
                host: vec!["a.example".into(), "b.example".into()],
                path: None,
            })),
            security: SecuritySettings::Tls(TlsSettings::default()),
        });
        let patch = to_flat(&entry);
        assert_eq!(
            patch.get("ss_tls_server_name"),
            Some(&FieldValue::from("a.example"))
        );
    }

    #[test]
    fn derived_server_name_never_overrides() {
        let mut entry = OutboundEntry::new("h2", "h2", Settings::empty(Protocol::Http));
        entry.stream = Some(StreamSettings {
            transport: Some(Transport::H2(H2Settings {
                host: vec!["a.example".into()],
                path: None,
            })),
            security: SecuritySettings::Tls(TlsSettings {
                server_name: Some("explicit.example".into()),
                ..Default::default()
            }),
        });
        assert_eq!(
            to_flat(&entry).get("ss_tls_server_name"),
            Some(&FieldValue::from("explicit.example"))
        );

        // Not for security none
        entry.stream.as_mut().unwrap().security = SecuritySettings::None;
        assert!(to_flat(&entry).removes("ss_tls_server_name"));
    }

    #[test]
    fn fields_outside_combination_are_not_written() {
        let mut entry = OutboundEntry::new("wg", "wg", Settings::empty(Protocol::Wireguard));
        entry.sockopt.mark = Some("255".into());
        entry.sockopt.interface = Some("eth0".into());
        entry.proxy_tag = Some("other".into());

        let patch = to_flat(&entry);
        assert!(patch.removes("ss_sockopt_mark"));
        assert!(patch.removes("ss_sockopt_iface"));
        assert_eq!(patch.get("proxy_settings_tag"), Some(&FieldValue::from("other")));
    }

    #[test]
    fn entry_json_shape() {
        let entry = OutboundEntry::new("a", "a", Settings::empty(Protocol::Mtproto));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["settings"]["protocol"], "mtproto");
        assert!(json.get("stream").is_none());
        assert!(json.get("sockopt").is_none());

        let back: OutboundEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    // === Tag and reference Tests ===

    fn with_reverse() -> FlatRecord {
        record(vec![
            ("a", vmess_ws_tls()),
            (
                "b",
                FlatSection::new(OUTBOUND_SECTION)
                    .with("alias", "direct")
                    .with("tag", "direct")
                    .with("protocol", "freedom")
                    .with("ss_sockopt_dialer_proxy", "edge"),
            ),
            (
                "r",
                FlatSection::new(REVERSE_SECTION)
                    .with("bridges", vec!["bridge1|b.example".to_string()])
                    .with(
                        "portals",
                        vec!["portal1|p.example,portal2|q.example".to_string()],
                    ),
            ),
        ])
    }

    #[test]
    fn unique_tag_checks_outbounds_and_reverse() {
        let rec = with_reverse();
        assert!(ensure_unique_tag(&rec, "fresh", None).is_ok());
        assert!(ensure_unique_tag(&rec, "edge", Some("a")).is_ok());

        match ensure_unique_tag(&rec, "edge", None).unwrap_err() {
            MapError::DuplicateTag { owner, .. } => assert_eq!(owner, "outbound a"),
            other => panic!("unexpected error: {other:?}"),
        }
        match ensure_unique_tag(&rec, "portal2", None).unwrap_err() {
            MapError::DuplicateTag { owner, .. } => assert_eq!(owner, "reverse r portal"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ensure_unique_tag(&rec, "bridge1", None).is_err());
    }

    #[test]
    fn candidates_include_portals_not_bridges() {
        let candidates = reference_candidates(&with_reverse());
        let tags: Vec<_> = candidates.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["edge", "direct", "portal1", "portal2"]);
        assert_eq!(candidates[0].label, "edge(edge)");
        assert_eq!(candidates[2].label, "portal1|p.example");
    }

    #[test]
    fn dangling_after_removal() {
        let mut rec = with_reverse();
        assert!(dangling_references(&rec).is_empty());

        rec.remove("a");
        assert_eq!(
            dangling_references(&rec),
            vec![DanglingReference {
                section: "b".into(),
                field: "ss_sockopt_dialer_proxy",
                tag: "edge".into(),
            }]
        );
    }
}
