//! `vmess://` share-link import.
//!
//! A link is `vmess://` followed by base64-encoded JSON (format version 2).
//! Decoding is pure; nothing reaches the store until
//! [`ImportReport::commit`] runs.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LinkError, StoreError};
use crate::mapper::{
    self, H2Settings, KcpSettings, OutboundEntry, QuicSettings, SecuritySettings, Settings,
    StreamSettings, TcpSettings, TlsSettings, Transport, VmessSettings, WsSettings,
};
use crate::store::Store;
use crate::types::{FlatRecord, OUTBOUND_SECTION};

const SCHEME: &str = "vmess://";
const SUPPORTED_VERSION: &str = "2";

/// JSON payload of a share link. Every field may be a string or a number.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VmessLink {
    #[serde(deserialize_with = "lenient_string")]
    v: String,
    #[serde(deserialize_with = "lenient_string")]
    ps: String,
    #[serde(deserialize_with = "lenient_string")]
    add: String,
    #[serde(deserialize_with = "lenient_string")]
    port: String,
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(deserialize_with = "lenient_string")]
    aid: String,
    #[serde(deserialize_with = "lenient_string")]
    scy: String,
    #[serde(deserialize_with = "lenient_string")]
    net: String,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    header_type: String,
    #[serde(deserialize_with = "lenient_string")]
    host: String,
    #[serde(deserialize_with = "lenient_string")]
    path: String,
    #[serde(deserialize_with = "lenient_string")]
    tls: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("expected a string, got {other}"))),
    }
}

/// Decode one share link into a vmess outbound.
///
/// The entry has no id yet. Its tag equals its alias.
///
/// # Errors
///
/// Returns the `LinkError` explaining why the line cannot be imported.
pub fn decode_link(line: &str) -> Result<OutboundEntry, LinkError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LinkError::Empty);
    }

    let payload = line
        .get(..SCHEME.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(SCHEME))
        .map(|_| &line[SCHEME.len()..])
        .ok_or(LinkError::UnsupportedScheme)?;

    let link: VmessLink =
        serde_json::from_slice(&decode_base64(payload)?).map_err(|e| LinkError::InvalidPayload {
            message: e.to_string(),
        })?;

    if link.v != SUPPORTED_VERSION {
        return Err(LinkError::UnsupportedVersion { version: link.v });
    }

    build_entry(link)
}

/// Accepts the standard and URL-safe alphabets, padded or not.
fn decode_base64(payload: &str) -> Result<Vec<u8>, LinkError> {
    let trimmed = payload.trim().trim_end_matches('=');
    let engine = if trimmed.contains(['-', '_']) {
        &general_purpose::URL_SAFE_NO_PAD
    } else {
        &general_purpose::STANDARD_NO_PAD
    };
    engine
        .decode(trimmed)
        .map_err(|_| LinkError::InvalidEncoding)
}

fn build_entry(link: VmessLink) -> Result<OutboundEntry, LinkError> {
    let address = or_default(&link.add, "0.0.0.0");
    let port = or_default(&link.port, "0");
    let alias = match link.ps.as_str() {
        "" => format!("{address}:{port}"),
        ps => ps.to_string(),
    };
    let tls = link.tls == "tls";
    let hosts: Vec<String> = link
        .host
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();
    let first_host = hosts.first().cloned();
    let header_type = non_empty(&link.header_type);

    // Server name to derive from the host list, if TLS is on.
    let mut server_name = None;
    let transport = match link.net.as_str() {
        "tcp" => {
            let mut tcp = TcpSettings {
                header_type,
                ..Default::default()
            };
            if link.header_type == "http" {
                if let Some(host) = &first_host {
                    tcp.request_headers = vec![format!("Host={host}")];
                    server_name = first_host.clone();
                }
            }
            Transport::Tcp(tcp)
        }
        "kcp" | "mkcp" => Transport::Kcp(KcpSettings {
            header_type,
            ..Default::default()
        }),
        "ws" => {
            server_name = first_host.clone();
            Transport::Ws(WsSettings {
                path: non_empty(&link.path),
                host: first_host.clone(),
            })
        }
        "http" | "h2" => {
            server_name = first_host.clone();
            Transport::H2(H2Settings {
                host: hosts.clone(),
                path: non_empty(&link.path),
            })
        }
        "quic" => {
            server_name = first_host.clone();
            Transport::Quic(QuicSettings {
                security: first_host.clone(),
                key: non_empty(&link.path),
                header_type,
            })
        }
        other => {
            return Err(LinkError::UnsupportedNetwork {
                network: other.to_string(),
            })
        }
    };

    let security = if tls {
        SecuritySettings::Tls(TlsSettings {
            server_name,
            ..Default::default()
        })
    } else {
        SecuritySettings::None
    };

    let settings = Settings::Vmess(VmessSettings {
        address: Some(address.to_string()),
        port: Some(port.to_string()),
        user_id: non_empty(&link.id),
        alter_id: non_empty(&link.aid),
        security: non_empty(&link.scy),
        user_level: None,
    });

    let mut entry = OutboundEntry::new(alias.clone(), alias, settings);
    entry.stream = Some(StreamSettings {
        transport: Some(transport),
        security,
    });
    Ok(entry)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn or_default<'a>(s: &'a str, default: &'a str) -> &'a str {
    if s.is_empty() {
        default
    } else {
        s
    }
}

/// A rejected input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: LinkError,
}

fn serialize_display<S: serde::Serializer>(
    value: &LinkError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Outcome of decoding a batch of links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Decoded entries, in input order.
    pub entries: Vec<OutboundEntry>,
    pub skipped: Vec<SkippedLine>,
}

impl ImportReport {
    /// Create one outbound section per decoded entry, then save.
    ///
    /// Writes nothing when no line was decoded.
    ///
    /// # Errors
    ///
    /// Returns the first `StoreError` raised by the store.
    pub fn commit<S: Store + ?Sized>(&self, store: &mut S) -> Result<Vec<String>, StoreError> {
        if self.entries.is_empty() {
            tracing::info!("no links imported");
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let id = store.add(OUTBOUND_SECTION);
            mapper::to_flat(entry).apply_to(store, &id)?;
            ids.push(id);
        }
        store.save()?;

        tracing::info!(count = ids.len(), "imported links");
        Ok(ids)
    }
}

/// Decode every line of `input`, skipping the ones that cannot be imported.
///
/// Blank lines are ignored. A line whose tag is already used by the record
/// or by an earlier line of the batch is skipped with `DuplicateTag`.
pub fn import_links(input: &str, record: &FlatRecord) -> ImportReport {
    let mut report = ImportReport::default();
    let mut batch_tags: BTreeMap<String, usize> = BTreeMap::new();

    for (index, line) in input.lines().enumerate() {
        let number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let decoded = decode_link(line).and_then(|entry| {
            if let Some(owner) = mapper::tag_owner(record, &entry.tag, None) {
                return Err(LinkError::DuplicateTag {
                    tag: entry.tag,
                    owner,
                });
            }
            if let Some(earlier) = batch_tags.get(&entry.tag) {
                return Err(LinkError::DuplicateTag {
                    tag: entry.tag,
                    owner: format!("line {earlier}"),
                });
            }
            Ok(entry)
        });

        match decoded {
            Ok(entry) => {
                tracing::debug!(line = number, tag = %entry.tag, "decoded share link");
                batch_tags.insert(entry.tag.clone(), number);
                report.entries.push(entry);
            }
            Err(reason) => {
                tracing::warn!(line = number, "skipped share link: {reason}");
                report.skipped.push(SkippedLine {
                    line: number,
                    reason,
                });
            }
        }
    }

    report
}
