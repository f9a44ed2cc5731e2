//! V2Ray Outbound Configuration Engine
//!
//! Maps flat, section-based outbound records to typed outbound entries and
//! back, decides which fields apply to a given protocol/transport/security
//! combination, validates sections, and imports `vmess://` share links.
//!
//! # Example
//!
//! ```
//! use v2ray_outbound::{to_flat, to_structured, FlatRecord, FlatSection, Protocol};
//!
//! let mut record = FlatRecord::new();
//! record.insert(
//!     "cfg000001".into(),
//!     FlatSection::new("outbound")
//!         .with("alias", "edge")
//!         .with("tag", "edge")
//!         .with("protocol", "vmess")
//!         .with("s_vmess_address", "1.2.3.4")
//!         .with("ss_network", "ws")
//!         .with("ss_websocket_path", "/ws")
//!         .with("ss_security", "none")
//!         .with("s_freedom_domain_strategy", "UseIP"),
//! );
//!
//! let mapped = to_structured(&record, "cfg000001").unwrap();
//! assert_eq!(mapped.entry.protocol(), Protocol::Vmess);
//!
//! // The freedom key does not belong to a vmess entry: it is dropped on read
//! // and removed on write.
//! assert_eq!(mapped.warnings.len(), 1);
//! let patch = to_flat(&mapped.entry);
//! assert!(patch.removes("s_freedom_domain_strategy"));
//! assert_eq!(patch.get("ss_websocket_path").and_then(|v| v.as_scalar()), Some("/ws"));
//! ```
//!
//! # Field Visibility
//!
//! | Visibility | Meaning |
//! |------------|---------|
//! | `omit` | No rule holds; the field is hidden and its value ignored |
//! | `required` | Active and must carry a value |
//! | `optional` | Active, value optional |
//!
//! A field's rules are OR-combined; the constraints inside one rule are
//! AND-combined. `reality_check` is not stored in the section; it comes
//! from [`ResolveOptions`].

mod error;
mod link;
mod linter;
mod loader;
mod mapper;
mod resolver;
mod schema;
mod store;
mod types;
mod validator;

pub use error::{
    FieldError, FieldErrorKind, LinkError, LoadError, MapError, ResolveError, StoreError,
    UnknownProtocol, ValidateError,
};
pub use link::{decode_link, import_links, ImportReport, SkippedLine};
pub use linter::{lint_record, Diagnostic, LintResult, SectionResult, SectionStatus, Severity};
pub use loader::{load_record, load_record_str, load_text_auto, write_record};
pub use mapper::{
    dangling_references, ensure_unique_tag, outbounds, reference_candidates, reverse_endpoints,
    to_flat, to_structured, BlackholeSettings, DanglingReference, DnsSettings,
    DomainSocketSettings, EndpointKind, FlatPatch, FreedomSettings, GrpcSettings, H2Settings,
    HttpSettings, HttpUpgradeSettings, Hysteria2Settings, KcpSettings, LoopbackSettings,
    MapWarning, Mapped, MuxSettings, OutboundEntry, PatchOp, QuicSettings, RealitySettings,
    ReferenceCandidate, ReverseEndpoint, SecuritySettings, Settings, ShadowsocksSettings,
    SockoptSettings, SocksSettings, StreamSettings, TcpSettings, TlsSettings, Transport,
    TrojanSettings, VlessSettings, VmessSettings, WireguardSettings, WsSettings,
};
pub use resolver::{
    check_rules, get_visibility, is_active, resolve, Constraint, Resolution, Rule, Snapshot,
    WithOptions,
};
pub use schema::{
    applicable_keys, field, fields, protocol_fields, section_schema, stream_fields, Combination,
    FieldDescriptor, Scope, ValidationKind, ValueKind,
};
pub use store::{MemoryStore, Store};
pub use types::{
    FieldValue, FlatRecord, FlatSection, Network, Protocol, ResolveOptions, Security, Visibility,
    OUTBOUND_SECTION, REALITY_CHECK, REVERSE_SECTION,
};
pub use validator::{
    ensure_not_self, validate_against_schema, validate_section, BuiltinValidator, Validator,
};
