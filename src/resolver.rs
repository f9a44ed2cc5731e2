//! Dependency resolution - decides which fields apply to a flat snapshot.
//!
//! Each field carries a list of rules from the registry. A rule is a
//! conjunction of `(field, constraint)` pairs; a field is active when any of
//! its rules holds. A field without rules is always active.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ResolveError;
use crate::schema::{self, FieldDescriptor, Scope};
use crate::types::{FieldValue, FlatSection, ResolveOptions, Visibility, REALITY_CHECK};

/// A single predicate on one field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// The value equals the given string.
    ///
    /// `Equals("0")` also holds for an unset or empty value, since the store
    /// does not distinguish those from `"0"` for flags.
    Equals(&'static str),
    /// The value is exactly one of the given tokens.
    OneOf(&'static [&'static str]),
    /// The value is unset, empty, or `"0"`.
    Unset,
}

impl Constraint {
    /// Evaluate against a field's current value.
    pub fn holds(&self, value: Option<&FieldValue>) -> bool {
        let falsy = value.map_or(true, FieldValue::is_falsy);
        match self {
            Constraint::Equals("0") => falsy,
            Constraint::Equals(expected) => value.and_then(FieldValue::as_scalar) == Some(*expected),
            Constraint::OneOf(set) => value
                .and_then(FieldValue::as_scalar)
                .is_some_and(|v| set.contains(&v)),
            Constraint::Unset => falsy,
        }
    }
}

/// Conjunction of constraints, optionally inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub constraints: &'static [(&'static str, Constraint)],
    /// Holds when the conjunction does not.
    pub inverted: bool,
}

impl Rule {
    /// Rule holding when every constraint holds.
    pub const fn all(constraints: &'static [(&'static str, Constraint)]) -> Self {
        Self {
            constraints,
            inverted: false,
        }
    }

    /// Rule holding unless every constraint holds.
    pub const fn any_but(constraints: &'static [(&'static str, Constraint)]) -> Self {
        Self {
            constraints,
            inverted: true,
        }
    }

    /// Fields this rule reads.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constraints.iter().map(|(field, _)| *field)
    }

    /// Evaluate against a snapshot.
    pub fn holds<S: Snapshot + ?Sized>(&self, snapshot: &S) -> bool {
        let all = self
            .constraints
            .iter()
            .all(|(field, constraint)| constraint.holds(snapshot.value(field)));
        all != self.inverted
    }
}

/// Read access to the current field values.
pub trait Snapshot {
    fn value(&self, key: &str) -> Option<&FieldValue>;
}

impl Snapshot for FlatSection {
    fn value(&self, key: &str) -> Option<&FieldValue> {
        self.get(key)
    }
}

impl Snapshot for BTreeMap<String, FieldValue> {
    fn value(&self, key: &str) -> Option<&FieldValue> {
        self.get(key)
    }
}

/// A snapshot with the global flags from [`ResolveOptions`] layered on top.
#[derive(Debug)]
pub struct WithOptions<'a, S: ?Sized> {
    base: &'a S,
    reality: FieldValue,
}

impl<'a, S: Snapshot + ?Sized> WithOptions<'a, S> {
    pub fn new(base: &'a S, options: &ResolveOptions) -> Self {
        let reality = if options.reality { "1" } else { "0" };
        Self {
            base,
            reality: FieldValue::from(reality),
        }
    }
}

impl<S: Snapshot + ?Sized> Snapshot for WithOptions<'_, S> {
    fn value(&self, key: &str) -> Option<&FieldValue> {
        if key == REALITY_CHECK {
            Some(&self.reality)
        } else {
            self.base.value(key)
        }
    }
}

/// Whether a field is active for the given snapshot.
///
/// Rules are evaluated in order and the first one that holds wins.
///
/// # Errors
///
/// Returns `ResolveError::UnknownField` if the key is not registered, or
/// `ResolveError::UnknownRuleField` if an evaluated rule reads an
/// unregistered field.
pub fn is_active<S: Snapshot + ?Sized>(key: &str, snapshot: &S) -> Result<bool, ResolveError> {
    let field = schema::field(key).ok_or_else(|| ResolveError::UnknownField {
        field: key.to_string(),
    })?;
    evaluate(field, snapshot)
}

/// Visibility of a single field: omitted, required, or optional.
///
/// # Errors
///
/// Same as [`is_active`].
pub fn get_visibility<S: Snapshot + ?Sized>(
    key: &str,
    snapshot: &S,
) -> Result<Visibility, ResolveError> {
    let field = schema::field(key).ok_or_else(|| ResolveError::UnknownField {
        field: key.to_string(),
    })?;
    visibility(field, snapshot)
}

/// Resolved visibility of every stored field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Active fields, in registry order.
    pub active: Vec<&'static str>,
    /// Active fields that must carry a value.
    pub required: Vec<&'static str>,
    /// Fields hidden for this snapshot.
    pub omitted: Vec<&'static str>,
}

impl Resolution {
    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains(&key)
    }
}

/// Resolve every registered field against a snapshot.
///
/// The global flags in `options` are layered over the snapshot.
///
/// # Errors
///
/// Returns `ResolveError` if a rule references an unregistered field.
pub fn resolve<S: Snapshot + ?Sized>(
    snapshot: &S,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    let snapshot = WithOptions::new(snapshot, options);
    let mut resolution = Resolution::default();

    for field in schema::fields() {
        if field.scope == Scope::Virtual {
            continue;
        }
        match visibility(field, &snapshot)? {
            Visibility::Omit => resolution.omitted.push(field.key),
            Visibility::Required => {
                resolution.active.push(field.key);
                resolution.required.push(field.key);
            }
            Visibility::Optional => resolution.active.push(field.key),
        }
    }

    Ok(resolution)
}

/// Check that every rule in a field table references registered fields.
///
/// # Errors
///
/// Returns the first `ResolveError::UnknownRuleField` found.
pub fn check_rules(fields: &[FieldDescriptor]) -> Result<(), ResolveError> {
    for field in fields {
        for rule in field.rules {
            check_rule(field, rule)?;
        }
    }
    Ok(())
}

// --- Internal implementation ---

fn evaluate<S: Snapshot + ?Sized>(
    field: &FieldDescriptor,
    snapshot: &S,
) -> Result<bool, ResolveError> {
    if field.rules.is_empty() {
        return Ok(true);
    }
    for rule in field.rules {
        check_rule(field, rule)?;
        if rule.holds(snapshot) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn visibility<S: Snapshot + ?Sized>(
    field: &FieldDescriptor,
    snapshot: &S,
) -> Result<Visibility, ResolveError> {
    Ok(match (evaluate(field, snapshot)?, field.required) {
        (false, _) => Visibility::Omit,
        (true, true) => Visibility::Required,
        (true, false) => Visibility::Optional,
    })
}

fn check_rule(field: &FieldDescriptor, rule: &Rule) -> Result<(), ResolveError> {
    match rule.fields().find(|f| schema::field(f).is_none()) {
        Some(referenced) => Err(ResolveError::UnknownRuleField {
            field: field.key.to_string(),
            referenced: referenced.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueKind;

    fn section(pairs: &[(&str, &str)]) -> FlatSection {
        pairs
            .iter()
            .fold(FlatSection::new("outbound"), |s, (k, v)| s.with(k, *v))
    }

    // === Constraint Tests ===

    #[test]
    fn one_of_is_exact_token() {
        let c = Constraint::OneOf(&["http", "trojan", "vless", "vmess"]);
        assert!(c.holds(Some(&FieldValue::from("vless"))));
        assert!(!c.holds(Some(&FieldValue::from("vlessx"))));
        assert!(!c.holds(Some(&FieldValue::from("xvless"))));
        assert!(!c.holds(Some(&FieldValue::from("http trojan"))));
        assert!(!c.holds(None));
    }

    #[test]
    fn unset_is_three_way_falsy() {
        let c = Constraint::Unset;
        assert!(c.holds(None));
        assert!(c.holds(Some(&FieldValue::from(""))));
        assert!(c.holds(Some(&FieldValue::from("0"))));
        assert!(!c.holds(Some(&FieldValue::from("1"))));
        assert!(!c.holds(Some(&FieldValue::from("none"))));
    }

    #[test]
    fn equals_zero_matches_unset() {
        let c = Constraint::Equals("0");
        assert!(c.holds(None));
        assert!(c.holds(Some(&FieldValue::from("0"))));
        assert!(!c.holds(Some(&FieldValue::from("1"))));

        let c = Constraint::Equals("1");
        assert!(!c.holds(None));
    }

    #[test]
    fn inverted_rule() {
        const RULE: Rule = Rule::any_but(&[("protocol", Constraint::Equals("wireguard"))]);
        assert!(!RULE.holds(&section(&[("protocol", "wireguard")])));
        assert!(RULE.holds(&section(&[("protocol", "vmess")])));
        assert!(RULE.holds(&section(&[])));
    }

    // === Field Resolution Tests ===

    #[test]
    fn field_without_rules_is_active() {
        assert!(is_active("alias", &section(&[])).unwrap());
        assert!(is_active("tag", &section(&[("protocol", "dns")])).unwrap());
    }

    #[test]
    fn unknown_field_errors() {
        let err = is_active("s_vmess_bogus", &section(&[])).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownField {
                field: "s_vmess_bogus".into()
            }
        );
    }

    #[test]
    fn protocol_fields_follow_protocol() {
        let s = section(&[("protocol", "vmess")]);
        assert!(is_active("s_vmess_address", &s).unwrap());
        assert!(!is_active("s_vless_address", &s).unwrap());
        assert!(is_active("ss_network", &s).unwrap());

        let s = section(&[("protocol", "freedom")]);
        assert!(!is_active("ss_network", &s).unwrap());
        assert!(is_active("s_freedom_fragment_enabled", &s).unwrap());
        assert!(!is_active("s_freedom_fragment_length", &s).unwrap());
    }

    #[test]
    fn nested_dependency_on_flag() {
        let s = section(&[("protocol", "freedom"), ("s_freedom_fragment_enabled", "1")]);
        assert!(is_active("s_freedom_fragment_length", &s).unwrap());
        assert!(is_active("ss_sockopt_tcp_no_Delay", &s).unwrap());
    }

    #[test]
    fn tls_fields_match_tls_and_xtls() {
        for security in ["tls", "xtls"] {
            let s = section(&[("protocol", "vless"), ("ss_security", security)]);
            assert!(is_active("ss_tls_server_name", &s).unwrap(), "{security}");
            assert!(is_active("ss_reality_fingerprint", &s).unwrap());
            assert!(!is_active("ss_reality_public_key", &s).unwrap());
        }
    }

    #[test]
    fn flow_rules_are_independent() {
        let base = [("protocol", "vless"), ("ss_network", "tcp")];

        // (a) xtls without REALITY support
        let mut s = section(&base).with("ss_security", "xtls");
        let off = ResolveOptions::new().reality(false);
        let on = ResolveOptions::new().reality(true);
        assert!(is_active("s_xtls_flow", &WithOptions::new(&s, &off)).unwrap());
        assert!(!is_active("s_xtls_flow", &WithOptions::new(&s, &on)).unwrap());

        // (b) tls with REALITY support
        s.set("ss_security", "tls");
        assert!(is_active("s_xtls_flow", &WithOptions::new(&s, &on)).unwrap());
        assert!(!is_active("s_xtls_flow", &WithOptions::new(&s, &off)).unwrap());

        // (c) reality with REALITY support, on a transport rule (a) excludes
        s.set("ss_security", "reality");
        s.set("ss_network", "grpc");
        assert!(is_active("s_xtls_flow", &WithOptions::new(&s, &on)).unwrap());

        s.set("ss_network", "quic");
        assert!(!is_active("s_xtls_flow", &WithOptions::new(&s, &on)).unwrap());

        s.set("protocol", "vmess");
        s.set("ss_network", "tcp");
        assert!(!is_active("s_xtls_flow", &WithOptions::new(&s, &on)).unwrap());
    }

    #[test]
    fn sockopt_reversed_dependencies() {
        let wg = section(&[("protocol", "wireguard")]);
        assert!(!is_active("ss_sockopt_mark", &wg).unwrap());
        assert!(!is_active("ss_sockopt_iface", &wg).unwrap());
        assert!(is_active("proxy_settings_tag", &wg).unwrap());

        let hy2 = section(&[("protocol", "hysteria2")]);
        assert!(!is_active("ss_sockopt_dialer_proxy", &hy2).unwrap());
        assert!(is_active("ss_sockopt_iface", &hy2).unwrap());
        assert!(!is_active("proxy_settings_tag", &hy2).unwrap());
    }

    #[test]
    fn congestion_has_two_rules() {
        let s = section(&[("protocol", "vmess"), ("ss_network", "ws")]);
        assert!(is_active("ss_sockopt_tcp_congestion", &s).unwrap());
        let s = section(&[("protocol", "vmess"), ("ss_network", "kcp")]);
        assert!(!is_active("ss_sockopt_tcp_congestion", &s).unwrap());
        let s = section(&[("protocol", "socks")]);
        assert!(is_active("ss_sockopt_tcp_congestion", &s).unwrap());
        let s = section(&[("protocol", "dns")]);
        assert!(!is_active("ss_sockopt_tcp_congestion", &s).unwrap());
    }

    #[test]
    fn visibility_reports_required() {
        let s = section(&[("protocol", "wireguard")]);
        assert_eq!(
            get_visibility("s_wireguard_endpoint", &s).unwrap(),
            Visibility::Required
        );
        assert_eq!(
            get_visibility("s_wireguard_mtu", &s).unwrap(),
            Visibility::Optional
        );
        assert_eq!(
            get_visibility("s_vmess_port", &s).unwrap(),
            Visibility::Omit
        );
    }

    #[test]
    fn resolve_partitions_fields() {
        let s = section(&[
            ("protocol", "vmess"),
            ("ss_network", "grpc"),
            ("ss_security", "tls"),
        ]);
        let resolution = resolve(&s, &ResolveOptions::new()).unwrap();
        assert!(resolution.is_active("ss_grpc_service_name"));
        assert!(resolution.required.contains(&"ss_grpc_service_name"));
        assert!(resolution.is_active("mux_enabled"));
        assert!(resolution.omitted.contains(&"s_vless_user_id"));
        assert!(!resolution.active.contains(&REALITY_CHECK));
        assert!(!resolution.omitted.contains(&REALITY_CHECK));
    }

    #[test]
    fn registry_rules_reference_known_fields() {
        check_rules(schema::fields()).unwrap();
    }

    #[test]
    fn check_rules_reports_unknown_reference() {
        const BAD: &[Rule] = &[Rule::all(&[("ss_netwoork", Constraint::Equals("grpc"))])];
        let fields = [FieldDescriptor {
            key: "ss_grpc_authority",
            kind: ValueKind::Scalar,
            scope: Scope::Common,
            default: None,
            required: false,
            choices: &[],
            validation: None,
            rules: BAD,
            reference: false,
        }];
        assert_eq!(
            check_rules(&fields),
            Err(ResolveError::UnknownRuleField {
                field: "ss_grpc_authority".into(),
                referenced: "ss_netwoork".into(),
            })
        );
    }
}
