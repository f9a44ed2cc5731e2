//! Record linting - static checks over every outbound section.
//!
//! Reports:
//! - sections that cannot be mapped (missing or unknown protocol)
//! - duplicate tags and self references
//! - stale keys, malformed values, dangling references, empty aliases

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::MapError;
use crate::mapper::{self, MapWarning, OutboundEntry};
use crate::types::FlatRecord;
use crate::validator::ensure_not_self;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub section: String,
    /// Flat key the diagnostic is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn error(code: &str, section: &str, field: Option<&str>, message: String) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            section: section.to_string(),
            field: field.map(str::to_string),
            message,
        }
    }

    fn warning(code: &str, section: &str, field: Option<&str>, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, section, field, message)
        }
    }
}

/// Result of linting a single section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionResult {
    pub section: String,
    pub status: SectionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a whole record.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub sections_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<SectionResult>,
}

impl LintResult {
    /// Returns true if no section has errors.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint every outbound section of a record.
///
/// If `strict` is true, sections with only warnings count as failed.
pub fn lint_record(record: &FlatRecord, strict: bool) -> LintResult {
    let known: BTreeSet<String> = mapper::reference_candidates(record)
        .into_iter()
        .map(|c| c.tag)
        .collect();

    let results: Vec<SectionResult> = mapper::outbounds(record)
        .map(|(id, _)| lint_section(record, id, &known))
        .collect();

    let count = |severity: Severity| {
        results
            .iter()
            .flat_map(|r| &r.diagnostics)
            .filter(|d| d.severity == severity)
            .count()
    };
    let errors = count(Severity::Error);
    let warnings = count(Severity::Warning);

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != SectionStatus::Ok
            } else {
                r.status == SectionStatus::Error
            }
        })
        .count();

    LintResult {
        sections_checked: results.len(),
        passed: results.len() - failed,
        failed,
        errors,
        warnings,
        results,
    }
}

fn lint_section(record: &FlatRecord, id: &str, known: &BTreeSet<String>) -> SectionResult {
    let mut diagnostics = Vec::new();

    match mapper::to_structured(record, id) {
        Ok(mapped) => {
            for warning in &mapped.warnings {
                diagnostics.push(map_warning(id, warning));
            }
            check_entry(record, id, &mapped.entry, known, &mut diagnostics);
        }
        Err(MapError::MissingProtocol { .. }) => diagnostics.push(Diagnostic::error(
            "E001",
            id,
            Some("protocol"),
            "missing protocol".to_string(),
        )),
        Err(e @ MapError::UnknownProtocol { .. }) => {
            diagnostics.push(Diagnostic::error("E002", id, Some("protocol"), e.to_string()))
        }
        Err(e) => diagnostics.push(Diagnostic::error("E002", id, None, e.to_string())),
    }

    let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        SectionStatus::Error
    } else if diagnostics.is_empty() {
        SectionStatus::Ok
    } else {
        SectionStatus::Warning
    };

    SectionResult {
        section: id.to_string(),
        status,
        diagnostics,
    }
}

fn map_warning(id: &str, warning: &MapWarning) -> Diagnostic {
    match warning {
        MapWarning::DroppedKey { key } => Diagnostic::warning(
            "W001",
            id,
            Some(key.as_str()),
            format!("{key} does not apply to this protocol, transport or security"),
        ),
        MapWarning::MalformedFlag { key, .. } => {
            Diagnostic::warning("W004", id, Some(key.as_str()), warning.to_string())
        }
        MapWarning::UnknownNetwork { .. } => {
            Diagnostic::warning("W004", id, Some("ss_network"), warning.to_string())
        }
        MapWarning::UnknownSecurity { .. } => {
            Diagnostic::warning("W004", id, Some("ss_security"), warning.to_string())
        }
    }
}

fn check_entry(
    record: &FlatRecord,
    id: &str,
    entry: &OutboundEntry,
    known: &BTreeSet<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if entry.alias.trim().is_empty() {
        diagnostics.push(Diagnostic::warning(
            "W003",
            id,
            Some("alias"),
            "empty alias".to_string(),
        ));
    }

    if let Err(e) = mapper::ensure_unique_tag(record, &entry.tag, Some(id)) {
        diagnostics.push(Diagnostic::error("E003", id, Some("tag"), e.to_string()));
    }

    let references = [
        ("ss_sockopt_dialer_proxy", entry.sockopt.dialer_proxy.as_deref()),
        ("proxy_settings_tag", entry.proxy_tag.as_deref()),
    ];
    for (field, value) in references {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Err(e) = ensure_not_self(field, &entry.tag, value) {
            diagnostics.push(Diagnostic::error("E004", id, Some(field), e.to_string()));
        } else if !known.contains(value) {
            diagnostics.push(Diagnostic::warning(
                "W002",
                id,
                Some(field),
                format!("{field} references unknown tag \"{value}\""),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlatSection, OUTBOUND_SECTION};

    fn outbound(tag: &str, protocol: &str) -> FlatSection {
        FlatSection::new(OUTBOUND_SECTION)
            .with("alias", tag)
            .with("tag", tag)
            .with("protocol", protocol)
    }

    fn record(sections: Vec<(&str, FlatSection)>) -> FlatRecord {
        sections
            .into_iter()
            .map(|(id, s)| (id.to_string(), s))
            .collect()
    }

    fn codes(result: &LintResult) -> Vec<&str> {
        result
            .results
            .iter()
            .flat_map(|r| &r.diagnostics)
            .map(|d| d.code.as_str())
            .collect()
    }

    #[test]
    fn lint_clean_record() {
        let rec = record(vec![
            ("a", outbound("direct", "freedom")),
            ("b", outbound("block", "blackhole")),
            ("main", FlatSection::new("v2ray")),
        ]);
        let result = lint_record(&rec, false);
        assert!(result.is_ok());
        assert_eq!(result.sections_checked, 2);
        assert_eq!(result.passed, 2);
        assert!(codes(&result).is_empty());
    }

    #[test]
    fn lint_missing_and_unknown_protocol() {
        let rec = record(vec![
            ("a", FlatSection::new(OUTBOUND_SECTION).with("tag", "a")),
            ("b", outbound("b", "vlessx")),
        ]);
        let result = lint_record(&rec, false);
        assert_eq!(codes(&result), vec!["E001", "E002"]);
        assert_eq!(result.failed, 2);
    }

    #[test]
    fn lint_duplicate_tag() {
        let rec = record(vec![
            ("a", outbound("same", "freedom")),
            ("b", outbound("same", "freedom")),
        ]);
        let result = lint_record(&rec, false);
        assert_eq!(codes(&result), vec!["E003", "E003"]);
    }

    #[test]
    fn lint_self_reference_and_dangling() {
        let rec = record(vec![
            (
                "a",
                outbound("edge", "vmess")
                    .with("ss_security", "none")
                    .with("ss_sockopt_dialer_proxy", "edge")
                    .with("proxy_settings_tag", "gone"),
            ),
        ]);
        let result = lint_record(&rec, false);
        assert_eq!(codes(&result), vec!["E004", "W002"]);
    }

    #[test]
    fn lint_stale_key_and_empty_alias() {
        let rec = record(vec![(
            "a",
            outbound("free", "freedom")
                .with("alias", "")
                .with("s_vmess_address", "1.2.3.4"),
        )]);
        let result = lint_record(&rec, false);
        assert_eq!(codes(&result), vec!["W001", "W003"]);
        assert!(result.is_ok());
        assert_eq!(result.failed, 0);
    }

    #[test]
    fn lint_strict_mode() {
        let rec = record(vec![(
            "a",
            outbound("free", "freedom").with("s_vmess_address", "1.2.3.4"),
        )]);
        assert_eq!(lint_record(&rec, false).failed, 0);
        assert_eq!(lint_record(&rec, true).failed, 1);
    }

    #[test]
    fn lint_reference_to_portal_is_known() {
        let rec = record(vec![
            (
                "a",
                outbound("edge", "freedom").with("ss_sockopt_dialer_proxy", "portal1"),
            ),
            (
                "r",
                FlatSection::new("reverse")
                    .with("portals", vec!["portal1|p.example".to_string()]),
            ),
        ]);
        assert!(codes(&lint_record(&rec, true)).is_empty());
    }
}
