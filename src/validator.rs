//! Section validation: JSON Schema shape, per-field value checks, and the
//! self-reference guard.

use std::net::IpAddr;

use base64::{engine::general_purpose, Engine as _};
use ipnet::IpNet;
use serde_json::Value;

use crate::error::{FieldError, MapError, ValidateError};
use crate::mapper;
use crate::resolver::{self, Snapshot, WithOptions};
use crate::schema::{self, ValidationKind};
use crate::types::{FieldValue, FlatRecord, FlatSection, ResolveOptions};

/// Reject a reference to the entry's own tag.
///
/// An empty candidate never matches.
///
/// # Errors
///
/// Returns `SelfReferenceNotAllowed` for `field` iff `candidate` equals
/// `current_tag`.
pub fn ensure_not_self(field: &str, current_tag: &str, candidate: &str) -> Result<(), FieldError> {
    if !candidate.is_empty() && candidate == current_tag {
        Err(FieldError::self_reference(field))
    } else {
        Ok(())
    }
}

/// Value checks for the validation kinds in the registry.
///
/// Error messages are shown to the user as is.
pub trait Validator {
    /// # Errors
    ///
    /// Returns a human-readable message when the value is rejected.
    fn check(&self, kind: ValidationKind, value: &str) -> Result<(), String>;
}

/// Local implementation of every [`ValidationKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidator;

impl Validator for BuiltinValidator {
    fn check(&self, kind: ValidationKind, value: &str) -> Result<(), String> {
        match kind {
            ValidationKind::Port => value
                .parse::<u16>()
                .map(|_| ())
                .map_err(|_| "expecting a port number (0-65535)".to_string()),
            ValidationKind::UInteger => value
                .parse::<u64>()
                .map(|_| ())
                .map_err(|_| "expecting a non-negative integer".to_string()),
            ValidationKind::Host => {
                if value.parse::<IpAddr>().is_ok() || is_hostname(value) {
                    Ok(())
                } else {
                    Err("expecting a hostname or IP address".to_string())
                }
            }
            ValidationKind::Path => {
                if value.starts_with('/') {
                    Ok(())
                } else {
                    Err("path must start with /".to_string())
                }
            }
            ValidationKind::Sni | ValidationKind::Domain => {
                if is_hostname(value) {
                    Ok(())
                } else {
                    Err("expecting a valid domain name".to_string())
                }
            }
            ValidationKind::WgKeys => match general_purpose::STANDARD.decode(value) {
                Ok(bytes) if bytes.len() == 32 => Ok(()),
                _ => Err("expecting a base64-encoded 32-byte key".to_string()),
            },
            ValidationKind::WgReserved => {
                let parts: Vec<_> = value.split(',').map(str::trim).collect();
                if parts.len() == 3 && parts.iter().all(|p| p.parse::<u8>().is_ok()) {
                    Ok(())
                } else {
                    Err("expecting three comma-separated bytes, like 0,123,255".to_string())
                }
            }
            ValidationKind::FragmentLength | ValidationKind::FragmentInterval => {
                check_range(value)
            }
            ValidationKind::FragmentPackets => {
                if value == "tlshello" {
                    Ok(())
                } else {
                    check_range(value)
                }
            }
            ValidationKind::GrpcServiceName => {
                if !value.is_empty() && !value.contains(char::is_whitespace) {
                    Ok(())
                } else {
                    Err("service name must not contain whitespace".to_string())
                }
            }
            ValidationKind::ShortId => {
                if value.len() <= 16
                    && value.len() % 2 == 0
                    && value.chars().all(|c| c.is_ascii_hexdigit())
                {
                    Ok(())
                } else {
                    Err("expecting an even-length hex string of at most 16 digits".to_string())
                }
            }
            ValidationKind::RealityPublicKey => {
                if value.len() == 43 {
                    Ok(())
                } else {
                    Err("expecting a 43-character public key".to_string())
                }
            }
            ValidationKind::IpOrCidr => {
                if value.parse::<IpNet>().is_ok() || value.parse::<IpAddr>().is_ok() {
                    Ok(())
                } else {
                    Err("expecting an IP address or CIDR".to_string())
                }
            }
        }
    }
}

fn is_hostname(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}

/// `N` or `N-M` with `N <= M`.
fn check_range(value: &str) -> Result<(), String> {
    let (low, high) = value.split_once('-').unwrap_or((value, value));
    match (low.trim().parse::<u64>(), high.trim().parse::<u64>()) {
        (Ok(low), Ok(high)) if low <= high => Ok(()),
        _ => Err("expecting a number or a range like 10-20".to_string()),
    }
}

/// Validate one outbound section.
///
/// Checks the section against [`schema::section_schema`] for its
/// combination, requires a value for every active required field without a
/// default, runs `validator` on every active non-empty field, and rejects
/// reference fields naming the section's own tag. All problems are
/// collected before returning.
///
/// # Errors
///
/// Returns `ValidateError::Map` if the section cannot be mapped,
/// `ValidateError::InvalidSchema` if the generated schema does not compile,
/// or `ValidateError::Invalid` with every field error found.
pub fn validate_section(
    record: &FlatRecord,
    section_id: &str,
    validator: &dyn Validator,
    options: &ResolveOptions,
) -> Result<(), ValidateError> {
    let mapped = mapper::to_structured(record, section_id)?;
    let combination = mapped.entry.combination();
    let section = record
        .get(section_id)
        .ok_or_else(|| MapError::SectionNotFound {
            section: section_id.to_string(),
        })?;

    let mut errors = validate_against_schema(&schema::section_schema(&combination), section)?;

    let snapshot = WithOptions::new(section, options);
    let current_tag = section.get_str("tag").unwrap_or_default();

    for field in combination.fields() {
        if !resolver::is_active(field.key, &snapshot)? {
            continue;
        }

        let Some(value) = snapshot.value(field.key).filter(|v| !values(v).is_empty()) else {
            if field.required && field.default.is_none() {
                errors.push(FieldError::validation(field.key, "value is required"));
            }
            continue;
        };

        if let Some(kind) = field.validation {
            for item in values(value) {
                if let Err(message) = validator.check(kind, &item) {
                    errors.push(FieldError::validation(field.key, message));
                }
            }
        }

        if field.reference {
            if let Some(candidate) = value.as_scalar() {
                if let Err(e) = ensure_not_self(field.key, current_tag, candidate) {
                    errors.push(e);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

fn values(value: &FieldValue) -> Vec<String> {
    value
        .to_list()
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect()
}

/// JSON Schema errors for a flat section, keyed by the offending property.
///
/// Root-level errors (missing required properties) are left out; callers
/// check required fields against the resolved rules instead.
///
/// # Errors
///
/// Returns `ValidateError::InvalidSchema` if the schema does not compile.
pub fn validate_against_schema(
    schema: &Value,
    section: &FlatSection,
) -> Result<Vec<FieldError>, ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    let payload = serde_json::to_value(section).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors = validator
        .iter_errors(&payload)
        .filter_map(|e| {
            let path = e.instance_path.to_string();
            let field = path.trim_start_matches('/').split('/').next().unwrap_or_default();
            if field.is_empty() {
                tracing::debug!("schema: {e}");
                return None;
            }
            Some(FieldError::validation(field, e.to_string()))
        })
        .collect();

    Ok(errors)
}
