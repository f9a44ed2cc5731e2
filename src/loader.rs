//! Record loading and writing.
//!
//! A record file is a JSON object of sections:
//! `{ "<id>": { ".type": "outbound", "<key>": "value" | ["item", ...] } }`.

use std::io::Read;
use std::path::Path;

use crate::error::LoadError;
use crate::types::FlatRecord;

/// Load a record from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't a valid record.
pub fn load_record(path: &Path) -> Result<FlatRecord, LoadError> {
    load_record_str(&read_file(path)?)
}

/// Load a record from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't a valid record.
pub fn load_record_str(content: &str) -> Result<FlatRecord, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Write a record as pretty-printed JSON.
///
/// # Errors
///
/// Returns `LoadError::WriteError` if the file cannot be written.
pub fn write_record(path: &Path, record: &FlatRecord) -> Result<(), LoadError> {
    let mut content =
        serde_json::to_string_pretty(record).map_err(|source| LoadError::InvalidJson { source })?;
    content.push('\n');
    std::fs::write(path, content).map_err(|source| LoadError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

/// Read text from a file, or from stdin when `source` is `-`.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` or `LoadError::ReadError`.
pub fn load_text_auto(source: &str) -> Result<String, LoadError> {
    if source == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| LoadError::ReadError {
                path: "-".into(),
                source,
            })?;
        return Ok(content);
    }
    read_file(Path::new(source))
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, FlatSection};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_record_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"cfg000001": {{".type": "outbound", "protocol": "vmess", "ss_http_host": ["a", "b"]}}}}"#
        )
        .unwrap();

        let record = load_record(file.path()).unwrap();
        let section = &record["cfg000001"];
        assert_eq!(section.kind, "outbound");
        assert_eq!(section.get_str("protocol"), Some("vmess"));
        assert_eq!(
            section.get("ss_http_host"),
            Some(&FieldValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn load_record_file_not_found() {
        let result = load_record(Path::new("/nonexistent/v2ray.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_record_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_record(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn load_record_str_rejects_non_string_values() {
        let result = load_record_str(r#"{"a": {".type": "outbound", "port": 443}}"#);
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn write_then_load() {
        let mut record = FlatRecord::new();
        record.insert(
            "cfg000001".into(),
            FlatSection::new("outbound").with("tag", "edge"),
        );
        let file = NamedTempFile::new().unwrap();

        write_record(file.path(), &record).unwrap();
        assert_eq!(load_record(file.path()).unwrap(), record);
    }

    #[test]
    fn load_text_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "vmess://abc").unwrap();
        let text = load_text_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(text.trim(), "vmess://abc");
    }
}
