//! Integration tests for share-link import.

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use v2ray_outbound::{
    import_links, to_flat, to_structured, FlatRecord, FlatSection, LinkError, MemoryStore,
    Network, Protocol, Security, Store, OUTBOUND_SECTION, REVERSE_SECTION,
};

fn link(payload: Value) -> String {
    format!(
        "vmess://{}",
        general_purpose::STANDARD.encode(payload.to_string())
    )
}

fn ws_link(alias: &str) -> String {
    link(json!({
        "v": "2",
        "ps": alias,
        "add": "1.2.3.4",
        "port": "443",
        "id": "uuid",
        "net": "ws",
        "path": "/x",
        "host": "example.com",
        "tls": "tls"
    }))
}

mod scenarios {
    use super::*;

    #[test]
    fn ws_tls_link_lands_in_the_store() {
        let report = import_links(&ws_link(""), &FlatRecord::new());
        assert!(report.skipped.is_empty());

        let mut store = MemoryStore::new();
        let ids = report.commit(&mut store).unwrap();
        assert_eq!(ids, vec!["cfg000001".to_string()]);

        let section = store.get(&ids[0]).unwrap();
        assert_eq!(section.kind, OUTBOUND_SECTION);
        assert_eq!(section.get_str("protocol"), Some("vmess"));
        assert_eq!(section.get_str("alias"), Some("1.2.3.4:443"));
        assert_eq!(section.get_str("tag"), Some("1.2.3.4:443"));
        assert_eq!(section.get_str("s_vmess_address"), Some("1.2.3.4"));
        assert_eq!(section.get_str("s_vmess_port"), Some("443"));
        assert_eq!(section.get_str("s_vmess_user_id"), Some("uuid"));
        assert_eq!(section.get_str("ss_network"), Some("ws"));
        assert_eq!(section.get_str("ss_websocket_path"), Some("/x"));
        assert_eq!(section.get_str("ss_security"), Some("tls"));
        assert_eq!(section.get_str("ss_tls_server_name"), Some("example.com"));

        let mapped = to_structured(store.record(), &ids[0]).unwrap();
        assert!(mapped.warnings.is_empty());
        let combination = mapped.entry.combination();
        assert_eq!(combination.protocol, Protocol::Vmess);
        assert_eq!(combination.network, Some(Network::Ws));
        assert_eq!(combination.security, Security::Tls);
    }

    #[test]
    fn unsupported_network_creates_nothing() {
        let grpc = link(json!({ "v": "2", "add": "1.2.3.4", "port": "443", "net": "grpc" }));
        let report = import_links(&grpc, &FlatRecord::new());

        assert!(report.entries.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].reason,
            LinkError::UnsupportedNetwork {
                network: "grpc".into()
            }
        );

        let mut store = MemoryStore::new();
        assert!(report.commit(&mut store).unwrap().is_empty());
        assert!(store.record().is_empty());
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn imported_patch_is_stable() {
        let report = import_links(&ws_link("edge"), &FlatRecord::new());
        let entry = &report.entries[0];
        assert_eq!(to_flat(entry), to_flat(entry));
    }
}

mod batch {
    use super::*;

    #[test]
    fn bad_line_between_good_ones() {
        let input = format!("{}\nbadline\n{}", ws_link("A"), ws_link("B"));
        let report = import_links(&input, &FlatRecord::new());

        let tags: Vec<&str> = report.entries.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["A", "B"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 2);
        assert_eq!(report.skipped[0].reason, LinkError::UnsupportedScheme);

        let mut store = MemoryStore::new();
        let ids = report.commit(&mut store).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.record().len(), 2);
        assert_eq!(store.get(&ids[0]).unwrap().get_str("tag"), Some("A"));
        assert_eq!(store.get(&ids[1]).unwrap().get_str("tag"), Some("B"));
    }

    #[test]
    fn crlf_and_blank_lines() {
        let input = format!("{}\r\n\r\n{}\r\n", ws_link("A"), ws_link("B"));
        let report = import_links(&input, &FlatRecord::new());
        assert_eq!(report.entries.len(), 2);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn tags_taken_by_record_or_reverse_are_skipped() {
        let mut record = FlatRecord::new();
        record.insert(
            "cfg000001".into(),
            FlatSection::new(OUTBOUND_SECTION)
                .with("tag", "A")
                .with("protocol", "freedom"),
        );
        record.insert(
            "cfg000002".into(),
            FlatSection::new(REVERSE_SECTION).with("bridges", vec!["B|b.example".to_string()]),
        );

        let input = format!("{}\n{}\n{}", ws_link("A"), ws_link("B"), ws_link("C"));
        let report = import_links(&input, &record);

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].tag, "C");
        let lines: Vec<usize> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 2]);
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.reason, LinkError::DuplicateTag { .. })));
    }

    #[test]
    fn commit_continues_after_existing_ids() {
        let mut record = FlatRecord::new();
        record.insert(
            "cfg000007".into(),
            FlatSection::new(OUTBOUND_SECTION)
                .with("tag", "old")
                .with("protocol", "freedom"),
        );
        let report = import_links(&ws_link("new"), &record);

        let mut store = MemoryStore::from_record(record);
        let ids = report.commit(&mut store).unwrap();
        assert_eq!(ids, vec!["cfg000008".to_string()]);
        assert_eq!(store.pending(), 0);
    }
}
