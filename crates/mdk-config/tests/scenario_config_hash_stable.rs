//! The effective config hash depends on content only: key order in the
//! source YAML does not matter, values and layer overrides do.

use mdk_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
daemon:
  addr: "127.0.0.1:8899"
store:
  backend: "memory"
  database_url_env: "MDK_DATABASE_URL"
  max_connections: 10
audit:
  path: "var/audit/memos.jsonl"
  hash_chain: true
"#;

const BASE_YAML_REORDERED: &str = r#"
audit:
  hash_chain: true
  path: "var/audit/memos.jsonl"
store:
  max_connections: 10
  database_url_env: "MDK_DATABASE_URL"
  backend: "memory"
daemon:
  addr: "127.0.0.1:8899"
"#;

const OVERLAY_YAML: &str = r#"
store:
  backend: "postgres"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(original.config_hash, reordered.config_hash);
    assert_eq!(original.canonical_json, reordered.canonical_json);
}

#[test]
fn overlay_changes_hash_and_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let desk = merged.desk().unwrap();
    assert_eq!(desk.store.backend, mdk_config::StoreBackend::Postgres);
    assert_eq!(desk.store.max_connections, 10);
    assert_eq!(desk.audit.path.as_deref(), Some("var/audit/memos.jsonl"));
}

#[test]
fn hash_is_lowercase_hex_sha256() {
    let cfg = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(cfg.config_hash.len(), 64);
    assert!(cfg
        .config_hash
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}
