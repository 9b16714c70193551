//! Property-based path safety tests for the local adapter
//!
//! Whatever name a client sends, an upload either lands strictly inside the
//! adapter's base directory or is rejected as an invalid name / path escape.

use proptest::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use ussp_storage::{LocalAdapter, StorageAdapter, StorageError};

/// Names built from traversal-prone fragments
fn arb_hostile_name() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("..".to_string()),
            Just("/".to_string()),
            Just("\\".to_string()),
            Just(".".to_string()),
            Just("%2e%2e".to_string()),
            Just("etc".to_string()),
            Just("passwd".to_string()),
            "[a-z0-9_-]{1,6}",
        ],
        0..8,
    )
    .prop_map(|parts| parts.concat())
}

#[test]
fn proptest_upload_stays_inside_base() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&arb_hostile_name(), |name| {
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let temp_dir = TempDir::new().unwrap();
                let base = temp_dir.path().join("base");
                let adapter = LocalAdapter::new(&base).await.unwrap();

                match adapter.upload("ns", &name, b"payload", None).await {
                    Ok(location) => {
                        let ns_dir = adapter.root().join("ns");
                        let stored = Path::new(&location.address);
                        prop_assert!(stored.starts_with(&ns_dir));
                        prop_assert_eq!(stored.parent(), Some(ns_dir.as_path()));
                        let data = adapter.download("ns", &name).await.unwrap();
                        prop_assert_eq!(data, b"payload".to_vec());
                    }
                    Err(StorageError::InvalidName(_)) | Err(StorageError::PathEscape { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }

                // Nothing ever appears next to the base directory
                let siblings: Vec<_> = std::fs::read_dir(temp_dir.path())
                    .unwrap()
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name())
                    .collect();
                prop_assert_eq!(siblings.len(), 1);
                Ok(())
            })
        })
        .unwrap();
}

/// Names that differ only in separators, underscores, percent signs and dots
fn arb_lookalike_name() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("a".to_string()),
            Just("b".to_string()),
            Just("_".to_string()),
            Just("/".to_string()),
            Just("\\".to_string()),
            Just("%".to_string()),
            Just("%2F".to_string()),
            Just("..".to_string()),
        ],
        1..6,
    )
    .prop_map(|parts| parts.concat())
}

#[test]
fn proptest_distinct_names_keep_distinct_bytes() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(arb_lookalike_name(), arb_lookalike_name()), |(first, second)| {
            prop_assume!(first != second);
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let temp_dir = TempDir::new().unwrap();
                let adapter = LocalAdapter::new(temp_dir.path()).await.unwrap();

                let stored_first = adapter.upload("ns", &first, b"first", None).await.is_ok();
                let stored_second = adapter.upload("ns", &second, b"second", None).await.is_ok();

                if stored_first {
                    prop_assert_eq!(adapter.download("ns", &first).await.unwrap(), b"first".to_vec());
                }
                if stored_first && stored_second {
                    adapter.delete("ns", &second).await.unwrap();
                    prop_assert!(adapter.exists("ns", &first).await.unwrap());
                }
                Ok(())
            })
        })
        .unwrap();
}

#[tokio::test]
async fn test_lookalike_names_do_not_alias() {
    let temp_dir = TempDir::new().unwrap();
    let adapter = LocalAdapter::new(temp_dir.path()).await.unwrap();

    adapter.upload("ns", "a_b", b"first", None).await.unwrap();
    adapter.upload("ns", "a/b", b"SECOND", None).await.unwrap();
    assert_eq!(adapter.download("ns", "a_b").await.unwrap(), b"first");
    assert_eq!(adapter.download("ns", "a/b").await.unwrap(), b"SECOND");

    adapter.upload("ns", "ab", b"x", None).await.unwrap();
    adapter.delete("ns", "a..b").await.unwrap();
    assert!(adapter.exists("ns", "ab").await.unwrap());
}

#[tokio::test]
async fn test_etc_passwd_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let adapter = LocalAdapter::new(temp_dir.path().join("base")).await.unwrap();

    let result = adapter.upload("ns", "../../etc/passwd", b"x", None).await;
    match result {
        Ok(location) => {
            assert!(Path::new(&location.address).starts_with(adapter.root()));
        }
        Err(e) => assert!(e.is_path_escape()),
    }
    assert!(!temp_dir.path().join("etc").exists());
}
