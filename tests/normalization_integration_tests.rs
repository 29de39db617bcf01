//! Integration tests for resource normalization with golden fixtures
//!
//! Each fixture under `tests/fixtures/normalization/<provider>/` holds a
//! provider listing and the canonical resources it must normalize into.

use cloudspend::normalization::{ResourceStatus, ResourceType, normalize_batch};
use cloudspend::providers::NativeRecord;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Fixture structure for normalization tests
#[derive(Debug, Deserialize)]
struct NormalizationFixture {
    /// Provider slug the listing came from
    provider: String,
    /// Human-readable case name
    name: String,
    /// Provider-native records
    input: Vec<NativeRecord>,
    /// Resources expected after normalization, in output order
    expected: Vec<ExpectedResource>,
}

#[derive(Debug, Deserialize)]
struct ExpectedResource {
    resource_type: ResourceType,
    native_id: String,
    status: ResourceStatus,
    capacity: BTreeMap<String, u64>,
    #[serde(default)]
    attached_volumes: Vec<String>,
    is_orphan: bool,
    /// Tags that must be present; other tags are ignored
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Providers that must ship at least one fixture.
const COVERED_PROVIDERS: &[&str] = &["manual", "selectel", "yandex"];

/// Root directory for normalization fixtures
const FIXTURE_ROOT: &str = "tests/fixtures/normalization";

fn discover_fixture_files(fixture_dir: &Path) -> Vec<DirEntry> {
    WalkDir::new(fixture_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect()
}

fn load_fixture(file_path: &Path) -> Result<NormalizationFixture, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path)?;
    let fixture: NormalizationFixture = serde_json::from_str(&content)?;

    if fixture.provider.is_empty() {
        return Err(format!("Fixture {}: provider field is required", file_path.display()).into());
    }
    if fixture.input.is_empty() {
        return Err(format!("Fixture {}: input must not be empty", file_path.display()).into());
    }
    Ok(fixture)
}

fn check_fixture(fixture: &NormalizationFixture) -> Result<(), String> {
    let batch = normalize_batch(&fixture.provider, &fixture.input);
    if !batch.rejected.is_empty() {
        return Err(format!("rejected records: {:?}", batch.rejected));
    }
    if batch.resources.len() != fixture.expected.len() {
        return Err(format!(
            "expected {} resources, got {}",
            fixture.expected.len(),
            batch.resources.len()
        ));
    }

    for (actual, expected) in batch.resources.iter().zip(&fixture.expected) {
        let id = &expected.native_id;
        if actual.native_id != *id {
            return Err(format!("expected {id} at this position, got {}", actual.native_id));
        }
        if actual.resource_type != expected.resource_type {
            return Err(format!(
                "{id}: type {} != {}",
                actual.resource_type, expected.resource_type
            ));
        }
        if actual.status != expected.status {
            return Err(format!("{id}: status {:?} != {:?}", actual.status, expected.status));
        }
        if actual.capacity != expected.capacity {
            return Err(format!(
                "{id}: capacity {:?} != {:?}",
                actual.capacity, expected.capacity
            ));
        }
        let attached: Vec<&str> = actual
            .attached_volumes
            .iter()
            .map(|v| v.native_id.as_str())
            .collect();
        if attached != expected.attached_volumes {
            return Err(format!(
                "{id}: attached volumes {:?} != {:?}",
                attached, expected.attached_volumes
            ));
        }
        if actual.is_orphan != expected.is_orphan {
            return Err(format!("{id}: is_orphan {}", actual.is_orphan));
        }
        for (key, value) in &expected.tags {
            if actual.tags.get(key) != Some(value) {
                return Err(format!("{id}: tag {key} = {:?}", actual.tags.get(key)));
            }
        }
    }
    Ok(())
}

#[test]
fn normalization_fixtures_match_expected_resources() {
    let fixture_dir = Path::new(FIXTURE_ROOT);
    let files = discover_fixture_files(fixture_dir);
    assert!(!files.is_empty(), "no fixtures found under {FIXTURE_ROOT}");

    let mut failures = Vec::new();
    for entry in &files {
        let fixture = match load_fixture(entry.path()) {
            Ok(fixture) => fixture,
            Err(err) => {
                failures.push(format!("{}: {}", entry.path().display(), err));
                continue;
            }
        };
        if let Err(err) = check_fixture(&fixture) {
            failures.push(format!("{} ({}): {}", entry.path().display(), fixture.name, err));
        }
    }

    assert!(failures.is_empty(), "fixture failures:\n{}", failures.join("\n"));
}

#[test]
fn every_provider_has_fixture_coverage() {
    let covered: BTreeSet<String> = discover_fixture_files(Path::new(FIXTURE_ROOT))
        .iter()
        .filter_map(|entry| load_fixture(entry.path()).ok())
        .map(|fixture| fixture.provider)
        .collect();

    for provider in COVERED_PROVIDERS {
        assert!(
            covered.contains(*provider),
            "provider {provider} has no normalization fixture"
        );
    }
}

#[test]
fn fixtures_normalize_deterministically() {
    for entry in discover_fixture_files(Path::new(FIXTURE_ROOT)) {
        let fixture = load_fixture(entry.path()).unwrap();
        let first = normalize_batch(&fixture.provider, &fixture.input);
        let second = normalize_batch(&fixture.provider, &fixture.input);

        let fingerprints = |batch: &cloudspend::normalization::NormalizedBatch| {
            batch
                .resources
                .iter()
                .map(|r| r.fingerprint())
                .collect::<Vec<_>>()
        };
        assert_eq!(fingerprints(&first), fingerprints(&second), "{}", fixture.name);
    }
}
