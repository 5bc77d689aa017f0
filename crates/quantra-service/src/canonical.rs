//! Canonical spec serialization and deduplication keys.
//!
//! The single chokepoint for dedup-key derivation, shared by single-job
//! submission and sweep child construction. Any deviation between the two
//! paths would produce silent dedup failures, so both go through
//! [`canonical_spec`].

use quantra_core::{JobSpec, SweepId};
use sha2::{Digest, Sha256};

/// Renders a spec as a deterministic byte string: stable field ordering,
/// trimmed strings, recursively key-sorted parameters.
#[must_use]
pub fn canonical_spec(spec: &JobSpec) -> String {
    format!(
        "strategy={}&symbol={}&start={}&end={}&capital={}&params={}",
        spec.strategy.trim(),
        spec.symbol.trim(),
        spec.start_date,
        spec.end_date,
        spec.initial_capital,
        canonical_json(&spec.parameters)
    )
}

/// Deduplication key for a standalone submission.
#[must_use]
pub fn dedup_key(spec: &JobSpec) -> String {
    hex_digest(&canonical_spec(spec))
}

/// Deduplication key for a sweep child; the sweep id namespaces the key so
/// identical combinations in different sweeps stay distinct jobs.
#[must_use]
pub fn child_dedup_key(sweep_id: SweepId, spec: &JobSpec) -> String {
    hex_digest(&format!("sweep={}&{}", sweep_id, canonical_spec(spec)))
}

/// Serializes a JSON value with recursively sorted object keys.
#[must_use]
pub fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
    }
}

fn hex_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
