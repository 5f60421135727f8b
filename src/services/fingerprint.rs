//! Order-independent content hashing of show projections.

use chrono::SecondsFormat;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::state::ShowProjection;

/// Metadata keys holding raw per-platform snapshots; kept for display only.
const PLATFORM_KEYS: [&str; 2] = ["floatplane", "youtube"];

/// Write `value` as JSON with every object's keys in lexicographic order.
pub fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Fields of a projection that identify its content.
///
/// Identity, lifecycle state, timestamps and the clock-derived actual start are left out.
fn fingerprint_view(projection: &ShowProjection) -> Value {
    let show = &projection.show;
    let metadata: Map<String, Value> = show
        .metadata
        .iter()
        .filter(|(key, _)| !PLATFORM_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    json!({
        "youtube_id": show.youtube_id,
        "scheduled_time": show.scheduled_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        "thumbnail": show.thumbnail,
        "metadata": metadata,
        "primary_live": projection.signals.primary_live,
        "has_identifying_signal": projection.signals.has_identifying_signal,
    })
}

/// Hex-encoded SHA-256 of the canonical fingerprint view.
pub fn fingerprint(projection: &ShowProjection) -> String {
    let canonical = canonical_json(&fingerprint_view(projection));
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Whether two projections carry the same content.
pub fn same_content(left: &ShowProjection, right: &ShowProjection) -> bool {
    fingerprint(left) == fingerprint(right)
}
