use serde_json::Value;

/// Canonical key for the "no meaningful filters" case.
///
/// Absent filters and filters that purge down to nothing both map here, so
/// callers cannot accidentally split one logical entry across two keys.
pub const EMPTY_KEY: &str = "{}";

/// Derive the canonical cache key for a filter object.
///
/// Two passes: [`purge`] strips empty values, [`sort`] normalizes ordering.
/// The key is the compact serialization of the result. Pure and
/// deterministic: filters that differ only in key insertion order or in
/// null/empty-string/empty-container noise produce the same key.
///
/// Array element order is deliberately insignificant: `[2,1]` and `[1,2]`
/// canonicalize identically. This is a cache-key equivalence, not a
/// general-purpose deep equality.
pub fn canonicalize(filters: Option<&Value>) -> String {
    key_of(&canonical_filters(filters))
}

/// Key for an already-canonical (purged, sorted) filter structure.
///
/// `key_of(&canonical_filters(f))` and `canonicalize(f)` are always equal;
/// this entry point exists so a caller holding one canonical snapshot can
/// derive the key from that same snapshot instead of re-canonicalizing.
pub fn key_of(canonical: &Value) -> String {
    match canonical {
        Value::Object(map) if map.is_empty() => EMPTY_KEY.to_string(),
        value => value.to_string(),
    }
}

/// The purged, sorted filter structure itself.
///
/// This is what gets handed to the fetcher: the same shape the key was
/// derived from, rather than the caller's raw input.
pub fn canonical_filters(filters: Option<&Value>) -> Value {
    let purged = match filters {
        Some(value) => purge(value),
        None => None,
    };

    match purged {
        Some(value) => sort(value),
        None => Value::Object(serde_json::Map::new()),
    }
}

/// Recursively strip empty values: null, the empty string, and any array or
/// object left empty once its own empty children are removed. Emptiness is
/// resolved depth-first, so a map of empty maps purges away entirely.
///
/// NaN cannot be represented in a [`Value`] (non-finite floats become null),
/// so the null rule covers it.
pub fn purge(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let purged: Vec<Value> = items.iter().filter_map(purge).collect();
            if purged.is_empty() {
                None
            } else {
                Some(Value::Array(purged))
            }
        }
        Value::Object(map) => {
            let mut purged = serde_json::Map::new();
            for (key, child) in map {
                if let Some(kept) = purge(child) {
                    purged.insert(key.clone(), kept);
                }
            }
            if purged.is_empty() {
                None
            } else {
                Some(Value::Object(purged))
            }
        }
        other => Some(other.clone()),
    }
}

/// Recursively normalize ordering. Object keys are lexicographic —
/// `serde_json`'s map is BTree-backed (the `preserve_order` feature must stay
/// off), so rebuilding the map is enough. Array elements are sorted by their
/// compact serialized form.
pub fn sort(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut sorted: Vec<Value> = items.into_iter().map(sort).collect();
            sorted.sort_by_key(|item| item.to_string());
            Value::Array(sorted)
        }
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, sort(v))).collect())
        }
        primitive => primitive,
    }
}
