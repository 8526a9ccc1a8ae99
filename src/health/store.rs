use std::collections::BTreeMap;

use serde::Serialize;

/// Key-value store statistics from `INFO`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StoreStats {
    pub connected_clients: Option<u64>,
    pub used_memory_bytes: Option<u64>,
    pub used_memory_human: Option<String>,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    /// `hits / (hits + misses)`, absent before the first lookup.
    pub hit_ratio: Option<f64>,
    /// Sum of `keys=` over every `dbN` keyspace line.
    pub total_keys: Option<u64>,
}

impl StoreStats {
    pub fn from_info(info: &BTreeMap<String, String>) -> Self {
        let number = |field: &str| info.get(field).and_then(|v| v.trim().parse::<u64>().ok());

        let keyspace_hits = number("keyspace_hits").unwrap_or(0);
        let keyspace_misses = number("keyspace_misses").unwrap_or(0);
        let lookups = keyspace_hits + keyspace_misses;

        let db_keys: Vec<u64> = info
            .iter()
            .filter(|(k, _)| is_keyspace_field(k))
            .filter_map(|(_, v)| keyspace_keys(v))
            .collect();

        Self {
            connected_clients: number("connected_clients"),
            used_memory_bytes: number("used_memory"),
            used_memory_human: info.get("used_memory_human").cloned(),
            keyspace_hits,
            keyspace_misses,
            hit_ratio: (lookups > 0).then(|| keyspace_hits as f64 / lookups as f64),
            total_keys: (!db_keys.is_empty()).then(|| db_keys.iter().sum()),
        }
    }
}

fn is_keyspace_field(field: &str) -> bool {
    field
        .strip_prefix("db")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Extract `keys` from a keyspace value like `keys=12,expires=3,avg_ttl=0`.
fn keyspace_keys(value: &str) -> Option<u64> {
    value
        .split(',')
        .find_map(|part| part.strip_prefix("keys="))
        .and_then(|n| n.parse().ok())
}
