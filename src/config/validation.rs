//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, unknown section).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Tables whose contents are user-defined and never checked.
const FREE_FORM_TABLES: &[&str] = &["assets.properties"];

/// Returns the complete set of valid dotted key paths for FleetConfig.
///
/// Array-of-table entries (`[[devices]]`, `[[assets]]`) are walked without
/// an index, so `devices.commands.name` covers every device entry.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [transport]
        "transport",
        "transport.vehicle_device_type",
        // [[devices]]
        "devices",
        "devices.device_type",
        "devices.commands",
        "devices.commands.name",
        // [queue]
        "queue",
        "queue.yield_delay_ms",
        "queue.task_timeout_ms",
        // [rules]
        "rules",
        "rules.simulation_vendor",
        "rules.low_fuel",
        "rules.low_fuel.enabled",
        "rules.low_fuel.threshold_ratio",
        "rules.half_fuel",
        "rules.half_fuel.enabled",
        "rules.half_fuel.threshold_ratio",
        "rules.high_engine_temp",
        "rules.high_engine_temp.enabled",
        "rules.high_engine_temp.limit",
        // [pipeline]
        "pipeline",
        "pipeline.channel_capacity",
        "pipeline.drop_when_full",
        // [[assets]]
        "assets",
        "assets.device_id",
        "assets.device_type",
        "assets.vehicle_id",
        "assets.driver_id",
        "assets.vendor",
        "assets.properties",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Tables inside arrays contribute their keys under
/// the array's path. Duplicates are removed, first occurrence wins.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    collect_keys(value, prefix, &mut keys);
    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}

fn collect_keys(value: &toml::Value, prefix: &str, keys: &mut Vec<String>) {
    let Some(table) = value.as_table() else {
        return;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        keys.push(path.clone());
        if FREE_FORM_TABLES.contains(&path.as_str()) {
            continue;
        }
        match v {
            toml::Value::Table(_) => collect_keys(v, &path, keys),
            toml::Value::Array(items) => {
                for item in items.iter().filter(|i| i.is_table()) {
                    collect_keys(item, &path, keys);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Closest known key within an edit distance of 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        match best {
            Some((best_key, best_dist)) if dist > best_dist || (dist == best_dist && k >= best_key) => {}
            _ => best = Some((k, dist)),
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation
// ============================================================================

/// Warn about every key in `raw_toml` that FleetConfig does not know.
///
/// Parse errors are left for serde to report.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("limit", "limit"), 0);
        assert_eq!(levenshtein("limt", "limit"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_descends_into_arrays() {
        let toml: toml::Value = r#"
[[devices]]
device_type = "vehicle"
[[devices.commands]]
name = "reboot"

[[devices]]
device_type = "gateway"
"#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"devices".to_string()));
        assert!(keys.contains(&"devices.device_type".to_string()));
        assert!(keys.contains(&"devices.commands.name".to_string()));
        assert_eq!(keys.iter().filter(|k| *k == "devices.device_type").count(), 1);
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[rules.high_engine_temp]
limt = 110.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "rules.high_engine_temp.limt");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("rules.high_engine_temp.limit")
        );
    }

    #[test]
    fn test_asset_properties_are_free_form() {
        let toml_str = r#"
[[assets]]
device_id = "dev-1"
vehicle_id = "car-1"
properties = { fueltank = 60, anything_goes = "yes" }
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[rules.typo_section]
some_field = 42
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field.contains("typo_section")));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }
}
