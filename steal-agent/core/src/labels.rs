use std::collections::BTreeMap;

/// Returns true if `labels` carries `key` with any value other than `false`
/// (compared case-insensitively).
///
/// A missing key and an explicit `false` are equivalent, so operators may
/// either omit the label or set it to `false` to leave a workload unmarked.
pub fn is_marked(labels: &BTreeMap<String, String>, key: &str) -> bool {
    match labels.get(key) {
        Some(value) => !value.eq_ignore_ascii_case("false"),
        None => false,
    }
}
