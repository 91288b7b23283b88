//! Market id → symbol lookup, loaded once at startup (SPEC_FULL.md §6).
//!
//! Grounded on the original's metadata loader: a missing, unreadable, or
//! malformed file degrades to an empty map with a warning log rather than
//! failing startup, since symbol names are cosmetic and the feed still
//! functions on bare market ids.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

pub type MarketMetadata = HashMap<i32, String>;

/// Load `{ "<market_id>": "<symbol>" }` from `path`. A missing, unreadable,
/// or non-object file degrades to "no metadata". Within an otherwise valid
/// object, each entry is tolerated independently: a non-integer key or a
/// non-string/empty value is skipped with a warning rather than failing
/// the whole file, so one bad entry never discards every good one.
pub fn load(path: &str) -> MarketMetadata {
    let contents = match std::fs::read_to_string(Path::new(path)) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(%path, error = %err, "could not read market metadata file, continuing without symbols");
            return MarketMetadata::new();
        }
    };

    match serde_json::from_str::<HashMap<String, Value>>(&contents) {
        Ok(raw) => raw
            .into_iter()
            .filter_map(|(key, value)| {
                let market_id = match key.parse::<i32>() {
                    Ok(market_id) => market_id,
                    Err(_) => {
                        tracing::warn!(key, "skipping non-numeric market metadata key");
                        return None;
                    }
                };
                match value {
                    Value::String(symbol) if !symbol.is_empty() => Some((market_id, symbol)),
                    _ => {
                        tracing::warn!(key, "skipping non-string or empty market metadata value");
                        None
                    }
                }
            })
            .collect(),
        Err(err) => {
            tracing::warn!(%path, error = %err, "market metadata file is not valid JSON, continuing without symbols");
            MarketMetadata::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct ScratchFile(std::path::PathBuf);

    impl ScratchFile {
        fn new(name: &str, contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!("lighter-md-test-{name}.json"));
            fs::write(&path, contents).expect("write scratch file");
            Self(path)
        }

        fn path(&self) -> &str {
            self.0.to_str().expect("utf8 path")
        }
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[test]
    fn missing_file_degrades_to_empty_map() {
        let metadata = load("/nonexistent/path/metadata.json");
        assert!(metadata.is_empty());
    }

    #[test]
    fn malformed_json_degrades_to_empty_map() {
        let file = ScratchFile::new("malformed", "not json");
        let metadata = load(file.path());
        assert!(metadata.is_empty());
    }

    #[test]
    fn loads_and_parses_numeric_keys() {
        let file = ScratchFile::new("valid", r#"{"1": "ETH-PERP", "2": "BTC-PERP"}"#);
        let metadata = load(file.path());
        assert_eq!(metadata.get(&1).map(String::as_str), Some("ETH-PERP"));
        assert_eq!(metadata.get(&2).map(String::as_str), Some("BTC-PERP"));
    }

    #[test]
    fn bad_entries_are_skipped_individually_not_the_whole_file() {
        let file = ScratchFile::new(
            "mixed",
            r#"{"1": "ETH-PERP", "2": 42, "3": "", "abc": "BTC-PERP"}"#,
        );
        let metadata = load(file.path());
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get(&1).map(String::as_str), Some("ETH-PERP"));
        assert!(!metadata.contains_key(&2));
        assert!(!metadata.contains_key(&3));
    }
}
