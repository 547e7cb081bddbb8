//! Output formatting helpers for the CLI.

use std::collections::BTreeMap;

use comfy_table::presets::NOTHING;
use comfy_table::{ContentArrangement, Table};

/// Render rows as a borderless table with a header line.
pub fn simple_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

/// Metadata values are bytes; show UTF-8 text as-is, anything else as hex.
pub fn display_value(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("0x{}", hex::encode(value)),
    }
}

pub fn metadata_json(metadata: &BTreeMap<String, Vec<u8>>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = metadata
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(display_value(value))))
        .collect();
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_value_text_and_binary() {
        assert_eq!(display_value(b"65"), "65");
        assert_eq!(display_value(&[0, 1, 255]), "0x0001ff");
    }

    #[test]
    fn test_metadata_json_is_object() {
        let mut metadata = BTreeMap::new();
        metadata.insert("sys-version".to_string(), b"96".to_vec());
        let json = metadata_json(&metadata);
        assert_eq!(json["sys-version"], "96");
    }
}
