//! Utility functions for identifiers, statuses and attribute values

use std::collections::HashMap;

use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::resource::Value;

/// Normalize region value (e.g., "otc.Region.eu_de" -> "eu-de")
pub fn normalize_region(s: &str) -> String {
    let region_part = if s.contains('.') {
        s.split('.').next_back().unwrap_or(s)
    } else {
        s
    };
    region_part.replace('_', "-")
}

/// Status family of a raw API status (e.g., "PENDING_CREATE" -> "PENDING")
pub fn normalize_status(raw: &str) -> String {
    raw.split('_').next().unwrap_or(raw).to_string()
}

/// Split a "<parent>/<child>" identifier (e.g., "<zone_id>/<recordset_id>")
pub fn split_identifier<'a>(identifier: &'a str, what: &str) -> ProviderResult<(&'a str, &'a str)> {
    match identifier.split_once('/') {
        Some((parent, child))
            if !parent.is_empty() && !child.is_empty() && !child.contains('/') =>
        {
            Ok((parent, child))
        }
        _ => Err(ProviderError::validation(format!(
            "Invalid {} identifier '{}', expected '<parent_id>/<id>'",
            what, identifier
        ))),
    }
}

/// Read a string attribute
pub fn get_string(attributes: &HashMap<String, Value>, key: &str) -> Option<String> {
    attributes.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Read a required string attribute
pub fn require_string(attributes: &HashMap<String, Value>, key: &str) -> ProviderResult<String> {
    get_string(attributes, key)
        .ok_or_else(|| ProviderError::validation(format!("'{}' is required", key)))
}

/// Read a list of strings attribute
pub fn get_string_list(attributes: &HashMap<String, Value>, key: &str) -> Vec<String> {
    attributes
        .get(key)
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Read a map of strings attribute
pub fn get_string_map(attributes: &HashMap<String, Value>, key: &str) -> HashMap<String, String> {
    attributes
        .get(key)
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
