//! Tag helpers shared by the resource kinds

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use stratus_core::resource::Value;
use stratus_core::schema::AttributeType;

use crate::api::ResourceTag;

const MAX_KEY_LENGTH: usize = 36;
const MAX_VALUE_LENGTH: usize = 43;

fn tag_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-zA-Z_-]*$").ok()).as_ref()
}

fn check_part(what: &str, text: &str, max: usize) -> Result<(), String> {
    if text.chars().count() > max {
        return Err(format!("Tag {} '{}' is longer than {} characters", what, text, max));
    }
    match tag_regex() {
        Some(re) if re.is_match(text) => Ok(()),
        _ => Err(format!(
            "Tag {} '{}' may only contain letters, digits, '_' and '-'",
            what, text
        )),
    }
}

/// Validate a tag map attribute
pub fn validate_tags(value: &Value) -> Result<(), String> {
    let Value::Map(map) = value else {
        return Err("Expected a map of tags".to_string());
    };
    for (key, value) in map {
        if key.is_empty() {
            return Err("Tag key must not be empty".to_string());
        }
        check_part("key", key, MAX_KEY_LENGTH)?;
        match value {
            Value::String(v) => check_part("value", v, MAX_VALUE_LENGTH)?,
            _ => return Err(format!("Tag '{}' must have a string value", key)),
        }
    }
    Ok(())
}

/// Attribute type of a `tags` map
pub fn tags_type() -> AttributeType {
    AttributeType::Custom {
        name: "Tags".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: validate_tags,
    }
}

/// Build API tags from a `tags` attribute, sorted by key
pub fn expand_tags(value: Option<&Value>) -> Vec<ResourceTag> {
    let mut tags = Vec::new();
    if let Some(Value::Map(map)) = value {
        for (key, value) in map {
            if let Value::String(v) = value {
                tags.push(ResourceTag::new(key.as_str(), v.as_str()));
            }
        }
    }
    tags.sort();
    tags
}

/// Turn API tags into a `tags` attribute value
pub fn flatten_tags(tags: &[ResourceTag]) -> Value {
    let map: HashMap<String, Value> = tags
        .iter()
        .map(|t| (t.key.clone(), Value::String(t.value.clone())))
        .collect();
    Value::Map(map)
}

/// Calls needed to go from the current tags to the desired ones
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagChanges {
    /// Keys to remove
    pub remove: Vec<ResourceTag>,
    /// Tags to create or overwrite
    pub set: Vec<ResourceTag>,
}

impl TagChanges {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.set.is_empty()
    }
}

pub fn diff_tags(current: &[ResourceTag], desired: &[ResourceTag]) -> TagChanges {
    let current: BTreeMap<&str, &str> = current
        .iter()
        .map(|t| (t.key.as_str(), t.value.as_str()))
        .collect();
    let desired: BTreeMap<&str, &str> = desired
        .iter()
        .map(|t| (t.key.as_str(), t.value.as_str()))
        .collect();

    let remove = current
        .iter()
        .filter(|(k, _)| !desired.contains_key(*k))
        .map(|(k, v)| ResourceTag::new(*k, *v))
        .collect();
    let set = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| ResourceTag::new(*k, *v))
        .collect();

    TagChanges { remove, set }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tags_sorted() {
        let value = Value::string_map([("team", "dns"), ("env", "prod")]);
        let tags = expand_tags(Some(&value));
        assert_eq!(
            tags,
            vec![ResourceTag::new("env", "prod"), ResourceTag::new("team", "dns")]
        );
        assert!(expand_tags(None).is_empty());
    }

    #[test]
    fn test_flatten_tags() {
        let value = flatten_tags(&[ResourceTag::new("env", "prod")]);
        assert_eq!(value, Value::string_map([("env", "prod")]));
    }

    #[test]
    fn test_diff_tags() {
        let current = vec![
            ResourceTag::new("env", "dev"),
            ResourceTag::new("owner", "ops"),
            ResourceTag::new("team", "dns"),
        ];
        let desired = vec![ResourceTag::new("env", "prod"), ResourceTag::new("team", "dns")];

        let changes = diff_tags(&current, &desired);
        assert_eq!(changes.remove, vec![ResourceTag::new("owner", "ops")]);
        assert_eq!(changes.set, vec![ResourceTag::new("env", "prod")]);
        assert!(diff_tags(&desired, &desired).is_empty());
    }

    #[test]
    fn test_validate_tags() {
        assert!(validate_tags(&Value::string_map([("env", "prod-1")])).is_ok());
        assert!(validate_tags(&Value::string_map([("env", "has space")])).is_err());
        assert!(validate_tags(&Value::string_map([("a".repeat(37), "x".to_string())])).is_err());
        assert!(validate_tags(&Value::string_map([("", "x")])).is_err());
    }

    #[test]
    fn test_tags_type_checks_base() {
        assert!(tags_type().validate(&Value::string_map([("env", "prod")])).is_ok());
        assert!(tags_type().validate(&Value::String("env=prod".into())).is_err());
    }
}
