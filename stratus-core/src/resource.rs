//! Resource - Representing resources and their state

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource type (e.g., "dns_recordset", "sdrs_protected_instance")
    pub resource_type: String,
    /// Resource name (identifier given by the user)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
///
/// Serialized as plain JSON (`"a"`, `1`, `true`, `[...]`, `{...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Build a list of strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a map of strings
    pub fn string_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }
}

/// Desired state of a resource, as written by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Current state fetched from the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: ResourceId,
    /// Cloud-side identifier (e.g. `<zone_id>/<recordset_id>`)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether the remote object exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn state_serializes_as_plain_json() {
        let mut attributes = HashMap::new();
        attributes.insert("ttl".to_string(), Value::Int(300));
        attributes.insert(
            "records".to_string(),
            Value::string_list(["10.0.0.1", "10.0.0.2"]),
        );
        let state = State::existing(ResourceId::new("dns_recordset", "www"), attributes)
            .with_identifier("zone/rs");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["attributes"]["ttl"], json!(300));
        assert_eq!(json["attributes"]["records"], json!(["10.0.0.1", "10.0.0.2"]));
        assert_eq!(json["identifier"], json!("zone/rs"));

        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn value_deserializes_nested_maps() {
        let value: Value = serde_json::from_value(json!({
            "create": "10m",
            "enabled": true,
        }))
        .unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("create").and_then(Value::as_str), Some("10m"));
        assert_eq!(map.get("enabled").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn not_found_state_has_no_identifier() {
        let state = State::not_found(ResourceId::new("dns_recordset", "www"));
        assert!(!state.exists);
        assert!(state.identifier.is_none());
    }

    #[test]
    fn resource_builder_collects_attributes() {
        let resource = Resource::new("dns_recordset", "www")
            .with_attribute("name", Value::String("www.example.com.".to_string()))
            .with_attribute("ttl", Value::Int(60));

        assert_eq!(resource.id, ResourceId::new("dns_recordset", "www"));
        assert_eq!(resource.get_str("name"), Some("www.example.com."));
        assert_eq!(resource.get_str("ttl"), None);
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("dns_recordset", "www");
        assert_eq!(id.to_string(), "dns_recordset.www");
    }
}
