//! Schema - Define type schemas for resources
//!
//! Resource kinds define a schema for their attributes, which is checked
//! before any attribute is marshaled into a typed request.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedOnly { name: String },

    #[error("Attribute '{name}' needs at least {min} item(s), got {got}")]
    TooFewItems { name: String, min: usize, got: usize },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider from the remote side
    pub computed: bool,
    /// Settable by the user even though it is computed (e.g., `region`)
    pub optional: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    pub default: Option<Value>,
    pub min_items: Option<usize>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            optional: true,
            force_new: false,
            default: None,
            min_items: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attribute only ever set by the provider
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Attribute the user may set, filled in by the provider otherwise
    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            let Some(schema) = self.attributes.get(name) else {
                errors.push(TypeError::UnknownAttribute { name: name.clone() });
                continue;
            };

            if schema.computed && !schema.optional {
                errors.push(TypeError::ComputedOnly { name: name.clone() });
                continue;
            }

            if let Err(e) = schema.attr_type.validate(value) {
                errors.push(TypeError::AttributeError {
                    name: name.clone(),
                    inner: Box::new(e),
                });
                continue;
            }

            if let (Some(min), Value::List(items)) = (schema.min_items, value)
                && items.len() < min
            {
                errors.push(TypeError::TooFewItems {
                    name: name.clone(),
                    min,
                    got: items.len(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in defaults for attributes the user left unset
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    /// Names of force-new attributes whose value differs between two attribute sets
    ///
    /// Attributes absent from `to` are skipped, so unset optional-computed
    /// values never force a replacement.
    pub fn force_new_changes(
        &self,
        from: &HashMap<String, Value>,
        to: &HashMap<String, Value>,
    ) -> Vec<String> {
        let mut changed: Vec<String> = self
            .attributes
            .values()
            .filter(|schema| schema.force_new)
            .filter_map(|schema| {
                let desired = to.get(&schema.name)?;
                (from.get(&schema.name) != Some(desired)).then(|| schema.name.clone())
            })
            .collect();
        changed.sort();
        changed
    }
}

/// Helper functions for common types
pub mod types {
    use std::net::IpAddr;
    use std::sync::OnceLock;

    use regex::Regex;

    use super::*;

    fn dns_name_regex() -> Option<&'static Regex> {
        static RE: OnceLock<Option<Regex>> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"^([A-Za-z0-9_*]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}\.?$").ok()
        })
        .as_ref()
    }

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                _ => Err("Value must be positive".to_string()),
            },
        }
    }

    /// Fully qualified DNS name (trailing dot optional)
    pub fn dns_name() -> AttributeType {
        AttributeType::Custom {
            name: "DnsName".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_dns_name(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// IPv4 or IPv6 address
    pub fn ip_address() -> AttributeType {
        AttributeType::Custom {
            name: "IpAddress".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => s
                    .parse::<IpAddr>()
                    .map(|_| ())
                    .map_err(|_| format!("Invalid IP address '{}'", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Duration string such as "10m" or "1h30m"
    pub fn duration() -> AttributeType {
        AttributeType::Custom {
            name: "Duration".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => crate::timeouts::parse_duration(s)
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Validate a DNS name (e.g., "www.example.com.")
    pub fn validate_dns_name(name: &str) -> Result<(), String> {
        if name.len() > 254 {
            return Err(format!("DNS name '{}' is longer than 254 characters", name));
        }
        match dns_name_regex() {
            Some(re) if re.is_match(name) => Ok(()),
            _ => Err(format!("Invalid DNS name '{}'", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["A".to_string(), "AAAA".to_string()]);
        assert!(t.validate(&Value::String("A".to_string())).is_ok());
        assert!(t.validate(&Value::String("MX".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::String("1".to_string())).is_err());
    }

    #[test]
    fn validate_dns_name_type() {
        let t = types::dns_name();
        assert!(t.validate(&Value::String("www.example.com.".to_string())).is_ok());
        assert!(t.validate(&Value::String("example.com".to_string())).is_ok());
        assert!(t.validate(&Value::String("*.example.com.".to_string())).is_ok());
        assert!(t.validate(&Value::String("-bad.example.com.".to_string())).is_err());
        assert!(t.validate(&Value::String("localhost".to_string())).is_err());
    }

    #[test]
    fn validate_ip_address_type() {
        let t = types::ip_address();
        assert!(t.validate(&Value::String("192.168.0.10".to_string())).is_ok());
        assert!(t.validate(&Value::String("fe80::1".to_string())).is_ok());
        assert!(t.validate(&Value::String("192.168.0.256".to_string())).is_err());
    }

    fn recordset_schema() -> ResourceSchema {
        ResourceSchema::new("dns_recordset")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new(
                    "records",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .required()
                .with_min_items(1),
            )
            .attribute(
                AttributeSchema::new("ttl", types::positive_int()).with_default(Value::Int(300)),
            )
            .attribute(AttributeSchema::new("zone_id", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    }

    #[test]
    fn validate_resource_schema() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("www".to_string()));
        attrs.insert("records".to_string(), Value::string_list(["10.0.0.1"]));

        assert!(recordset_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let result = recordset_schema().validate(&HashMap::new());
        let errors = result.unwrap_err();
        assert!(errors.contains(&TypeError::MissingRequired {
            name: "name".to_string()
        }));
    }

    #[test]
    fn unknown_and_computed_attributes_are_rejected() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("www".to_string()));
        attrs.insert("records".to_string(), Value::string_list(["10.0.0.1"]));
        attrs.insert("colour".to_string(), Value::String("blue".to_string()));
        attrs.insert("status".to_string(), Value::String("ACTIVE".to_string()));

        let errors = recordset_schema().validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&TypeError::UnknownAttribute {
            name: "colour".to_string()
        }));
        assert!(errors.contains(&TypeError::ComputedOnly {
            name: "status".to_string()
        }));
    }

    #[test]
    fn empty_list_below_min_items() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("www".to_string()));
        attrs.insert("records".to_string(), Value::List(vec![]));

        let errors = recordset_schema().validate(&attrs).unwrap_err();
        assert_eq!(
            errors,
            vec![TypeError::TooFewItems {
                name: "records".to_string(),
                min: 1,
                got: 0
            }]
        );
    }

    #[test]
    fn defaults_fill_unset_attributes_only() {
        let mut attrs = HashMap::new();
        recordset_schema().apply_defaults(&mut attrs);
        assert_eq!(attrs.get("ttl"), Some(&Value::Int(300)));

        let mut attrs = HashMap::new();
        attrs.insert("ttl".to_string(), Value::Int(60));
        recordset_schema().apply_defaults(&mut attrs);
        assert_eq!(attrs.get("ttl"), Some(&Value::Int(60)));
    }

    #[test]
    fn force_new_changes_only_report_force_new_attributes() {
        let mut from = HashMap::new();
        from.insert("zone_id".to_string(), Value::String("zone-a".to_string()));
        from.insert("name".to_string(), Value::String("www".to_string()));

        let mut to = from.clone();
        to.insert("name".to_string(), Value::String("api".to_string()));
        assert!(recordset_schema().force_new_changes(&from, &to).is_empty());

        to.insert("zone_id".to_string(), Value::String("zone-b".to_string()));
        assert_eq!(
            recordset_schema().force_new_changes(&from, &to),
            vec!["zone_id".to_string()]
        );
    }
}
