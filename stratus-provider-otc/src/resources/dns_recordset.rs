//! dns_recordset - A record set inside a DNS zone
//!
//! Identifier: "<zone_id>/<recordset_id>". Create and update wait for the
//! record set to leave PENDING and become ACTIVE; delete waits until the
//! record set is gone.

use std::collections::HashMap;
use std::sync::Arc;

use stratus_core::lifecycle::{Accepted, Request, ResourceKind, StatusSets, WaitTarget};
use stratus_core::provider::{BoxFuture, ProviderResult};
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use stratus_core::timeouts::Verb;
use stratus_core::waiter::Observation;

use crate::api::{CloudApi, CreateRecordSetOpts, RecordSet, ResourceTag, UpdateRecordSetOpts};
use crate::tags::{diff_tags, expand_tags, flatten_tags, tags_type};
use crate::utils::{
    get_string, get_string_list, get_string_map, normalize_status, require_string,
    split_identifier,
};

pub const TYPE_NAME: &str = "dns_recordset";

pub const DEFAULT_TTL: i64 = 300;

pub const RECORD_TYPES: &[&str] = &["A", "AAAA", "MX", "CNAME", "TXT", "NS", "SRV", "CAA", "PTR"];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Record set in a DNS zone")
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("zone_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("name", types::dns_name())
                .required()
                .force_new()
                .with_description("Fully qualified name, e.g. \"www.example.com.\""),
        )
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::Enum(RECORD_TYPES.iter().map(|t| t.to_string()).collect()),
            )
            .required()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("records", AttributeType::List(Box::new(AttributeType::String)))
                .required()
                .with_min_items(1),
        )
        .attribute(
            AttributeSchema::new("ttl", types::positive_int())
                .with_default(Value::Int(DEFAULT_TTL)),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("value_specs", AttributeType::Map(Box::new(AttributeType::String)))
                .force_new()
                .with_description("Extra request fields passed to the API as-is"),
        )
        .attribute(AttributeSchema::new("tags", tags_type()))
}

/// Desired record set
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSetSpec {
    pub zone_id: String,
    pub name: String,
    pub record_type: String,
    pub description: Option<String>,
    pub ttl: i64,
    pub records: Vec<String>,
    pub value_specs: HashMap<String, String>,
    pub tags: Vec<ResourceTag>,
}

/// Record set as read from the API, with its tags
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecordSet {
    pub record_set: RecordSet,
    pub tags: Vec<ResourceTag>,
}

pub struct DnsRecordSet {
    api: Arc<dyn CloudApi>,
    region: String,
}

impl DnsRecordSet {
    pub fn new(api: Arc<dyn CloudApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }

    /// Bring the record set's tags in line with the desired ones
    async fn reconcile_tags(
        &self,
        zone_id: &str,
        recordset_id: &str,
        desired: &[ResourceTag],
    ) -> ProviderResult<()> {
        let zone = self.api.get_zone(&self.region, zone_id).await?;
        let tag_type = zone.recordset_tag_type();
        let current = self.api.get_tags(&self.region, tag_type, recordset_id).await?;

        let changes = diff_tags(&current, desired);
        if !changes.remove.is_empty() {
            let keys: Vec<String> = changes.remove.into_iter().map(|t| t.key).collect();
            self.api
                .delete_tags(&self.region, tag_type, recordset_id, &keys)
                .await?;
        }
        if !changes.set.is_empty() {
            self.api
                .create_tags(&self.region, tag_type, recordset_id, &changes.set)
                .await?;
        }
        Ok(())
    }
}

impl ResourceKind for DnsRecordSet {
    type Spec = RecordSetSpec;
    type Remote = RemoteRecordSet;

    fn name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn wait_target(&self, verb: Verb) -> WaitTarget {
        match verb {
            Verb::Create | Verb::Update => {
                WaitTarget::Status(StatusSets::new(["PENDING"], ["ACTIVE"]))
            }
            Verb::Delete => {
                WaitTarget::Status(StatusSets::deletion(["ACTIVE", "PENDING", "ERROR"]))
            }
        }
    }

    fn marshal(&self, resource: &Resource) -> ProviderResult<RecordSetSpec> {
        let attrs = &resource.attributes;
        Ok(RecordSetSpec {
            zone_id: require_string(attrs, "zone_id")?,
            name: require_string(attrs, "name")?,
            record_type: require_string(attrs, "type")?,
            description: get_string(attrs, "description"),
            ttl: attrs.get("ttl").and_then(Value::as_int).unwrap_or(DEFAULT_TTL),
            records: get_string_list(attrs, "records"),
            value_specs: get_string_map(attrs, "value_specs"),
            tags: expand_tags(attrs.get("tags")),
        })
    }

    fn send<'a>(
        &'a self,
        request: Request<'a, RecordSetSpec>,
    ) -> BoxFuture<'a, ProviderResult<Accepted>> {
        Box::pin(async move {
            match request {
                Request::Create { spec } => {
                    let opts = CreateRecordSetOpts {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        record_type: spec.record_type.clone(),
                        ttl: spec.ttl,
                        records: spec.records.clone(),
                        value_specs: spec.value_specs.clone(),
                    };
                    let created = self
                        .api
                        .create_recordset(&self.region, &spec.zone_id, &opts)
                        .await?;
                    Ok(Accepted::resource(format!("{}/{}", spec.zone_id, created.id)))
                }
                Request::Update {
                    identifier,
                    from,
                    spec,
                } => {
                    let (zone_id, id) = split_identifier(identifier, TYPE_NAME)?;
                    let old_ttl = from.attributes.get("ttl").and_then(Value::as_int);
                    let old_description = from.get_str("description");
                    let opts = UpdateRecordSetOpts {
                        description: (spec.description.as_deref() != old_description)
                            .then(|| spec.description.clone().unwrap_or_default()),
                        ttl: (old_ttl != Some(spec.ttl)).then_some(spec.ttl),
                        records: spec.records.clone(),
                    };
                    self.api
                        .update_recordset(&self.region, zone_id, id, &opts)
                        .await?;
                    Ok(Accepted::done())
                }
                Request::Delete { identifier } => {
                    let (zone_id, id) = split_identifier(identifier, TYPE_NAME)?;
                    self.api.delete_recordset(&self.region, zone_id, id).await?;
                    Ok(Accepted::done())
                }
            }
        })
    }

    fn probe<'a>(
        &'a self,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Observation<RemoteRecordSet>>> {
        Box::pin(async move {
            let (zone_id, id) = split_identifier(identifier, TYPE_NAME)?;
            let record_set = self.api.get_recordset(&self.region, zone_id, id).await?;
            let status = normalize_status(&record_set.status);
            Ok(Observation::new(
                RemoteRecordSet {
                    record_set,
                    tags: Vec::new(),
                },
                status,
            ))
        })
    }

    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<RemoteRecordSet>> {
        Box::pin(async move {
            let (zone_id, id) = split_identifier(identifier, TYPE_NAME)?;
            let record_set = self.api.get_recordset(&self.region, zone_id, id).await?;
            let zone = self.api.get_zone(&self.region, zone_id).await?;
            let mut tags = self
                .api
                .get_tags(&self.region, zone.recordset_tag_type(), id)
                .await?;
            tags.sort();
            Ok(RemoteRecordSet { record_set, tags })
        })
    }

    fn unmarshal(&self, _identifier: &str, remote: &RemoteRecordSet) -> HashMap<String, Value> {
        let rs = &remote.record_set;
        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::String(self.region.clone()));
        attributes.insert("zone_id".to_string(), Value::String(rs.zone_id.clone()));
        attributes.insert("name".to_string(), Value::String(rs.name.clone()));
        attributes.insert("type".to_string(), Value::String(rs.record_type.clone()));
        attributes.insert("ttl".to_string(), Value::Int(rs.ttl));
        attributes.insert("records".to_string(), Value::string_list(rs.records.iter().cloned()));
        if !rs.description.is_empty() {
            attributes.insert("description".to_string(), Value::String(rs.description.clone()));
        }
        if !remote.tags.is_empty() {
            attributes.insert("tags".to_string(), flatten_tags(&remote.tags));
        }
        attributes
    }

    fn finish<'a>(
        &'a self,
        verb: Verb,
        identifier: &'a str,
        spec: Option<&'a RecordSetSpec>,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let Some(spec) = spec else {
                return Ok(());
            };
            if verb == Verb::Create && spec.tags.is_empty() {
                return Ok(());
            }
            let (zone_id, id) = split_identifier(identifier, TYPE_NAME)?;
            self.reconcile_tags(zone_id, id, &spec.tags).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCloud;
    use stratus_core::lifecycle::{Lifecycle, TIMEOUTS_ATTRIBUTE, is_wait_timeout};
    use stratus_core::provider::ErrorKind;
    use stratus_core::resource::ResourceId;
    use stratus_core::waiter::WaitError;

    const REGION: &str = "eu-de";

    fn setup() -> (Arc<InMemoryCloud>, Lifecycle<DnsRecordSet>, String) {
        let cloud = Arc::new(InMemoryCloud::new());
        let zone_id = cloud.add_zone(REGION, "example.com.", "public");
        let driver = Lifecycle::new(DnsRecordSet::new(cloud.clone(), REGION));
        (cloud, driver, zone_id)
    }

    fn www(zone_id: &str) -> Resource {
        Resource::new(TYPE_NAME, "www")
            .with_attribute("zone_id", Value::String(zone_id.to_string()))
            .with_attribute("name", Value::String("www.example.com.".to_string()))
            .with_attribute("type", Value::String("A".to_string()))
            .with_attribute("records", Value::string_list(["10.0.0.1", "10.0.0.2"]))
    }

    fn recordset_id(identifier: &str) -> &str {
        split_identifier(identifier, TYPE_NAME).unwrap().1
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_active_and_reads_back() {
        let (cloud, driver, zone_id) = setup();
        let resource = www(&zone_id).with_attribute("tags", Value::string_map([("env", "prod")]));

        let state = driver.create_resource(&resource).await.unwrap();

        let identifier = state.identifier.clone().unwrap();
        assert!(identifier.starts_with(&format!("{}/", zone_id)));
        assert_eq!(state.attributes.get("ttl"), Some(&Value::Int(DEFAULT_TTL)));
        assert_eq!(state.get_str("region"), Some(REGION));
        assert_eq!(
            state.attributes.get("tags"),
            Some(&Value::string_map([("env", "prod")]))
        );
        assert_eq!(cloud.call_count("create_tags"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_without_tags_skips_tagging() {
        let (cloud, driver, zone_id) = setup();

        let state = driver.create_resource(&www(&zone_id)).await.unwrap();

        assert!(!state.attributes.contains_key("tags"));
        assert_eq!(cloud.call_count("create_tags"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_record_type_is_rejected_before_any_call() {
        let (cloud, driver, zone_id) = setup();
        let resource = www(&zone_id).with_attribute("type", Value::String("ALIAS".to_string()));

        let err = driver.create_resource(&resource).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("type"));
        assert_eq!(cloud.call_count("create_recordset"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_records_are_rejected() {
        let (_cloud, driver, zone_id) = setup();
        let resource = www(&zone_id).with_attribute("records", Value::List(vec![]));

        let err = driver.create_resource(&resource).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_on_error_status() {
        let (cloud, driver, zone_id) = setup();
        cloud.fail_next_recordset();

        let err = driver.create_resource(&www(&zone_id)).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Wait);
        assert!(matches!(
            err.wait_error(),
            Some(WaitError::UnexpectedStatus { status, .. }) if status == "ERROR"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn create_honours_timeouts_attribute() {
        let cloud = Arc::new(InMemoryCloud::new().with_settle_after(1000));
        let zone_id = cloud.add_zone(REGION, "example.com.", "public");
        let driver = Lifecycle::new(DnsRecordSet::new(cloud.clone(), REGION));
        let resource = www(&zone_id).with_attribute(
            TIMEOUTS_ATTRIBUTE,
            Value::string_map([("create", "1m")]),
        );

        let err = driver.create_resource(&resource).await.unwrap_err();

        assert!(is_wait_timeout(&err));
        assert!(err.to_string().contains("timeout after 1m"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_changes_ttl_and_reconciles_tags() {
        let (cloud, driver, zone_id) = setup();
        let created = driver
            .create_resource(
                &www(&zone_id)
                    .with_attribute("tags", Value::string_map([("env", "dev"), ("owner", "ops")])),
            )
            .await
            .unwrap();
        let identifier = created.identifier.clone().unwrap();

        let to = www(&zone_id)
            .with_attribute("ttl", Value::Int(60))
            .with_attribute("tags", Value::string_map([("env", "prod")]));
        let state = driver
            .update_resource(&created.id, &identifier, &created, &to)
            .await
            .unwrap();

        assert_eq!(state.attributes.get("ttl"), Some(&Value::Int(60)));
        assert_eq!(
            state.attributes.get("tags"),
            Some(&Value::string_map([("env", "prod")]))
        );
        assert_eq!(cloud.call_count("delete_tags"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn renaming_requires_replacement() {
        let (cloud, driver, zone_id) = setup();
        let created = driver.create_resource(&www(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let to =
            www(&zone_id).with_attribute("name", Value::String("api.example.com.".to_string()));
        let err = driver
            .update_resource(&created.id, &identifier, &created, &to)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("name"));
        assert_eq!(cloud.call_count("update_recordset"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_gone() {
        let (cloud, driver, zone_id) = setup();
        let created = driver.create_resource(&www(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        driver.delete_resource(&created).await.unwrap();

        let err = cloud
            .get_recordset(REGION, &zone_id, recordset_id(&identifier))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_vanished_record_set_succeeds() {
        let (cloud, driver, zone_id) = setup();
        let created = driver.create_resource(&www(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();
        cloud.remove_recordset(REGION, recordset_id(&identifier));

        driver.delete_resource(&created).await.unwrap();

        assert_eq!(cloud.call_count("delete_recordset"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_reports_out_of_band_deletion() {
        let (cloud, driver, zone_id) = setup();
        let created = driver.create_resource(&www(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();
        cloud.remove_recordset(REGION, recordset_id(&identifier));

        let state = driver.read_resource(&created.id, &identifier).await.unwrap();

        assert!(!state.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn import_rejects_malformed_identifier() {
        let (_cloud, driver, _zone_id) = setup();
        let id = ResourceId::new(TYPE_NAME, "www");

        let err = driver.import_resource(&id, "no-slash").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn import_reads_existing_record_set() {
        let (_cloud, driver, zone_id) = setup();
        let created = driver.create_resource(&www(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let imported = driver
            .import_resource(&ResourceId::new(TYPE_NAME, "imported"), &identifier)
            .await
            .unwrap();

        assert_eq!(imported.get_str("name"), Some("www.example.com."));
        assert_eq!(imported.attributes.get("records"), created.attributes.get("records"));
    }
}
