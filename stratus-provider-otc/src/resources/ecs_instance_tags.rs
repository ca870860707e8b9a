//! ecs_instance_tags - The tag set of an existing compute instance
//!
//! Identifier: the server id. Tag calls are synchronous, so no verb waits.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use stratus_core::lifecycle::{Accepted, Request, ResourceKind, WaitTarget};
use stratus_core::provider::{BoxFuture, ProviderResult};
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use stratus_core::timeouts::Verb;
use stratus_core::waiter::Observation;

use crate::api::{CloudApi, ResourceTag, TagAction};
use crate::tags::{diff_tags, expand_tags, flatten_tags, tags_type};
use crate::utils::require_string;

pub const TYPE_NAME: &str = "ecs_instance_tags";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Tags of a compute instance")
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("server_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("tags", tags_type()).required())
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTagsSpec {
    pub server_id: String,
    pub tags: Vec<ResourceTag>,
}

pub struct EcsInstanceTags {
    api: Arc<dyn CloudApi>,
    region: String,
}

impl EcsInstanceTags {
    pub fn new(api: Arc<dyn CloudApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }

    async fn batch(
        &self,
        server_id: &str,
        action: TagAction,
        tags: &[ResourceTag],
    ) -> ProviderResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        debug!("{:?} {} tag(s) on server {}", action, tags.len(), server_id);
        self.api
            .batch_server_tags(&self.region, server_id, action, tags)
            .await?;
        Ok(())
    }
}

impl ResourceKind for EcsInstanceTags {
    type Spec = InstanceTagsSpec;
    type Remote = Vec<ResourceTag>;

    fn name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn wait_target(&self, _verb: Verb) -> WaitTarget {
        WaitTarget::None
    }

    fn marshal(&self, resource: &Resource) -> ProviderResult<InstanceTagsSpec> {
        Ok(InstanceTagsSpec {
            server_id: require_string(&resource.attributes, "server_id")?,
            tags: expand_tags(resource.attributes.get("tags")),
        })
    }

    fn send<'a>(
        &'a self,
        request: Request<'a, InstanceTagsSpec>,
    ) -> BoxFuture<'a, ProviderResult<Accepted>> {
        Box::pin(async move {
            match request {
                Request::Create { spec } => {
                    self.batch(&spec.server_id, TagAction::Create, &spec.tags)
                        .await?;
                    Ok(Accepted::resource(spec.server_id.clone()))
                }
                Request::Update {
                    identifier, spec, ..
                } => {
                    let current = self.api.get_server_tags(&self.region, identifier).await?;
                    let changes = diff_tags(&current, &spec.tags);
                    self.batch(identifier, TagAction::Delete, &changes.remove)
                        .await?;
                    self.batch(identifier, TagAction::Create, &changes.set)
                        .await?;
                    Ok(Accepted::done())
                }
                Request::Delete { identifier } => {
                    let current = self.api.get_server_tags(&self.region, identifier).await?;
                    self.batch(identifier, TagAction::Delete, &current).await?;
                    Ok(Accepted::done())
                }
            }
        })
    }

    fn probe<'a>(
        &'a self,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Observation<Vec<ResourceTag>>>> {
        Box::pin(async move {
            let mut tags = self.api.get_server_tags(&self.region, identifier).await?;
            tags.sort();
            Ok(Observation::new(tags, "ACTIVE"))
        })
    }

    fn unmarshal(&self, identifier: &str, remote: &Vec<ResourceTag>) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::String(self.region.clone()));
        attributes.insert("server_id".to_string(), Value::String(identifier.to_string()));
        attributes.insert("tags".to_string(), flatten_tags(remote));
        attributes
    }
}
