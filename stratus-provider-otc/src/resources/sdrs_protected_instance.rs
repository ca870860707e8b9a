//! sdrs_protected_instance - Server protected by Storage Disaster Recovery
//!
//! Create and delete start an SDRS job and wait for it; the instance id is
//! only known once the create job has succeeded. Only the name can change
//! in place.

use std::collections::HashMap;
use std::sync::Arc;

use stratus_core::lifecycle::{Accepted, JobSnapshot, Request, ResourceKind, WaitTarget};
use stratus_core::provider::{BoxFuture, ProviderError, ProviderResult};
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use stratus_core::timeouts::Verb;
use stratus_core::waiter::Observation;

use crate::api::{
    CloudApi, CreateProtectedInstanceOpts, PROTECTED_INSTANCE_ENTITY, ProtectedInstance,
    ResourceTag,
};
use crate::tags::{expand_tags, flatten_tags, tags_type};
use crate::utils::{get_string, require_string};

pub const TYPE_NAME: &str = "sdrs_protected_instance";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Server protected by a disaster recovery protection group")
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("server_group_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("server_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("description", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("primary_subnet_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("primary_ip_address", types::ip_address()).force_new())
        .attribute(AttributeSchema::new("flavor_ref", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("target_server", AttributeType::String).computed())
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("tags", tags_type()).force_new())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedInstanceSpec {
    pub server_group_id: String,
    pub server_id: String,
    pub name: String,
    pub description: Option<String>,
    pub primary_subnet_id: Option<String>,
    pub primary_ip_address: Option<String>,
    pub flavor_ref: Option<String>,
    pub tags: Vec<ResourceTag>,
}

pub struct SdrsProtectedInstance {
    api: Arc<dyn CloudApi>,
    region: String,
}

impl SdrsProtectedInstance {
    pub fn new(api: Arc<dyn CloudApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }
}

impl ResourceKind for SdrsProtectedInstance {
    type Spec = ProtectedInstanceSpec;
    type Remote = ProtectedInstance;

    fn name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn wait_target(&self, verb: Verb) -> WaitTarget {
        match verb {
            Verb::Create | Verb::Delete => WaitTarget::Job,
            Verb::Update => WaitTarget::None,
        }
    }

    fn marshal(&self, resource: &Resource) -> ProviderResult<ProtectedInstanceSpec> {
        let attrs = &resource.attributes;
        Ok(ProtectedInstanceSpec {
            server_group_id: require_string(attrs, "server_group_id")?,
            server_id: require_string(attrs, "server_id")?,
            name: require_string(attrs, "name")?,
            description: get_string(attrs, "description"),
            primary_subnet_id: get_string(attrs, "primary_subnet_id"),
            primary_ip_address: get_string(attrs, "primary_ip_address"),
            flavor_ref: get_string(attrs, "flavor_ref"),
            tags: expand_tags(attrs.get("tags")),
        })
    }

    fn send<'a>(
        &'a self,
        request: Request<'a, ProtectedInstanceSpec>,
    ) -> BoxFuture<'a, ProviderResult<Accepted>> {
        Box::pin(async move {
            match request {
                Request::Create { spec } => {
                    if spec.primary_ip_address.is_some() && spec.primary_subnet_id.is_none() {
                        return Err(ProviderError::validation(
                            "primary_ip_address requires primary_subnet_id",
                        ));
                    }
                    let opts = CreateProtectedInstanceOpts {
                        server_group_id: spec.server_group_id.clone(),
                        server_id: spec.server_id.clone(),
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        primary_subnet_id: spec.primary_subnet_id.clone(),
                        primary_ip_address: spec.primary_ip_address.clone(),
                        flavor_ref: spec.flavor_ref.clone(),
                        tags: spec.tags.clone(),
                    };
                    let job_id = self.api.create_protected_instance(&self.region, &opts).await?;
                    Ok(Accepted::job(job_id))
                }
                Request::Update {
                    identifier,
                    from,
                    spec,
                } => {
                    if from.get_str("name") != Some(spec.name.as_str()) {
                        self.api
                            .update_protected_instance(&self.region, identifier, &spec.name)
                            .await?;
                    }
                    Ok(Accepted::done())
                }
                Request::Delete { identifier } => {
                    let job_id = self
                        .api
                        .delete_protected_instance(&self.region, identifier, false)
                        .await?;
                    Ok(Accepted::job(job_id))
                }
            }
        })
    }

    fn probe<'a>(
        &'a self,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Observation<ProtectedInstance>>> {
        Box::pin(async move {
            let instance = self
                .api
                .get_protected_instance(&self.region, identifier)
                .await?;
            let status = instance.status.clone();
            Ok(Observation::new(instance, status))
        })
    }

    fn unmarshal(&self, _identifier: &str, remote: &ProtectedInstance) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::String(self.region.clone()));
        attributes.insert(
            "server_group_id".to_string(),
            Value::String(remote.server_group_id.clone()),
        );
        attributes.insert(
            "server_id".to_string(),
            Value::String(remote.source_server.clone()),
        );
        attributes.insert("name".to_string(), Value::String(remote.name.clone()));
        if !remote.description.is_empty() {
            attributes.insert(
                "description".to_string(),
                Value::String(remote.description.clone()),
            );
        }
        attributes.insert(
            "target_server".to_string(),
            Value::String(remote.target_server.clone()),
        );
        attributes.insert("status".to_string(), Value::String(remote.status.clone()));
        if !remote.tags.is_empty() {
            attributes.insert("tags".to_string(), flatten_tags(&remote.tags));
        }
        attributes
    }

    fn probe_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Observation<JobSnapshot>>> {
        Box::pin(async move {
            let job = self.api.get_job(&self.region, job_id).await?;
            let status = job.status.clone();
            Ok(Observation::new(
                JobSnapshot {
                    job_id: job.job_id,
                    status: job.status,
                    entities: job.entities,
                    fail_reason: job.fail_reason,
                },
                status,
            ))
        })
    }

    fn identifier_from_job(&self, job: &JobSnapshot) -> ProviderResult<String> {
        job.entities
            .get(PROTECTED_INSTANCE_ENTITY)
            .cloned()
            .ok_or_else(|| {
                ProviderError::api(format!(
                    "Job {} finished without a {}",
                    job.job_id, PROTECTED_INSTANCE_ENTITY
                ))
            })
    }
}
