//! Cloud API - The calls the provider makes against Open Telekom Cloud
//!
//! `CloudApi` is the seam between resource kinds and the transport. Every
//! call is scoped to a region. A missing object is always reported as
//! `ApiError::NotFound`, which the lifecycle driver relies on.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

/// Error returned by the cloud API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl ApiError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// HTTP status the error corresponds to
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Conflict(_) => 409,
            ApiError::Server { status, .. } => *status,
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let kind = match err {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Api,
        };
        ProviderError::new(err.to_string())
            .with_kind(kind)
            .with_cause(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// DNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    /// "public" or "private"
    pub zone_type: String,
}

impl Zone {
    /// Resource type used by the tag service for record sets in this zone
    pub fn recordset_tag_type(&self) -> &'static str {
        if self.zone_type == "private" {
            "DNS-private_recordset"
        } else {
            "DNS-public_recordset"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub id: String,
    pub zone_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: i64,
    pub records: Vec<String>,
    /// Raw status such as "PENDING_CREATE" or "ACTIVE"
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordSetOpts {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: i64,
    pub records: Vec<String>,
    /// Extra request fields passed through verbatim
    #[serde(flatten)]
    pub value_specs: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecordSetOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    pub records: Vec<String>,
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceTag {
    pub key: String,
    pub value: String,
}

impl ResourceTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Batch action of the compute tag API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    Create,
    Delete,
}

// =============================================================================
// SDRS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedInstance {
    pub id: String,
    pub name: String,
    pub description: String,
    pub server_group_id: String,
    /// Production server the instance protects
    pub source_server: String,
    /// Replica server in the disaster recovery site
    pub target_server: String,
    pub status: String,
    pub tags: Vec<ResourceTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProtectedInstanceOpts {
    pub server_group_id: String,
    pub server_id: String,
    pub name: String,
    pub description: Option<String>,
    pub primary_subnet_id: Option<String>,
    pub primary_ip_address: Option<String>,
    pub flavor_ref: Option<String>,
    pub tags: Vec<ResourceTag>,
}

/// Job entity carrying the id of a created protected instance
pub const PROTECTED_INSTANCE_ENTITY: &str = "protected_instance_id";

/// Asynchronous job started by an SDRS request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_type: String,
    /// "INIT", "RUNNING", "SUCCESS" or "FAIL"
    pub status: String,
    pub entities: HashMap<String, String>,
    pub fail_reason: Option<String>,
    pub begin_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

// =============================================================================
// API trait
// =============================================================================

/// Calls the provider issues against the cloud
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_zone(&self, region: &str, zone_id: &str) -> ApiResult<Zone>;

    async fn create_recordset(
        &self,
        region: &str,
        zone_id: &str,
        opts: &CreateRecordSetOpts,
    ) -> ApiResult<RecordSet>;

    async fn get_recordset(&self, region: &str, zone_id: &str, id: &str) -> ApiResult<RecordSet>;

    async fn update_recordset(
        &self,
        region: &str,
        zone_id: &str,
        id: &str,
        opts: &UpdateRecordSetOpts,
    ) -> ApiResult<RecordSet>;

    async fn delete_recordset(&self, region: &str, zone_id: &str, id: &str) -> ApiResult<()>;

    async fn get_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> ApiResult<Vec<ResourceTag>>;

    /// Create or overwrite tags
    async fn create_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
        tags: &[ResourceTag],
    ) -> ApiResult<()>;

    async fn delete_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> ApiResult<()>;

    /// Returns the id of the job creating the instance
    async fn create_protected_instance(
        &self,
        region: &str,
        opts: &CreateProtectedInstanceOpts,
    ) -> ApiResult<String>;

    async fn get_protected_instance(&self, region: &str, id: &str) -> ApiResult<ProtectedInstance>;

    async fn update_protected_instance(
        &self,
        region: &str,
        id: &str,
        name: &str,
    ) -> ApiResult<ProtectedInstance>;

    /// Returns the id of the job deleting the instance
    async fn delete_protected_instance(
        &self,
        region: &str,
        id: &str,
        delete_target_server: bool,
    ) -> ApiResult<String>;

    async fn get_job(&self, region: &str, job_id: &str) -> ApiResult<Job>;

    async fn get_server_tags(&self, region: &str, server_id: &str) -> ApiResult<Vec<ResourceTag>>;

    async fn batch_server_tags(
        &self,
        region: &str,
        server_id: &str,
        action: TagAction,
        tags: &[ResourceTag],
    ) -> ApiResult<()>;
}
