//! In-memory cloud
//!
//! A `CloudApi` that keeps every object in process memory and moves
//! asynchronous operations forward one step per status read, so callers see
//! the same PENDING -> ACTIVE and INIT -> RUNNING -> SUCCESS progressions
//! as against the real service.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use uuid::Uuid;

use stratus_core::lifecycle::job_status;

use crate::api::{
    ApiError, ApiResult, CloudApi, CreateProtectedInstanceOpts, CreateRecordSetOpts, Job,
    PROTECTED_INSTANCE_ENTITY, ProtectedInstance, RecordSet, ResourceTag, TagAction,
    UpdateRecordSetOpts, Zone,
};

type Key = (String, String);

fn key(region: &str, id: &str) -> Key {
    (region.to_string(), id.to_string())
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

struct TrackedRecordSet {
    record: RecordSet,
    remaining: u32,
    deleting: bool,
    /// Status reached once the pending reads are used up
    settles_to: &'static str,
}

enum JobEffect {
    CreateInstance(ProtectedInstance),
    DeleteInstance(String),
}

struct TrackedJob {
    job: Job,
    remaining: u32,
    effect: JobEffect,
    failure: Option<String>,
}

#[derive(Default)]
struct Tables {
    zones: HashMap<Key, Zone>,
    recordsets: HashMap<Key, TrackedRecordSet>,
    /// (region, resource type, resource id) -> tags
    tags: HashMap<(String, String, String), BTreeMap<String, String>>,
    servers: HashMap<Key, BTreeMap<String, String>>,
    server_groups: HashSet<Key>,
    instances: HashMap<Key, ProtectedInstance>,
    jobs: HashMap<Key, TrackedJob>,
    next_job_failure: Option<String>,
    next_recordset_error: bool,
    calls: Vec<&'static str>,
}

/// Cloud backed by in-process tables
pub struct InMemoryCloud {
    tables: Mutex<Tables>,
    settle_after: u32,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            settle_after: 1,
        }
    }

    /// Number of status reads an operation stays pending for
    pub fn with_settle_after(mut self, reads: u32) -> Self {
        self.settle_after = reads;
        self
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a DNS zone, returning its id
    pub fn add_zone(&self, region: &str, name: &str, zone_type: &str) -> String {
        let id = new_id();
        self.tables().zones.insert(
            key(region, &id),
            Zone {
                id: id.clone(),
                name: name.to_string(),
                zone_type: zone_type.to_string(),
            },
        );
        id
    }

    pub fn add_server(&self, region: &str, server_id: &str) {
        self.tables()
            .servers
            .insert(key(region, server_id), BTreeMap::new());
    }

    /// Add an SDRS protection group, returning its id
    pub fn add_server_group(&self, region: &str) -> String {
        let id = new_id();
        self.tables().server_groups.insert(key(region, &id));
        id
    }

    /// Make the next job started fail with the given reason
    pub fn fail_next_job(&self, reason: &str) {
        self.tables().next_job_failure = Some(reason.to_string());
    }

    /// Make the next record set created end up in ERROR instead of ACTIVE
    pub fn fail_next_recordset(&self) {
        self.tables().next_recordset_error = true;
    }

    /// Remove a record set behind the provider's back
    pub fn remove_recordset(&self, region: &str, id: &str) {
        self.tables().recordsets.remove(&key(region, id));
    }

    /// Remove a protected instance behind the provider's back
    pub fn remove_protected_instance(&self, region: &str, id: &str) {
        self.tables().instances.remove(&key(region, id));
    }

    /// How many times an API call was made
    pub fn call_count(&self, call: &str) -> usize {
        self.tables().calls.iter().filter(|c| **c == call).count()
    }

    fn start_job(
        &self,
        tables: &mut Tables,
        region: &str,
        job_type: &str,
        effect: JobEffect,
    ) -> String {
        let job_id = new_id();
        let failure = tables.next_job_failure.take();
        tables.jobs.insert(
            key(region, &job_id),
            TrackedJob {
                job: Job {
                    job_id: job_id.clone(),
                    job_type: job_type.to_string(),
                    status: job_status::INIT.to_string(),
                    entities: HashMap::new(),
                    fail_reason: None,
                    begin_time: Utc::now(),
                    end_time: None,
                },
                remaining: self.settle_after,
                effect,
                failure,
            },
        );
        debug!("Started job {} ({})", job_id, job_type);
        job_id
    }
}

/// Advance a job by one read, applying its effect when it completes
fn advance_job(tables: &mut Tables, region: &str, job_id: &str) -> ApiResult<Job> {
    let tracked = tables
        .jobs
        .get_mut(&key(region, job_id))
        .ok_or_else(|| ApiError::not_found("job", job_id))?;

    let status = tracked.job.status.as_str();
    if status != job_status::INIT && status != job_status::RUNNING {
        return Ok(tracked.job.clone());
    }
    if tracked.remaining > 0 {
        tracked.remaining -= 1;
        let job = tracked.job.clone();
        tracked.job.status = job_status::RUNNING.to_string();
        return Ok(job);
    }

    tracked.job.end_time = Some(Utc::now());
    if let Some(reason) = tracked.failure.take() {
        tracked.job.status = job_status::FAIL.to_string();
        tracked.job.fail_reason = Some(reason);
        return Ok(tracked.job.clone());
    }

    tracked.job.status = job_status::SUCCESS.to_string();
    match &tracked.effect {
        JobEffect::CreateInstance(instance) => {
            let mut instance = instance.clone();
            instance.status = "protected".to_string();
            tracked
                .job
                .entities
                .insert(PROTECTED_INSTANCE_ENTITY.to_string(), instance.id.clone());
            let job = tracked.job.clone();
            tables.instances.insert(key(region, &instance.id), instance);
            Ok(job)
        }
        JobEffect::DeleteInstance(id) => {
            let id = id.clone();
            let job = tracked.job.clone();
            tables.instances.remove(&key(region, &id));
            Ok(job)
        }
    }
}

#[async_trait]
impl CloudApi for InMemoryCloud {
    async fn get_zone(&self, region: &str, zone_id: &str) -> ApiResult<Zone> {
        let mut tables = self.tables();
        tables.calls.push("get_zone");
        tables
            .zones
            .get(&key(region, zone_id))
            .cloned()
            .ok_or_else(|| ApiError::not_found("zone", zone_id))
    }

    async fn create_recordset(
        &self,
        region: &str,
        zone_id: &str,
        opts: &CreateRecordSetOpts,
    ) -> ApiResult<RecordSet> {
        let mut tables = self.tables();
        tables.calls.push("create_recordset");
        if !tables.zones.contains_key(&key(region, zone_id)) {
            return Err(ApiError::not_found("zone", zone_id));
        }
        let duplicate = tables.recordsets.iter().any(|((r, _), t)| {
            r == region
                && t.record.zone_id == zone_id
                && t.record.name == opts.name
                && t.record.record_type == opts.record_type
        });
        if duplicate {
            return Err(ApiError::Conflict(format!(
                "record set {} {} already exists",
                opts.name, opts.record_type
            )));
        }

        let settles_to = if std::mem::take(&mut tables.next_recordset_error) {
            "ERROR"
        } else {
            "ACTIVE"
        };
        let record = RecordSet {
            id: new_id(),
            zone_id: zone_id.to_string(),
            name: opts.name.clone(),
            description: opts.description.clone().unwrap_or_default(),
            record_type: opts.record_type.clone(),
            ttl: opts.ttl,
            records: opts.records.clone(),
            status: "PENDING_CREATE".to_string(),
        };
        tables.recordsets.insert(
            key(region, &record.id),
            TrackedRecordSet {
                record: record.clone(),
                remaining: self.settle_after,
                deleting: false,
                settles_to,
            },
        );
        Ok(record)
    }

    async fn get_recordset(&self, region: &str, zone_id: &str, id: &str) -> ApiResult<RecordSet> {
        let mut tables = self.tables();
        tables.calls.push("get_recordset");
        let k = key(region, id);
        let tracked = tables
            .recordsets
            .get_mut(&k)
            .filter(|t| t.record.zone_id == zone_id)
            .ok_or_else(|| ApiError::not_found("recordset", id))?;

        if tracked.record.status.starts_with("PENDING") {
            if tracked.remaining > 0 {
                tracked.remaining -= 1;
            } else if tracked.deleting {
                tables.recordsets.remove(&k);
                return Err(ApiError::not_found("recordset", id));
            } else {
                tracked.record.status = tracked.settles_to.to_string();
            }
        }
        Ok(tracked.record.clone())
    }

    async fn update_recordset(
        &self,
        region: &str,
        zone_id: &str,
        id: &str,
        opts: &UpdateRecordSetOpts,
    ) -> ApiResult<RecordSet> {
        let mut tables = self.tables();
        tables.calls.push("update_recordset");
        let tracked = tables
            .recordsets
            .get_mut(&key(region, id))
            .filter(|t| t.record.zone_id == zone_id)
            .ok_or_else(|| ApiError::not_found("recordset", id))?;

        if let Some(description) = &opts.description {
            tracked.record.description = description.clone();
        }
        if let Some(ttl) = opts.ttl {
            tracked.record.ttl = ttl;
        }
        tracked.record.records = opts.records.clone();
        tracked.record.status = "PENDING_UPDATE".to_string();
        tracked.remaining = self.settle_after;
        tracked.settles_to = "ACTIVE";
        Ok(tracked.record.clone())
    }

    async fn delete_recordset(&self, region: &str, zone_id: &str, id: &str) -> ApiResult<()> {
        let mut tables = self.tables();
        tables.calls.push("delete_recordset");
        let tracked = tables
            .recordsets
            .get_mut(&key(region, id))
            .filter(|t| t.record.zone_id == zone_id)
            .ok_or_else(|| ApiError::not_found("recordset", id))?;

        tracked.record.status = "PENDING_DELETE".to_string();
        tracked.remaining = self.settle_after;
        tracked.deleting = true;
        Ok(())
    }

    async fn get_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> ApiResult<Vec<ResourceTag>> {
        let mut tables = self.tables();
        tables.calls.push("get_tags");
        Ok(tables
            .tags
            .get(&(region.to_string(), resource_type.to_string(), resource_id.to_string()))
            .map(|tags| {
                tags.iter()
                    .map(|(k, v)| ResourceTag::new(k.as_str(), v.as_str()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
        tags: &[ResourceTag],
    ) -> ApiResult<()> {
        let mut tables = self.tables();
        tables.calls.push("create_tags");
        let entry = tables
            .tags
            .entry((region.to_string(), resource_type.to_string(), resource_id.to_string()))
            .or_default();
        for tag in tags {
            entry.insert(tag.key.clone(), tag.value.clone());
        }
        Ok(())
    }

    async fn delete_tags(
        &self,
        region: &str,
        resource_type: &str,
        resource_id: &str,
        keys: &[String],
    ) -> ApiResult<()> {
        let mut tables = self.tables();
        tables.calls.push("delete_tags");
        if let Some(entry) = tables.tags.get_mut(&(
            region.to_string(),
            resource_type.to_string(),
            resource_id.to_string(),
        )) {
            for k in keys {
                entry.remove(k);
            }
        }
        Ok(())
    }

    async fn create_protected_instance(
        &self,
        region: &str,
        opts: &CreateProtectedInstanceOpts,
    ) -> ApiResult<String> {
        let mut tables = self.tables();
        tables.calls.push("create_protected_instance");
        if !tables
            .server_groups
            .contains(&key(region, &opts.server_group_id))
        {
            return Err(ApiError::not_found("server group", &opts.server_group_id));
        }
        if !tables.servers.contains_key(&key(region, &opts.server_id)) {
            return Err(ApiError::not_found("server", &opts.server_id));
        }

        let instance = ProtectedInstance {
            id: new_id(),
            name: opts.name.clone(),
            description: opts.description.clone().unwrap_or_default(),
            server_group_id: opts.server_group_id.clone(),
            source_server: opts.server_id.clone(),
            target_server: new_id(),
            status: "creating".to_string(),
            tags: opts.tags.clone(),
        };
        Ok(self.start_job(
            &mut tables,
            region,
            "createProtectedInstance",
            JobEffect::CreateInstance(instance),
        ))
    }

    async fn get_protected_instance(&self, region: &str, id: &str) -> ApiResult<ProtectedInstance> {
        let mut tables = self.tables();
        tables.calls.push("get_protected_instance");
        tables
            .instances
            .get(&key(region, id))
            .cloned()
            .ok_or_else(|| ApiError::not_found("protected instance", id))
    }

    async fn update_protected_instance(
        &self,
        region: &str,
        id: &str,
        name: &str,
    ) -> ApiResult<ProtectedInstance> {
        let mut tables = self.tables();
        tables.calls.push("update_protected_instance");
        let instance = tables
            .instances
            .get_mut(&key(region, id))
            .ok_or_else(|| ApiError::not_found("protected instance", id))?;
        instance.name = name.to_string();
        Ok(instance.clone())
    }

    async fn delete_protected_instance(
        &self,
        region: &str,
        id: &str,
        _delete_target_server: bool,
    ) -> ApiResult<String> {
        let mut tables = self.tables();
        tables.calls.push("delete_protected_instance");
        let instance = tables
            .instances
            .get_mut(&key(region, id))
            .ok_or_else(|| ApiError::not_found("protected instance", id))?;
        instance.status = "deleting".to_string();
        Ok(self.start_job(
            &mut tables,
            region,
            "deleteProtectedInstance",
            JobEffect::DeleteInstance(id.to_string()),
        ))
    }

    async fn get_job(&self, region: &str, job_id: &str) -> ApiResult<Job> {
        let mut tables = self.tables();
        tables.calls.push("get_job");
        advance_job(&mut tables, region, job_id)
    }

    async fn get_server_tags(&self, region: &str, server_id: &str) -> ApiResult<Vec<ResourceTag>> {
        let mut tables = self.tables();
        tables.calls.push("get_server_tags");
        tables
            .servers
            .get(&key(region, server_id))
            .map(|tags| {
                tags.iter()
                    .map(|(k, v)| ResourceTag::new(k.as_str(), v.as_str()))
                    .collect()
            })
            .ok_or_else(|| ApiError::not_found("server", server_id))
    }

    async fn batch_server_tags(
        &self,
        region: &str,
        server_id: &str,
        action: TagAction,
        tags: &[ResourceTag],
    ) -> ApiResult<()> {
        let mut tables = self.tables();
        tables.calls.push("batch_server_tags");
        let existing = tables
            .servers
            .get_mut(&key(region, server_id))
            .ok_or_else(|| ApiError::not_found("server", server_id))?;
        for tag in tags {
            match action {
                TagAction::Create => {
                    existing.insert(tag.key.clone(), tag.value.clone());
                }
                TagAction::Delete => {
                    existing.remove(&tag.key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: &str = "eu-de";

    fn a_record(name: &str) -> CreateRecordSetOpts {
        CreateRecordSetOpts {
            name: name.to_string(),
            record_type: "A".to_string(),
            ttl: 300,
            records: vec!["10.0.0.1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn recordset_settles_after_configured_reads() {
        let cloud = InMemoryCloud::new().with_settle_after(2);
        let zone = cloud.add_zone(REGION, "example.com.", "public");
        let rs = cloud
            .create_recordset(REGION, &zone, &a_record("www.example.com."))
            .await
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(cloud.get_recordset(REGION, &zone, &rs.id).await.unwrap().status);
        }
        assert_eq!(statuses, vec!["PENDING_CREATE", "PENDING_CREATE", "ACTIVE"]);
    }

    #[tokio::test]
    async fn deleted_recordset_disappears() {
        let cloud = InMemoryCloud::new();
        let zone = cloud.add_zone(REGION, "example.com.", "public");
        let rs = cloud
            .create_recordset(REGION, &zone, &a_record("www.example.com."))
            .await
            .unwrap();
        cloud.delete_recordset(REGION, &zone, &rs.id).await.unwrap();

        let first = cloud.get_recordset(REGION, &zone, &rs.id).await.unwrap();
        assert_eq!(first.status, "PENDING_DELETE");
        let err = cloud.get_recordset(REGION, &zone, &rs.id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn recordsets_are_scoped_to_region() {
        let cloud = InMemoryCloud::new();
        let zone = cloud.add_zone(REGION, "example.com.", "public");
        let rs = cloud
            .create_recordset(REGION, &zone, &a_record("www.example.com."))
            .await
            .unwrap();

        let err = cloud.get_recordset("eu-nl", &zone, &rs.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_recordset_conflicts() {
        let cloud = InMemoryCloud::new();
        let zone = cloud.add_zone(REGION, "example.com.", "public");
        cloud
            .create_recordset(REGION, &zone, &a_record("www.example.com."))
            .await
            .unwrap();

        let err = cloud
            .create_recordset(REGION, &zone, &a_record("www.example.com."))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn job_runs_to_success_and_creates_instance() {
        let cloud = InMemoryCloud::new();
        let group = cloud.add_server_group(REGION);
        cloud.add_server(REGION, "server-1");
        let job_id = cloud
            .create_protected_instance(
                REGION,
                &CreateProtectedInstanceOpts {
                    server_group_id: group,
                    server_id: "server-1".to_string(),
                    name: "web".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let first = cloud.get_job(REGION, &job_id).await.unwrap();
        assert_eq!(first.status, job_status::INIT);
        let second = cloud.get_job(REGION, &job_id).await.unwrap();
        assert_eq!(second.status, job_status::SUCCESS);
        assert!(second.end_time.is_some());

        let id = &second.entities[PROTECTED_INSTANCE_ENTITY];
        let instance = cloud.get_protected_instance(REGION, id).await.unwrap();
        assert_eq!(instance.source_server, "server-1");
        assert_eq!(instance.status, "protected");
    }

    #[tokio::test]
    async fn failing_job_reports_reason() {
        let cloud = InMemoryCloud::new().with_settle_after(0);
        let group = cloud.add_server_group(REGION);
        cloud.add_server(REGION, "server-1");
        cloud.fail_next_job("insufficient quota");
        let job_id = cloud
            .create_protected_instance(
                REGION,
                &CreateProtectedInstanceOpts {
                    server_group_id: group,
                    server_id: "server-1".to_string(),
                    name: "web".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let job = cloud.get_job(REGION, &job_id).await.unwrap();
        assert_eq!(job.status, job_status::FAIL);
        assert_eq!(job.fail_reason.as_deref(), Some("insufficient quota"));
        assert!(job.entities.is_empty());
    }

    #[tokio::test]
    async fn server_tags_batch_actions() {
        let cloud = InMemoryCloud::new();
        cloud.add_server(REGION, "server-1");
        cloud
            .batch_server_tags(
                REGION,
                "server-1",
                TagAction::Create,
                &[ResourceTag::new("env", "prod"), ResourceTag::new("team", "dns")],
            )
            .await
            .unwrap();
        cloud
            .batch_server_tags(
                REGION,
                "server-1",
                TagAction::Delete,
                &[ResourceTag::new("env", "")],
            )
            .await
            .unwrap();

        let tags = cloud.get_server_tags(REGION, "server-1").await.unwrap();
        assert_eq!(tags, vec![ResourceTag::new("team", "dns")]);
        assert_eq!(cloud.call_count("batch_server_tags"), 2);
    }
}
