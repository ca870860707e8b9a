//! Lifecycle - One create/read/update/delete/import driver for every resource kind
//!
//! A resource kind only describes how to translate between attributes and
//! its cloud API (`marshal`, `send`, `probe`, `unmarshal`) and which status
//! each verb waits for. The driver owns validation, waiting, reading back
//! and error wrapping.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};

use crate::provider::{BoxFuture, ErrorKind, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;
use crate::timeouts::{ResourceTimeouts, Verb};
use crate::waiter::{DEFAULT_DELAY, DEFAULT_MIN_INTERVAL, Observation, WaitConfig};

/// Attribute carrying user overrides for operation timeouts
pub const TIMEOUTS_ATTRIBUTE: &str = "timeouts";

/// Statuses of an asynchronous job
pub mod job_status {
    pub const INIT: &str = "INIT";
    pub const RUNNING: &str = "RUNNING";
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAIL: &str = "FAIL";
}

/// Status vocabulary of a resource-status wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSets {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Status reported when the object is gone (deletion waits)
    pub absent: Option<String>,
}

impl StatusSets {
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            absent: None,
        }
    }

    /// Wait until the object no longer exists
    pub fn deletion<P>(pending: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let mut sets = Self::new(pending, [crate::waiter::STATUS_DELETED]);
        sets.absent = Some(crate::waiter::STATUS_DELETED.to_string());
        sets
    }
}

/// What a verb waits for after its request is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// The request completes synchronously
    None,
    /// Poll the resource's own status
    Status(StatusSets),
    /// Poll the asynchronous job returned by the request
    Job,
}

/// Answer of the cloud API to a mutating request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Identifier of the resource, when known at this point
    pub identifier: Option<String>,
    /// Job tracking the request, for job-based APIs
    pub job_id: Option<String>,
}

impl Accepted {
    pub fn resource(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            job_id: None,
        }
    }

    pub fn job(job_id: impl Into<String>) -> Self {
        Self {
            identifier: None,
            job_id: Some(job_id.into()),
        }
    }

    pub fn done() -> Self {
        Self::default()
    }
}

/// Snapshot of an asynchronous job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: String,
    /// Entities produced by the job (e.g., "protected_instance_id")
    pub entities: HashMap<String, String>,
    pub fail_reason: Option<String>,
}

/// A mutating request, built from the marshaled spec
#[derive(Debug)]
pub enum Request<'a, S> {
    Create {
        spec: &'a S,
    },
    Update {
        identifier: &'a str,
        from: &'a State,
        spec: &'a S,
    },
    Delete {
        identifier: &'a str,
    },
}

impl<S> Request<'_, S> {
    pub fn verb(&self) -> Verb {
        match self {
            Request::Create { .. } => Verb::Create,
            Request::Update { .. } => Verb::Update,
            Request::Delete { .. } => Verb::Delete,
        }
    }
}

/// Capabilities a resource kind provides to the lifecycle driver
pub trait ResourceKind: Send + Sync {
    /// Typed desired configuration
    type Spec: Send + Sync;
    /// Remote object as returned by the cloud API
    type Remote: Send + Sync;

    /// Resource type name (e.g., "dns_recordset")
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::default()
    }

    /// What the given verb waits for once its request is accepted
    fn wait_target(&self, verb: Verb) -> WaitTarget;

    /// Turn validated attributes into the typed spec
    fn marshal(&self, resource: &Resource) -> ProviderResult<Self::Spec>;

    /// Issue a mutating request
    fn send<'a>(
        &'a self,
        request: Request<'a, Self::Spec>,
    ) -> BoxFuture<'a, ProviderResult<Accepted>>;

    /// Query the object's current status
    ///
    /// Must fail with a not-found error when the object does not exist.
    fn probe<'a>(&'a self, identifier: &'a str)
    -> BoxFuture<'a, ProviderResult<Observation<Self::Remote>>>;

    /// Full read of the object, used for drift detection and read-back
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Self::Remote>> {
        Box::pin(async move { self.probe(identifier).await.map(|o| o.snapshot) })
    }

    /// Turn the remote object into attributes
    fn unmarshal(&self, identifier: &str, remote: &Self::Remote) -> HashMap<String, Value>;

    /// Query a job started by `send`
    fn probe_job<'a>(
        &'a self,
        _job_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Observation<JobSnapshot>>> {
        let name = self.name();
        Box::pin(async move {
            Err(ProviderError::unsupported(format!(
                "{} does not use asynchronous jobs",
                name
            )))
        })
    }

    /// Resource identifier produced by a finished create job
    fn identifier_from_job(&self, job: &JobSnapshot) -> ProviderResult<String> {
        Err(ProviderError::unsupported(format!(
            "{} cannot take its identifier from job {}",
            self.name(),
            job.job_id
        )))
    }

    /// Follow-up calls once the verb's wait is over (e.g., tagging)
    fn finish<'a>(
        &'a self,
        _verb: Verb,
        _identifier: &'a str,
        _spec: Option<&'a Self::Spec>,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Object-safe face of a lifecycle driver, one per resource type
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>>;

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    fn delete<'a>(&'a self, state: &'a State) -> BoxFuture<'a, ProviderResult<()>>;

    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>>;
}

/// Pauses used by every wait of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub delay: Duration,
    pub min_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// Generic lifecycle driver for a resource kind
pub struct Lifecycle<K> {
    kind: K,
    poll: PollSettings,
}

impl<K: ResourceKind> Lifecycle<K> {
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Split the `timeouts` attribute off the user's attributes
    fn timeouts_for(
        &self,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<(ResourceTimeouts, Option<Value>)> {
        let defaults = self.kind.timeouts();
        match attributes.get(TIMEOUTS_ATTRIBUTE) {
            None => Ok((defaults, None)),
            Some(Value::Map(overrides)) => {
                let timeouts = defaults.with_overrides(overrides).map_err(|e| {
                    ProviderError::validation(format!("Invalid timeouts: {}", e)).with_cause(e)
                })?;
                Ok((timeouts, Some(Value::Map(overrides.clone()))))
            }
            Some(_) => Err(ProviderError::validation(
                "Invalid timeouts: expected a map of durations",
            )),
        }
    }

    /// Validate a desired resource and marshal it into the kind's spec
    fn prepare(
        &self,
        resource: &Resource,
    ) -> ProviderResult<(K::Spec, ResourceTimeouts, Option<Value>)> {
        let (timeouts, raw_timeouts) = self.timeouts_for(&resource.attributes)?;

        let mut attributes = resource.attributes.clone();
        attributes.remove(TIMEOUTS_ATTRIBUTE);

        let schema = self.kind.schema();
        schema
            .validate(&attributes)
            .map_err(ProviderError::invalid_attributes)?;
        schema.apply_defaults(&mut attributes);

        let normalized = Resource {
            id: resource.id.clone(),
            attributes,
        };
        let spec = self.kind.marshal(&normalized)?;
        Ok((spec, timeouts, raw_timeouts))
    }

    fn wait_config(&self, subject: String, sets: &StatusSets, timeout: Duration) -> WaitConfig {
        let mut config = WaitConfig::new(
            subject,
            sets.pending.iter().cloned(),
            sets.target.iter().cloned(),
        )
        .timeout(timeout)
        .delay(self.poll.delay)
        .min_interval(self.poll.min_interval);
        config.absent_status = sets.absent.clone();
        config
    }

    fn subject(&self, identifier: &str) -> String {
        format!("{} ({})", self.kind.name(), identifier)
    }

    /// Wait for a verb to settle, returning the resource identifier
    ///
    /// For job-based creates the identifier only becomes known here.
    async fn settle(
        &self,
        verb: Verb,
        accepted: &Accepted,
        timeout: Duration,
    ) -> ProviderResult<Option<String>> {
        match self.kind.wait_target(verb) {
            WaitTarget::None => Ok(accepted.identifier.clone()),
            WaitTarget::Status(sets) => {
                let identifier = accepted.identifier.as_deref().ok_or_else(|| {
                    ProviderError::api(format!(
                        "No identifier returned for {} of {}",
                        verb,
                        self.kind.name()
                    ))
                })?;
                let config = self.wait_config(self.subject(identifier), &sets, timeout);
                config.wait_for(|| self.kind.probe(identifier)).await?;
                Ok(Some(identifier.to_string()))
            }
            WaitTarget::Job => {
                let job_id = accepted.job_id.as_deref().ok_or_else(|| {
                    ProviderError::api(format!(
                        "No job returned for {} of {}",
                        verb,
                        self.kind.name()
                    ))
                })?;
                let sets = StatusSets::new(
                    [job_status::INIT, job_status::RUNNING],
                    [job_status::SUCCESS],
                );
                let config = self.wait_config(format!("job {}", job_id), &sets, timeout);
                let settled = config.wait_for(|| self.probe_job(job_id)).await?;
                let job = settled.snapshot.ok_or_else(|| {
                    ProviderError::not_found(format!("Job {} disappeared", job_id))
                })?;

                if verb == Verb::Create {
                    self.kind.identifier_from_job(&job).map(Some)
                } else {
                    Ok(accepted.identifier.clone())
                }
            }
        }
    }

    /// Job probe that reports a failed job as an error carrying its reason
    async fn probe_job(&self, job_id: &str) -> ProviderResult<Observation<JobSnapshot>> {
        let observation = self.kind.probe_job(job_id).await?;
        if observation.status == job_status::FAIL {
            let reason = observation
                .snapshot
                .fail_reason
                .as_deref()
                .unwrap_or("no reason given");
            return Err(ProviderError::api(format!("Job {} failed: {}", job_id, reason)));
        }
        Ok(observation)
    }

    async fn read_back(
        &self,
        id: &ResourceId,
        identifier: &str,
        raw_timeouts: Option<Value>,
    ) -> ProviderResult<State> {
        let remote = self.kind.fetch(identifier).await?;
        let mut attributes = self.kind.unmarshal(identifier, &remote);
        if let Some(raw) = raw_timeouts {
            attributes.insert(TIMEOUTS_ATTRIBUTE.to_string(), raw);
        }
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        match self.kind.fetch(identifier).await {
            Ok(remote) => {
                let attributes = self.kind.unmarshal(identifier, &remote);
                Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
            }
            Err(e) if e.is_not_found() => {
                info!("{} ({}) no longer exists, removing from state", id, identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e.for_resource(id.clone())),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let (spec, timeouts, raw_timeouts) = self
            .prepare(resource)
            .map_err(|e| e.for_resource(id.clone()))?;

        debug!("Creating {}", id);
        let accepted = self
            .kind
            .send(Request::Create { spec: &spec })
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        let identifier = self
            .settle(Verb::Create, &accepted, timeouts.create)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
            .ok_or_else(|| {
                ProviderError::api("No identifier returned for create").for_resource(id.clone())
            })?;

        self.kind
            .finish(Verb::Create, &identifier, Some(&spec))
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        info!("Created {} ({})", id, identifier);
        self.read_back(id, &identifier, raw_timeouts)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let (spec, timeouts, raw_timeouts) =
            self.prepare(to).map_err(|e| e.for_resource(id.clone()))?;

        let replaced = self
            .kind
            .schema()
            .force_new_changes(&from.attributes, &to.attributes);
        if !replaced.is_empty() {
            return Err(ProviderError::validation(format!(
                "Cannot update {} in place, changing it requires replacement",
                replaced.join(", ")
            ))
            .for_resource(id.clone()));
        }

        debug!("Updating {} ({})", id, identifier);
        let mut accepted = self
            .kind
            .send(Request::Update {
                identifier,
                from,
                spec: &spec,
            })
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        accepted.identifier.get_or_insert_with(|| identifier.to_string());

        self.settle(Verb::Update, &accepted, timeouts.update)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.kind
            .finish(Verb::Update, identifier, Some(&spec))
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read_back(id, identifier, raw_timeouts)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }

    pub async fn delete_resource(&self, state: &State) -> ProviderResult<()> {
        let id = &state.id;
        let identifier = state.identifier.as_deref().ok_or_else(|| {
            ProviderError::validation("Cannot delete a resource without identifier")
                .for_resource(id.clone())
        })?;
        let (timeouts, _) = self
            .timeouts_for(&state.attributes)
            .map_err(|e| e.for_resource(id.clone()))?;

        debug!("Deleting {} ({})", id, identifier);
        let mut accepted = match self.kind.send(Request::Delete { identifier }).await {
            Ok(accepted) => accepted,
            Err(e) if e.is_not_found() => {
                info!("{} ({}) was already deleted", id, identifier);
                return Ok(());
            }
            Err(e) => return Err(e.for_resource(id.clone())),
        };
        accepted.identifier.get_or_insert_with(|| identifier.to_string());

        self.settle(Verb::Delete, &accepted, timeouts.delete)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.kind
            .finish(Verb::Delete, identifier, None)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        info!("Deleted {} ({})", id, identifier);
        Ok(())
    }

    pub async fn import_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let state = self.read_resource(id, identifier).await?;
        if !state.exists {
            return Err(ProviderError::not_found(format!(
                "Cannot import non-existent remote object {}",
                identifier
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }
}

impl<K: ResourceKind> ResourceHandler for Lifecycle<K> {
    fn resource_type(&self) -> &'static str {
        self.kind.name()
    }

    fn schema(&self) -> ResourceSchema {
        self.kind.schema()
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_resource(id, identifier))
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.create_resource(resource))
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.update_resource(id, identifier, from, to))
    }

    fn delete<'a>(&'a self, state: &'a State) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_resource(state))
    }

    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.import_resource(id, identifier))
    }
}

/// True when the error came from a wait that ran out of time
pub fn is_wait_timeout(err: &ProviderError) -> bool {
    err.kind == ErrorKind::Wait
        && matches!(
            err.wait_error(),
            Some(crate::waiter::WaitError::Timeout { .. })
        )
}
