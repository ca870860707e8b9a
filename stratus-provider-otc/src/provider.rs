//! Open Telekom Cloud provider implementation
//!
//! Routes each operation to the lifecycle handler of the resource's type,
//! scoped to the resource's region (or the provider's default region).

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use stratus_core::lifecycle::{PollSettings, ResourceHandler, TIMEOUTS_ATTRIBUTE};
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State, Value};

use crate::api::CloudApi;
use crate::config::{ConfigError, ProviderConfig};
use crate::resources::handler_for;
use crate::utils::normalize_region;

/// Open Telekom Cloud Provider
pub struct OtcProvider {
    config: ProviderConfig,
    api: Arc<dyn CloudApi>,
    poll: PollSettings,
}

impl OtcProvider {
    /// Create a provider from a configuration and an API client
    pub fn new(config: ProviderConfig, api: Arc<dyn CloudApi>) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Open Telekom Cloud provider for region {} (dns: {}, sdrs: {})",
            config.region,
            config.endpoint_for("dns", &config.region),
            config.endpoint_for("sdrs", &config.region)
        );
        Ok(Self {
            config,
            api,
            poll: PollSettings::default(),
        })
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Region of a resource: its own `region` attribute or the provider default
    fn region_of(&self, attributes: &HashMap<String, Value>) -> String {
        attributes
            .get("region")
            .and_then(Value::as_str)
            .map(normalize_region)
            .unwrap_or_else(|| self.config.region.clone())
    }

    fn handler(&self, id: &ResourceId, region: &str) -> ProviderResult<Box<dyn ResourceHandler>> {
        handler_for(&id.resource_type, self.api.clone(), region, self.poll).ok_or_else(|| {
            ProviderError::unsupported(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    /// Copy of a resource with its region normalized
    fn normalized(&self, resource: &Resource, region: &str) -> Resource {
        let mut resource = resource.clone();
        if resource.attributes.contains_key("region") {
            resource
                .attributes
                .insert("region".to_string(), Value::String(region.to_string()));
        }
        resource
    }

    pub async fn read_resource(&self, prior: &State) -> ProviderResult<State> {
        let Some(identifier) = prior.identifier.as_deref() else {
            return Ok(State::not_found(prior.id.clone()));
        };
        let region = self.region_of(&prior.attributes);
        let mut state = self
            .handler(&prior.id, &region)?
            .read(&prior.id, identifier)
            .await?;
        if let Some(timeouts) = prior.attributes.get(TIMEOUTS_ATTRIBUTE)
            && state.exists
        {
            state
                .attributes
                .insert(TIMEOUTS_ATTRIBUTE.to_string(), timeouts.clone());
        }
        Ok(state)
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let region = self.region_of(&resource.attributes);
        let resource = self.normalized(resource, &region);
        self.handler(&resource.id, &region)?
            .create(&resource)
            .await
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let region = self.region_of(&to.attributes);
        let to = self.normalized(to, &region);
        self.handler(id, &region)?
            .update(id, identifier, from, &to)
            .await
    }

    pub async fn delete_resource(&self, state: &State) -> ProviderResult<()> {
        let region = self.region_of(&state.attributes);
        self.handler(&state.id, &region)?.delete(state).await
    }

    pub async fn import_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let region = self.config.region.clone();
        self.handler(id, &region)?.import(id, identifier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCloud;
    use crate::resources::dns_recordset;
    use stratus_core::provider::{ErrorKind, Provider};

    fn config() -> ProviderConfig {
        ProviderConfig {
            region: "eu-de".to_string(),
            auth_url: "https://iam.eu-de.otc.t-systems.com/v3".to_string(),
            token: Some("token".to_string()),
            ..Default::default()
        }
    }

    fn record(zone_id: &str) -> Resource {
        Resource::new(dns_recordset::TYPE_NAME, "www")
            .with_attribute("zone_id", Value::String(zone_id.to_string()))
            .with_attribute("name", Value::String("www.example.com.".to_string()))
            .with_attribute("type", Value::String("A".to_string()))
            .with_attribute("records", Value::string_list(["10.0.0.1"]))
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cloud = Arc::new(InMemoryCloud::new());
        let config = ProviderConfig {
            token: None,
            ..config()
        };
        assert!(matches!(
            OtcProvider::new(config, cloud),
            Err(ConfigError::NoCredentials)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_through_provider_trait() {
        let _ = env_logger::builder().is_test(true).try_init();
        let cloud = Arc::new(InMemoryCloud::new());
        let zone_id = cloud.add_zone("eu-de", "example.com.", "public");
        let provider: Box<dyn Provider> = Box::new(OtcProvider::new(config(), cloud).unwrap());

        let created = provider.create(&record(&zone_id)).await.unwrap();
        assert_eq!(created.get_str("region"), Some("eu-de"));

        let read = provider.read(&created).await.unwrap();
        assert!(read.exists);
        assert_eq!(read.attributes, created.attributes);

        provider.delete(&created).await.unwrap();
        let gone = provider.read(&created).await.unwrap();
        assert!(!gone.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn resource_region_overrides_default() {
        let cloud = Arc::new(InMemoryCloud::new());
        let zone_id = cloud.add_zone("eu-nl", "example.nl.", "public");
        let provider = OtcProvider::new(config(), cloud.clone()).unwrap();

        let err = provider.create_resource(&record(&zone_id)).await.unwrap_err();
        assert!(err.is_not_found());

        let resource =
            record(&zone_id).with_attribute("region", Value::String("eu_nl".to_string()));
        let state = provider.create_resource(&resource).await.unwrap();
        assert_eq!(state.get_str("region"), Some("eu-nl"));

        let read = provider.read_resource(&state).await.unwrap();
        assert!(read.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn read_keeps_timeouts_of_prior_state() {
        let cloud = Arc::new(InMemoryCloud::new());
        let zone_id = cloud.add_zone("eu-de", "example.com.", "public");
        let provider = OtcProvider::new(config(), cloud).unwrap();
        let resource = record(&zone_id).with_attribute(
            TIMEOUTS_ATTRIBUTE,
            Value::string_map([("delete", "30m")]),
        );

        let created = provider.create_resource(&resource).await.unwrap();
        let read = provider.read_resource(&created).await.unwrap();

        assert_eq!(
            read.attributes.get(TIMEOUTS_ATTRIBUTE),
            Some(&Value::string_map([("delete", "30m")]))
        );
    }

    #[tokio::test]
    async fn unknown_resource_type_is_unsupported() {
        let cloud = Arc::new(InMemoryCloud::new());
        let provider = OtcProvider::new(config(), cloud).unwrap();

        let err = provider
            .create_resource(&Resource::new("vpc", "main"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(err.to_string(), "[vpc.main] Unknown resource type: vpc");
    }

    #[tokio::test]
    async fn read_without_identifier_is_not_found() {
        let cloud = Arc::new(InMemoryCloud::new());
        let provider = OtcProvider::new(config(), cloud).unwrap();
        let prior = State::not_found(ResourceId::new(dns_recordset::TYPE_NAME, "www"));

        let state = provider.read_resource(&prior).await.unwrap();

        assert!(!state.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn import_uses_default_region() {
        let cloud = Arc::new(InMemoryCloud::new());
        let zone_id = cloud.add_zone("eu-de", "example.com.", "public");
        let provider = OtcProvider::new(config(), cloud).unwrap();
        let created = provider.create_resource(&record(&zone_id)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let imported = provider
            .import_resource(&ResourceId::new(dns_recordset::TYPE_NAME, "imported"), &identifier)
            .await
            .unwrap();

        assert_eq!(imported.identifier.as_deref(), Some(identifier.as_str()));
    }
}
