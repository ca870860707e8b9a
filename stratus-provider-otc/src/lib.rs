//! Stratus Open Telekom Cloud Provider
//!
//! Manages DNS record sets, SDRS protected instances and compute instance
//! tags on Open Telekom Cloud.
//!
//! ## Module Structure
//!
//! - `api` - Cloud API trait and request/response types
//! - `config` - Provider configuration (file or `OS_*` environment)
//! - `memory` - In-memory cloud implementing the API
//! - `provider` - OtcProvider implementation
//! - `resources` - Resource kinds and their schemas
//! - `tags` - Tag conversion and reconciliation
//! - `utils` - Helpers for identifiers, statuses and attribute values

pub mod api;
pub mod config;
pub mod memory;
pub mod provider;
pub mod resources;
pub mod tags;
pub mod utils;

// Re-export main types
pub use api::{ApiError, CloudApi};
pub use config::{ConfigError, ProviderConfig};
pub use memory::InMemoryCloud;
pub use provider::OtcProvider;
pub use utils::{normalize_region, normalize_status};

use stratus_core::provider::{BoxFuture, Provider, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for OtcProvider {
    fn name(&self) -> &'static str {
        "otc"
    }

    fn resource_types(&self) -> Vec<Box<dyn stratus_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move { self.read_resource(&prior).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, state: &State) -> BoxFuture<'_, ProviderResult<()>> {
        let state = state.clone();
        Box::pin(async move { self.delete_resource(&state).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }
}
