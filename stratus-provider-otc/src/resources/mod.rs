//! Resource types of the Open Telekom Cloud provider
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Construction of a lifecycle handler per resource type and region

pub mod dns_recordset;
pub mod ecs_instance_tags;
pub mod sdrs_protected_instance;

use std::sync::Arc;

use stratus_core::lifecycle::{Lifecycle, PollSettings, ResourceHandler};
use stratus_core::provider::ResourceType;
use stratus_core::schema::ResourceSchema;

use crate::api::CloudApi;

use dns_recordset::DnsRecordSet;
use ecs_instance_tags::EcsInstanceTags;
use sdrs_protected_instance::SdrsProtectedInstance;

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::TYPE_NAME
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
        }
    };
}

define_resource_type!(DnsRecordSetType, dns_recordset);
define_resource_type!(SdrsProtectedInstanceType, sdrs_protected_instance);
define_resource_type!(EcsInstanceTagsType, ecs_instance_tags);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(DnsRecordSetType),
        Box::new(SdrsProtectedInstanceType),
        Box::new(EcsInstanceTagsType),
    ]
}

// =============================================================================
// Handlers
// =============================================================================

/// Lifecycle handler for a resource type in a region
pub fn handler_for(
    resource_type: &str,
    api: Arc<dyn CloudApi>,
    region: &str,
    poll: PollSettings,
) -> Option<Box<dyn ResourceHandler>> {
    let handler: Box<dyn ResourceHandler> = match resource_type {
        dns_recordset::TYPE_NAME => {
            Box::new(Lifecycle::new(DnsRecordSet::new(api, region)).with_poll_settings(poll))
        }
        sdrs_protected_instance::TYPE_NAME => Box::new(
            Lifecycle::new(SdrsProtectedInstance::new(api, region)).with_poll_settings(poll),
        ),
        ecs_instance_tags::TYPE_NAME => {
            Box::new(Lifecycle::new(EcsInstanceTags::new(api, region)).with_poll_settings(poll))
        }
        _ => return None,
    };
    Some(handler)
}
