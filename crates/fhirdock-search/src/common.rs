//! Common search parameters that apply to all FHIR resources.
//!
//! These parameters are defined in the FHIR specification and are available
//! for all resource types. They are registered before loading resource- and
//! profile-specific search parameters.

use crate::parameters::{SearchParameter, SearchParameterType, TokenShape};
use crate::registry::SearchParameterRegistry;

/// Registers all common (Resource-level) search parameters.
pub fn register_common_parameters(registry: &mut SearchParameterRegistry) {
    registry.register(
        SearchParameter::new("_id", "http://hl7.org/fhir/SearchParameter/Resource-id", SearchParameterType::Token, vec!["Resource".into()])
            .with_expression("Resource.id")
            .with_description("Logical id of this artifact")
            .with_json_path(&["id"])
            .with_token_shape(TokenShape::Plain),
    );

    registry.register(
        SearchParameter::new("_lastUpdated", "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated", SearchParameterType::Date, vec!["Resource".into()])
            .with_expression("Resource.meta.lastUpdated")
            .with_description("When the resource version last changed")
            .with_json_path(&["meta", "lastUpdated"]),
    );

    registry.register(
        SearchParameter::new("_tag", "http://hl7.org/fhir/SearchParameter/Resource-tag", SearchParameterType::Token, vec!["Resource".into()])
            .with_expression("Resource.meta.tag")
            .with_description("Tags applied to this resource")
            .with_json_path(&["meta", "tag"]),
    );

    registry.register(
        SearchParameter::new("_profile", "http://hl7.org/fhir/SearchParameter/Resource-profile", SearchParameterType::Uri, vec!["Resource".into()])
            .with_expression("Resource.meta.profile")
            .with_description("Profiles this resource claims to conform to")
            .with_json_path(&["meta", "profile"]),
    );

    registry.register(
        SearchParameter::new("_security", "http://hl7.org/fhir/SearchParameter/Resource-security", SearchParameterType::Token, vec!["Resource".into()])
            .with_expression("Resource.meta.security")
            .with_description("Security labels applied to this resource")
            .with_json_path(&["meta", "security"]),
    );

    tracing::debug!(count = 5, "registered common search parameters");
}
