pub mod error;
pub mod fhir;
pub mod id;
pub mod resource;
pub mod time;

pub use error::{CoreError, Result};
pub use fhir::{FhirVersion, ResourceType};
pub use id::{IdError, generate_id, validate_id};
pub use resource::{ResourceMeta, id_of, resource_type_of, stamp_meta};
pub use time::{FhirDateTime, now_utc};
