pub mod endpoint_validation;
pub use endpoint_validation::{EndpointValidationError, validate_endpoint_url};
