pub mod health;
pub mod registrants;
pub mod teams;
pub mod verify;

use checkpoint_domain::id::ExternalId;

use crate::error::RegistryError;

/// Parse an external account id from a request body.
pub(crate) fn external_id(raw: &str) -> Result<ExternalId, RegistryError> {
    ExternalId::parse(raw).map_err(|e| RegistryError::Validation(e.to_string()))
}
