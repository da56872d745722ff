//! `ResourceIdentifier`: the `(resourceType, resourceId)` pair naming one
//! live shared-state instance, with a canonical `"type:id"` string form.

use crate::error::SyncError;
use std::fmt;

/// Names one logical resource instance.
///
/// `resource_id` may itself contain `:` (e.g. a UUID never does, but a
/// caller-chosen id might); only the *first* `:` is treated as the
/// type/id separator, so `"chat:room:general"` parses as
/// `("chat", "room:general")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// `"<resourceType>:<resourceId>"`.
    pub fn to_canonical(&self) -> String {
        format!("{}:{}", self.resource_type, self.resource_id)
    }

    /// The pubsub topic key a [`crate::master_connection::MasterResourceConnection`]
    /// routes forward-actions and reconciliation batches on.
    pub fn topic_key(&self) -> String {
        format!("rid:{}", self.to_canonical())
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

impl TryFrom<&str> for ResourceIdentifier {
    type Error = SyncError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.split_once(':') {
            Some((resource_type, resource_id)) if !resource_type.is_empty() && !resource_id.is_empty() => {
                Ok(ResourceIdentifier::new(resource_type, resource_id))
            }
            _ => Err(SyncError::InvalidResourceIdentifier(value.to_string())),
        }
    }
}

impl TryFrom<String> for ResourceIdentifier {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ResourceIdentifier::try_from(value.as_str())
    }
}
