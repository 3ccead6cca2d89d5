use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields covered by an update, matching the payload of [`NewDataProduct`].
pub const UPDATE_MASK: &str = "displayName,description,labels,ownerEmails";

/// Catalog identifier of a data product. Contains only lowercase
/// alphanumerics and hyphens.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Id(pub String);

impl Id {
    /// Derive the catalog id from a business display name.
    ///
    /// Deterministic: lowercase, spaces become hyphens, `&` becomes `and`,
    /// underscores become hyphens, everything else outside `[a-z0-9-]` is
    /// stripped.
    pub fn from_display_name(name: &str) -> Self {
        let id = name
            .to_lowercase()
            .replace(' ', "-")
            .replace('&', "and")
            .replace('_', "-")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        Self(id)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A data product as returned by the catalog.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataProduct {
    /// Fully qualified resource name assigned by the service.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_emails: Vec<String>,
}

/// Request payload for creating or updating a data product.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewDataProduct {
    pub display_name: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub owner_emails: Vec<String>,
}
