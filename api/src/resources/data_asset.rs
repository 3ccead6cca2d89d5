use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// A `dataset.table` reference from a proposal document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    pub dataset: String,
    pub table: String,
}

impl FromStr for TableReference {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        match string.split_once('.') {
            Some((dataset, table)) if !dataset.is_empty() && !table.is_empty() => Ok(Self {
                dataset: dataset.into(),
                table: table.into(),
            }),
            _ => Err(Error::BadTableReference {
                reference: string.into(),
            }),
        }
    }
}

impl TableReference {
    /// Catalog-safe asset id for this table: `{dataset}-{table}`, lowercased
    /// with underscores replaced by hyphens.
    pub fn asset_id(&self) -> Id {
        Id(format!("{}-{}", self.dataset, self.table)
            .replace('_', "-")
            .to_lowercase())
    }

    /// Fully qualified resource name of the underlying warehouse table.
    pub fn resource_name(&self, project: &str) -> String {
        format!(
            "//bigquery.googleapis.com/projects/{}/datasets/{}/tables/{}",
            project, self.dataset, self.table
        )
    }
}

/// Catalog identifier of a data asset.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Id(pub String);

impl std::fmt::Display for Id {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A data asset as returned by the catalog.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataAsset {
    pub name: String,
    #[serde(default)]
    pub resource: Option<String>,
}

/// Request payload for attaching a table to a data product.
///
/// The service expects the resource as a scalar string, not a nested spec
/// object. This shape is pinned by the mocked integration tests; revisit
/// there if the API contract changes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewDataAsset {
    pub resource: String,
}
