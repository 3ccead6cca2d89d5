use anyhow::{bail, Context, Result};
use catalog_client::DataProductId;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::Path,
};

/// A validated data product proposal document.
///
/// The document is produced upstream (by the proposal-generation agent) and
/// consumed read-only here; fields are preserved verbatim for display, and
/// id derivation happens later during reconciliation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub data_products: Vec<ProposedDataProduct>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProposedDataProduct {
    /// Business display name. Also the input to catalog id derivation.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub domain: String,
    /// Owning role. Descriptive metadata only, never used as a contact
    /// address.
    #[serde(default)]
    pub owner: String,
    /// Raw `dataset.table` references. Validated individually during asset
    /// association, not here.
    #[serde(default)]
    pub tables: Vec<String>,
}

pub fn load_proposal(path: impl AsRef<Path>) -> Result<Proposal> {
    let file = File::open(&path)
        .with_context(|| format!("Could not open proposal `{}`", path.as_ref().display()))?;
    let proposal: Proposal = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse proposal `{}`", path.as_ref().display()))?;
    validate(&proposal)?;
    Ok(proposal)
}

fn validate(proposal: &Proposal) -> Result<()> {
    let mut ids: HashMap<String, &str> = HashMap::new();
    for (index, product) in proposal.data_products.iter().enumerate() {
        if product.name.trim().is_empty() {
            bail!("Data product at index {} has an empty name", index);
        }
        if product.domain.trim().is_empty() {
            bail!("Data product `{}` has an empty domain", product.name);
        }

        // A name with no usable characters (e.g. all punctuation) derives
        // an empty id, which would address the collection instead of an
        // entity.
        let id = DataProductId::from_display_name(&product.name);
        if id.0.is_empty() {
            bail!(
                "Data product `{}` derives an empty catalog id; \
                 the name needs at least one alphanumeric character",
                product.name
            );
        }

        // Two distinct business names can collapse to the same catalog id;
        // publishing both would silently overwrite one with the other.
        if let Some(existing) = ids.insert(id.0.clone(), &product.name) {
            bail!(
                "Data products `{}` and `{}` both derive the catalog id `{}`",
                existing,
                product.name,
                id
            );
        }
    }
    Ok(())
}
