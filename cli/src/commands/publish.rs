use anyhow::{Context, Result};
use catalog_client::{
    resources::{
        data_asset::NewDataAsset,
        data_product::NewDataProduct,
        operation::MutationResponse,
    },
    Client, DataProductId, PollConfig, Poller, TableReference,
};
use log::{error, info, warn};
use std::{collections::BTreeMap, path::PathBuf, str::FromStr, time::Duration};
use structopt::StructOpt;

use crate::proposal::{self, ProposedDataProduct};

/// Owner contact used when neither the context nor the command line
/// provides one.
pub const DEFAULT_OWNER_EMAIL: &str = "data-stewardship@example.com";

/// Value of the `generated_by` provenance label.
pub const DEFAULT_PROVENANCE_LABEL: &str = "ai-agent";

#[derive(Debug, StructOpt)]
pub struct PublishArgs {
    #[structopt(long = "file", parse(from_os_str))]
    /// Path to the proposal document to publish
    pub file: PathBuf,

    #[structopt(long = "dry-run")]
    /// Report the intended catalog mutations without performing any
    pub dry_run: bool,

    #[structopt(long = "owner-email")]
    /// Owner contact attached to every data product. Overrides the context
    /// setting [default: data-stewardship@example.com]
    pub owner_email: Option<String>,

    #[structopt(long = "provenance-label")]
    /// Value recorded in the `generated_by` label [default: ai-agent]
    pub provenance_label: Option<String>,

    #[structopt(long = "poll-interval-secs", default_value = "2")]
    /// Seconds to wait between polls of a long-running operation
    pub poll_interval_secs: u64,

    #[structopt(long = "poll-timeout-secs", default_value = "600")]
    /// Upper bound in seconds on waiting for a single operation
    pub poll_timeout_secs: u64,
}

/// Resolved settings for one publication run.
#[derive(Debug, Clone)]
pub struct Params {
    pub project: String,
    pub location: String,
    pub owner_email: String,
    pub provenance_label: String,
    pub poll: PollConfig,
}

impl Params {
    pub fn poll_config(args: &PublishArgs) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(args.poll_interval_secs),
            timeout: Some(Duration::from_secs(args.poll_timeout_secs)),
        }
    }
}

/// How one data product fared.
#[derive(Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    Created,
    Updated,
    Simulated,
    Failed(String),
}

#[derive(Debug)]
pub struct Outcome {
    pub id: DataProductId,
    pub status: OutcomeStatus,
    pub assets: Vec<AssetOutcome>,
}

/// How one table reference fared within a confirmed data product.
#[derive(Debug, PartialEq, Eq)]
pub enum AssetStatus {
    Attached,
    AlreadyAttached,
    Simulated,
    Skipped(String),
    Failed(String),
}

#[derive(Debug)]
pub struct AssetOutcome {
    pub reference: String,
    pub status: AssetStatus,
}

/// Reconcile every data product in the proposal against the catalog.
///
/// `client` is `None` for dry runs. Per-product failures are recorded and
/// logged but never abort the run; only validation and transport-level
/// errors are fatal.
pub fn run(args: &PublishArgs, params: &Params, client: Option<&Client>) -> Result<()> {
    let proposal = proposal::load_proposal(&args.file)?;
    info!(
        "Processing {} data products (location: {})",
        proposal.data_products.len(),
        params.location
    );

    let mut outcomes = Vec::with_capacity(proposal.data_products.len());
    for product in &proposal.data_products {
        let outcome = match client {
            None => simulate(product, params),
            Some(client) => reconcile(client, product, params)?,
        };
        outcomes.push(outcome);
    }

    summarize(&outcomes);
    Ok(())
}

/// Bring the catalog entry for one proposed data product in line with the
/// proposal, then attach its table assets.
///
/// Application-level failures (bad status, failed operation) are captured
/// in the returned `Outcome`; transport failures bubble up as fatal since
/// no further call can succeed.
fn reconcile(
    client: &Client,
    product: &ProposedDataProduct,
    params: &Params,
) -> Result<Outcome> {
    let id = DataProductId::from_display_name(&product.name);
    info!("Reconciling data product `{}` as `{}`", product.name, id);

    let payload = build_payload(product, params);
    let status = match ensure_data_product(client, &id, &payload, params) {
        Ok(status) => status,
        Err(error) if error.is_scoped() => {
            error!("Failed to reconcile data product `{id}`: {error}");
            return Ok(Outcome {
                id,
                status: OutcomeStatus::Failed(error.to_string()),
                assets: Vec::new(),
            });
        }
        Err(error) => {
            return Err(error).with_context(|| format!("Transport failure while reconciling `{id}`"))
        }
    };

    let mut assets = Vec::with_capacity(product.tables.len());
    for reference in &product.tables {
        assets.push(ensure_asset(client, &id, reference, params)?);
    }

    Ok(Outcome { id, status, assets })
}

/// Create-or-update decision for a single data product id.
fn ensure_data_product(
    client: &Client,
    id: &DataProductId,
    payload: &NewDataProduct,
    params: &Params,
) -> catalog_client::Result<OutcomeStatus> {
    match client.get_data_product(id)? {
        Some(_) => {
            info!("Data product `{id}` already exists, updating");
            let response = client.update_data_product(id, payload)?;
            await_if_operation(client, &response, params)?;
            Ok(OutcomeStatus::Updated)
        }
        None => {
            info!("Data product `{id}` not found, creating");
            let response = client.create_data_product(id, payload)?;
            await_if_operation(client, &response, params)?;
            Ok(OutcomeStatus::Created)
        }
    }
}

/// Await the long-running operation behind a mutation response, if any.
/// Synchronous responses are already complete.
fn await_if_operation(
    client: &Client,
    response: &MutationResponse,
    params: &Params,
) -> catalog_client::Result<()> {
    if let Some(name) = response.operation_name() {
        let poller = Poller::new(params.poll.clone());
        client.wait_for_operation(name, &poller)?;
    }
    Ok(())
}

/// Idempotently attach one table reference to a confirmed data product.
///
/// Malformed references are skipped, never failed. An existing asset is a
/// no-op. Failures affect this asset only.
fn ensure_asset(
    client: &Client,
    data_product_id: &DataProductId,
    reference: &str,
    params: &Params,
) -> Result<AssetOutcome> {
    let table = match TableReference::from_str(reference) {
        Ok(table) => table,
        Err(error) => {
            warn!("Skipping table reference `{reference}`: {error}");
            return Ok(AssetOutcome {
                reference: reference.to_owned(),
                status: AssetStatus::Skipped(error.to_string()),
            });
        }
    };

    let asset_id = table.asset_id();
    let status = match client.get_data_asset(data_product_id, &asset_id) {
        Ok(Some(_)) => {
            info!("Asset `{asset_id}` already attached to `{data_product_id}`");
            AssetStatus::AlreadyAttached
        }
        Ok(None) => {
            let asset = NewDataAsset {
                resource: table.resource_name(&params.project),
            };
            match client.create_data_asset(data_product_id, &asset_id, &asset) {
                Ok(_) => {
                    info!("Attached asset `{asset_id}` ({reference})");
                    AssetStatus::Attached
                }
                Err(error) if error.is_scoped() => {
                    error!("Failed to attach asset `{asset_id}`: {error}");
                    AssetStatus::Failed(error.to_string())
                }
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("Transport failure while attaching asset `{asset_id}`")
                    })
                }
            }
        }
        Err(error) if error.is_scoped() => {
            error!("Could not check asset `{asset_id}`: {error}");
            AssetStatus::Failed(error.to_string())
        }
        Err(error) => {
            return Err(error).with_context(|| {
                format!("Transport failure while checking asset `{asset_id}`")
            })
        }
    };

    Ok(AssetOutcome {
        reference: reference.to_owned(),
        status,
    })
}

/// Dry run: compute everything, mutate nothing.
fn simulate(product: &ProposedDataProduct, params: &Params) -> Outcome {
    let id = DataProductId::from_display_name(&product.name);
    let payload = build_payload(product, params);

    info!(
        "[DRY RUN] Would create or update data product `{}` with payload:",
        id
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).expect("Payload is always serialisable")
    );

    let assets = product
        .tables
        .iter()
        .map(|reference| match TableReference::from_str(reference) {
            Ok(table) => {
                info!(
                    "[DRY RUN]   + would attach `{}` as `{}` -> {}",
                    reference,
                    table.asset_id(),
                    table.resource_name(&params.project)
                );
                AssetOutcome {
                    reference: reference.clone(),
                    status: AssetStatus::Simulated,
                }
            }
            Err(error) => {
                warn!("Skipping table reference `{reference}`: {error}");
                AssetOutcome {
                    reference: reference.clone(),
                    status: AssetStatus::Skipped(error.to_string()),
                }
            }
        })
        .collect();

    Outcome {
        id,
        status: OutcomeStatus::Simulated,
        assets,
    }
}

/// Build the target catalog payload for one proposed data product.
///
/// The proposal's `owner` field is a role, not a contact address; the
/// configured owner email is used instead.
fn build_payload(product: &ProposedDataProduct, params: &Params) -> NewDataProduct {
    NewDataProduct {
        display_name: product.name.clone(),
        description: format!("{}\n\nDomain: {}", product.description, product.domain),
        labels: BTreeMap::from([
            ("domain".to_owned(), domain_label(&product.domain)),
            (
                "generated_by".to_owned(),
                params.provenance_label.clone(),
            ),
        ]),
        owner_emails: vec![params.owner_email.clone()],
    }
}

/// Label-safe rendition of a domain string: lowercase, non-alphanumerics
/// become `_`, runs of `_` collapse to one.
fn domain_label(domain: &str) -> String {
    let mut label = String::with_capacity(domain.len());
    for character in domain.to_lowercase().chars() {
        if character.is_alphanumeric() {
            label.push(character);
        } else if !label.ends_with('_') {
            label.push('_');
        }
    }
    label
}

fn summarize(outcomes: &[Outcome]) {
    let mut created = 0;
    let mut updated = 0;
    let mut simulated = 0;
    let mut attached = 0;
    let mut skipped = 0;
    let mut asset_failures = 0;
    let mut failures = Vec::new();

    for outcome in outcomes {
        match &outcome.status {
            OutcomeStatus::Created => created += 1,
            OutcomeStatus::Updated => updated += 1,
            OutcomeStatus::Simulated => simulated += 1,
            OutcomeStatus::Failed(reason) => failures.push((&outcome.id, reason)),
        }
        for asset in &outcome.assets {
            match &asset.status {
                AssetStatus::Attached | AssetStatus::AlreadyAttached | AssetStatus::Simulated => {
                    attached += 1
                }
                AssetStatus::Skipped(_) => skipped += 1,
                AssetStatus::Failed(_) => asset_failures += 1,
            }
        }
    }

    info!(
        "Run complete: {created} created, {updated} updated, {simulated} simulated, {} failed; \
         assets: {attached} attached, {skipped} skipped, {asset_failures} failed",
        failures.len()
    );
    for (id, reason) in failures {
        error!("  data product `{id}` failed: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_client::{Config as ClientConfig, Token};
    use mockito::{mock, server_url, Matcher};
    use pretty_assertions::assert_eq;
    use url::Url;

    fn test_params() -> Params {
        Params {
            project: "acme-analytics".to_owned(),
            location: "eu".to_owned(),
            owner_email: DEFAULT_OWNER_EMAIL.to_owned(),
            provenance_label: DEFAULT_PROVENANCE_LABEL.to_owned(),
            poll: PollConfig {
                interval: Duration::from_secs(0),
                timeout: Some(Duration::from_secs(5)),
            },
        }
    }

    fn test_client() -> Client {
        Client::new(ClientConfig {
            endpoint: Url::parse(&server_url()).unwrap(),
            token: Token("test-token".to_owned()),
            project: "acme-analytics".to_owned(),
            location: "eu".to_owned(),
            ..Default::default()
        })
        .unwrap()
    }

    fn product(name: &str, domain: &str, tables: &[&str]) -> ProposedDataProduct {
        ProposedDataProduct {
            name: name.to_owned(),
            description: "d".to_owned(),
            domain: domain.to_owned(),
            owner: "Logistics".to_owned(),
            tables: tables.iter().map(|table| (*table).to_owned()).collect(),
        }
    }

    fn product_path(id: &str) -> String {
        format!("/projects/acme-analytics/locations/eu/dataProducts/{id}")
    }

    const PRODUCTS_PATH: &str = "/projects/acme-analytics/locations/eu/dataProducts";

    #[test]
    fn test_domain_label() {
        assert_eq!(domain_label("Supply Chain"), "supply_chain");
        assert_eq!(domain_label("R&D / Ops"), "r_d_ops");
        assert_eq!(domain_label("sales"), "sales");
    }

    #[test]
    fn test_build_payload() {
        let payload = build_payload(
            &product("Pharma Inventory & Stock", "Supply Chain", &[]),
            &test_params(),
        );
        assert_eq!(payload.display_name, "Pharma Inventory & Stock");
        assert_eq!(payload.description, "d\n\nDomain: Supply Chain");
        assert_eq!(payload.labels["domain"], "supply_chain");
        assert_eq!(payload.labels["generated_by"], "ai-agent");
        // The proposal's owner role is not a contact address.
        assert_eq!(payload.owner_emails, vec![DEFAULT_OWNER_EMAIL.to_owned()]);
    }

    #[test]
    fn test_dry_run_reports_intended_actions_without_network() {
        let outcome = simulate(
            &product(
                "Pharma Inventory & Stock",
                "Supply Chain",
                &["inv.drugs", "inv.shipments"],
            ),
            &test_params(),
        );
        assert_eq!(outcome.id.0, "pharma-inventory-and-stock");
        assert_eq!(outcome.status, OutcomeStatus::Simulated);
        assert_eq!(outcome.assets.len(), 2);
        assert!(outcome
            .assets
            .iter()
            .all(|asset| asset.status == AssetStatus::Simulated));
    }

    #[test]
    fn test_missing_product_is_created() {
        let get = mock("GET", product_path("alpha-sales").as_str())
            .with_status(404)
            .with_body(r#"{"error": {"message": "not found"}}"#)
            .create();
        let create = mock("POST", PRODUCTS_PATH)
            .match_query(Matcher::UrlEncoded(
                "dataProductId".into(),
                "alpha-sales".into(),
            ))
            .with_body(format!(r#"{{"name": "{}"}}"#, &product_path("alpha-sales")[1..]))
            .create();

        let outcome = reconcile(
            &test_client(),
            &product("Alpha Sales", "Sales", &[]),
            &test_params(),
        )
        .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Created);
        get.assert();
        create.assert();
    }

    #[test]
    fn test_existing_product_is_updated() {
        let get = mock("GET", product_path("beta-ops").as_str())
            .with_body(r#"{"name": "projects/acme-analytics/locations/eu/dataProducts/beta-ops"}"#)
            .create();
        let update = mock("PATCH", product_path("beta-ops").as_str())
            .match_query(Matcher::UrlEncoded(
                "updateMask".into(),
                "displayName,description,labels,ownerEmails".into(),
            ))
            .with_body(r#"{"name": "projects/acme-analytics/locations/eu/dataProducts/beta-ops"}"#)
            .create();

        let outcome = reconcile(
            &test_client(),
            &product("Beta Ops", "Ops", &[]),
            &test_params(),
        )
        .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Updated);
        get.assert();
        update.assert();
    }

    #[test]
    fn test_undetermined_existence_fails_without_mutation() {
        let get = mock("GET", product_path("gamma-hr").as_str())
            .with_status(500)
            .with_body(r#"{"error": {"message": "internal"}}"#)
            .create();
        let create = mock("POST", PRODUCTS_PATH)
            .match_query(Matcher::UrlEncoded(
                "dataProductId".into(),
                "gamma-hr".into(),
            ))
            .expect(0)
            .create();
        let update = mock("PATCH", product_path("gamma-hr").as_str()).expect(0).create();

        let outcome = reconcile(
            &test_client(),
            &product("Gamma HR", "HR", &["hr.people"]),
            &test_params(),
        )
        .unwrap();
        assert!(matches!(outcome.status, OutcomeStatus::Failed(_)));
        // Asset association is skipped entirely for a failed product.
        assert!(outcome.assets.is_empty());
        get.assert();
        create.assert();
        update.assert();
    }

    #[test]
    fn test_product_failure_does_not_stop_the_next_product() {
        let _first = mock("GET", product_path("delta-a").as_str())
            .with_status(500)
            .with_body("{}")
            .create();
        let second_get = mock("GET", product_path("delta-b").as_str())
            .with_status(404)
            .with_body("{}")
            .create();
        let second_create = mock("POST", PRODUCTS_PATH)
            .match_query(Matcher::UrlEncoded(
                "dataProductId".into(),
                "delta-b".into(),
            ))
            .with_body(r#"{"name": "projects/acme-analytics/locations/eu/dataProducts/delta-b"}"#)
            .create();

        let client = test_client();
        let params = test_params();
        let outcomes = [
            reconcile(&client, &product("Delta A", "Ops", &[]), &params).unwrap(),
            reconcile(&client, &product("Delta B", "Ops", &[]), &params).unwrap(),
        ];
        assert!(matches!(outcomes[0].status, OutcomeStatus::Failed(_)));
        assert_eq!(outcomes[1].status, OutcomeStatus::Created);
        second_get.assert();
        second_create.assert();
    }

    #[test]
    fn test_asynchronous_create_is_awaited() {
        let get = mock("GET", product_path("epsilon-fin").as_str())
            .with_status(404)
            .with_body("{}")
            .create();
        let create = mock("POST", PRODUCTS_PATH)
            .match_query(Matcher::UrlEncoded(
                "dataProductId".into(),
                "epsilon-fin".into(),
            ))
            .with_body(r#"{"name": "projects/acme-analytics/locations/eu/operations/op-epsilon"}"#)
            .create();
        let operation = mock(
            "GET",
            "/projects/acme-analytics/locations/eu/operations/op-epsilon",
        )
        .with_body(
            r#"{"name": "projects/acme-analytics/locations/eu/operations/op-epsilon", "done": true}"#,
        )
        .create();

        let outcome = reconcile(
            &test_client(),
            &product("Epsilon Fin", "Finance", &[]),
            &test_params(),
        )
        .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Created);
        get.assert();
        create.assert();
        operation.assert();
    }

    #[test]
    fn test_asset_association_is_idempotent() {
        let client = test_client();
        let params = test_params();
        let id = DataProductId("zeta-inv".to_owned());

        // First call: asset is absent, exactly one creation.
        let check_absent = mock(
            "GET",
            format!("{}/dataAssets/inv-drugs", product_path("zeta-inv")).as_str(),
        )
        .with_status(404)
        .with_body("{}")
        .expect(1)
        .create();
        let create = mock(
            "POST",
            format!("{}/dataAssets", product_path("zeta-inv")).as_str(),
        )
        .match_query(Matcher::UrlEncoded("dataAssetId".into(), "inv-drugs".into()))
        .match_body(Matcher::Json(serde_json::json!({
            "resource": "//bigquery.googleapis.com/projects/acme-analytics/datasets/inv/tables/drugs"
        })))
        .with_body(r#"{"name": "projects/acme-analytics/locations/eu/dataProducts/zeta-inv/dataAssets/inv-drugs"}"#)
        .expect(1)
        .create();

        let first = ensure_asset(&client, &id, "inv.drugs", &params).unwrap();
        assert_eq!(first.status, AssetStatus::Attached);
        check_absent.assert();
        create.assert();

        // Second call: asset now exists, no further mutation.
        let check_present = mock(
            "GET",
            format!("{}/dataAssets/inv-drugs", product_path("zeta-inv")).as_str(),
        )
        .with_body(r#"{"name": "projects/acme-analytics/locations/eu/dataProducts/zeta-inv/dataAssets/inv-drugs"}"#)
        .expect(1)
        .create();
        let no_create = mock(
            "POST",
            format!("{}/dataAssets", product_path("zeta-inv")).as_str(),
        )
        .expect(0)
        .create();

        let second = ensure_asset(&client, &id, "inv.drugs", &params).unwrap();
        assert_eq!(second.status, AssetStatus::AlreadyAttached);
        check_present.assert();
        no_create.assert();
    }

    #[test]
    fn test_malformed_reference_is_skipped_not_failed() {
        let outcome = ensure_asset(
            &test_client(),
            &DataProductId("eta-inv".to_owned()),
            "missing-dot",
            &test_params(),
        )
        .unwrap();
        assert!(matches!(outcome.status, AssetStatus::Skipped(_)));
    }

    #[test]
    fn test_asset_failure_is_scoped_to_that_asset() {
        let _check = mock(
            "GET",
            format!("{}/dataAssets/inv-stock", product_path("theta-inv")).as_str(),
        )
        .with_status(404)
        .with_body("{}")
        .create();
        let _create = mock(
            "POST",
            format!("{}/dataAssets", product_path("theta-inv")).as_str(),
        )
        .match_query(Matcher::UrlEncoded("dataAssetId".into(), "inv-stock".into()))
        .with_status(400)
        .with_body(r#"{"error": {"message": "invalid resource"}}"#)
        .create();

        let outcome = ensure_asset(
            &test_client(),
            &DataProductId("theta-inv".to_owned()),
            "inv.stock",
            &test_params(),
        )
        .unwrap();
        assert!(matches!(outcome.status, AssetStatus::Failed(_)));
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let client = Client::new(ClientConfig {
            // Nothing listens here; requests fail at the transport layer.
            endpoint: Url::parse("http://127.0.0.1:1").unwrap(),
            token: Token("test-token".to_owned()),
            project: "acme-analytics".to_owned(),
            location: "eu".to_owned(),
            ..Default::default()
        })
        .unwrap();

        let result = reconcile(
            &client,
            &product("Iota Sales", "Sales", &[]),
            &test_params(),
        );
        assert!(result.is_err());
    }
}
