#![deny(clippy::all)]
mod error;
pub mod poll;
pub mod resources;

use log::debug;
use once_cell::sync::Lazy;
use reqwest::{
    blocking::{Client as HttpClient, Response as HttpResponse},
    header::{self, HeaderMap, HeaderValue},
    Method, Proxy, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::resources::{
    api_error,
    data_asset::{DataAsset, NewDataAsset},
    data_product::{DataProduct, NewDataProduct, UPDATE_MASK},
    operation::{MutationResponse, Operation},
};

pub use crate::{
    error::{Error, Result},
    poll::{CancellationToken, PollConfig, Poller},
    resources::{
        data_asset::{DataAsset as Asset, Id as DataAssetId, TableReference},
        data_product::Id as DataProductId,
        operation::OperationStatus,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token(pub String);

pub struct Config {
    pub endpoint: Url,
    pub token: Token,
    /// Cloud project that owns the catalog entries and the referenced tables.
    pub project: String,
    /// Catalog location, e.g. `eu` or `us`. Must match the location of the
    /// referenced assets.
    pub location: String,
    pub accept_invalid_certificates: bool,
    pub proxy: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.clone(),
            token: Token("".to_owned()),
            project: "".to_owned(),
            location: "".to_owned(),
            accept_invalid_certificates: false,
            proxy: None,
        }
    }
}

/// Authenticated transport to the catalog API.
///
/// One method call is one request/response cycle. The bearer credential is
/// attached at construction and reused for the client's lifetime; a
/// credential that expires mid-run surfaces as an [`Error::Api`] rather
/// than being refreshed behind the caller's back. Retry, if desired, is a
/// caller concern.
#[derive(Debug)]
pub struct Client {
    endpoints: Endpoints,
    http_client: HttpClient,
    headers: HeaderMap,
}

#[derive(Serialize)]
struct CreateDataProductQuery<'a> {
    #[serde(rename = "dataProductId")]
    data_product_id: &'a str,
}

#[derive(Serialize)]
struct UpdateDataProductQuery<'a> {
    #[serde(rename = "updateMask")]
    update_mask: &'a str,
}

#[derive(Serialize)]
struct CreateDataAssetQuery<'a> {
    #[serde(rename = "dataAssetId")]
    data_asset_id: &'a str,
}

impl Client {
    /// Create a new API client.
    pub fn new(config: Config) -> Result<Client> {
        let http_client = build_http_client(&config)?;
        let headers = build_headers(&config)?;
        let endpoints = Endpoints::new(config.endpoint, &config.project, &config.location)?;
        Ok(Client {
            endpoints,
            http_client,
            headers,
        })
    }

    /// Get the base url for the client
    pub fn base_url(&self) -> &Url {
        &self.endpoints.base
    }

    /// Look up a data product by id. `Ok(None)` means the catalog has no
    /// such entry; any other non-2xx status is an error.
    pub fn get_data_product(&self, id: &DataProductId) -> Result<Option<DataProduct>> {
        self.get_opt(self.endpoints.data_product(id)?)
    }

    /// Create a data product under the given id.
    pub fn create_data_product(
        &self,
        id: &DataProductId,
        data_product: &NewDataProduct,
    ) -> Result<MutationResponse> {
        self.request(
            Method::POST,
            self.endpoints.data_products.clone(),
            &Some(data_product),
            &Some(CreateDataProductQuery {
                data_product_id: &id.0,
            }),
        )
    }

    /// Overwrite the mutable fields of an existing data product.
    pub fn update_data_product(
        &self,
        id: &DataProductId,
        data_product: &NewDataProduct,
    ) -> Result<MutationResponse> {
        self.request(
            Method::PATCH,
            self.endpoints.data_product(id)?,
            &Some(data_product),
            &Some(UpdateDataProductQuery {
                update_mask: UPDATE_MASK,
            }),
        )
    }

    /// Look up an asset attached to a data product.
    pub fn get_data_asset(
        &self,
        data_product_id: &DataProductId,
        asset_id: &DataAssetId,
    ) -> Result<Option<DataAsset>> {
        self.get_opt(self.endpoints.data_asset(data_product_id, asset_id)?)
    }

    /// Attach an asset to a data product under the given id.
    pub fn create_data_asset(
        &self,
        data_product_id: &DataProductId,
        asset_id: &DataAssetId,
        asset: &NewDataAsset,
    ) -> Result<MutationResponse> {
        self.request(
            Method::POST,
            self.endpoints.data_assets(data_product_id)?,
            &Some(asset),
            &Some(CreateDataAssetQuery {
                data_asset_id: &asset_id.0,
            }),
        )
    }

    /// Fetch the current state of a long-running operation.
    pub fn get_operation(&self, name: &str) -> Result<Operation> {
        self.get(self.endpoints.operation(name)?)
    }

    /// Block until the named operation reaches a terminal state.
    pub fn wait_for_operation(&self, name: &str, poller: &Poller) -> Result<Operation> {
        debug!("Waiting for operation `{name}` to complete");
        poller.wait(name, || self.get_operation(name))
    }

    fn get<SuccessT>(&self, url: Url) -> Result<SuccessT>
    where
        for<'de> SuccessT: Deserialize<'de>,
    {
        self.request(Method::GET, url, &None::<()>, &None::<()>)
    }

    fn get_opt<SuccessT>(&self, url: Url) -> Result<Option<SuccessT>>
    where
        for<'de> SuccessT: Deserialize<'de>,
    {
        let http_response = self.raw_request(&Method::GET, url, &None::<()>, &None::<()>)?;
        if http_response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        into_result(http_response).map(Some)
    }

    fn request<RequestT, SuccessT, QueryT>(
        &self,
        method: Method,
        url: Url,
        body: &Option<RequestT>,
        query: &Option<QueryT>,
    ) -> Result<SuccessT>
    where
        RequestT: Serialize,
        QueryT: Serialize,
        for<'de> SuccessT: Deserialize<'de>,
    {
        let http_response = self.raw_request(&method, url, body, query)?;
        into_result(http_response)
    }

    fn raw_request<RequestT, QueryT>(
        &self,
        method: &Method,
        url: Url,
        body: &Option<RequestT>,
        query: &Option<QueryT>,
    ) -> Result<HttpResponse>
    where
        RequestT: Serialize,
        QueryT: Serialize,
    {
        debug!("Attempting {method} `{url}`");
        let request = self
            .http_client
            .request(method.clone(), url)
            .headers(self.headers.clone());
        let request = match &query {
            Some(query) => request.query(query),
            None => request,
        };
        let request = match &body {
            Some(body) => request.json(body),
            None => request,
        };
        request.send().map_err(|source| Error::ReqwestError {
            source,
            message: format!("{method} operation failed."),
        })
    }
}

fn into_result<SuccessT>(http_response: HttpResponse) -> Result<SuccessT>
where
    for<'de> SuccessT: Deserialize<'de>,
{
    let status = http_response.status();
    if status.is_success() {
        http_response
            .json::<SuccessT>()
            .map_err(Error::BadJsonResponse)
    } else {
        let body = http_response.text().unwrap_or_default();
        Err(api_error(status, &body))
    }
}

#[derive(Debug)]
struct Endpoints {
    base: Url,
    data_products: Url,
}

impl Endpoints {
    fn new(base: Url, project: &str, location: &str) -> Result<Self> {
        let data_products = construct_endpoint(
            &base,
            &["projects", project, "locations", location, "dataProducts"],
        )?;
        Ok(Endpoints {
            base,
            data_products,
        })
    }

    fn data_product(&self, id: &DataProductId) -> Result<Url> {
        construct_endpoint(&self.data_products, &[&id.0])
    }

    fn data_assets(&self, id: &DataProductId) -> Result<Url> {
        construct_endpoint(&self.data_products, &[&id.0, "dataAssets"])
    }

    fn data_asset(&self, id: &DataProductId, asset_id: &DataAssetId) -> Result<Url> {
        construct_endpoint(&self.data_products, &[&id.0, "dataAssets", &asset_id.0])
    }

    /// Operation names are server-issued resource paths, e.g.
    /// `projects/{p}/locations/{l}/operations/{id}`, resolved relative to
    /// the API base.
    fn operation(&self, name: &str) -> Result<Url> {
        construct_endpoint(&self.base, &name.split('/').collect::<Vec<_>>())
    }
}

fn construct_endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut endpoint = base.clone();

    let mut endpoint_segments = endpoint.path_segments_mut().map_err(|_| Error::BadEndpoint {
        endpoint: base.clone(),
    })?;

    for segment in segments {
        endpoint_segments.push(segment);
    }

    drop(endpoint_segments);

    Ok(endpoint)
}

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 120;

fn build_http_client(config: &Config) -> Result<HttpClient> {
    let mut builder = HttpClient::builder()
        .gzip(true)
        .danger_accept_invalid_certs(config.accept_invalid_certificates)
        .timeout(Some(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS)));

    if let Some(proxy) = config.proxy.clone() {
        builder = builder.proxy(Proxy::all(proxy).map_err(Error::BuildHttpClient)?);
    }
    builder.build().map_err(Error::BuildHttpClient)
}

fn build_headers(config: &Config) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", &config.token.0)).map_err(|_| {
            Error::BadToken {
                token: config.token.0.clone(),
            }
        })?,
    );
    Ok(headers)
}

pub static DEFAULT_ENDPOINT: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://dataplex.googleapis.com/v1").expect("Default URL is well-formed")
});
