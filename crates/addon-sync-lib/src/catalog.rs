//! # Remote catalog
//!
//! [`CatalogClient`] is the seam to the addon host. [`HttpCatalog`] talks to the
//! real service, tests substitute their own implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::ledger::{ProjectId, VersionId};

pub mod query;
pub use query::{poll_project, BuildDescriptor, CatalogQuery, PollOutcome};

/// The catalog could not be reached or answered with something unusable.
#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("catalog responded with status {0}")]
	Status(u16),
	#[error("malformed catalog response: {0}")]
	Malformed(String),
	#[error("request cancelled")]
	Cancelled,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
	/// Fetches one page of raw build descriptors.
	async fn list_builds(&self, query: &CatalogQuery) -> Result<Vec<serde_json::Value>, CatalogError>;
	/// Fetches the archive of a single build.
	async fn fetch_artifact(&self, project_id: ProjectId, version_id: VersionId) -> Result<Vec<u8>, CatalogError>;
}

/// Catalog client over HTTP.
///
/// The header set is validated once at construction and sent with every request.
pub struct HttpCatalog {
	client: reqwest::Client,
	base_url: String,
}

impl HttpCatalog {
	/// # Errors
	/// - [`InvalidHeader`](crate::Error::InvalidHeader) when a configured header name or value is not valid HTTP.
	/// - [`Reqwest`](crate::Error::Reqwest) when the client can't be built.
	pub fn new(config: &crate::Config) -> crate::Result<Self> {
		let mut headers = HeaderMap::new();
		for (name, value) in config.headers() {
			let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| crate::Error::InvalidHeader(name.clone()))?;
			let value = HeaderValue::from_str(value).map_err(|_| crate::Error::InvalidHeader(name.to_string()))?;
			headers.insert(name, value);
		}

		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.timeout(config.request_timeout())
			.default_headers(headers)
			.build()?;

		let mut base_url = config.catalog_url().to_string();
		if !base_url.ends_with('/') {
			base_url.push('/');
		}

		Ok(Self { client, base_url })
	}
}

#[async_trait]
impl CatalogClient for HttpCatalog {
	async fn list_builds(&self, query: &CatalogQuery) -> Result<Vec<serde_json::Value>, CatalogError> {
		let url = format!("{}{}/files", self.base_url, query.project_id);
		log::debug!("Requesting builds from {}", url);

		let response = self.client.get(&url).query(&query.to_query_pairs()).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(CatalogError::Status(status.as_u16()));
		}

		match response.json::<serde_json::Value>().await? {
			serde_json::Value::Object(mut body) => match body.remove("data") {
				Some(serde_json::Value::Array(rows)) => Ok(rows),
				_ => Err(CatalogError::Malformed("missing `data` array".to_string())),
			},
			_ => Err(CatalogError::Malformed("body is not an object".to_string())),
		}
	}

	async fn fetch_artifact(&self, project_id: ProjectId, version_id: VersionId) -> Result<Vec<u8>, CatalogError> {
		let url = format!("{}{}/files/{}/download", self.base_url, project_id, version_id);
		log::info!("Downloading build {} of project {} from {}", version_id, project_id, url);

		let response = self.client.get(&url).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(CatalogError::Status(status.as_u16()));
		}
		Ok(response.bytes().await?.to_vec())
	}
}
