use std::time::Duration;

use async_trait::async_trait;
use relview_core::catalog::{CatalogBackend, CatalogBackendError};
use relview_core::config::ViewerConfig;
use relview_core::relation::{RelationDescriptor, RelationKind};
use relview_core::rows::{
    Record, RowBackend, RowBackendError, RowPage, RowRequest, SortDirection,
};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const API_PREFIX: [&str; 2] = ["api", "web-viewer"];
const CATALOG_SORT_COLUMN: &str = "Name";

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("invalid API base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
}

/// One page of a paginated API response. Every field may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedEnvelope<T> {
    page: Option<u64>,
    page_size: Option<u64>,
    total: Option<u64>,
    total_pages: Option<u64>,
    items: Option<Vec<T>>,
}

impl<T> PagedEnvelope<T> {
    fn into_parts(self) -> (Vec<T>, u64) {
        (self.items.unwrap_or_default(), self.total.unwrap_or(0))
    }
}

#[derive(Debug, Deserialize)]
struct RelationItem {
    name: String,
    #[serde(default)]
    columns: Option<Vec<String>>,
}

impl RelationItem {
    fn into_descriptor(self, kind: RelationKind) -> RelationDescriptor {
        RelationDescriptor::new(self.name, kind, self.columns.unwrap_or_default())
    }
}

/// Catalog and row fetcher for the web viewer HTTP API.
#[derive(Debug, Clone)]
pub struct HttpViewerBackend {
    client: Client,
    base_url: Url,
    catalog_page_size: usize,
}

impl HttpViewerBackend {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        catalog_page_size: usize,
    ) -> Result<Self, HttpBackendError> {
        let parsed = Url::parse(base_url.trim()).map_err(|error| HttpBackendError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: error.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(HttpBackendError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot carry a path".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpBackendError::Client)?;

        Ok(Self {
            client,
            base_url: parsed,
            catalog_page_size: catalog_page_size.max(1),
        })
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self, HttpBackendError> {
        Self::new(
            &config.api_base_url,
            config.request_timeout(),
            config.catalog_page_size,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn relation_url(&self, kind: RelationKind, id: Option<&str>) -> Result<Url, HttpBackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments =
                url.path_segments_mut()
                    .map_err(|()| HttpBackendError::InvalidBaseUrl {
                        url: self.base_url.to_string(),
                        reason: "url cannot carry a path".to_string(),
                    })?;
            segments.pop_if_empty().extend(API_PREFIX).push(kind.path_segment());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&'static str, String)],
    ) -> Result<PagedEnvelope<T>, HttpBackendError> {
        debug!(%url, ?query, "GET");
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|source| HttpBackendError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpBackendError::Status { status, body });
        }

        let envelope: PagedEnvelope<T> = response
            .json()
            .await
            .map_err(|source| HttpBackendError::Request { url, source })?;
        debug!(
            page = ?envelope.page,
            page_size = ?envelope.page_size,
            total_pages = ?envelope.total_pages,
            "page received"
        );
        Ok(envelope)
    }

    async fn fetch_relations(
        &self,
        kind: RelationKind,
    ) -> Result<Vec<RelationDescriptor>, HttpBackendError> {
        let url = self.relation_url(kind, None)?;
        let query = page_query(
            0,
            self.catalog_page_size,
            Some(CATALOG_SORT_COLUMN),
            SortDirection::Ascending,
        );
        let envelope: PagedEnvelope<RelationItem> = self.get_page(url, &query).await?;
        let (items, _) = envelope.into_parts();
        Ok(items
            .into_iter()
            .map(|item| item.into_descriptor(kind))
            .collect())
    }
}

/// Query parameters for one page. The API counts pages from 1, and sort
/// parameters are only sent for a non-blank column.
#[must_use]
pub fn page_query(
    page_index: usize,
    page_size: usize,
    sort_by: Option<&str>,
    sort_direction: SortDirection,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("page", (page_index + 1).to_string()),
        ("pageSize", page_size.to_string()),
    ];
    if let Some(sort_by) = sort_by.filter(|column| !column.trim().is_empty()) {
        query.push(("sortBy", sort_by.to_string()));
        query.push(("sortDir", sort_direction.as_str().to_string()));
    }
    query
}

#[async_trait]
impl CatalogBackend for HttpViewerBackend {
    async fn fetch_tables(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
        self.fetch_relations(RelationKind::Table)
            .await
            .map_err(to_catalog_error)
    }

    async fn fetch_views(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
        self.fetch_relations(RelationKind::View)
            .await
            .map_err(to_catalog_error)
    }
}

#[async_trait]
impl RowBackend for HttpViewerBackend {
    async fn fetch_rows(&self, request: &RowRequest) -> Result<RowPage, RowBackendError> {
        let url = self
            .relation_url(request.kind, Some(&request.id))
            .map_err(to_row_error)?;
        let query = page_query(
            request.page_index,
            request.page_size,
            request.sort_by.as_deref(),
            request.sort_direction,
        );
        let envelope: PagedEnvelope<Record> =
            self.get_page(url, &query).await.map_err(to_row_error)?;
        let (rows, total_count) = envelope.into_parts();
        Ok(RowPage::new(rows, total_count))
    }
}

fn to_catalog_error(error: HttpBackendError) -> CatalogBackendError {
    CatalogBackendError::new(error.to_string())
}

fn to_row_error(error: HttpBackendError) -> RowBackendError {
    RowBackendError::new(error.to_string())
}
