use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::relation::{RelationDescriptor, RelationKind};

pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowPage {
    pub rows: Vec<Record>,
    pub total_count: u64,
}

impl RowPage {
    #[must_use]
    pub fn new(rows: Vec<Record>, total_count: u64) -> Self {
        Self { rows, total_count }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingState {
    pub page_index: usize,
    pub page_size: usize,
    pub sort_by: Option<String>,
    pub sort_direction: SortDirection,
}

impl PagingState {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            sort_by: None,
            sort_direction: SortDirection::Ascending,
        }
    }

    #[must_use]
    pub fn page_count(&self, total_count: u64) -> u64 {
        total_count.div_ceil(self.page_size as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRequest {
    pub kind: RelationKind,
    pub id: String,
    pub page_index: usize,
    pub page_size: usize,
    pub sort_by: Option<String>,
    pub sort_direction: SortDirection,
}

impl RowRequest {
    #[must_use]
    pub fn for_selection(relation: &RelationDescriptor, paging: &PagingState) -> Self {
        Self {
            kind: relation.kind,
            id: relation.id.clone(),
            page_index: paging.page_index,
            page_size: paging.page_size,
            sort_by: paging.sort_by.clone(),
            sort_direction: paging.sort_direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RowBackendError {
    message: String,
}

impl RowBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait RowBackend: Send + Sync {
    async fn fetch_rows(&self, request: &RowRequest) -> Result<RowPage, RowBackendError>;
}
