use async_trait::async_trait;
use futures_util::future::try_join;
use thiserror::Error;

use crate::relation::{RelationDescriptor, RelationKind};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    pub tables: Vec<RelationDescriptor>,
    pub views: Vec<RelationDescriptor>,
}

impl Catalog {
    #[must_use]
    pub fn new(tables: Vec<RelationDescriptor>, views: Vec<RelationDescriptor>) -> Self {
        Self { tables, views }
    }

    #[must_use]
    pub fn relations(&self, kind: RelationKind) -> &[RelationDescriptor] {
        match kind {
            RelationKind::Table => &self.tables,
            RelationKind::View => &self.views,
        }
    }

    #[must_use]
    pub fn find(&self, kind: RelationKind, id: &str) -> Option<&RelationDescriptor> {
        self.relations(kind)
            .iter()
            .find(|relation| relation.id == id)
    }

    #[must_use]
    pub fn contains(&self, relation: &RelationDescriptor) -> bool {
        self.find(relation.kind, &relation.id).is_some()
    }

    #[must_use]
    pub fn first_available(&self) -> Option<&RelationDescriptor> {
        self.tables.first().or_else(|| self.views.first())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.views.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CatalogBackendError {
    message: String,
}

impl CatalogBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn fetch_tables(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError>;
    async fn fetch_views(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError>;
}

pub async fn fetch_catalog<B>(backend: &B) -> Result<Catalog, CatalogBackendError>
where
    B: CatalogBackend + ?Sized,
{
    let (tables, views) = try_join(backend.fetch_tables(), backend.fetch_views()).await?;
    Ok(Catalog { tables, views })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::{fetch_catalog, Catalog, CatalogBackend, CatalogBackendError};
    use crate::relation::{RelationDescriptor, RelationKind};

    #[derive(Debug, Clone, Default)]
    struct FakeCatalogBackend {
        tables: Vec<RelationDescriptor>,
        views: Vec<RelationDescriptor>,
        fail_views: bool,
        fetch_count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl CatalogBackend for FakeCatalogBackend {
        async fn fetch_tables(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
            self.fetch_count.fetch_add(1, Ordering::Relaxed);
            Ok(self.tables.clone())
        }

        async fn fetch_views(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
            self.fetch_count.fetch_add(1, Ordering::Relaxed);
            if self.fail_views {
                return Err(CatalogBackendError::new("views unavailable"));
            }
            Ok(self.views.clone())
        }
    }

    #[tokio::test]
    async fn fetch_catalog_combines_tables_and_views() {
        let fetch_count = Arc::new(AtomicUsize::new(0));
        let backend = FakeCatalogBackend {
            tables: vec![RelationDescriptor::table("orders")],
            views: vec![RelationDescriptor::view("vw_holidays")],
            fetch_count: Arc::clone(&fetch_count),
            ..FakeCatalogBackend::default()
        };

        let catalog = fetch_catalog(&backend)
            .await
            .expect("catalog load should succeed");

        assert_eq!(fetch_count.load(Ordering::Relaxed), 2);
        assert_eq!(catalog.tables.len(), 1);
        assert_eq!(catalog.views.len(), 1);
        assert!(catalog.find(RelationKind::View, "vw_holidays").is_some());
        assert!(catalog.find(RelationKind::Table, "vw_holidays").is_none());
    }

    #[tokio::test]
    async fn fetch_catalog_fails_when_either_list_fails() {
        let backend = FakeCatalogBackend {
            tables: vec![RelationDescriptor::table("orders")],
            fail_views: true,
            ..FakeCatalogBackend::default()
        };

        let err = fetch_catalog(&backend)
            .await
            .expect_err("view failure should fail the catalog load");
        assert_eq!(err.to_string(), "views unavailable");
    }

    #[test]
    fn first_available_prefers_tables_then_views() {
        let both = Catalog::new(
            vec![RelationDescriptor::table("a"), RelationDescriptor::table("b")],
            vec![RelationDescriptor::view("v")],
        );
        assert_eq!(both.first_available().map(|r| r.id.as_str()), Some("a"));

        let views_only = Catalog::new(Vec::new(), vec![RelationDescriptor::view("v")]);
        assert_eq!(
            views_only.first_available().map(|r| r.kind),
            Some(RelationKind::View)
        );

        assert!(Catalog::default().first_available().is_none());
        assert!(Catalog::default().is_empty());
    }
}
