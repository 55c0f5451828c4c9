use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::catalog::{fetch_catalog, Catalog, CatalogBackend, CatalogBackendError};
use crate::columns::resolve_columns;
use crate::listener::RelationEvent;
use crate::notifier::{Notice, Notifier};
use crate::relation::{RelationDescriptor, RelationKind, RelationRef};
use crate::request_line::{RequestLine, RequestTicket};
use crate::rows::{PagingState, RowBackend, RowBackendError, RowPage, RowRequest, SortDirection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIntent {
    Initial,
    Select(RelationRef),
    PreserveOrClear {
        previous: Option<RelationDescriptor>,
        deleted: RelationRef,
    },
}

#[derive(Debug)]
pub enum ControllerEvent {
    CatalogLoaded {
        intent: CatalogIntent,
        result: Result<Catalog, CatalogBackendError>,
    },
    RowsLoaded {
        ticket: RequestTicket,
        result: Result<RowPage, RowBackendError>,
    },
    Relation(RelationEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Uninitialized,
    CatalogLoading,
    Idle,
    RowsLoading,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("failed to load tables and views: {0}")]
    CatalogLoad(#[source] CatalogBackendError),
    #[error("failed to load rows: {0}")]
    RowLoad(#[source] RowBackendError),
}

pub struct SelectionController<B, N> {
    backend: Arc<B>,
    notifier: N,
    default_page_size: usize,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    initialized: bool,
    initial_load_pending: bool,
    pending_catalog_loads: usize,
    catalog: Catalog,
    selection: Option<RelationDescriptor>,
    paging: PagingState,
    page: RowPage,
    columns: Vec<String>,
    loading_rows: bool,
    rows_line: RequestLine,
    last_error: Option<ControllerError>,
}

impl<B, N> SelectionController<B, N>
where
    B: CatalogBackend + RowBackend + 'static,
    N: Notifier,
{
    #[must_use]
    pub fn new(backend: B, notifier: N, default_page_size: usize) -> Self {
        let default_page_size = default_page_size.max(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend: Arc::new(backend),
            notifier,
            default_page_size,
            events_tx,
            events_rx,
            initialized: false,
            initial_load_pending: false,
            pending_catalog_loads: 0,
            catalog: Catalog::default(),
            selection: None,
            paging: PagingState::new(default_page_size),
            page: RowPage::default(),
            columns: Vec::new(),
            loading_rows: false,
            rows_line: RequestLine::new(),
            last_error: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ControllerPhase {
        if !self.initialized {
            ControllerPhase::Uninitialized
        } else if self.initial_load_pending {
            ControllerPhase::CatalogLoading
        } else if self.rows_line.in_flight() {
            ControllerPhase::RowsLoading
        } else {
            ControllerPhase::Idle
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn tables(&self) -> &[RelationDescriptor] {
        &self.catalog.tables
    }

    #[must_use]
    pub fn views(&self) -> &[RelationDescriptor] {
        &self.catalog.views
    }

    #[must_use]
    pub fn selection(&self) -> Option<&RelationDescriptor> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn paging(&self) -> &PagingState {
        &self.paging
    }

    #[must_use]
    pub fn row_page(&self) -> &RowPage {
        &self.page
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn is_loading_rows(&self) -> bool {
        self.loading_rows
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ControllerError> {
        self.last_error.as_ref()
    }

    pub fn initialize(&mut self) {
        self.initialized = true;
        self.initial_load_pending = true;
        self.loading_rows = true;
        self.spawn_catalog_load(CatalogIntent::Initial);
    }

    pub fn reload_catalog(&mut self, intent: CatalogIntent) {
        self.spawn_catalog_load(intent);
    }

    pub fn select_relation(&mut self, relation: RelationDescriptor) {
        if self
            .selection
            .as_ref()
            .is_some_and(|current| current.matches(&relation))
        {
            return;
        }

        debug!(kind = %relation.kind, id = %relation.id, "selecting relation");
        self.paging = PagingState::new(self.default_page_size);
        self.columns.clone_from(&relation.columns);
        self.selection = Some(relation);
        self.load_rows();
    }

    pub fn select_by_id(&mut self, kind: RelationKind, id: &str) {
        match self.catalog.find(kind, id).cloned() {
            Some(relation) => self.select_relation(relation),
            None => self
                .notifier
                .notify(Notice::relation_not_found(&RelationRef::new(kind, id))),
        }
    }

    pub fn page(&mut self, page_index: usize, page_size: usize) {
        self.paging.page_index = page_index;
        if page_size > 0 {
            self.paging.page_size = page_size;
        }
        self.load_rows();
    }

    pub fn sort(&mut self, column: &str, direction: Option<SortDirection>) {
        let column = column.trim();
        match direction {
            Some(direction) if !column.is_empty() => {
                self.paging.sort_by = Some(column.to_string());
                self.paging.sort_direction = direction;
            }
            _ => {
                self.paging.sort_by = None;
                self.paging.sort_direction = SortDirection::Ascending;
            }
        }
        self.paging.page_index = 0;
        self.load_rows();
    }

    pub fn on_relation_event(&mut self, event: RelationEvent) {
        match event {
            RelationEvent::Created(target) => {
                self.notifier.notify(Notice::relation_created(&target));
                self.reload_catalog(CatalogIntent::Select(target));
            }
            RelationEvent::Deleted(target) => {
                self.notifier.notify(Notice::relation_deleted(&target));
                self.reload_catalog(CatalogIntent::PreserveOrClear {
                    previous: self.selection.clone(),
                    deleted: target,
                });
            }
        }
    }

    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    pub async fn settle(&mut self) {
        while self.has_pending_work() {
            let Some(event) = self.events_rx.recv().await else {
                return;
            };
            self.handle(event);
        }
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.pending_catalog_loads > 0 || self.rows_line.in_flight()
    }

    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::CatalogLoaded { intent, result } => {
                self.pending_catalog_loads = self.pending_catalog_loads.saturating_sub(1);
                self.apply_catalog(intent, result);
            }
            ControllerEvent::RowsLoaded { ticket, result } => self.apply_rows(ticket, result),
            ControllerEvent::Relation(event) => self.on_relation_event(event),
        }
    }

    fn spawn_catalog_load(&mut self, intent: CatalogIntent) {
        self.pending_catalog_loads += 1;
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        debug!(?intent, "loading tables and views");
        tokio::spawn(async move {
            let result = fetch_catalog(backend.as_ref()).await;
            let _ = events.send(ControllerEvent::CatalogLoaded { intent, result });
        });
    }

    fn load_rows(&mut self) {
        let Some(relation) = &self.selection else {
            return;
        };

        let request = RowRequest::for_selection(relation, &self.paging);
        debug!(
            kind = %request.kind,
            id = %request.id,
            page_index = request.page_index,
            page_size = request.page_size,
            "loading rows"
        );
        self.loading_rows = true;

        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        self.rows_line.start(move |ticket| {
            tokio::spawn(async move {
                let result = backend.fetch_rows(&request).await;
                let _ = events.send(ControllerEvent::RowsLoaded { ticket, result });
            })
        });
    }

    fn apply_catalog(&mut self, intent: CatalogIntent, result: Result<Catalog, CatalogBackendError>) {
        let catalog = match result {
            Ok(catalog) => catalog,
            Err(error) => {
                self.on_catalog_failure(&intent, error);
                return;
            }
        };

        self.replace_catalog(catalog);
        match intent {
            CatalogIntent::Initial => {
                self.initial_load_pending = false;
                let listed = self
                    .selection
                    .as_ref()
                    .is_some_and(|current| self.catalog.contains(current));
                if listed {
                    self.loading_rows = self.rows_line.in_flight();
                } else {
                    self.clear_selection();
                    if let Some(relation) = self.catalog.first_available().cloned() {
                        self.select_relation(relation);
                    }
                }
            }
            CatalogIntent::Select(target) => {
                match self.catalog.find(target.kind, &target.name).cloned() {
                    Some(relation) => self.select_relation(relation),
                    None => {
                        self.clear_selection();
                        self.notifier.notify(Notice::relation_not_found(&target));
                    }
                }
            }
            CatalogIntent::PreserveOrClear { previous, deleted } => {
                // The selection may have moved on since the snapshot was taken.
                let previous = match previous {
                    Some(snapshot)
                        if self
                            .selection
                            .as_ref()
                            .is_some_and(|current| current.matches(&snapshot)) =>
                    {
                        Some(snapshot)
                    }
                    _ => self.selection.clone(),
                };

                let survivor = previous
                    .filter(|relation| !relation.refers_to(&deleted))
                    .and_then(|relation| self.catalog.find(relation.kind, &relation.id).cloned());

                match survivor {
                    Some(relation) => {
                        self.columns.clone_from(&relation.columns);
                        self.selection = Some(relation);
                        self.load_rows();
                    }
                    None => self.clear_selection(),
                }
            }
        }
    }

    fn on_catalog_failure(&mut self, intent: &CatalogIntent, error: CatalogBackendError) {
        warn!(%error, "catalog load failed");
        if matches!(intent, CatalogIntent::Initial) {
            self.initial_load_pending = false;
            self.catalog = Catalog::default();
            self.clear_selection();
            self.notifier
                .notify(Notice::error("Failed to load tables and views."));
        } else {
            self.notifier
                .notify(Notice::error("Failed to refresh tables and views."));
        }
        self.last_error = Some(ControllerError::CatalogLoad(error));
    }

    fn replace_catalog(&mut self, catalog: Catalog) {
        self.catalog = catalog;
        if matches!(self.last_error, Some(ControllerError::CatalogLoad(_))) {
            self.last_error = None;
        }
        if let Some(current) = &self.selection {
            if let Some(fresh) = self.catalog.find(current.kind, &current.id) {
                self.selection = Some(fresh.clone());
            }
        }
    }

    fn clear_selection(&mut self) {
        self.rows_line.cancel();
        self.selection = None;
        self.columns.clear();
        self.page = RowPage::default();
        self.loading_rows = false;
    }

    fn apply_rows(&mut self, ticket: RequestTicket, result: Result<RowPage, RowBackendError>) {
        if !self.rows_line.complete(ticket) {
            debug!(generation = ticket.generation(), "discarding stale row page");
            return;
        }
        self.loading_rows = false;

        match result {
            Ok(page) => {
                let declared = self
                    .selection
                    .as_ref()
                    .map(|relation| relation.columns.as_slice())
                    .unwrap_or_default();
                self.columns = resolve_columns(&page.rows, declared);
                self.page = page;
                if matches!(self.last_error, Some(ControllerError::RowLoad(_))) {
                    self.last_error = None;
                }
            }
            Err(error) => {
                warn!(%error, "row load failed");
                self.page = RowPage::default();
                self.notifier.notify(Notice::error("Failed to load rows."));
                self.last_error = Some(ControllerError::RowLoad(error));
            }
        }
    }
}
