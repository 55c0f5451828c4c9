use relview_core::catalog::CatalogBackend;
use relview_core::controller::SelectionController;
use relview_core::notifier::Notifier;
use relview_core::relation::RelationKind;
use relview_core::rows::{RowBackend, SortDirection};
use thiserror::Error;

use crate::render;

pub const HELP: &str = "\
Commands:
  tables                       List tables
  views                        List views
  select <table|view> <name>   Select a relation and show its first page
  page <number> [size]         Go to a page (numbered from 1), optionally resizing it
  next | prev                  Move one page forward or back
  sort <column> [asc|desc]     Sort by a column (ascending by default)
  unsort                       Clear the sort
  show                         Show the current page again
  help                         Show this help
  quit                         Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tables,
    Views,
    Select { kind: RelationKind, name: String },
    Page { index: usize, size: Option<usize> },
    Next,
    Prev,
    Sort {
        column: String,
        direction: SortDirection,
    },
    Unsort,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`; type `help` for a list of commands")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a table or view")]
    InvalidKind(String),
    #[error("`{0}` is not a positive number")]
    InvalidNumber(String),
    #[error("`{0}` is not a sort direction; use asc or desc")]
    InvalidDirection(String),
}

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        let Some(word) = line.split_whitespace().next() else {
            return Ok(None);
        };
        let rest = line[word.len()..].trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word.to_ascii_lowercase().as_str() {
            "tables" => Self::Tables,
            "views" => Self::Views,
            "select" => {
                let usage = "select <table|view> <name>";
                let Some(kind_arg) = args.first() else {
                    return Err(CommandError::Usage(usage));
                };
                let kind = RelationKind::parse(kind_arg)
                    .ok_or_else(|| CommandError::InvalidKind((*kind_arg).to_string()))?;
                let name = rest[kind_arg.len()..].trim();
                if name.is_empty() {
                    return Err(CommandError::Usage(usage));
                }
                Self::Select {
                    kind,
                    name: name.to_string(),
                }
            }
            "page" => {
                let usage = "page <number> [size]";
                let (number, size) = match args.as_slice() {
                    [number] => (parse_positive(number)?, None),
                    [number, size] => (parse_positive(number)?, Some(parse_positive(size)?)),
                    _ => return Err(CommandError::Usage(usage)),
                };
                Self::Page {
                    index: number - 1,
                    size,
                }
            }
            "next" => Self::Next,
            "prev" => Self::Prev,
            "sort" => {
                let usage = "sort <column> [asc|desc]";
                let (column, direction) = match args.as_slice() {
                    [column] => (*column, SortDirection::Ascending),
                    [column, direction] => (
                        *column,
                        SortDirection::parse(direction)
                            .ok_or_else(|| CommandError::InvalidDirection((*direction).to_string()))?,
                    ),
                    _ => return Err(CommandError::Usage(usage)),
                };
                Self::Sort {
                    column: column.to_string(),
                    direction,
                }
            }
            "unsort" => Self::Unsort,
            "show" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => return Err(CommandError::Unknown(word.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_positive(raw: &str) -> Result<usize, CommandError> {
    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CommandError::InvalidNumber(raw.to_string())),
    }
}

/// Applies a command, waits for the fetches it triggered and returns the
/// text to print.
pub async fn execute<B, N>(controller: &mut SelectionController<B, N>, command: Command) -> String
where
    B: CatalogBackend + RowBackend + 'static,
    N: Notifier,
{
    match command {
        Command::Tables => return render::render_relations("Tables", controller.tables()),
        Command::Views => return render::render_relations("Views", controller.views()),
        Command::Help => return HELP.to_string(),
        Command::Quit | Command::Show => {}
        Command::Select { kind, name } => controller.select_by_id(kind, &name),
        Command::Page { index, size } => {
            let size = size.unwrap_or(controller.paging().page_size);
            controller.page(index, size);
        }
        Command::Next => {
            let paging = controller.paging();
            let page_count = paging.page_count(controller.row_page().total_count);
            let (page_index, page_size) = (paging.page_index, paging.page_size);
            if (page_index as u64) + 1 >= page_count {
                return "Already on the last page.".to_string();
            }
            controller.page(page_index + 1, page_size);
        }
        Command::Prev => {
            let paging = controller.paging();
            let (page_index, page_size) = (paging.page_index, paging.page_size);
            if page_index == 0 {
                return "Already on the first page.".to_string();
            }
            controller.page(page_index - 1, page_size);
        }
        Command::Sort { column, direction } => controller.sort(&column, Some(direction)),
        Command::Unsort => controller.sort("", None),
    }

    controller.settle().await;
    render::render_view(controller)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use relview_core::catalog::{CatalogBackend, CatalogBackendError};
    use relview_core::controller::SelectionController;
    use relview_core::notifier::TracingNotifier;
    use relview_core::relation::{RelationDescriptor, RelationKind};
    use relview_core::rows::{
        Record, RowBackend, RowBackendError, RowPage, RowRequest, SortDirection,
    };
    use serde_json::json;

    use super::{execute, Command, CommandError};

    #[derive(Debug, Clone, Default)]
    struct FakeBackend {
        requests: Arc<Mutex<Vec<RowRequest>>>,
    }

    impl FakeBackend {
        fn last_request(&self) -> RowRequest {
            self.requests
                .lock()
                .expect("requests lock")
                .last()
                .cloned()
                .expect("a row request")
        }
    }

    #[async_trait::async_trait]
    impl CatalogBackend for FakeBackend {
        async fn fetch_tables(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
            Ok(vec![
                RelationDescriptor::table("orders"),
                RelationDescriptor::table("order items"),
            ])
        }

        async fn fetch_views(&self) -> Result<Vec<RelationDescriptor>, CatalogBackendError> {
            Ok(vec![RelationDescriptor::view("vw_totals")])
        }
    }

    #[async_trait::async_trait]
    impl RowBackend for FakeBackend {
        async fn fetch_rows(&self, request: &RowRequest) -> Result<RowPage, RowBackendError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            let row: Record = json!({"id": request.page_index + 1, "name": request.id})
                .as_object()
                .cloned()
                .expect("object");
            Ok(RowPage::new(vec![row], 25))
        }
    }

    fn parse(line: &str) -> Command {
        Command::parse(line)
            .expect("command should parse")
            .expect("line is not blank")
    }

    #[test]
    fn parse_recognizes_simple_commands() {
        assert_eq!(parse("tables"), Command::Tables);
        assert_eq!(parse("  VIEWS "), Command::Views);
        assert_eq!(parse("next"), Command::Next);
        assert_eq!(parse("exit"), Command::Quit);
        assert_eq!(Command::parse("   ").expect("blank line"), None);
    }

    #[test]
    fn parse_select_keeps_names_with_spaces() {
        assert_eq!(
            parse("select table order items"),
            Command::Select {
                kind: RelationKind::Table,
                name: "order items".to_string()
            }
        );
        assert_eq!(
            Command::parse("select index ix_orders"),
            Err(CommandError::InvalidKind("index".to_string()))
        );
        assert!(matches!(
            Command::parse("select view"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn parse_page_numbers_from_one() {
        assert_eq!(parse("page 1"), Command::Page { index: 0, size: None });
        assert_eq!(
            parse("page 3 50"),
            Command::Page {
                index: 2,
                size: Some(50)
            }
        );
        assert_eq!(
            Command::parse("page 0"),
            Err(CommandError::InvalidNumber("0".to_string()))
        );
    }

    #[test]
    fn parse_sort_defaults_to_ascending() {
        assert_eq!(
            parse("sort total"),
            Command::Sort {
                column: "total".to_string(),
                direction: SortDirection::Ascending
            }
        );
        assert_eq!(
            parse("sort total DESC"),
            Command::Sort {
                column: "total".to_string(),
                direction: SortDirection::Descending
            }
        );
        assert_eq!(
            Command::parse("sort total sideways"),
            Err(CommandError::InvalidDirection("sideways".to_string()))
        );
    }

    #[test]
    fn parse_rejects_unknown_commands() {
        assert_eq!(
            Command::parse("drop table orders"),
            Err(CommandError::Unknown("drop".to_string()))
        );
    }

    #[tokio::test]
    async fn execute_drives_paging_and_selection() {
        let backend = FakeBackend::default();
        let mut controller = SelectionController::new(backend.clone(), TracingNotifier, 10);
        controller.initialize();
        controller.settle().await;

        let output = execute(&mut controller, parse("next")).await;
        assert!(output.contains("page 2/3"), "unexpected output:\n{output}");
        assert_eq!(backend.last_request().page_index, 1);

        execute(&mut controller, parse("next")).await;
        let output = execute(&mut controller, parse("next")).await;
        assert_eq!(output, "Already on the last page.");

        execute(&mut controller, parse("sort name desc")).await;
        let request = backend.last_request();
        assert_eq!(request.page_index, 0);
        assert_eq!(request.sort_by.as_deref(), Some("name"));
        assert_eq!(request.sort_direction, SortDirection::Descending);

        let output = execute(&mut controller, parse("prev")).await;
        assert_eq!(output, "Already on the first page.");

        execute(&mut controller, parse("select table order items")).await;
        let request = backend.last_request();
        assert_eq!(request.id, "order items");
        assert_eq!(request.sort_by, None);

        let output = execute(&mut controller, parse("views")).await;
        assert!(output.contains("vw_totals"));
    }
}
