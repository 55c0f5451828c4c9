mod render;
mod shell;

use std::io;
use std::path::PathBuf;

use relview_adapters::http::HttpViewerBackend;
use relview_adapters::hub::WebSocketHubTransport;
use relview_core::catalog::CatalogBackend;
use relview_core::config::{ConfigError, FileConfigStore};
use relview_core::controller::SelectionController;
use relview_core::listener::{HubTransport, NotificationListener, RelationEvent};
use relview_core::notifier::{Notifier, TracingNotifier};
use relview_core::rows::RowBackend;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::shell::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseOutcome {
    Options,
    HelpRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AppOptions {
    config_path: Option<PathBuf>,
    api_base_url: Option<String>,
    hub_url: Option<String>,
    save_config: bool,
    hub: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            api_base_url: None,
            hub_url: None,
            save_config: false,
            hub: true,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut options = AppOptions::default();
    if parse_args_from(std::env::args().skip(1), &mut options)? == ParseOutcome::HelpRequested {
        print_help();
        return Ok(());
    }

    let mut store = match &options.config_path {
        Some(path) => FileConfigStore::load_from_path(path)?,
        None => FileConfigStore::load_default()?,
    };
    info!(path = %store.path().display(), "loaded configuration");
    apply_config_overrides(&mut store, &options)?;
    let config = store.config().clone();

    let backend = HttpViewerBackend::from_config(&config)?;
    let mut controller =
        SelectionController::new(backend, TracingNotifier, config.default_page_size);

    let mut listener = NotificationListener::new(config.reconnect_policy());
    let transport = options
        .hub
        .then(|| WebSocketHubTransport::new(config.hub_url.clone()));
    let mut hub_events =
        start_session(&mut controller, &mut listener, transport, |view| println!("{view}")).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        println!("{}", shell::execute(&mut controller, command).await);
                    }
                    Err(error) => println!("{error}"),
                }
            }
            Some(event) = controller.next_event() => controller.handle(event),
            event = next_hub_event(&mut hub_events) => match event {
                Some(event) => {
                    controller.on_relation_event(event);
                    controller.settle().await;
                    println!("{}", render::render_view(&controller));
                }
                None => {
                    warn!("notification hub stream ended; live updates are disabled");
                    hub_events = None;
                }
            },
        }
    }

    listener.disconnect().await?;
    Ok(())
}

/// Loads the catalog and emits the first view before the hub is contacted.
async fn start_session<B, N, T>(
    controller: &mut SelectionController<B, N>,
    listener: &mut NotificationListener,
    transport: Option<T>,
    mut emit: impl FnMut(String),
) -> Option<mpsc::UnboundedReceiver<RelationEvent>>
where
    B: CatalogBackend + RowBackend + 'static,
    N: Notifier,
    T: HubTransport + 'static,
{
    controller.initialize();
    controller.settle().await;
    emit(render::render_view(controller));

    let transport = transport?;
    match listener.connect(transport).await {
        Ok(events) => Some(events),
        Err(error) => {
            warn!(%error, "live updates are disabled");
            None
        }
    }
}

async fn next_hub_event(
    events: &mut Option<mpsc::UnboundedReceiver<RelationEvent>>,
) -> Option<RelationEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn parse_args_from(
    args: impl IntoIterator<Item = String>,
    options: &mut AppOptions,
) -> io::Result<ParseOutcome> {
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-h" | "--help" => return Ok(ParseOutcome::HelpRequested),
            "--config" => {
                options.config_path = Some(PathBuf::from(next_value(&mut args, "--config")?));
            }
            "--api-url" => options.api_base_url = Some(next_value(&mut args, "--api-url")?),
            "--hub-url" => options.hub_url = Some(next_value(&mut args, "--hub-url")?),
            "--save-config" => options.save_config = true,
            "--no-hub" => options.hub = false,
            _ => {
                return Err(io_other(format!("unknown argument `{flag}`")));
            }
        }
    }

    Ok(ParseOutcome::Options)
}

fn apply_config_overrides(
    store: &mut FileConfigStore,
    options: &AppOptions,
) -> Result<(), ConfigError> {
    let mut config = store.config().clone();
    if let Some(url) = &options.api_base_url {
        config.api_base_url.clone_from(url);
    }
    if let Some(url) = &options.hub_url {
        config.hub_url.clone_from(url);
    }
    store.set_config(config);

    if options.save_config {
        store.persist()?;
        info!(path = %store.path().display(), "saved configuration");
    }
    Ok(())
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> io::Result<String> {
    args.next()
        .ok_or_else(|| io_other(format!("missing value for `{flag}`")))
}

fn print_help() {
    println!(
        "relview: browse the tables and views of a web viewer API\n\n\
Usage:\n  relview-app [OPTIONS]\n\n\
Options:\n  --config <path>   Config file (default: $RELVIEW_CONFIG_DIR/relview/config.toml or the platform config dir)\n  --api-url <url>   Web viewer API base URL for this run\n  --hub-url <url>   Notification hub URL for this run\n  --save-config     Write the effective settings back to the config file\n  --no-hub          Do not subscribe to live create/delete notifications\n  -h, --help        Show this help\n\n\
Environment:\n  RUST_LOG controls log output (default: info).\n\n{}",
        shell::HELP
    );
}

fn io_other(error: impl std::fmt::Display) -> io::Error {
    io::Error::other(error.to_string())
}
