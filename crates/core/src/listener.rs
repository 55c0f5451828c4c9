use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::relation::{RelationKind, RelationRef};

pub const CREATE_RELATION_TARGET: &str = "CreateRelation";
pub const DELETE_RELATION_TARGET: &str = "DeleteRelation";

#[derive(Debug, Clone, PartialEq)]
pub struct HubInvocation {
    pub target: String,
    pub arguments: Vec<Value>,
}

impl HubInvocation {
    #[must_use]
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEvent {
    Created(RelationRef),
    Deleted(RelationRef),
}

impl RelationEvent {
    #[must_use]
    pub fn from_invocation(invocation: &HubInvocation) -> Option<Self> {
        let target = relation_ref_from_payload(invocation.arguments.first()?)?;
        match invocation.target.as_str() {
            CREATE_RELATION_TARGET => Some(Self::Created(target)),
            DELETE_RELATION_TARGET => Some(Self::Deleted(target)),
            _ => None,
        }
    }

    #[must_use]
    pub fn target(&self) -> &RelationRef {
        match self {
            Self::Created(target) | Self::Deleted(target) => target,
        }
    }
}

fn relation_ref_from_payload(payload: &Value) -> Option<RelationRef> {
    let kind = RelationKind::parse(&payload_text(payload.get("type")))?;
    let name = payload_text(payload.get("name"));
    if name.is_empty() {
        return None;
    }
    Some(RelationRef::new(kind, name))
}

fn payload_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HubTransportError {
    message: String,
}

impl HubTransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait HubTransport: Send {
    async fn open(&mut self) -> Result<(), HubTransportError>;

    /// Next invocation pushed by the hub. `Ok(None)` means the hub closed the
    /// connection for good; errors mean it was lost and may be reopened.
    async fn next_invocation(&mut self) -> Result<Option<HubInvocation>, HubTransportError>;

    async fn close(&mut self) -> Result<(), HubTransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    #[must_use]
    pub fn never() -> Self {
        Self { delays: Vec::new() }
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connected,
    Reconnecting,
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("notification listener is already connected")]
    AlreadyConnected,
    #[error("hub transport failed: {0}")]
    Transport(#[source] HubTransportError),
}

#[derive(Debug)]
struct ActiveListener {
    shutdown: oneshot::Sender<()>,
    state: watch::Receiver<ListenerState>,
    task: JoinHandle<Result<(), HubTransportError>>,
}

#[derive(Debug, Default)]
pub struct NotificationListener {
    policy: ReconnectPolicy,
    active: Option<ActiveListener>,
}

impl NotificationListener {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            active: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> ListenerState {
        self.active
            .as_ref()
            .map_or(ListenerState::Disconnected, |active| *active.state.borrow())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() != ListenerState::Disconnected
    }

    pub async fn connect<T>(
        &mut self,
        mut transport: T,
    ) -> Result<mpsc::UnboundedReceiver<RelationEvent>, ListenerError>
    where
        T: HubTransport + 'static,
    {
        if self.is_connected() {
            return Err(ListenerError::AlreadyConnected);
        }
        // A listener that gave up reconnecting leaves a finished task behind.
        self.active = None;

        transport.open().await.map_err(ListenerError::Transport)?;
        info!("connected to notification hub");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(ListenerState::Connected);
        let policy = self.policy.clone();

        let task = tokio::spawn(run_listener(
            transport,
            policy,
            events_tx,
            shutdown_rx,
            state_tx,
        ));

        self.active = Some(ActiveListener {
            shutdown: shutdown_tx,
            state: state_rx,
            task,
        });
        Ok(events_rx)
    }

    pub async fn disconnect(&mut self) -> Result<(), ListenerError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        let _ = active.shutdown.send(());
        match active.task.await {
            Ok(result) => result.map_err(ListenerError::Transport),
            Err(join_error) => Err(ListenerError::Transport(HubTransportError::new(
                join_error.to_string(),
            ))),
        }
    }
}

enum ReconnectOutcome {
    Restored,
    Exhausted,
    Shutdown,
}

async fn run_listener<T: HubTransport>(
    mut transport: T,
    policy: ReconnectPolicy,
    events: mpsc::UnboundedSender<RelationEvent>,
    mut shutdown: oneshot::Receiver<()>,
    state: watch::Sender<ListenerState>,
) -> Result<(), HubTransportError> {
    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                state.send_replace(ListenerState::Disconnected);
                return transport.close().await;
            }
            next = transport.next_invocation() => next,
        };

        match next {
            Ok(Some(invocation)) => {
                let Some(event) = RelationEvent::from_invocation(&invocation) else {
                    debug!(hub_target = %invocation.target, "ignoring hub invocation");
                    continue;
                };
                if events.send(event).is_err() {
                    debug!("relation event receiver dropped; closing hub connection");
                    state.send_replace(ListenerState::Disconnected);
                    return transport.close().await;
                }
            }
            Ok(None) => {
                info!("notification hub closed the connection");
                state.send_replace(ListenerState::Disconnected);
                return Ok(());
            }
            Err(error) => {
                warn!(%error, "notification hub connection lost");
                state.send_replace(ListenerState::Reconnecting);
                match reconnect(&mut transport, &policy, &mut shutdown).await {
                    ReconnectOutcome::Restored => {
                        state.send_replace(ListenerState::Connected);
                    }
                    ReconnectOutcome::Exhausted => {
                        warn!("giving up on notification hub; live updates are disabled");
                        state.send_replace(ListenerState::Disconnected);
                        return Ok(());
                    }
                    ReconnectOutcome::Shutdown => {
                        state.send_replace(ListenerState::Disconnected);
                        return transport.close().await;
                    }
                }
            }
        }
    }
}

async fn reconnect<T: HubTransport>(
    transport: &mut T,
    policy: &ReconnectPolicy,
    shutdown: &mut oneshot::Receiver<()>,
) -> ReconnectOutcome {
    for (attempt, delay) in policy.delays().iter().enumerate() {
        tokio::select! {
            _ = &mut *shutdown => return ReconnectOutcome::Shutdown,
            () = tokio::time::sleep(*delay) => {}
        }

        match transport.open().await {
            Ok(()) => {
                info!(attempt = attempt + 1, "reconnected to notification hub");
                return ReconnectOutcome::Restored;
            }
            Err(error) => warn!(attempt = attempt + 1, %error, "hub reconnect attempt failed"),
        }
    }
    ReconnectOutcome::Exhausted
}
