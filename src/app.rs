use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures_util::{
    sink::{Sink, SinkExt},
    stream::StreamExt,
};
use serde_json::json;
use tokio::{sync::mpsc, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::RelayConfig;
use crate::fallback::HttpResponder;
use crate::prompting::FallbackContext;
use crate::router::{Handled, MessageRouter};
use crate::types::{ConnId, Role};

pub struct AppState {
    pub router: MessageRouter<HttpResponder>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(user_ws_handler))
        .route("/admin", get(admin_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    "live relay websocket server is running"
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": now_iso() }))
}

async fn user_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Role::User))
}

async fn admin_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Role::Admin))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, role: Role) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.router.on_connect(role, tx).await;

    let (ws_sender, mut ws_receiver) = socket.split();
    let send_task = tokio::spawn(pump_outbound(rx, ws_sender));

    let mut replies = PendingReplies::default();
    while let Some(Ok(message)) = ws_receiver.next().await {
        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let handled = state.router.on_message(conn_id, &text).await;
        replies.track(conn_id, handled);
    }

    state.router.on_close(conn_id).await;
    replies.abort_all();
    send_task.abort();
}

/// Forwards queued frames to the socket. When every sender is gone (the
/// connection was evicted or released) the socket is closed.
async fn pump_outbound<S>(mut rx: mpsc::UnboundedReceiver<String>, mut sink: S)
where
    S: Sink<Message> + Unpin,
{
    while let Some(payload) = rx.recv().await {
        if sink.send(Message::Text(payload.into())).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Automated replies started by one socket. Any still running when the
/// socket goes away would be discarded on delivery, so they are aborted.
#[derive(Default)]
struct PendingReplies {
    tasks: Vec<JoinHandle<()>>,
}

impl PendingReplies {
    fn track(&mut self, conn_id: ConnId, handled: Handled) {
        match handled {
            Handled::Fallback(task) => {
                self.tasks.retain(|task| !task.is_finished());
                self.tasks.push(task);
            }
            other => debug!(conn_id, handled = ?other, "frame handled"),
        }
    }

    fn abort_all(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

pub async fn run() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    if config.provider.api_key.is_none() {
        warn!("no provider API key set; automated replies will fail");
    }

    let context = FallbackContext::load(config.profile_path.as_deref(), &config.persona)
        .context("failed to load fallback profile")?;
    let responder = HttpResponder::new(config.provider.clone(), context)
        .context("failed to build provider client")?;

    let state = Arc::new(AppState {
        router: MessageRouter::new(responder, config.persona.clone()),
    });
    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind TCP listener on {addr}"))?;

    info!(port = config.port, endpoint = %config.provider.endpoint, "live relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failure")?;
    Ok(())
}
