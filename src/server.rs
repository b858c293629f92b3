// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! HTTP surface: stream, snapshot, health, reinit and control endpoints.
//!
//! Handlers never touch the sensor on the async runtime. Every unit of work
//! runs on the blocking pool under the session lock, and the stream handler
//! feeds its body from a blocking [`StreamSession`] through a one-slot
//! channel, so a slow client holds back capture instead of queueing frames.
//! A client that stops reading altogether is dropped after
//! [`Timings::client_stall`], releasing the lock for everyone else.
//!
//! While a reinit runs, handlers answer from the lock-free [`StateCell`]
//! instead of queueing behind the recovery.

use crate::{
    config::Timings,
    error::{AcquireError, CaptureError, TransportError},
    probe::{self, MemoryMonitor},
    session::{ControlCommand, PipelineState, SensorSession, StateCell},
    stream::{self, PartSink, StreamSession, NO_CACHE, STREAM_CONTENT_TYPE},
};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    net::TcpListener,
    runtime::Handle,
    sync::mpsc::{self, error::SendTimeoutError},
};
use tracing::{error, info, warn};

/// Session shared by all handlers.
pub type SharedSession = Arc<Mutex<SensorSession>>;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    session: SharedSession,
    state: StateCell,
    timings: Timings,
    memory: Arc<dyn MemoryMonitor>,
}

impl AppState {
    pub fn new(session: SensorSession, memory: Arc<dyn MemoryMonitor>) -> Self {
        let state = session.state_cell();
        let timings = session.timings().clone();
        Self {
            session: Arc::new(Mutex::new(session)),
            state,
            timings,
            memory,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.state.get()
    }
}

/// Builds the router with every endpoint.
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream_handler))
        .route("/capture", get(capture_handler))
        .route("/health", get(health_handler))
        .route("/reinit", get(reinit_handler).post(reinit_handler))
        .route("/control", get(control_handler))
        .with_state(app)
}

/// Serves HTTP on `listener` until the runtime shuts down.
pub async fn serve(listener: TcpListener, app: AppState) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(app)).await
}

/// Runs `f` on the blocking pool with the session locked.
async fn with_session<T, F>(session: &SharedSession, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SensorSession) -> T + Send + 'static,
{
    let session = session.clone();
    let joined = tokio::task::spawn_blocking(move || match session.lock() {
        Ok(mut guard) => Some(f(&mut *guard)),
        Err(_) => {
            error!("session lock poisoned");
            None
        }
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(e) => {
            error!("blocking task failed: {e}");
            None
        }
    }
}

fn recovering() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "camera recovering").into_response()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = "<!doctype html>\
<html><head><meta charset=\"utf-8\"><title>camera</title></head>\
<body style=\"margin:0;background:#111\">\
<img src=\"/stream\" style=\"display:block;margin:auto;max-width:100%\">\
</body></html>";

/// Forwards stream bytes to the response body.
///
/// Runs on a blocking thread. Each send waits at most `stall` for the body to
/// take the previous chunk.
struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    runtime: Handle,
    stall: Duration,
}

impl PartSink for ChannelSink {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let chunk = Bytes::copy_from_slice(bytes);
        match self.runtime.block_on(self.tx.send_timeout(chunk, self.stall)) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(stall = ?self.stall, "stream client stopped reading");
                Err(TransportError::Stalled(self.stall))
            }
            Err(SendTimeoutError::Closed(_)) => Err(TransportError::Disconnected),
        }
    }
}

async fn stream_handler(State(app): State<AppState>) -> Response {
    if app.pipeline_state() == PipelineState::Recovering {
        return recovering();
    }

    let (tx, mut rx) = mpsc::channel::<Bytes>(1);
    let session = app.session.clone();
    let timings = app.timings.clone();
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink {
            tx,
            runtime,
            stall: timings.client_stall,
        };
        let summary = StreamSession::new(&timings).run(&session, &mut sink);
        info!(
            frames = summary.frames,
            nulls = summary.nulls,
            fps = %format!("{:.2}", summary.fps()),
            "stream session finished"
        );
    });

    let body = Body::from_stream(async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<_, io::Error>(chunk);
        }
    });
    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, NO_CACHE),
            (header::PRAGMA, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn capture_handler(State(app): State<AppState>) -> Response {
    if app.pipeline_state() == PipelineState::Recovering {
        return recovering();
    }
    match with_session(&app.session, stream::snapshot).await {
        Some(Ok(jpeg)) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            jpeg,
        )
            .into_response(),
        Some(Err(CaptureError::Acquire(AcquireError::Recovering))) => recovering(),
        Some(Err(e)) => {
            warn!("capture failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "capture failed").into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "capture failed").into_response(),
    }
}

async fn health_handler(State(app): State<AppState>) -> Response {
    let report = if app.pipeline_state() == PipelineState::Recovering {
        probe::unready(app.memory.as_ref())
    } else {
        let memory = app.memory.clone();
        with_session(&app.session, move |session| {
            let report = probe::probe(session, memory.as_ref());
            session.record_probe(report.ok);
            report
        })
        .await
        .unwrap_or_else(|| probe::unready(app.memory.as_ref()))
    };

    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report)).into_response()
}

async fn reinit_handler(State(app): State<AppState>) -> Response {
    match with_session(&app.session, SensorSession::reinitialize).await {
        Some(Ok(())) => (StatusCode::OK, "reinit ok").into_response(),
        Some(Err(e)) => {
            error!("reinit failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "reinit failed").into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "reinit failed").into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ControlQuery {
    var: Option<String>,
    val: Option<String>,
}

async fn control_handler(
    State(app): State<AppState>,
    Query(query): Query<ControlQuery>,
) -> Response {
    let (var, val) = match (query.var, query.val) {
        (None, None) => return StatusCode::NOT_FOUND.into_response(),
        (Some(var), Some(val)) => (var, val),
        _ => return (StatusCode::BAD_REQUEST, "var and val required").into_response(),
    };
    let Some(command) = ControlCommand::parse(&var, &val) else {
        warn!(%var, %val, "rejected control request");
        return (StatusCode::BAD_REQUEST, "bad control").into_response();
    };
    if app.pipeline_state() == PipelineState::Recovering {
        return recovering();
    }

    match with_session(&app.session, move |session| session.apply_control(command)).await {
        Some(Ok(())) => (StatusCode::OK, "OK").into_response(),
        Some(Err(e)) => {
            warn!(?command, "control failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "control failed").into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "control failed").into_response(),
    }
}
