// src/server/routes.rs
use chrono::{SecondsFormat, Utc};
use log::error;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use warp::filters::BoxedFilter;
use warp::path::FullPath;
use warp::{Filter, Rejection, Reply};

use super::connection::handle_connection;
use crate::canvas::SnapshotError;
use crate::config::MAX_MESSAGE_SIZE;
use crate::messages::Snapshot;
use crate::state::AppState;

pub fn create_routes(
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let state = warp::any().map(move || state.clone());

    // The bundled web client connects on `/socket`.
    let ws_route = warp::path("ws")
        .or(warp::path("socket"))
        .unify()
        .and(warp::path::end())
        .and(upgrade())
        .and(warp::addr::remote())
        .and(state.clone())
        .map(|ws: warp::ws::Ws, remote: Option<SocketAddr>, state: Arc<AppState>| {
            let label = remote.map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
            ws.max_message_size(MAX_MESSAGE_SIZE)
                .max_frame_size(MAX_MESSAGE_SIZE)
                .on_upgrade(move |socket| handle_connection(socket, label, state))
        });

    let health_check = warp::path!("api" / "health")
        .and(warp::get())
        .and(state.clone())
        .and_then(health);

    let image = warp::path!("api" / "image")
        .and(warp::get())
        .and(state.clone())
        .and_then(canvas_png);

    let time = warp::path!("api" / "time").and(warp::get()).map(|| {
        let now = Utc::now();
        warp::reply::json(&json!({
            "now": now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            "epoch": now.timestamp(),
        }))
    });

    ws_route
        .or(health_check)
        .or(time)
        .or(image)
        .or(static_files(static_dir))
        .with(warp::log("shared_canvas_server::http"))
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

async fn health(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let clients = state.hub.client_count().await.unwrap_or(0);
    Ok(warp::reply::json(&json!({
        "status": "ok",
        "service": "shared-canvas",
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        "clients": clients,
    })))
}

#[derive(Debug)]
struct NotAnUpgrade;

impl warp::reject::Reject for NotAnUpgrade {}

/// `warp::ws()`, but a request on a socket path that is not a valid upgrade
/// is answered with 400 instead of falling through to the other routes.
fn upgrade() -> impl Filter<Extract = (warp::ws::Ws,), Error = Rejection> + Clone {
    warp::ws().or_else(|_: Rejection| async { Err::<(warp::ws::Ws,), _>(warp::reject::custom(NotAnUpgrade)) })
}

#[derive(Debug)]
struct ImageUnavailable;

impl warp::reject::Reject for ImageUnavailable {}

async fn canvas_png(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let snapshot = state.canvas.snapshot().await.map_err(|e| {
        error!("Could not snapshot canvas for image: {}", e);
        warp::reject::custom(ImageUnavailable)
    })?;
    let png = render_png(&snapshot).map_err(|e| {
        error!("Could not encode canvas as PNG: {}", e);
        warp::reject::custom(ImageUnavailable)
    })?;

    Ok(warp::reply::with_header(png, "content-type", "image/png"))
}

fn render_png(snapshot: &Snapshot) -> Result<Vec<u8>, SnapshotError> {
    Ok(snapshot.to_canvas()?.to_png()?)
}

/// Serves the web client, falling back to `index.html` for unknown paths
/// outside `/api/` and the socket paths so client-side routes resolve.
fn static_files(static_dir: Option<PathBuf>) -> BoxedFilter<(warp::fs::File,)> {
    let Some(dir) = static_dir else {
        return warp::any()
            .and_then(|| async { Err::<warp::fs::File, Rejection>(warp::reject::not_found()) })
            .boxed();
    };

    let index = dir.join("index.html");
    let app_route = warp::path::full()
        .and_then(|path: FullPath| async move {
            let path = path.as_str();
            if path.starts_with("/api/") || path.starts_with("/ws") || path.starts_with("/socket") {
                Err(warp::reject::not_found())
            } else {
                Ok(())
            }
        })
        .untuple_one()
        .and(warp::fs::file(index));

    warp::get()
        .and(warp::fs::dir(dir).or(app_route).unify())
        .boxed()
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (warp::http::StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (warp::http::StatusCode::BAD_REQUEST, "Payload too large")
    } else if err.find::<NotAnUpgrade>().is_some() {
        (warp::http::StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade")
    } else if err.find::<warp::reject::MissingHeader>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
    {
        (warp::http::StatusCode::BAD_REQUEST, "Bad Request")
    } else if err.find::<ImageUnavailable>().is_some() {
        (warp::http::StatusCode::SERVICE_UNAVAILABLE, "Canvas unavailable")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (warp::http::StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        error!("unhandled error: {:?}", err);
        (warp::http::StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };

    Ok(warp::reply::with_status(message.to_string(), code))
}
