use crate::{state::AppState, ws};
use common::messages::EnabledRequest;
use std::net::SocketAddr;
use tracing::info;
use warp::{http::StatusCode, reply::json, Rejection, Reply};

type Result<T> = std::result::Result<T, Rejection>;

pub async fn status_handler(state: AppState) -> Result<impl Reply> {
    Ok(json(&state.status().await))
}

pub async fn enabled_handler(body: EnabledRequest, state: AppState) -> Result<impl Reply> {
    state.clock.write().await.set_enabled(body.enabled);
    info!("clock enabled set to {}", body.enabled);
    Ok(json(&state.status().await))
}

pub async fn ws_handler(
    ws: warp::ws::Ws,
    remote_addr: Option<SocketAddr>,
    state: AppState,
) -> Result<impl Reply> {
    Ok(ws.on_upgrade(move |socket| ws::client_connection(socket, remote_addr, state)))
}

pub async fn health_handler() -> Result<impl Reply> {
    Ok(StatusCode::OK)
}
