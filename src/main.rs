use crate::clock::{Ticker, TICK};
use crate::config::Config;
use crate::state::AppState;
use clap::Parser;
use std::convert::Infallible;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use warp::{
    http::{header, Method},
    Filter, Rejection, Reply,
};

mod client;
mod clock;
mod command;
mod config;
mod handler;
mod registry;
mod state;
mod ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    let _guard = init_tracing(&config)?;

    let state = AppState::default();
    let ticker = Ticker::spawn(state.clock.clone(), TICK);
    info!("created turn clock and connection registry");

    let (addr, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(config.addr(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", e);
            }
        })?;
    info!("listening on ws://{}/ws", addr);

    server.await;
    ticker.stop();
    info!("shut down");
    Ok(())
}

// The returned guard flushes the file writer when dropped
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>, SetGlobalDefaultError> {
    if config.log_stdout {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(config.log_level)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(None);
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(config.log_level)
        .with_writer(non_blocking)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(Some(guard))
}

fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health_route = warp::path!("health").and_then(handler::health_handler);

    let clock = warp::path("clock");
    let clock_routes = clock
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handler::status_handler)
        .or(clock
            .and(warp::path("enabled"))
            .and(warp::path::end())
            .and(warp::put())
            .and(warp::body::json())
            .and(with_state(state.clone()))
            .and_then(handler::enabled_handler));

    let ws_route = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::addr::remote())
        .and(with_state(state))
        .and_then(handler::ws_handler);

    health_route.or(clock_routes).or(ws_route).with(
        warp::cors()
            .allow_methods(&[Method::OPTIONS, Method::GET, Method::PUT])
            .allow_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .max_age(300)
            .allow_any_origin(),
    )
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
