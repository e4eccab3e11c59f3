//! Campus dining review backend.
//!
//! Scrapes the Bowdoin dining site's daily menus for both halls on demand and
//! serves them next to crowd-sourced 1-5 star ratings, one rating per user
//! per (hall, meal, date). Accounts are JWT-backed; ratings live in SQLite.
//!
//! # Layout
//! - [`menu`]: headless-browser scraping pipeline (session, meal selection,
//!   DOM extraction)
//! - [`ratings`]: rating validation and aggregate computation
//! - [`auth`]: registration, login, bearer-token extraction
//! - [`db`]: SQLite worker thread and typed queries

use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod ratings;
pub mod routes;
pub mod state;

use auth::{login_handler, logout_handler, me_handler, register_handler};
use routes::{
    aggregate_handler, health_handler, meal_menus_handler, menus_handler, scope_ratings_handler,
    submit_rating_handler, user_rating_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/menus", get(menus_handler))
        .route("/api/menus/{meal}", get(meal_menus_handler))
        .route("/api/users", post(register_handler))
        .route("/api/users/me", get(me_handler))
        .route("/api/sessions", post(login_handler).delete(logout_handler))
        .route("/api/ratings", post(submit_rating_handler))
        .route("/api/ratings/user", get(user_rating_handler))
        .route("/api/ratings/{hall}/{meal}", get(aggregate_handler))
        .route("/api/ratings/{hall}/{meal}/{date}", get(scope_ratings_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
