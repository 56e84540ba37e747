use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::RequestBodyTimeoutLayer;

use crate::auth;
use crate::config::HTTP_READ_TIMEOUT_SECS;
use crate::routes;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Load test definitions
        .route(
            "/v1/load-tests",
            post(routes::load_tests::create_load_test).get(routes::load_tests::list_load_tests),
        )
        .route(
            "/v1/load-tests/{id}",
            get(routes::load_tests::get_load_test)
                .put(routes::load_tests::update_load_test)
                .delete(routes::load_tests::delete_load_test),
        )
        // Script revisions
        .route(
            "/v1/load-tests/{id}/script",
            put(routes::scripts::update_script).get(routes::scripts::get_script),
        )
        .route(
            "/v1/load-tests/{id}/script/revisions",
            get(routes::scripts::list_script_revisions),
        )
        .route(
            "/v1/load-tests/{id}/script/revisions/{rid}",
            get(routes::scripts::get_script_revision),
        )
        // Runs
        .route(
            "/v1/load-tests/{id}/runs",
            post(routes::runs::create_run).get(routes::runs::list_runs_for_test),
        )
        .route("/v1/runs", get(routes::runs::list_runs))
        .route("/v1/runs/{id}", get(routes::runs::get_run))
        .route("/v1/runs/{id}/stop", post(routes::runs::stop_run))
        // Dashboard read side
        .route(
            "/v1/runs/{id}/metrics/timeseries",
            get(routes::metrics::get_timeseries),
        )
        .route(
            "/v1/runs/{id}/metrics/aggregate",
            get(routes::metrics::get_aggregate),
        )
        // Worker callbacks
        .route(
            "/v1/internal/locust/test-start",
            post(routes::callbacks::test_start),
        )
        .route(
            "/v1/internal/locust/test-stop",
            post(routes::callbacks::test_stop),
        )
        .route(
            "/v1/internal/locust/metrics",
            post(routes::callbacks::metrics),
        )
        .route(
            "/v1/internal/locust/register-external",
            post(routes::callbacks::register_external),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        // Bounds how long a handler waits for the request body.
        .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
            HTTP_READ_TIMEOUT_SECS,
        )))
        .layer(cors)
        .with_state(state)
}
