pub mod error;
pub(crate) mod handlers;
// OpenAPI document assembly lives in openapi.rs.
mod openapi;

pub use openapi::ApiDoc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::TokenSigner,
    cli::globals::GlobalArgs,
    risk::predictor::PredictorHandle,
    storage::{self, Store},
};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    let store = storage::connect(&dsn)
        .await
        .context("Failed to connect to storage backend")?;

    let signer = TokenSigner::new(globals.session_secret.expose_secret().as_bytes());
    let predictor = PredictorHandle::load(globals.model_path.as_deref());

    let app = router(store, signer, predictor, globals.clone());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Build the application router with all routes, layers and extensions.
/// Split out from [`new`] so tests can drive it without a socket.
#[must_use]
pub fn router(
    store: Store,
    signer: TokenSigner,
    predictor: PredictorHandle,
    globals: GlobalArgs,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/predict", post(handlers::predict_form))
        .route("/api/predict", post(handlers::predict))
        .route("/api/predictions-log", get(handlers::predictions_log))
        .route("/api/assessments", get(handlers::all_assessments))
        .route("/api/patients", get(handlers::patients))
        .route(
            "/api/patients/:id/assessments",
            get(handlers::patient_assessments),
        )
        .route("/profile", get(handlers::profile))
        .route("/profile/update", post(handlers::update_profile))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(store))
                .layer(Extension(signer))
                .layer(Extension(predictor))
                .layer(Extension(globals)),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
