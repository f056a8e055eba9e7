//! # captioner: batch image captioning service
//!
//! `captioner` accepts a batch of uploaded images, asks a vision-analysis service and a chat
//! model to describe each one, and returns every image re-encoded as PNG inside a single ZIP
//! archive, each entry named after its caption.
//!
//! ## Request Flow
//!
//! A `POST /api/images/process` request carries one or more multipart parts named `images`.
//! The [`batch::BatchProcessor`] captions the images concurrently: for each image the
//! [`captions::CaptionSynthesizer`] calls the vision service (dense captions, tags, OCR),
//! condenses the findings with [`captions::summary::summarize`], and asks the chat model for a
//! single sentence. A failure for one image only costs that image its caption. The
//! [`archive`] module then turns each caption into a safe entry name with
//! [`captions::filename::sanitize`] and writes the archive; images that cannot be decoded are
//! left out.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use captioner::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = captioner::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     captioner::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod archive;
pub mod batch;
pub mod captions;
pub mod config;
pub mod errors;
mod openapi;
pub mod providers;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
mod test_utils;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue, Method},
    routing::{get, post},
};
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::batch::BatchProcessor;
use crate::captions::{CaptionSynthesizer, GenerationSettings};
use crate::config::CorsOrigin;
pub use crate::config::Config;
use crate::openapi::ApiDoc;
use crate::providers::{ChatCompleter, ImageAnalyzer};

/// Shared state handed to every request handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .batch(batch)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub batch: Arc<BatchProcessor>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.cors.allowed_origins;

    let origins = if allowed.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::with_capacity(allowed.len());
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .expose_headers([http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `GET /healthz`: liveness
/// - `GET /api-docs/openapi.json`, `GET /docs`: API documentation
/// - `POST /api/images/process`: the captioning endpoint, with the upload size limit applied
///
/// CORS and request tracing wrap every route.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/images/process", post(api::handlers::images::process_images))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service: provider clients, batch processor and router.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Build the external service clients from configuration and assemble the application.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting captioner with configuration: {:#?}", config);

        let analyzer = providers::create_analyzer(&config.vision).context("Failed to create vision client")?;
        let completer = providers::create_completer(&config.chat).context("Failed to create chat client")?;

        Self::with_providers(config, analyzer, completer)
    }

    /// Assemble the application around already constructed service clients.
    pub fn with_providers(config: Config, analyzer: Arc<dyn ImageAnalyzer>, completer: Arc<dyn ChatCompleter>) -> anyhow::Result<Self> {
        let synthesizer = CaptionSynthesizer::new(analyzer, completer, GenerationSettings::from(&config.chat));
        let batch = BatchProcessor::new(Arc::new(synthesizer), config.batch.max_concurrency);

        let state = AppState::builder().config(config.clone()).batch(Arc::new(batch)).build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving until `shutdown` resolves, then flush telemetry.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Captioner listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
