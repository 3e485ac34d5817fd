//! HTTP surface: `GET /` health summary and `GET /events`, which runs the
//! whole pipeline per request.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Settings;
use crate::dates;
use crate::llm::OpenAiChat;
use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};
use crate::scraping::{self, base::HttpFetcher, Audience, CollectError};

const SERVICE_NAME: &str = "Purdue Events Scraper and Formatter Service";

/// Runs one pipeline pass. Called from a blocking thread.
pub trait Backend: Send + Sync + 'static {
    /// Why the completion client cannot be built, if it cannot.
    fn init_error(&self) -> Option<String>;
    fn default_audience(&self) -> Audience;
    fn run(&self, audience: Audience) -> Result<PipelineOutcome, PipelineError>;
}

/// Builds real HTTP clients for every request; nothing is shared across runs.
pub struct LiveBackend {
    settings: Settings,
}

impl LiveBackend {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Backend for LiveBackend {
    fn init_error(&self) -> Option<String> {
        self.settings
            .completion_config()
            .err()
            .map(|err| err.to_string())
    }

    fn default_audience(&self) -> Audience {
        self.settings.audience
    }

    fn run(&self, audience: Audience) -> Result<PipelineOutcome, PipelineError> {
        // Credentials are checked before any scraping happens.
        let completion_config = self.settings.completion_config()?;
        let completion = OpenAiChat::new(completion_config).map_err(PipelineError::ClientInit)?;

        let site = scraping::default_site();
        let fetcher = HttpFetcher::new().map_err(|err| CollectError::SourceUnavailable {
            url: site.listing_url(audience),
            reason: format!("{err:#}"),
        })?;

        Pipeline {
            site: site.as_ref(),
            fetcher: &fetcher,
            completion: &completion,
            policy: self.settings.batch_policy(),
            collect: self.settings.collect_options(audience),
        }
        .run(dates::today())
    }
}

#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn live(settings: Settings) -> Self {
        Self::new(Arc::new(LiveBackend::new(settings)))
    }
}

pub fn router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin: HeaderValue = cors_origin
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid CORS origin {cors_origin:?}: {err}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET]);

    Ok(Router::new()
        .route("/", get(index))
        .route("/events", get(events).layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[derive(Debug, Serialize)]
struct IndexBody {
    status: &'static str,
    message: String,
}

async fn index(State(state): State<AppState>) -> Json<IndexBody> {
    let body = match state.backend.init_error() {
        None => IndexBody {
            status: "Operational",
            message: SERVICE_NAME.to_string(),
        },
        Some(err) => IndexBody {
            status: "Degraded (OpenAI client failed to initialize)",
            message: format!("{SERVICE_NAME}\nWARNING: {err}"),
        },
    };
    Json(body)
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    audience: Option<String>,
}

#[derive(Debug, Serialize)]
struct SuccessBody {
    status: &'static str,
    message: String,
    total_scraped: usize,
    filtered_for_formatting: usize,
    sent_to_openai: usize,
    /// A count, or `"N/A"` when the reply was an object without a list.
    received_from_openai: Value,
    events: Value,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    step: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<String>,
}

impl ErrorBody {
    fn new(message: String, step: &'static str) -> Self {
        Self {
            status: "error",
            message,
            step,
            raw_response: None,
        }
    }
}

impl From<&PipelineError> for ErrorBody {
    fn from(err: &PipelineError) -> Self {
        Self {
            raw_response: err.raw_response().map(str::to_string),
            ..Self::new(err.to_string(), err.step())
        }
    }
}

async fn events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Response {
    let audience = match query.audience.as_deref().map(str::parse::<Audience>) {
        None => state.backend.default_audience(),
        Some(Ok(audience)) => audience,
        Some(Err(message)) => {
            let body = ErrorBody::new(message, "request");
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };
    info!(%audience, "received request to /events");

    let backend = Arc::clone(&state.backend);
    let result = tokio::task::spawn_blocking(move || backend.run(audience)).await;

    match result {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(success_body(outcome))).into_response(),
        Ok(Err(err)) => {
            error!(step = err.step(), error = %err, "pipeline failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::from(&err))).into_response()
        }
        Err(join_err) => {
            error!(error = %join_err, "pipeline task panicked");
            let body = ErrorBody::new(
                "Internal error while processing events.".to_string(),
                "internal",
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn success_body(outcome: PipelineOutcome) -> SuccessBody {
    match outcome {
        PipelineOutcome::Empty {
            message,
            total_scraped,
            filtered_for_formatting,
        } => SuccessBody {
            status: "success",
            message: message.to_string(),
            total_scraped,
            filtered_for_formatting,
            sent_to_openai: 0,
            received_from_openai: Value::from(0),
            events: Value::Array(Vec::new()),
        },
        PipelineOutcome::Enriched(report) => {
            let received = report.received();
            let count = received
                .map(|n| n.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            SuccessBody {
                status: "success",
                message: format!("Successfully scraped and formatted {count} events."),
                total_scraped: report.total_scraped,
                filtered_for_formatting: report.filtered_for_formatting,
                sent_to_openai: report.sent(),
                received_from_openai: received
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from("N/A")),
                events: report.enrichment.batch.to_value(),
            }
        }
    }
}
