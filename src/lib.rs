pub mod config;
pub mod dates;
pub mod enrich;
pub mod filter;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod scraping;
pub mod server;
mod utils;

use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

pub use config::{Settings, Variant};
pub use models::{EnrichedEvent, RawEvent, Urgency};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};

/// `RUST_LOG` if set, otherwise `info`.
pub fn init_tracing<W>(writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(writer)
        .init();
}
