//! scrape -> filter -> batch -> enrich, shared by the CLI and the service.

use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::config::ConfigError;
use crate::enrich::{EnrichError, EnrichReport, Enricher};
use crate::filter::{self, BatchPolicy};
use crate::llm::{CompletionClient, CompletionError};
use crate::scraping::{self, CollectError, CollectOptions, EventSite, PageFetcher};

pub const NO_EVENTS_MESSAGE: &str = "No events found to process.";
pub const NO_COMPLETE_EVENTS_MESSAGE: &str = "No events with complete details found to format.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scraping(#[from] CollectError),
    #[error("Failed to initialize OpenAI client: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to initialize OpenAI client: {0}")]
    ClientInit(CompletionError),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

impl PipelineError {
    /// Stage name reported to clients alongside the message.
    pub fn step(&self) -> &'static str {
        match self {
            PipelineError::Scraping(_) => "scraping",
            PipelineError::Config(_) | PipelineError::ClientInit(_) => "openai_init",
            PipelineError::Enrich(EnrichError::Completion(_)) => "openai_call",
            PipelineError::Enrich(EnrichError::EmptyResponse) => "openai_call_result",
            PipelineError::Enrich(_) => "response_parse",
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PipelineError::Enrich(err) => err.raw_response(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub total_scraped: usize,
    pub filtered_for_formatting: usize,
    pub enrichment: EnrichReport,
}

impl PipelineReport {
    pub fn sent(&self) -> usize {
        self.enrichment.sent
    }

    pub fn received(&self) -> Option<usize> {
        self.enrichment.batch.received()
    }
}

/// A run with nothing to enrich still succeeds.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Empty {
        message: &'static str,
        total_scraped: usize,
        filtered_for_formatting: usize,
    },
    Enriched(PipelineReport),
}

pub struct Pipeline<'a> {
    pub site: &'a dyn EventSite,
    pub fetcher: &'a dyn PageFetcher,
    pub completion: &'a dyn CompletionClient,
    pub policy: BatchPolicy,
    pub collect: CollectOptions,
}

impl<'a> Pipeline<'a> {
    pub fn run(&self, today: NaiveDate) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();

        let events = scraping::fetch_events(self.site, self.fetcher, &self.collect)?;
        let total_scraped = events.len();
        if events.is_empty() {
            info!("scraper returned no events");
            return Ok(PipelineOutcome::Empty {
                message: NO_EVENTS_MESSAGE,
                total_scraped,
                filtered_for_formatting: 0,
            });
        }

        let selection = filter::select_batch(&events, &self.policy);
        info!(
            total = total_scraped,
            complete = selection.complete,
            batch = selection.batch.len(),
            limit = ?self.policy.max_size,
            "selected batch for enrichment"
        );
        if selection.complete == 0 {
            return Ok(PipelineOutcome::Empty {
                message: NO_COMPLETE_EVENTS_MESSAGE,
                total_scraped,
                filtered_for_formatting: 0,
            });
        }

        let enrichment = Enricher::new(self.completion).enrich(&selection.batch, today)?;
        info!(
            sent = enrichment.sent,
            received = ?enrichment.batch.received(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );

        Ok(PipelineOutcome::Enriched(PipelineReport {
            total_scraped,
            filtered_for_formatting: selection.complete,
            enrichment,
        }))
    }
}
