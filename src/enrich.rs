//! Sends a batch to the completion service and turns its reply into
//! `EnrichedEvent`s.

use std::time::Instant;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::dates;
use crate::llm::{CompletionClient, CompletionError, Usage};
use crate::models::{EnrichedEvent, RawEvent};

const TRUNCATION_MARGIN: u32 = 500;
const SUMMARY_MAX_CHARS: usize = 200;
const DEFAULT_CATEGORY: &str = "General";

const SYSTEM_PROMPT: &str = "You are an expert event data formatter. You receive event data, enhance it by parsing dates, summarizing descriptions, adding categories/urgency/tags, and return ONLY a valid JSON array containing objects for all input events, sorted by urgency and date.";

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Error calling OpenAI API: {0}")]
    Completion(#[from] CompletionError),
    #[error("Failed to parse OpenAI response as JSON: {message}")]
    InvalidJson { message: String, raw: String },
    #[error("OpenAI returned valid JSON, but it was not a list or dictionary as expected.")]
    UnexpectedShape { raw: String },
    #[error("An error occurred processing the OpenAI JSON response: {message}")]
    InvalidEvent { message: String, raw: String },
    #[error("OpenAI formatting function did not return a valid response string.")]
    EmptyResponse,
}

impl EnrichError {
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            EnrichError::Completion(_) | EnrichError::EmptyResponse => None,
            EnrichError::InvalidJson { raw, .. }
            | EnrichError::UnexpectedShape { raw }
            | EnrichError::InvalidEvent { raw, .. } => Some(raw),
        }
    }
}

/// What the model's reply parsed into.
#[derive(Debug, Clone)]
pub enum EnrichedBatch {
    Events(Vec<EnrichedEvent>),
    /// An object with no list inside; passed back untouched.
    Mapping(Map<String, Value>),
}

impl EnrichedBatch {
    pub fn received(&self) -> Option<usize> {
        match self {
            EnrichedBatch::Events(events) => Some(events.len()),
            EnrichedBatch::Mapping(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EnrichedBatch::Events(events) => {
                serde_json::to_value(events).unwrap_or_else(|_| Value::Array(Vec::new()))
            }
            EnrichedBatch::Mapping(map) => Value::Object(map.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichReport {
    pub sent: usize,
    pub batch: EnrichedBatch,
    /// Set when the model returned a different number of events than it was sent.
    pub discrepancy: bool,
    pub truncation_risk: bool,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    pub raw_response: String,
}

pub struct Enricher<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> Enricher<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    pub fn enrich(
        &self,
        batch: &[RawEvent],
        today: NaiveDate,
    ) -> Result<EnrichReport, EnrichError> {
        let sent = batch.len();
        if batch.is_empty() {
            return Ok(EnrichReport {
                sent,
                batch: EnrichedBatch::Events(Vec::new()),
                discrepancy: false,
                truncation_risk: false,
                usage: None,
                finish_reason: None,
                raw_response: String::new(),
            });
        }

        let started = Instant::now();
        info!(events = sent, model = self.client.model(), "sending batch to completion service");
        let prompt = build_prompt(batch, today);
        let completion = self.client.complete(SYSTEM_PROMPT, &prompt)?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "completion received");

        let truncation_risk = check_usage(completion.usage.as_ref(), self.client.max_tokens());
        log_finish_reason(completion.finish_reason.as_deref());

        let parsed = parse_reply(&completion.text, today)?;
        let discrepancy = match parsed.received() {
            Some(received) if received != sent => {
                warn!(
                    sent,
                    received,
                    "model returned a different number of events; the reply may be truncated"
                );
                true
            }
            _ => false,
        };

        Ok(EnrichReport {
            sent,
            batch: parsed,
            discrepancy,
            truncation_risk,
            usage: completion.usage,
            finish_reason: completion.finish_reason,
            raw_response: completion.text,
        })
    }
}

pub fn build_prompt(batch: &[RawEvent], today: NaiveDate) -> String {
    let today = dates::format_display(today);
    let count = batch.len();
    let events_json = serde_json::to_string_pretty(batch).unwrap_or_default();
    format!(
        r#"You are an event data formatter. You will receive a list of university events. Each event has a combined 'date' field (which might represent multiple dates or a range, possibly joined by ';') and may optionally include a 'description'.

Today's date is: {today}

Your task is to process the following JSON input array:
- For each event:
  - Parse the original 'date' field into these new fields:
    - 'parsed_date': the primary date or date range found (e.g., "Mon, May 5, 2025", "Apr 23, 2025 - Apr 25, 2025", "May 15, 2025"). Standardize relative dates like "Today" or "Tomorrow" to their actual date based on today's date ({today}). If the input combines multiple dates (separated by ';'), represent the range or the first date clearly. If unparseable, use null.
    - 'time': the time portion (e.g., "3pm to 4pm", "10:00 AM - 11:00 AM"), or null if no time is present or multiple times are listed ambiguously.
    - 'additional_days': the number of days the event runs beyond its first day (0 for a single day).
  - Process the 'description' field:
    - 'short_description': a concise summary (1-2 sentences) of the original 'description', focused on the core activity or purpose.
    - If the original 'description' is null or empty, set 'short_description' to null.
  - Keep the original fields: title, location, link, image, description.
  - Add new fields:
    - 'category': a relevant category guessed from the title and description (e.g., "Seminar", "Music", "Career Fair", "Workshop", "Arts", "Sports", "Social", "Lecture", "Expo", "Commencement"). Use "General" if unsure.
    - 'urgency': based on 'parsed_date' relative to today ({today}). 'high' if the event starts within the next 3 days (inclusive of today), 'medium' if within the next 7 days, 'low' otherwise or if the date is unparseable or in the past.
    - 'tags': 2-4 relevant lowercase keywords based on title, category, and description.
    - 'ranking': after building all objects, sort them by urgency (high, then medium, then low) and importance, and assign 1 to the most urgent, 2 to the next, and so on.

Return ONLY a valid JSON array containing the formatted event objects for ALL the events provided in the input. Do NOT include any introduction, explanation, markdown formatting (like ```json), or concluding remarks.
Arrange the output by urgency ('high' first, then 'medium', then 'low'), and then by parsed_date (earliest first).
Input JSON ({count} events):
{events_json}
"#
    )
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses the model's reply and applies the deterministic post-processing.
pub fn parse_reply(raw: &str, today: NaiveDate) -> Result<EnrichedBatch, EnrichError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(EnrichError::EmptyResponse);
    }
    let value: Value = serde_json::from_str(cleaned).map_err(|err| EnrichError::InvalidJson {
        message: err.to_string(),
        raw: raw.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            warn!("reply is a JSON object, not a list; looking for a nested list");
            match first_list(map) {
                Ok((key, items)) => {
                    info!(%key, "using list found under key");
                    items
                }
                Err(map) => {
                    warn!("no list inside the object; returning it unchanged");
                    return Ok(EnrichedBatch::Mapping(map));
                }
            }
        }
        _ => {
            return Err(EnrichError::UnexpectedShape {
                raw: raw.to_string(),
            })
        }
    };

    let mut events = items
        .into_iter()
        .map(serde_json::from_value::<EnrichedEvent>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| EnrichError::InvalidEvent {
            message: err.to_string(),
            raw: raw.to_string(),
        })?;

    for event in &mut events {
        finalize(event, today);
    }
    sort_enriched(&mut events, today);
    Ok(EnrichedBatch::Events(events))
}

fn first_list(mut map: Map<String, Value>) -> Result<(String, Vec<Value>), Map<String, Value>> {
    let key = map
        .iter()
        .find(|(_, value)| value.is_array())
        .map(|(key, _)| key.clone());
    match key.and_then(|key| map.remove(&key).map(|value| (key, value))) {
        Some((key, Value::Array(items))) => Ok((key, items)),
        _ => Err(map),
    }
}

fn finalize(event: &mut EnrichedEvent, today: NaiveDate) {
    if let Some(text) = event.parsed_date.as_deref() {
        if dates::parse_event_date(text, today).is_none() {
            warn!(
                title = %event.title,
                parsed_date = text,
                "could not parse parsed_date for urgency check"
            );
        }
    }
    event.calculated_urgency_check = Some(dates::classify(event.parsed_date.as_deref(), today));

    if event.id.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        event.id = Some(crate::models::stable_id(event.link.as_deref(), &event.title));
    }
    if event.category.trim().is_empty() {
        event.category = DEFAULT_CATEGORY.to_string();
    }

    if !event.has_description() {
        event.short_description = None;
    } else if event
        .short_description
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        event.short_description = event.description.as_deref().map(first_sentence);
    }
}

/// Stable sort by (urgency, parsed date); unparseable dates go last within
/// their urgency.
pub fn sort_enriched(events: &mut [EnrichedEvent], today: NaiveDate) {
    events.sort_by_cached_key(|event| {
        let date = event
            .parsed_date
            .as_deref()
            .and_then(|text| dates::parse_event_date(text, today));
        (event.urgency.rank(), date.is_none(), date)
    });
}

const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "prof", "st", "jr", "sr", "vs", "etc", "no", "rm",
];

fn first_sentence(description: &str) -> String {
    let text = description.trim();
    let line = text.lines().next().unwrap_or(text).trim();
    let sentence = match sentence_end(line) {
        Some(end) => &line[..end],
        None => line,
    };
    if sentence.chars().count() <= SUMMARY_MAX_CHARS {
        sentence.to_string()
    } else {
        let cut: String = sentence.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Byte offset just past the first `.`, `!` or `?` that ends a sentence:
/// followed by a space and an uppercase letter or digit, and not closing an
/// abbreviation or a single-letter initial.
fn sentence_end(line: &str) -> Option<usize> {
    line.char_indices().find_map(|(idx, ch)| {
        if !matches!(ch, '.' | '!' | '?') {
            return None;
        }
        let end = idx + ch.len_utf8();
        let mut rest = line[end..].chars();
        if rest.next() != Some(' ') {
            return None;
        }
        let next = rest.next()?;
        if !(next.is_uppercase() || next.is_ascii_digit()) {
            return None;
        }
        if ch == '.' {
            let word = line[..idx]
                .rsplit(|c: char| !c.is_alphanumeric())
                .next()
                .unwrap_or_default();
            let is_abbreviation = word.chars().count() == 1
                || ABBREVIATIONS.contains(&word.to_ascii_lowercase().as_str());
            if is_abbreviation {
                return None;
            }
        }
        Some(end)
    })
}

fn check_usage(usage: Option<&Usage>, max_tokens: u32) -> bool {
    let Some(usage) = usage else {
        return false;
    };
    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "token usage"
    );
    let near_cap = usage.completion_tokens >= max_tokens.saturating_sub(TRUNCATION_MARGIN);
    if near_cap {
        warn!(
            completion_tokens = usage.completion_tokens,
            max_tokens, "completion tokens near max_tokens; output might be truncated"
        );
    }
    near_cap
}

fn log_finish_reason(reason: Option<&str>) {
    match reason {
        Some("stop") | None => {}
        Some("length") => warn!(
            "generation stopped at max_tokens (finish_reason=length); output is likely incomplete"
        ),
        Some(other) => info!(finish_reason = other, "generation stopped early"),
    }
}
