pub mod base;
pub mod purdue_html;

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::RawEvent;

/// Which listing of the site to scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    General,
    Student,
    Faculty,
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "general" | "all" => Ok(Audience::General),
            "student" | "students" => Ok(Audience::Student),
            "faculty" | "staff" => Ok(Audience::Faculty),
            other => Err(format!("unknown audience: {other}")),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Audience::General => "general",
            Audience::Student => "student",
            Audience::Faculty => "faculty",
        })
    }
}

/// What a listing card yields before its detail page is visited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventCard {
    pub title: String,
    pub link: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDetail {
    pub date: Option<String>,
    pub description: Option<String>,
}

/// Markup knowledge for one version of one events site. Extraction is
/// best-effort: parsing never fails, missing pieces come back as `None`.
pub trait EventSite: Send + Sync {
    fn site_id(&self) -> &'static str;
    fn base_url(&self) -> &'static str;
    fn listing_url(&self, audience: Audience) -> String;
    fn parse_listing(&self, html: &str) -> Vec<EventCard>;
    fn parse_detail(&self, html: &str) -> EventDetail;
}

pub trait PageFetcher: Send + Sync {
    fn fetch_html(&self, url: &str, timeout: Duration) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub audience: Audience,
    pub listing_timeout: Duration,
    pub detail_timeout: Duration,
    /// Pause before each detail request.
    pub detail_delay: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            audience: Audience::General,
            listing_timeout: Duration::from_secs(20),
            detail_timeout: Duration::from_secs(15),
            detail_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Error fetching event list {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },
}

pub fn default_site() -> Box<dyn EventSite> {
    Box::new(purdue_html::PurdueEvents)
}

/// Scrapes the listing page, then visits each card's detail page in order.
///
/// Only the listing request can fail the run. A failed detail page keeps the
/// event with `date` and `description` left empty.
pub fn fetch_events(
    site: &dyn EventSite,
    fetcher: &dyn PageFetcher,
    options: &CollectOptions,
) -> Result<Vec<RawEvent>, CollectError> {
    let started = Instant::now();
    let url = site.listing_url(options.audience);
    info!(site = site.site_id(), %url, audience = %options.audience, "requesting event listing");

    let html = fetcher
        .fetch_html(&url, options.listing_timeout)
        .map_err(|err| CollectError::SourceUnavailable {
            url: url.clone(),
            reason: format!("{err:#}"),
        })?;

    let cards = site.parse_listing(&html);
    info!(cards = cards.len(), "parsed listing page");

    let mut events = Vec::with_capacity(cards.len());
    for card in cards {
        let detail = match card.link.as_deref() {
            Some(link) => {
                if !options.detail_delay.is_zero() {
                    thread::sleep(options.detail_delay);
                }
                fetch_detail(site, fetcher, link, options.detail_timeout)
            }
            None => {
                debug!(title = %card.title, "no detail link, skipping detail page");
                EventDetail::default()
            }
        };

        events.push(RawEvent {
            title: card.title,
            date: detail.date,
            location: card.location,
            link: card.link,
            image: card.image,
            description: detail.description,
        });
    }

    info!(
        events = events.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scraping complete"
    );
    Ok(events)
}

fn fetch_detail(
    site: &dyn EventSite,
    fetcher: &dyn PageFetcher,
    link: &str,
    timeout: Duration,
) -> EventDetail {
    match fetcher.fetch_html(link, timeout) {
        Ok(html) => {
            let detail = site.parse_detail(&html);
            debug!(
                %link,
                date = detail.date.as_deref().unwrap_or(""),
                description_len = detail.description.as_ref().map(String::len).unwrap_or(0),
                "parsed detail page"
            );
            detail
        }
        Err(err) => {
            warn!(%link, error = %format!("{err:#}"), "error fetching detail page");
            EventDetail::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;

    use super::PageFetcher;

    /// Serves canned pages by URL; unknown URLs fail like a 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    impl PageFetcher for StaticFetcher {
        fn fetch_html(&self, url: &str, _timeout: Duration) -> anyhow::Result<String> {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("non-success status for {url}: 404 Not Found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::purdue_html::PurdueEvents;
    use super::testing::StaticFetcher;
    use super::*;

    const LISTING: &str = r#"
    <div class="em-card">
        <h3 class="em-card_title"><a href="/event/seminar-a">Seminar A</a></h3>
        <p class="em-card_event-text">Mon, Jun 3, 2024</p>
        <p class="em-card_event-text"><a href="/place/hall">Hall of Music</a></p>
    </div>
    <div class="em-card">
        <h3 class="em-card_title"><a href="/event/broken">Broken Detail</a></h3>
    </div>
    <div class="em-card">
        <h3 class="em-card_title">No anchor here</h3>
    </div>
    <div class="em-card">
        <h3 class="em-card_title"><a href="/event/third">Third Event</a></h3>
    </div>
    "#;

    const SEMINAR_DETAIL: &str = r#"
    <div class="em-list_dates__container"><p class="em-date">Mon, Jun 3, 2024</p></div>
    <div class="em-about_description"><p>A talk.</p></div>
    "#;

    const THIRD_DETAIL: &str = r#"<div class="em-about_description"><p>Third.</p></div>"#;

    fn fetcher() -> StaticFetcher {
        StaticFetcher::default()
            .with_page("https://events.purdue.edu/", LISTING)
            .with_page("https://events.purdue.edu/event/seminar-a", SEMINAR_DETAIL)
            .with_page("https://events.purdue.edu/event/third", THIRD_DETAIL)
    }

    #[test]
    fn emits_one_event_per_titled_card() {
        let fetcher = fetcher();
        let events = fetch_events(&PurdueEvents, &fetcher, &CollectOptions::default())
            .expect("listing fetch succeeds");

        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Seminar A", "Broken Detail", "Third Event"]);

        let seminar = &events[0];
        assert_eq!(seminar.date.as_deref(), Some("Mon, Jun 3, 2024"));
        assert_eq!(seminar.description.as_deref(), Some("A talk."));
        assert_eq!(seminar.location.as_deref(), Some("Hall of Music"));
        assert_eq!(
            seminar.link.as_deref(),
            Some("https://events.purdue.edu/event/seminar-a")
        );
    }

    #[test]
    fn failed_detail_page_keeps_event_without_date() {
        let fetcher = fetcher();
        let events = fetch_events(&PurdueEvents, &fetcher, &CollectOptions::default())
            .expect("listing fetch succeeds");
        let broken = &events[1];
        assert_eq!(broken.title, "Broken Detail");
        assert_eq!(broken.date, None);
        assert_eq!(broken.description, None);

        let third = &events[2];
        assert_eq!(third.date, None);
        assert_eq!(third.description.as_deref(), Some("Third."));
    }

    #[test]
    fn details_are_fetched_sequentially_after_listing() {
        let fetcher = fetcher();
        fetch_events(&PurdueEvents, &fetcher, &CollectOptions::default()).expect("fetch");
        let requests = fetcher.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![
                "https://events.purdue.edu/".to_string(),
                "https://events.purdue.edu/event/seminar-a".to_string(),
                "https://events.purdue.edu/event/broken".to_string(),
                "https://events.purdue.edu/event/third".to_string(),
            ]
        );
    }

    #[test]
    fn listing_failure_is_fatal() {
        let fetcher = StaticFetcher::default();
        let err = fetch_events(&PurdueEvents, &fetcher, &CollectOptions::default())
            .expect_err("listing missing");
        let CollectError::SourceUnavailable { url, reason } = err;
        assert_eq!(url, "https://events.purdue.edu/");
        assert!(reason.contains("404"));
    }

    #[test]
    fn audience_parses_loosely() {
        assert_eq!("Faculty".parse::<Audience>(), Ok(Audience::Faculty));
        assert_eq!("".parse::<Audience>(), Ok(Audience::General));
        assert!("alumni".parse::<Audience>().is_err());
    }
}
