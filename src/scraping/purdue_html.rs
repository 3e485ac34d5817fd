use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{Audience, EventCard, EventDetail, EventSite};

const BASE_URL: &str = "https://events.purdue.edu";
const SITE_ID: &str = "purdue";
const GENERAL_URL: &str = "https://events.purdue.edu/";
const STUDENT_URL: &str = "https://events.purdue.edu/calendar/upcoming?event_types[]=39925425488556";
const FACULTY_URL: &str = "https://events.purdue.edu/calendar/week?card_size=small&order=date&experience=&event_types%5B%5D=39925426947703";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".em-card").expect("purdue card selector"));
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".em-card_title a").expect("purdue title link"));
static EVENT_TEXT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".em-card_event-text").expect("purdue event text"));
static EVENT_TEXT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".em-card_event-text a").expect("purdue location link"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("purdue image"));
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("anchor"));
static DATE_CONTAINER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.em-list_dates__container").expect("purdue date container")
});
static PRIMARY_DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.em-date").expect("purdue primary date"));
static EXTRA_DATES_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.em-list_dates__extra-message").expect("purdue extra dates")
});
static DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.em-about_description").expect("purdue description"));
static EXTRA_DATES_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Additional Event Dates:|Additional Event y,|Additional Dates:)\s*")
        .expect("extra dates prefix regex")
});

/// The Purdue events calendar (Localist "em-" markup).
pub struct PurdueEvents;

impl EventSite for PurdueEvents {
    fn site_id(&self) -> &'static str {
        SITE_ID
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn listing_url(&self, audience: Audience) -> String {
        match audience {
            Audience::General => GENERAL_URL,
            Audience::Student => STUDENT_URL,
            Audience::Faculty => FACULTY_URL,
        }
        .to_string()
    }

    fn parse_listing(&self, html: &str) -> Vec<EventCard> {
        let document = Html::parse_document(html);
        document
            .select(&CARD_SELECTOR)
            .filter_map(|card| parse_card(&card, self.base_url()))
            .collect()
    }

    fn parse_detail(&self, html: &str) -> EventDetail {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let date = root
            .select(&DATE_CONTAINER_SELECTOR)
            .next()
            .and_then(|container| combined_date(&container));

        let description = root
            .select(&DESCRIPTION_SELECTOR)
            .next()
            .map(|node| base::joined_text(node, "\n"))
            .filter(|text| !text.is_empty());

        EventDetail { date, description }
    }
}

fn parse_card(card: &ElementRef<'_>, base_url: &str) -> Option<EventCard> {
    let title_link = card.select(&TITLE_LINK_SELECTOR).next()?;
    let title = base::inner_text(title_link);
    if title.is_empty() {
        return None;
    }

    let link = base::absolute_url(base_url, title_link.value().attr("href").map(str::to_string));
    let image = base::absolute_url(base_url, base::first_attr(card, &IMAGE_SELECTOR, "src"));

    Some(EventCard {
        title,
        link,
        location: card_location(card),
        image,
    })
}

/// Linked location text, else the first later text block without a link.
fn card_location(card: &ElementRef<'_>) -> Option<String> {
    if let Some(location) = base::first_text(card, &EVENT_TEXT_LINK_SELECTOR) {
        return Some(location);
    }

    let first_block = card.select(&EVENT_TEXT_SELECTOR).next()?;
    let sibling = first_block
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| base::has_class(el, "em-card_event-text"))?;
    if sibling.select(&ANCHOR_SELECTOR).next().is_some() {
        return None;
    }
    Some(base::inner_text(sibling)).filter(|text| !text.is_empty())
}

fn combined_date(container: &ElementRef<'_>) -> Option<String> {
    let primary = base::first_text(container, &PRIMARY_DATE_SELECTOR);
    let additional = base::first_attr(container, &EXTRA_DATES_SELECTOR, "aria-label")
        .map(|label| strip_extra_dates_prefix(&label))
        .filter(|label| !label.is_empty());

    match (primary, additional) {
        (Some(primary), Some(additional)) => Some(format!("{primary}; {additional}")),
        (Some(primary), None) => Some(primary),
        _ => None,
    }
}

fn strip_extra_dates_prefix(label: &str) -> String {
    EXTRA_DATES_PREFIX_RE.replace(label, "").trim().to_string()
}
