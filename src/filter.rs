use serde::{Deserialize, Serialize};

use crate::models::RawEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredField {
    Title,
    Date,
    Location,
    Link,
    Image,
    Description,
}

impl RequiredField {
    fn value<'a>(&self, event: &'a RawEvent) -> Option<&'a str> {
        match self {
            RequiredField::Title => Some(event.title.as_str()),
            RequiredField::Date => event.date.as_deref(),
            RequiredField::Location => event.location.as_deref(),
            RequiredField::Link => event.link.as_deref(),
            RequiredField::Image => event.image.as_deref(),
            RequiredField::Description => event.description.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPolicy {
    pub required_fields: Vec<RequiredField>,
    /// Treat whitespace-only descriptions as missing.
    pub blank_description_is_empty: bool,
    /// `None` sends every complete event.
    pub max_size: Option<usize>,
}

pub fn is_complete(event: &RawEvent, policy: &BatchPolicy) -> bool {
    policy.required_fields.iter().all(|field| {
        let Some(value) = field.value(event) else {
            return false;
        };
        if value.is_empty() {
            return false;
        }
        !(policy.blank_description_is_empty
            && *field == RequiredField::Description
            && value.trim().is_empty())
    })
}

/// Complete events only, in their original order.
pub fn filter_complete(events: &[RawEvent], policy: &BatchPolicy) -> Vec<RawEvent> {
    events
        .iter()
        .filter(|event| is_complete(event, policy))
        .cloned()
        .collect()
}

/// Leading slice of `filtered`, capped at `max_size`.
pub fn take_batch(filtered: &[RawEvent], max_size: Option<usize>) -> Vec<RawEvent> {
    let limit = max_size.unwrap_or(filtered.len()).min(filtered.len());
    filtered[..limit].to_vec()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// How many events passed the completeness check, before the cap.
    pub complete: usize,
    pub batch: Vec<RawEvent>,
}

pub fn select_batch(events: &[RawEvent], policy: &BatchPolicy) -> Selection {
    let filtered = filter_complete(events, policy);
    Selection {
        complete: filtered.len(),
        batch: take_batch(&filtered, policy.max_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str, date: Option<&str>, description: Option<&str>) -> RawEvent {
        RawEvent {
            title: title.to_string(),
            date: date.map(str::to_string),
            location: None,
            link: Some(format!("https://events.example.edu/{title}")),
            image: None,
            description: description.map(str::to_string),
        }
    }

    fn service_policy(max_size: Option<usize>) -> BatchPolicy {
        BatchPolicy {
            required_fields: vec![
                RequiredField::Title,
                RequiredField::Date,
                RequiredField::Link,
                RequiredField::Description,
            ],
            blank_description_is_empty: true,
            max_size,
        }
    }

    fn sample() -> Vec<RawEvent> {
        vec![
            event("a", Some("Jun 3, 2024"), Some("A talk.")),
            event("b", None, Some("No date.")),
            event("c", Some("Jun 4, 2024"), Some("   ")),
            event("d", Some("Jun 5, 2024"), Some("Workshop.")),
            event("e", Some(""), Some("Empty date.")),
            event("f", Some("Jun 6, 2024"), Some("Fair.")),
        ]
    }

    #[test]
    fn drops_incomplete_events() {
        let kept = filter_complete(&sample(), &service_policy(None));
        let titles: Vec<_> = kept.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "d", "f"]);
    }

    #[test]
    fn whitespace_description_survives_without_blank_policy() {
        let mut policy = service_policy(None);
        policy.blank_description_is_empty = false;
        let kept = filter_complete(&sample(), &policy);
        assert!(kept.iter().any(|e| e.title == "c"));
    }

    #[test]
    fn filtering_is_idempotent() {
        let policy = service_policy(None);
        let once = filter_complete(&sample(), &policy);
        let twice = filter_complete(&once, &policy);
        assert_eq!(once, twice);
    }

    #[test]
    fn batch_is_capped_and_keeps_order() {
        let selection = select_batch(&sample(), &service_policy(Some(2)));
        let titles: Vec<_> = selection.batch.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "d"]);
        assert_eq!(selection.complete, 3);

        let selection = select_batch(&sample(), &service_policy(Some(10)));
        assert_eq!(selection.batch.len(), 3);

        let selection = select_batch(&sample(), &service_policy(None));
        assert_eq!(selection.batch.len(), 3);

        let selection = select_batch(&sample(), &service_policy(Some(0)));
        assert!(selection.batch.is_empty());
        assert_eq!(selection.complete, 3);
    }

    #[test]
    fn location_requirement_applies_when_listed() {
        let mut policy = service_policy(None);
        policy.required_fields.push(RequiredField::Location);
        assert!(filter_complete(&sample(), &policy).is_empty());
    }
}
