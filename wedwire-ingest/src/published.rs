//! Normalization of provider timestamps to absolute UTC instants.
//!
//! Providers mix relative phrases ("3 hours ago", "yesterday") with several
//! absolute formats. Anything unrecognised maps to the ingestion instant.
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(an?|\d+)\s+(second|sec|minute|min|hour|hr|day|week|month|year)s?\s+ago$")
        .expect("static pattern compiles")
});

/// Milliseconds per unit. Months count as 30 days and years as 365.
fn unit_millis(unit: &str) -> Option<i64> {
    Some(match unit {
        "second" | "sec" => 1_000,
        "minute" | "min" => 60_000,
        "hour" | "hr" => 3_600_000,
        "day" => 86_400_000,
        "week" => 604_800_000,
        "month" => 2_592_000_000,
        "year" => 31_536_000_000,
        _ => return None,
    })
}

/// Resolve `phrase` against `now`. Never fails: unparseable or missing input
/// yields `now`.
pub fn normalize_published(phrase: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(phrase) = phrase.map(str::trim).filter(|p| !p.is_empty()) else {
        return now;
    };
    relative(phrase, now)
        .or_else(|| absolute(phrase))
        .unwrap_or_else(|| {
            tracing::debug!(target: "ingest.published", phrase, "published.unparsed");
            now
        })
}

fn relative(phrase: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = phrase.to_ascii_lowercase();
    match lowered.as_str() {
        "just now" | "now" | "today" => return Some(now),
        "yesterday" => return Some(now - Duration::days(1)),
        _ => {}
    }
    let caps = RELATIVE.captures(&lowered)?;
    let amount: i64 = match &caps[1] {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };
    let millis = amount.checked_mul(unit_millis(&caps[2])?)?;
    now.checked_sub_signed(Duration::milliseconds(millis))
}

fn absolute(phrase: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(phrase) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(phrase) {
        return Some(t.with_timezone(&Utc));
    }
    // "06/01/2024, 07:00 AM, +0000 UTC"
    let provider = phrase.trim_end_matches("UTC").trim_end();
    if let Ok(t) = DateTime::parse_from_str(provider, "%m/%d/%Y, %I:%M %p, %z") {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(phrase, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-10T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn relative_phrases_use_the_unit_table() {
        let now = t();
        assert_eq!(
            normalize_published(Some("3 hours ago"), now),
            now - Duration::hours(3)
        );
        assert_eq!(
            normalize_published(Some("an hour ago"), now),
            now - Duration::hours(1)
        );
        assert_eq!(
            normalize_published(Some("1 day ago"), now),
            now - Duration::days(1)
        );
        assert_eq!(
            normalize_published(Some("45 mins ago"), now),
            now - Duration::minutes(45)
        );
        assert_eq!(
            normalize_published(Some("2 Weeks ago"), now),
            now - Duration::weeks(2)
        );
        assert_eq!(
            normalize_published(Some("1 month ago"), now),
            now - Duration::days(30)
        );
        assert_eq!(
            normalize_published(Some("yesterday"), now),
            now - Duration::days(1)
        );
        assert_eq!(normalize_published(Some("just now"), now), now);
    }

    #[test]
    fn unparseable_input_is_ingestion_time() {
        let now = t();
        assert_eq!(normalize_published(Some("sometime last spring"), now), now);
        assert_eq!(normalize_published(Some("3 fortnights ago"), now), now);
        assert_eq!(normalize_published(Some(""), now), now);
        assert_eq!(normalize_published(None, now), now);
        assert_eq!(
            normalize_published(Some("99999999999999999999 years ago"), now),
            now
        );
    }

    #[test]
    fn absolute_formats() {
        let now = t();
        let expect = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc)
        };
        assert_eq!(
            normalize_published(Some("06/01/2024, 07:00 AM, +0000 UTC"), now),
            expect("2024-06-01T07:00:00Z")
        );
        assert_eq!(
            normalize_published(Some("06/01/2024, 07:15 PM, +0200 UTC"), now),
            expect("2024-06-01T17:15:00Z")
        );
        assert_eq!(
            normalize_published(Some("2024-05-31T22:00:00+02:00"), now),
            expect("2024-05-31T20:00:00Z")
        );
        assert_eq!(
            normalize_published(Some("2024-05-30"), now),
            expect("2024-05-30T00:00:00Z")
        );
        assert_eq!(
            normalize_published(Some("Jun 1, 2024"), now),
            expect("2024-06-01T00:00:00Z")
        );
        assert_eq!(
            normalize_published(Some("Sat, 01 Jun 2024 09:00:00 GMT"), now),
            expect("2024-06-01T09:00:00Z")
        );
    }
}
