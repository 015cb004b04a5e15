//! Pure HTML extraction for the calendar listing and event detail pages.
//! No network calls happen here; a malformed item is isolated and never
//! fails the rest of its page.

use crate::dedup::record_key;
use crate::types::{CandidateRecord, VenueInfo};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

static ITEM_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.EventSearchResultsModule-results-item").unwrap());
static PROMO_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("ps-promo.PromoEvent").unwrap());
static TITLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.PromoEvent-title").unwrap());
static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a.PromoEvent-link-link").unwrap());
static DESC_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.PromoEvent-description").unwrap());
static TIME_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("div.PromoEvent-time").unwrap());
static LISTING_DATE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.PromoEvent-date-date").unwrap());

static VENUE_SECTION_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation").unwrap());
static VENUE_NAME_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.VenueInformation-text-name").unwrap());
static VENUE_TEXT_SPAN_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation-text span").unwrap());
static ADDR_STREET_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.VenueInformation-address-street").unwrap());
static ADDR_CITY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.VenueInformation-address-city").unwrap());
static ADDR_STATE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.VenueInformation-address-state").unwrap());
static ADDR_ZIP_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.VenueInformation-address-zip").unwrap());
static ADDR_BLOCK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation-address").unwrap());
static PHONE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation-phone").unwrap());
static EMAIL_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation-email").unwrap());
static WEBSITE_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.VenueInformation-website a").unwrap());
static EVENT_PAGE_VENUE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.EventPage-venueInformation div.VenueInformation-text").unwrap());

// "... on Mon, 17 Nov 2025 ..."
static DOW_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"on\s+\w+,\s+(\d{1,2})\s+(\w+)\s+(\d{4})").unwrap());
// "November 17, 2025" / "Nov 17 2025"
static MONTH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s+(\d{1,2}),?\s+(\d{4})").unwrap());
static CLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d{1,2}:\d{2}\s*[AP]M)").unwrap());
static FREQUENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Every\s+\d+\s+weeks?[^.]*").unwrap());
static DOW_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday").unwrap()
});
static STATE_ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]{2})\s*(\d{5}(?:-\d{4})?)").unwrap());
static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{5}(?:-\d{4})?)").unwrap());
static STATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{2})\b").unwrap());

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Start/end times and recurrence info pulled out of a PromoEvent-time blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeInfo {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub recurring: bool,
    pub frequency_notes: Option<String>,
}

/// Street/city/state/zip split out of a free-text address block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn month_number(name: &str) -> Option<u32> {
    match name {
        "Jan" | "January" => Some(1),
        "Feb" | "February" => Some(2),
        "Mar" | "March" => Some(3),
        "Apr" | "April" => Some(4),
        "May" => Some(5),
        "Jun" | "June" => Some(6),
        "Jul" | "July" => Some(7),
        "Aug" | "August" => Some(8),
        "Sep" | "September" => Some(9),
        "Oct" | "October" => Some(10),
        "Nov" | "November" => Some(11),
        "Dec" | "December" => Some(12),
        _ => None,
    }
}

/// Extracts every candidate record from one listing page, in listing order.
/// Past-dated items are dropped, items missing both title and date are
/// dropped, and the page is deduplicated against itself (the source HTML
/// sometimes repeats an event within one page).
pub fn extract_listing(html: &str, site_origin: &str, today: NaiveDate) -> Vec<CandidateRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for item in document.select(&ITEM_SEL) {
        let Some(record) = extract_item(&item, site_origin, today) else {
            continue;
        };
        if !record.is_retainable() {
            debug!("dropping listing item with neither title nor date");
            continue;
        }
        if seen_keys.insert(record_key(&record)) {
            records.push(record);
        }
    }

    records
}

fn extract_item(item: &ElementRef, site_origin: &str, today: NaiveDate) -> Option<CandidateRecord> {
    let promo = item.select(&PROMO_SEL).next()?;

    // The heading usually wraps the title in an anchor
    let title = promo.select(&TITLE_SEL).next().and_then(|heading| {
        heading
            .select(&ANCHOR_SEL)
            .next()
            .and_then(|a| non_empty(text_of(&a)))
            .or_else(|| non_empty(text_of(&heading)))
    });

    let url = promo
        .select(&LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| absolutize(href, site_origin));

    let description = promo
        .select(&DESC_SEL)
        .next()
        .and_then(|d| non_empty(text_of(&d)));

    let time_text = promo.select(&TIME_SEL).next().map(|t| text_of(&t));
    let time_info = time_text
        .as_deref()
        .map(parse_time_info)
        .unwrap_or_default();

    // Prefer the listing's own date element, then fall back to the time blob
    let date = parse_listing_date(&promo, today)
        .or_else(|| time_text.as_deref().and_then(parse_date_from_time_text));

    if date.as_deref().is_some_and(|d| is_past_event(d, today)) {
        return None;
    }

    Some(CandidateRecord {
        title,
        description,
        date,
        start_time: time_info.start_time,
        end_time: time_info.end_time,
        recurring: time_info.recurring,
        frequency_notes: time_info.frequency_notes,
        url,
        venue: None,
    })
}

fn absolutize(href: &str, site_origin: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{site_origin}{href}")
    }
}

/// Reads the listing's `PromoEvent-date-date` element ("Nov 15 Saturday").
/// The year is inferred: a month earlier than the current one belongs to
/// next year, since the calendar only lists upcoming events.
fn parse_listing_date(promo: &ElementRef, today: NaiveDate) -> Option<String> {
    use chrono::Datelike;

    let element = promo.select(&LISTING_DATE_SEL).next()?;
    let text = DOW_NAME_RE.replace_all(&text_of(&element), "").trim().to_string();

    let mut parts = text.split_whitespace();
    let month = month_number(parts.next()?)?;
    let day: u32 = parts.next()?.parse().ok()?;

    let year = if month < today.month() {
        today.year() + 1
    } else {
        today.year()
    };

    Some(format!("{month:02}-{day:02}-{year}"))
}

/// Pulls an explicit date out of a PromoEvent-time blob, trying the
/// "on Mon, 17 Nov 2025" form first and a bare "November 17, 2025" second.
/// Output is the source's own `MM-DD-YYYY` form.
pub fn parse_date_from_time_text(text: &str) -> Option<String> {
    if let Some(caps) = DOW_DATE_RE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = &caps[3];
        return Some(format!("{month:02}-{day:02}-{year}"));
    }

    if let Some(caps) = MONTH_DATE_RE.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = &caps[3];
        return Some(format!("{month:02}-{day:02}-{year}"));
    }

    None
}

/// Splits a PromoEvent-time blob into clean start/end times plus recurrence
/// info ("Every 2 weeks on Tuesday", "Weekly on Saturday").
pub fn parse_time_info(text: &str) -> TimeInfo {
    let lower = text.to_lowercase();
    let mut info = TimeInfo::default();

    if lower.contains("every") || lower.contains("weekly") {
        info.recurring = true;

        if lower.contains("every") {
            info.frequency_notes = FREQUENCY_RE
                .find(text)
                .map(|m| m.as_str().trim().to_string());
        }

        for day in WEEKDAYS {
            if text.contains(day) {
                info.frequency_notes = Some(match info.frequency_notes.take() {
                    Some(notes) => format!("{notes} on {day}"),
                    None => format!("Weekly on {day}"),
                });
                break;
            }
        }
    }

    let mut clock_times = CLOCK_RE.find_iter(text);
    info.start_time = clock_times
        .next()
        .map(|m| m.as_str().to_uppercase().trim().to_string());
    info.end_time = clock_times
        .next()
        .map(|m| m.as_str().to_uppercase().trim().to_string());

    info
}

/// True when a `MM-DD-YYYY` date lies strictly before `today`. Unparseable
/// dates are never treated as past; the record still gets a chance downstream.
pub fn is_past_event(date: &str, today: NaiveDate) -> bool {
    NaiveDate::parse_from_str(date, "%m-%d-%Y")
        .map(|d| d < today)
        .unwrap_or(false)
}

/// Splits a free-text address like "123 Main St, Portland, ME 04101" into
/// components. Used only when the detail page lacks the per-field spans.
pub fn parse_address(address: &str) -> ParsedAddress {
    let cleaned = address.trim().replace('\n', ", ");
    let parts: Vec<&str> = cleaned
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut parsed = ParsedAddress::default();

    if let Some(first) = parts.first() {
        parsed.street = Some((*first).to_string());
    }

    if let Some(second) = parts.get(1) {
        if let Some(caps) = STATE_ZIP_RE.captures(second) {
            // The second part already carries state and zip, so any text
            // remaining before them is the city
            parsed.state = Some(caps[1].to_string());
            parsed.zip_code = Some(caps[2].to_string());
            let city = STATE_ZIP_RE.replace(second, "").trim().to_string();
            if !city.is_empty() {
                parsed.city = Some(city);
            }
        } else {
            parsed.city = Some((*second).to_string());
        }
    }

    if let Some(last) = parts.get(2) {
        if let Some(caps) = STATE_ZIP_RE.captures(last) {
            if parsed.state.is_none() {
                parsed.state = Some(caps[1].to_string());
            }
            if parsed.zip_code.is_none() {
                parsed.zip_code = Some(caps[2].to_string());
            }
        } else {
            if parsed.zip_code.is_none() {
                if let Some(caps) = ZIP_RE.captures(last) {
                    parsed.zip_code = Some(caps[1].to_string());
                }
            }
            if parsed.state.is_none() {
                if let Some(caps) = STATE_RE.captures(last) {
                    parsed.state = Some(caps[1].to_string());
                }
            }
        }
    }

    if parsed.state.is_none() && parts.iter().any(|p| *p == "Maine" || *p == "ME") {
        parsed.state = Some("ME".to_string());
    }

    parsed
}

/// Extracts venue details from an event's own page. Anything the page does
/// not carry stays `None`; the caller decides whether the result is worth
/// attaching to the record.
pub fn extract_venue_details(html: &str) -> VenueInfo {
    let document = Html::parse_document(html);
    let mut venue = VenueInfo::default();

    if let Some(section) = document.select(&VENUE_SECTION_SEL).next() {
        venue.name = section
            .select(&VENUE_NAME_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)))
            .or_else(|| {
                section
                    .select(&VENUE_TEXT_SPAN_SEL)
                    .next()
                    .and_then(|e| non_empty(text_of(&e)))
            });

        venue.street = section
            .select(&ADDR_STREET_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));
        venue.city = section
            .select(&ADDR_CITY_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));
        venue.state = section
            .select(&ADDR_STATE_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));
        venue.zip_code = section
            .select(&ADDR_ZIP_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));

        // Older event pages only have a single free-text address block
        if venue.street.is_none() {
            if let Some(block) = section.select(&ADDR_BLOCK_SEL).next() {
                let parsed = parse_address(&text_of(&block));
                venue.street = parsed.street.or(venue.street.take());
                venue.city = parsed.city.or(venue.city.take());
                venue.state = parsed.state.or(venue.state.take());
                venue.zip_code = parsed.zip_code.or(venue.zip_code.take());
            }
        }

        venue.phone = section
            .select(&PHONE_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));
        venue.email = section
            .select(&EMAIL_SEL)
            .next()
            .and_then(|e| non_empty(text_of(&e)));
        venue.website = section
            .select(&WEBSITE_LINK_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
    }

    // Some event pages only name the venue in the page body
    if venue.name.is_none() {
        if let Some(text_el) = document.select(&EVENT_PAGE_VENUE_SEL).next() {
            venue.name = text_of(&text_el)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
                .and_then(non_empty);
        }
    }

    venue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 12).unwrap()
    }

    const LISTING_HTML: &str = r#"
        <html><body><ul>
          <li class="EventSearchResultsModule-results-item">
            <ps-promo class="PromoEvent">
              <h3 class="PromoEvent-title"><a href="/event/book-fair">Book Fair</a></h3>
              <a class="PromoEvent-link-link" href="/event/book-fair"></a>
              <div class="PromoEvent-description">Annual used book sale.</div>
              <div class="PromoEvent-time">10:00 AM - 02:30 PM on Thu, 20 Nov 2025</div>
            </ps-promo>
          </li>
          <li class="EventSearchResultsModule-results-item">
            <ps-promo class="PromoEvent">
              <h3 class="PromoEvent-title"><a href="/event/book-fair">Book Fair</a></h3>
              <a class="PromoEvent-link-link" href="/event/book-fair"></a>
              <div class="PromoEvent-time">10:00 AM on Thu, 20 Nov 2025</div>
            </ps-promo>
          </li>
          <li class="EventSearchResultsModule-results-item">
            <ps-promo class="PromoEvent">
              <h3 class="PromoEvent-title">Harvest Dinner</h3>
              <a class="PromoEvent-link-link" href="https://other.example/dinner"></a>
              <div class="PromoEvent-time">06:00 PM on Sat, 01 Nov 2025</div>
            </ps-promo>
          </li>
          <li class="EventSearchResultsModule-results-item">
            <div class="not-a-promo">junk</div>
          </li>
        </ul></body></html>
    "#;

    #[test]
    fn listing_extracts_dedups_and_drops_past_events() {
        let records = extract_listing(LISTING_HTML, "https://www.mainepublic.org", today());

        // The duplicate Book Fair collapses and the past Harvest Dinner drops
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.title.as_deref(), Some("Book Fair"));
        assert_eq!(
            record.url.as_deref(),
            Some("https://www.mainepublic.org/event/book-fair")
        );
        assert_eq!(record.date.as_deref(), Some("11-20-2025"));
        assert_eq!(record.start_time.as_deref(), Some("10:00 AM"));
        assert_eq!(record.end_time.as_deref(), Some("02:30 PM"));
        assert_eq!(record.description.as_deref(), Some("Annual used book sale."));
        assert!(!record.recurring);
    }

    #[test]
    fn listing_date_element_wins_and_rolls_over_the_year() {
        let html = r#"
            <li class="EventSearchResultsModule-results-item">
              <ps-promo class="PromoEvent">
                <h3 class="PromoEvent-title">Winter Concert</h3>
                <p class="PromoEvent-date-date">Feb 3 Tuesday</p>
                <div class="PromoEvent-time">07:00 PM</div>
              </ps-promo>
            </li>
        "#;
        let records = extract_listing(html, "https://www.mainepublic.org", today());
        assert_eq!(records.len(), 1);
        // February is before November, so the event belongs to next year
        assert_eq!(records[0].date.as_deref(), Some("02-03-2026"));
    }

    #[test]
    fn time_info_detects_recurrence() {
        let info = parse_time_info("Every 2 weeks until Dec. Tuesday 06:30 PM - 08:00 PM");
        assert!(info.recurring);
        assert_eq!(
            info.frequency_notes.as_deref(),
            Some("Every 2 weeks until Dec on Tuesday")
        );
        assert_eq!(info.start_time.as_deref(), Some("06:30 PM"));
        assert_eq!(info.end_time.as_deref(), Some("08:00 PM"));

        let weekly = parse_time_info("Weekly event Saturday 09:00 AM");
        assert!(weekly.recurring);
        assert_eq!(weekly.frequency_notes.as_deref(), Some("Weekly on Saturday"));
    }

    #[test]
    fn time_info_single_event() {
        let info = parse_time_info("07:30 PM on Fri, 21 Nov 2025");
        assert!(!info.recurring);
        assert!(info.frequency_notes.is_none());
        assert_eq!(info.start_time.as_deref(), Some("07:30 PM"));
        assert!(info.end_time.is_none());
    }

    #[test]
    fn date_from_time_text_handles_both_forms() {
        assert_eq!(
            parse_date_from_time_text("07:00 PM on Mon, 17 Nov 2025").as_deref(),
            Some("11-17-2025")
        );
        assert_eq!(
            parse_date_from_time_text("November 17, 2025 at 07:00 PM").as_deref(),
            Some("11-17-2025")
        );
        assert!(parse_date_from_time_text("every Tuesday evening").is_none());
    }

    #[test]
    fn past_event_detection() {
        assert!(is_past_event("11-01-2025", today()));
        assert!(!is_past_event("11-20-2025", today()));
        // invalid dates are not "past"; the importer decides their fate
        assert!(!is_past_event("13-40-2025", today()));
    }

    #[test]
    fn address_parse_three_parts() {
        let parsed = parse_address("123 Main St, Portland, ME 04101");
        assert_eq!(parsed.street.as_deref(), Some("123 Main St"));
        assert_eq!(parsed.city.as_deref(), Some("Portland"));
        assert_eq!(parsed.state.as_deref(), Some("ME"));
        assert_eq!(parsed.zip_code.as_deref(), Some("04101"));
    }

    #[test]
    fn address_parse_state_and_zip_in_second_part() {
        let parsed = parse_address("45 Water St\nBangor ME 04401");
        assert_eq!(parsed.street.as_deref(), Some("45 Water St"));
        assert_eq!(parsed.city.as_deref(), Some("Bangor"));
        assert_eq!(parsed.state.as_deref(), Some("ME"));
        assert_eq!(parsed.zip_code.as_deref(), Some("04401"));
    }

    #[test]
    fn address_parse_state_name_fallback() {
        let parsed = parse_address("1 Elm St, Orono, Maine");
        assert_eq!(parsed.state.as_deref(), Some("ME"));
        assert!(parsed.zip_code.is_none());
    }

    const DETAIL_HTML: &str = r#"
        <html><body>
          <div class="VenueInformation">
            <span class="VenueInformation-text-name">Town Hall</span>
            <span class="VenueInformation-address-street">1 Municipal Way</span>
            <span class="VenueInformation-address-city">Portland</span>
            <span class="VenueInformation-address-state">ME</span>
            <span class="VenueInformation-address-zip">04101</span>
            <div class="VenueInformation-phone">207-555-0100</div>
            <div class="VenueInformation-email">hello@townhall.example</div>
            <div class="VenueInformation-website"><a href="https://townhall.example">site</a></div>
          </div>
        </body></html>
    "#;

    #[test]
    fn venue_details_from_field_spans() {
        let venue = extract_venue_details(DETAIL_HTML);
        assert_eq!(venue.name.as_deref(), Some("Town Hall"));
        assert_eq!(venue.street.as_deref(), Some("1 Municipal Way"));
        assert_eq!(venue.city.as_deref(), Some("Portland"));
        assert_eq!(venue.state.as_deref(), Some("ME"));
        assert_eq!(venue.zip_code.as_deref(), Some("04101"));
        assert_eq!(venue.phone.as_deref(), Some("207-555-0100"));
        assert_eq!(venue.email.as_deref(), Some("hello@townhall.example"));
        assert_eq!(venue.website.as_deref(), Some("https://townhall.example"));
    }

    #[test]
    fn venue_details_fall_back_to_address_block() {
        let html = r#"
            <div class="VenueInformation">
              <span class="VenueInformation-text-name">Grange Hall</span>
              <div class="VenueInformation-address">17 Depot Rd, Freeport, ME 04032</div>
            </div>
        "#;
        let venue = extract_venue_details(html);
        assert_eq!(venue.name.as_deref(), Some("Grange Hall"));
        assert_eq!(venue.street.as_deref(), Some("17 Depot Rd"));
        assert_eq!(venue.city.as_deref(), Some("Freeport"));
        assert_eq!(venue.zip_code.as_deref(), Some("04032"));
    }

    #[test]
    fn venue_details_missing_section_is_empty() {
        let venue = extract_venue_details("<html><body><p>nothing</p></body></html>");
        assert!(venue.is_empty());
    }
}
