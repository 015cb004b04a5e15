use crate::types::CandidateRecord;

/// Derives the stable identity used to recognize the same real-world event
/// across pages and runs. The source URL is unique per event, so it wins when
/// present; otherwise fall back to normalized title + date + start time.
pub fn record_key(record: &CandidateRecord) -> String {
    if let Some(url) = record.url.as_deref() {
        if !url.is_empty() {
            return url.to_string();
        }
    }

    let title = record.title.as_deref().unwrap_or("").trim().to_lowercase();
    let date = record.date.as_deref().unwrap_or("");
    let start_time = record.start_time.as_deref().unwrap_or("");
    format!("{title}|{date}|{start_time}")
}
