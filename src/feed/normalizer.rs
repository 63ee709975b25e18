use super::parser::{RawEntry, UNTITLED};
use crate::storage::PostDraft;
use crate::util::{first_line, strip_control_chars};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Posts are keyed by link; an entry without one cannot be stored
    #[error("entry has no link")]
    MissingLink,
}

/// Map a raw entry onto the canonical post shape.
///
/// - title: first line only, trimmed, control characters removed; a blank
///   first line becomes `Untitled`
/// - description: the entry's description, or the title when empty
/// - image: all image URLs comma-joined, `None` when there are none
/// - published: passed through; the store defaults it to ingestion time
pub fn normalize(entry: RawEntry) -> Result<PostDraft, NormalizeError> {
    let external_link = entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(NormalizeError::MissingLink)?
        .to_owned();

    let title = match first_line(&strip_control_chars(&entry.title)) {
        "" => UNTITLED.to_owned(),
        line => line.to_owned(),
    };

    let description = match strip_control_chars(entry.description.trim()) {
        d if d.is_empty() => title.clone(),
        d => d.into_owned(),
    };

    let summary = Some(strip_control_chars(entry.summary.trim()).into_owned())
        .filter(|s| !s.is_empty());

    let image_url = Some(
        entry
            .image_urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect::<Vec<_>>()
            .join(","),
    )
    .filter(|joined| !joined.is_empty());

    Ok(PostDraft {
        title,
        description,
        summary,
        image_url,
        external_link,
        published: entry.published.map(|d| d.timestamp()),
    })
}
