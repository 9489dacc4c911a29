//! `srcset`/`sizes` attribute assembly.

pub const DEFAULT_SIZES: &str = "(max-width: 1024px) 100vw, 1024px";

/// Build a `srcset` value from `(url, width)` candidates.
///
/// Candidates are ordered by width and duplicates of a width are dropped,
/// keeping the first. Returns `None` when there is nothing to offer.
pub fn build_srcset<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = (String, u32)>,
{
    let mut entries: Vec<(String, u32)> = candidates
        .into_iter()
        .filter(|(url, width)| !url.is_empty() && *width > 0)
        .collect();
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|(_, width)| *width);
    entries.dedup_by_key(|(_, width)| *width);

    let parts: Vec<String> = entries
        .into_iter()
        .map(|(url, width)| format!("{url} {width}w"))
        .collect();
    Some(parts.join(", "))
}
