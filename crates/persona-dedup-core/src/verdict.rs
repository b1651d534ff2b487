//! Free-text verdict parsing and citation deduplication.
//!
//! The classifier is asked to reply with exactly `SAME` or `DIFFERENT`, but
//! replies are parsed defensively: uppercase the text, then look for `SAME`
//! before `DIFFERENT`. A reply containing both tokens resolves to `Same`.

use std::collections::HashMap;

use crate::models::{Citation, RowResult, Verdict};

/// Map a free-text classifier reply to a [`Verdict`].
///
/// ```rust
/// use persona_dedup_core::models::Verdict;
/// use persona_dedup_core::verdict::parse_verdict;
///
/// assert_eq!(parse_verdict(" same\n"), Verdict::Same);
/// assert_eq!(parse_verdict("They are DIFFERENT people."), Verdict::Different);
/// assert_eq!(parse_verdict("I cannot tell."), Verdict::Inconclusive);
/// ```
pub fn parse_verdict(text: &str) -> Verdict {
    let upper = text.trim().to_uppercase();
    if upper.contains("SAME") {
        Verdict::Same
    } else if upper.contains("DIFFERENT") {
        Verdict::Different
    } else {
        Verdict::Inconclusive
    }
}

/// Drop empty URIs and collapse repeats of a URI into one entry. The entry
/// keeps the position of the first occurrence and the title of the last.
pub fn dedup_citations<I>(citations: I) -> Vec<Citation>
where
    I: IntoIterator<Item = Citation>,
{
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Citation> = Vec::new();
    for citation in citations {
        if citation.uri.trim().is_empty() {
            continue;
        }
        match position.get(&citation.uri) {
            Some(&i) => out[i] = citation,
            None => {
                position.insert(citation.uri.clone(), out.len());
                out.push(citation);
            }
        }
    }
    out
}

/// All sources cited across a result set, one entry per URI.
pub fn collect_sources(results: &[RowResult]) -> Vec<Citation> {
    dedup_citations(results.iter().flat_map(|r| r.citations.iter().cloned()))
}
