//! Mirror-list resolution and traversal ordering.
//!
//! The mirror list is refreshed from a well-known URL at the start of a run;
//! if that fetch fails in any way the compiled-in fallback list is used
//! instead, so resolution itself can never fail. Each download walks the
//! mirrors in a freshly shuffled order so repeated runs spread load instead
//! of hammering whichever mirror happens to be listed first.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::commands::fetch::client::fetch_text;

/// Parse a mirror-list document: one base URL per line, `#` comments and
/// blank lines ignored, surrounding whitespace stripped.
pub(crate) fn parse_mirror_list(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| match line.find('#') {
            Some(idx) => line[..idx].trim(),
            None => line.trim(),
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetch the current mirror list, falling back to the compiled-in list on
/// any failure. Always returns at least the fallback.
pub(crate) fn resolve_mirrors(
    client: &Client,
    remote_list_url: &str,
    fallback: &[&str],
) -> Vec<String> {
    match fetch_text(client, remote_list_url, "Mirror list") {
        Ok(body) => {
            let mirrors = parse_mirror_list(&body);
            if mirrors.is_empty() {
                warn!(url = remote_list_url, "mirror list was empty, using fallback");
                fallback.iter().map(|m| m.to_string()).collect()
            } else {
                debug!(count = mirrors.len(), "resolved remote mirror list");
                mirrors
            }
        }
        Err(err) => {
            warn!(
                url = remote_list_url,
                error = %err,
                "mirror list fetch failed, using fallback"
            );
            fallback.iter().map(|m| m.to_string()).collect()
        }
    }
}

/// A freshly shuffled copy of the mirror list. The input is never mutated;
/// the random source is injected so traversal order is testable.
pub(crate) fn shuffled_mirrors<R: Rng>(mirrors: &[String], rng: &mut R) -> Vec<String> {
    let mut order: Vec<String> = mirrors.to_vec();
    order.shuffle(rng);
    order
}
