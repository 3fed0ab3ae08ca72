// Change-detection signature for live sync.
//
// A poll tick only re-renders when the signature of the externally visible
// state changes. The encoding covers winners, the voting lock, per-film watch
// availability, the banner, and the user's performance; everything else
// (nomination order, titles, posters) is left out.

use std::fmt;

use serde::Serialize;

use crate::model::{NomineeSnapshot, Performance};

/// Stable string encoding of the render-relevant parts of remote state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the live-sync signature for a snapshot and the user's standing.
pub fn live_sync_signature(snapshot: &NomineeSnapshot, performance: &Performance) -> Signature {
    // BTreeMap iteration is already key-ordered.
    let winners: Vec<(&str, &str)> = snapshot
        .winners_by_category
        .iter()
        .map(|(category, film_id)| (category.as_str(), film_id.as_str()))
        .collect();

    let mut watch: Vec<(&str, bool, &str)> = snapshot
        .films
        .iter()
        .map(|film| {
            (
                film.id.as_str(),
                film.free_to_watch,
                film.where_to_watch_url.as_deref().unwrap_or(""),
            )
        })
        .collect();
    watch.sort();

    Signature(format!(
        "{}|{}|{}|{}|{}",
        to_json(&winners),
        snapshot.voting_locked,
        to_json(&watch),
        to_json(&snapshot.banner),
        to_json(performance),
    ))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Plain structs, tuples and string-keyed maps cannot fail to serialize.
    serde_json::to_string(value).unwrap_or_default()
}
