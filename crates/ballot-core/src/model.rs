// Remote state models: nominee snapshots, per-user records, and the view session.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Pseudo category selecting every nominated film of the year.
pub const ALL_CATEGORIES: &str = "__ALL__";

/// Category shown when nothing else has been chosen.
pub const DEFAULT_CATEGORY: &str = "Actor in a Leading Role";

pub type FilmId = String;

/// Category name -> picked (or winning) film.
pub type PickMap = BTreeMap<String, FilmId>;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// How the film list is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Title,
    Nominations,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(SortOrder::Title),
            "nominations" => Some(SortOrder::Nominations),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Title => "title",
            SortOrder::Nominations => "nominations",
        }
    }
}

/// The user's current view selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// `None` until a year has been chosen from the years list.
    pub year: Option<u32>,
    pub category: String,
    pub sort: SortOrder,
}

impl Session {
    pub fn new(category: &str) -> Self {
        Session {
            year: None,
            category: category.to_string(),
            sort: SortOrder::default(),
        }
    }

    pub fn is_all_categories(&self) -> bool {
        self.category == ALL_CATEGORIES
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(DEFAULT_CATEGORY)
    }
}

// ---------------------------------------------------------------------------
// Nominee snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearEntry {
    pub year: u32,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YearsResponse {
    #[serde(default)]
    pub years: Vec<YearEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub year_started: Option<u32>,
    #[serde(default)]
    pub year_ended: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Film {
    pub id: FilmId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub where_to_watch_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub free_to_watch: bool,
    #[serde(default)]
    pub poster_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
    pub category: String,
    pub film_id: FilmId,
    #[serde(default)]
    pub nominee: Option<String>,
}

/// Announcement banner shown above the film list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Banner {
    pub enabled: bool,
    pub text: String,
}

impl Default for Banner {
    fn default() -> Self {
        Banner {
            enabled: true,
            text: String::new(),
        }
    }
}

/// The authoritative remote view for one year. Replaced wholesale on every
/// fetch; never patched in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NomineeSnapshot {
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub films: Vec<Film>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nominations: Vec<Nomination>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub winners_by_category: PickMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub banner: Banner,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_mode: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub voting_locked: bool,
}

impl NomineeSnapshot {
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    pub fn film(&self, film_id: &str) -> Option<&Film> {
        self.films.iter().find(|f| f.id == film_id)
    }
}

// ---------------------------------------------------------------------------
// User record
// ---------------------------------------------------------------------------

/// Leaderboard standing computed by the server once winners are announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Performance {
    pub winner_category_count: u32,
    pub user_correct_count: u32,
    pub better_than_percent: u32,
    pub compared_user_count: u32,
    pub rank_position: u32,
    pub ranked_user_count: u32,
    pub tied_user_count: u32,
}

impl Default for Performance {
    fn default() -> Self {
        Performance {
            winner_category_count: 0,
            user_correct_count: 0,
            better_than_percent: 0,
            compared_user_count: 0,
            rank_position: 1,
            ranked_user_count: 0,
            tied_user_count: 1,
        }
    }
}

/// Seen films, picks, and standing for one (year, user) pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub seen_film_ids: BTreeSet<FilmId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub picks_by_category: PickMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub performance: Performance,
}

impl UserRecord {
    pub fn has_seen(&self, film_id: &str) -> bool {
        self.seen_film_ids.contains(film_id)
    }

    pub fn pick(&self, category: &str) -> Option<&FilmId> {
        self.picks_by_category.get(category)
    }
}

/// Effective picks after a fetch: start from the locally cached map, then
/// overlay every key the server reported. Remote wins per key; local entries
/// survive only where the server has nothing yet.
pub fn merge_picks(local: &PickMap, remote: &PickMap) -> PickMap {
    let mut merged = local.clone();
    for (category, film_id) in remote {
        merged.insert(category.clone(), film_id.clone());
    }
    merged
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
