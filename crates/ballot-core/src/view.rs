// Pure view derivations shared by renderers: category ordering, selection
// fallbacks, film sorting, watch links, and progress/leaderboard summaries.

use std::collections::{HashMap, HashSet};

use crate::model::{
    Banner, Film, NomineeSnapshot, SortOrder, UserRecord, YearEntry, ALL_CATEGORIES,
    DEFAULT_CATEGORY,
};

/// Ceremony order used for the category selector. Categories the server
/// reports that are not listed here follow in server order.
pub const CATEGORY_VIEW_ORDER: &[&str] = &[
    "Actor in a Leading Role",
    "Actor in a Supporting Role",
    "Actress in a Leading Role",
    "Actress in a Supporting Role",
    "Animated Feature Film",
    "Animated Short Film",
    "Casting",
    "Cinematography",
    "Costume Design",
    "Directing",
    "Documentary Feature Film",
    "Documentary Short Film",
    "Film Editing",
    "International Feature Film",
    "Live Action Short Film",
    "Makeup and Hairstyling",
    "Music (Original Score)",
    "Music (Original Song)",
    "Best Picture",
    "Production Design",
    "Sound",
    "Visual Effects",
    "Writing (Adapted Screenplay)",
    "Writing (Original Screenplay)",
];

pub fn ordered_categories(snapshot: &NomineeSnapshot) -> Vec<&str> {
    let present: Vec<&str> = snapshot.categories.iter().map(|c| c.name.as_str()).collect();
    let mut ordered: Vec<&str> = CATEGORY_VIEW_ORDER
        .iter()
        .copied()
        .filter(|name| present.contains(name))
        .collect();
    for name in present {
        if !ordered.contains(&name) {
            ordered.push(name);
        }
    }
    ordered
}

/// Keep the saved year if the server still lists it, otherwise take the
/// first (most recent) listed year.
pub fn resolve_year(saved: Option<u32>, years: &[YearEntry]) -> Option<u32> {
    match saved {
        Some(year) if years.iter().any(|y| y.year == year) => Some(year),
        _ => years.first().map(|y| y.year).or(saved),
    }
}

/// Keep the selected category if the snapshot has it, otherwise fall back
/// to the default category, then the first category, then all films.
pub fn resolve_category(selected: &str, snapshot: &NomineeSnapshot) -> String {
    if selected == ALL_CATEGORIES || snapshot.has_category(selected) {
        return selected.to_string();
    }
    if snapshot.has_category(DEFAULT_CATEGORY) {
        return DEFAULT_CATEGORY.to_string();
    }
    snapshot
        .categories
        .first()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| ALL_CATEGORIES.to_string())
}

pub fn sorted_films(snapshot: &NomineeSnapshot, sort: SortOrder) -> Vec<&Film> {
    let mut films: Vec<&Film> = snapshot.films.iter().collect();
    let by_title = |a: &&Film, b: &&Film| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.title.cmp(&b.title))
    };
    match sort {
        SortOrder::Title => films.sort_by(by_title),
        SortOrder::Nominations => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for n in &snapshot.nominations {
                *counts.entry(n.film_id.as_str()).or_default() += 1;
            }
            films.sort_by(|a, b| {
                let ca = counts.get(a.id.as_str()).copied().unwrap_or(0);
                let cb = counts.get(b.id.as_str()).copied().unwrap_or(0);
                cb.cmp(&ca).then_with(|| by_title(a, b))
            });
        }
    }
    films
}

/// The film's watch link, or `None` when missing or only a search page.
pub fn resolve_watch_url(film: &Film) -> Option<&str> {
    let url = film.where_to_watch_url.as_deref()?.trim();
    if url.is_empty() {
        return None;
    }
    let lower = url.to_lowercase();
    if lower.contains("justwatch.com") && (lower.contains("/search") || lower.contains("?q=")) {
        return None;
    }
    Some(url)
}

/// Banner text to display, if the banner is enabled and non-blank.
pub fn banner_text(banner: &Banner) -> Option<&str> {
    let text = banner.text.trim();
    (banner.enabled && !text.is_empty()).then_some(text)
}

/// Seen progress, pick accuracy, and leaderboard standing for one year.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub seen: usize,
    pub total: usize,
    pub seen_percent: u32,
    /// `None` until at least one winner has been announced.
    pub accuracy: Option<Accuracy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accuracy {
    pub correct: usize,
    pub decided: usize,
    pub percent: u32,
    pub leaderboard_label: String,
    /// 0..=100, higher is better.
    pub leaderboard_percent: u32,
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        ((part as f64 / whole as f64) * 100.0).round() as u32
    }
}

impl ProgressSummary {
    pub fn compute(snapshot: &NomineeSnapshot, record: &UserRecord) -> Self {
        let year_films: HashSet<&str> = snapshot
            .nominations
            .iter()
            .map(|n| n.film_id.as_str())
            .collect();
        let seen = record
            .seen_film_ids
            .iter()
            .filter(|id| year_films.contains(id.as_str()))
            .count();
        let total = year_films.len();

        let decided = snapshot.winners_by_category.len();
        let accuracy = (decided > 0).then(|| {
            let correct = snapshot
                .winners_by_category
                .iter()
                .filter(|(category, winner)| record.pick(category) == Some(*winner))
                .count();

            let perf = &record.performance;
            let rank = perf.rank_position.max(1);
            let ranked = perf.ranked_user_count;
            let leaderboard_percent = if ranked > 1 {
                let normalized =
                    (ranked.saturating_sub(rank)) as f64 / (ranked - 1) as f64 * 100.0;
                normalized.round().clamp(0.0, 100.0) as u32
            } else {
                100
            };
            let prefix = if perf.tied_user_count > 1 {
                "Tied for"
            } else {
                "Rank"
            };

            Accuracy {
                correct,
                decided,
                percent: percent(correct, decided),
                leaderboard_label: format!("{prefix} #{rank} of {} Users", ranked.max(1)),
                leaderboard_percent,
            }
        });

        ProgressSummary {
            seen,
            total,
            seen_percent: percent(seen, total),
            accuracy,
        }
    }
}
