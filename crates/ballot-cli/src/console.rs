// Plain-text rendering of the ballot view.
//
// The console owns stdout; logs go to a file. Formatting is kept in pure
// functions so the renderer itself is a thin writer.

use std::collections::BTreeSet;
use std::io::Write;

use tokio::sync::watch;
use tracing::warn;

use ballot_app::api::admin::{AuditLog, Dashboard};
use ballot_app::protocol::{Notice, RenderScope};
use ballot_app::render::Renderer;
use ballot_app::state::ViewState;
use ballot_core::model::{Film, ALL_CATEGORIES};
use ballot_core::view::{
    banner_text, ordered_categories, resolve_watch_url, sorted_films, ProgressSummary,
};

// ---------------------------------------------------------------------------
// ViewContext
// ---------------------------------------------------------------------------

/// What the input side needs to know about the last rendered view: the
/// selected category and the numbered category list shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    pub category: String,
    pub categories: Vec<String>,
}

impl Default for ViewContext {
    fn default() -> Self {
        ViewContext {
            category: ALL_CATEGORIES.to_string(),
            categories: Vec::new(),
        }
    }
}

impl ViewContext {
    pub fn from_view(view: &ViewState) -> Self {
        ViewContext {
            category: view.session.category.clone(),
            categories: ordered_categories(&view.snapshot)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Resolve a category argument: `all`/`0`, a 1-based list number, or an
    /// exact (case-insensitive) name.
    pub fn resolve_category(&self, arg: &str) -> Option<String> {
        let arg = arg.trim();
        if arg.eq_ignore_ascii_case("all") || arg == "0" || arg == ALL_CATEGORIES {
            return Some(ALL_CATEGORIES.to_string());
        }
        if let Ok(n) = arg.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| self.categories.get(i))
                .cloned();
        }
        self.categories
            .iter()
            .find(|name| name.eq_ignore_ascii_case(arg))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn format_view(view: &ViewState, scope: RenderScope) -> String {
    match scope {
        RenderScope::Full => {
            let mut out = format_header(view);
            out.push_str(&format_banner(view));
            out.push_str(&format_films(view));
            out
        }
        RenderScope::Films => format_films(view),
        RenderScope::Banner => format_banner(view),
    }
}

fn format_header(view: &ViewState) -> String {
    let mut out = String::new();

    let years: Vec<String> = view
        .years
        .iter()
        .map(|entry| match &entry.label {
            Some(label) => format!("{} ({label})", entry.year),
            None => entry.year.to_string(),
        })
        .collect();
    match view.session.year {
        Some(year) => out.push_str(&format!("== Ceremony {year} ==  years: {}\n", years.join(", "))),
        None => out.push_str("== No ceremony years available ==\n"),
    }

    let mut listed: Vec<String> = ordered_categories(&view.snapshot)
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}) {name}", i + 1))
        .collect();
    listed.push("0) All films".to_string());
    out.push_str(&format!("Categories: {}\n", listed.join("  ")));

    out.push_str(&format!(
        "Category: {} | Sort: {} | Event mode: {} | Voting: {}\n",
        category_label(&view.session.category),
        view.session.sort.as_str(),
        if view.event_mode { "live" } else { "off" },
        if view.snapshot.voting_locked { "locked" } else { "open" },
    ));
    out
}

fn format_banner(view: &ViewState) -> String {
    match banner_text(&view.snapshot.banner) {
        Some(text) => format!(">> {text}\n"),
        None => String::new(),
    }
}

fn category_label(category: &str) -> &str {
    if category == ALL_CATEGORIES {
        "All films"
    } else {
        category
    }
}

fn format_films(view: &ViewState) -> String {
    let mut out = String::new();
    let snapshot = &view.snapshot;
    let record = &view.record;
    let category = view.session.category.as_str();
    let all = category == ALL_CATEGORIES;

    let seen_here = snapshot
        .films
        .iter()
        .filter(|film| record.has_seen(&film.id))
        .count();
    if all {
        out.push_str(&format!(
            "You have seen {seen_here} of {} nominated films\n",
            snapshot.films.len()
        ));
    } else {
        out.push_str(&format!(
            "You have seen {seen_here} of {} {category} nominees\n",
            snapshot.films.len()
        ));
    }

    let progress = ProgressSummary::compute(snapshot, record);
    out.push_str(&format!(
        "{}% Seen ({} / {})",
        progress.seen_percent, progress.seen, progress.total
    ));
    if let Some(accuracy) = &progress.accuracy {
        out.push_str(&format!(
            " | {}% Pick Accuracy ({} / {}) | {} ({}%)",
            accuracy.percent,
            accuracy.correct,
            accuracy.decided,
            accuracy.leaderboard_label,
            accuracy.leaderboard_percent
        ));
    }
    out.push('\n');

    for film in sorted_films(snapshot, view.session.sort) {
        out.push_str(&format_film(view, film));
        out.push('\n');
    }
    out
}

fn format_film(view: &ViewState, film: &Film) -> String {
    let snapshot = &view.snapshot;
    let category = view.session.category.as_str();
    let seen = if view.record.has_seen(&film.id) { "[x]" } else { "[ ]" };
    let mut line = format!("  {seen} {} <{}>", film.title, film.id);

    if category == ALL_CATEGORIES {
        let categories: BTreeSet<&str> = snapshot
            .nominations
            .iter()
            .filter(|n| n.film_id == film.id)
            .map(|n| n.category.as_str())
            .collect();
        let n = categories.len();
        line.push_str(&format!(" - {n} Nomination{}", if n == 1 { "" } else { "s" }));
    } else {
        let nominees: Vec<&str> = snapshot
            .nominations
            .iter()
            .filter(|n| n.film_id == film.id && n.category == category)
            .filter_map(|n| n.nominee.as_deref())
            .filter(|name| !name.is_empty())
            .collect();
        if !nominees.is_empty() {
            line.push_str(&format!(" - {}", nominees.join(" / ")));
        }

        let winner = snapshot.winners_by_category.get(category);
        let picked = view.record.pick(category) == Some(&film.id);
        let is_winner = winner == Some(&film.id);
        if picked {
            let verdict = match winner {
                Some(_) if is_winner => " (correct)",
                Some(_) => " (missed)",
                None => "",
            };
            line.push_str(&format!("  [My Pick{verdict}]"));
        }
        if is_winner {
            line.push_str("  * WINNER");
        }
    }

    if let Some(url) = resolve_watch_url(film) {
        line.push_str(&format!("  watch: {url}"));
    }
    if film.free_to_watch {
        line.push_str("  (free)");
    }
    line
}

pub fn format_dashboard(dashboard: &Dashboard) -> String {
    format!(
        "Users: {} | Compared: {} | Picks: {} | Winners set: {}\n",
        dashboard.unique_users,
        dashboard.users_compared,
        dashboard.total_picks,
        dashboard.winner_categories
    )
}

/// One line per entry, newest first, then the per-action totals.
pub fn format_audit_log(log: &AuditLog) -> String {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    let mut out = String::new();
    for entry in &log.logs {
        let details = if entry.details.is_null() {
            "{}".to_string()
        } else {
            entry.details.to_string()
        };
        out.push_str(&format!(
            "  {}  {}  {}  {}  {}  {}\n",
            or_dash(&entry.created_at),
            entry.action,
            if entry.success { "Success" } else { "Failure" },
            or_dash(&entry.actor_email),
            or_dash(&entry.request_ip),
            details
        ));
    }
    if !log.actions.is_empty() {
        let totals: Vec<String> = log
            .actions
            .iter()
            .map(|a| format!("{} ({})", a.action, a.count))
            .collect();
        out.push_str(&format!("Actions: {}\n", totals.join(", ")));
    }
    out.push_str(&format!("{} log entries loaded.\n", log.logs.len()));
    out
}

// ---------------------------------------------------------------------------
// ConsoleRenderer
// ---------------------------------------------------------------------------

/// Writes each render to `out` and publishes the rendered selection to the
/// input loop.
pub struct ConsoleRenderer<W> {
    out: W,
    context: watch::Sender<ViewContext>,
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W, context: watch::Sender<ViewContext>) -> Self {
        ConsoleRenderer { out, context }
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write to console: {e}");
        }
    }
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn render(&mut self, view: &ViewState, scope: RenderScope) {
        self.context.send_replace(ViewContext::from_view(view));
        let text = format_view(view, scope);
        self.write(&text);
    }

    fn notify(&mut self, notice: &Notice) {
        self.write(&format!("! {notice}\n"));
    }
}
