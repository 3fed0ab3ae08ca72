// Immutable view state and its reducer.
//
// Every change to what the user sees goes through `reduce`, which returns a
// new `ViewState` and leaves the old one untouched. Snapshots are shared
// behind `Arc` and replaced wholesale, never patched.

use std::sync::Arc;

use ballot_core::local::Surface;
use ballot_core::model::{
    FilmId, NomineeSnapshot, Session, SortOrder, UserRecord, YearEntry, ALL_CATEGORIES,
};
use ballot_core::view::{resolve_category, resolve_year};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub surface: Surface,
    pub session: Session,
    pub years: Vec<YearEntry>,
    pub snapshot: Arc<NomineeSnapshot>,
    pub record: UserRecord,
    /// Starts from the snapshot flag, but a cross-tab signal can flip it
    /// before the next fetch lands.
    pub event_mode: bool,
}

impl ViewState {
    pub fn new(surface: Surface, session: Session) -> Self {
        ViewState {
            surface,
            session,
            years: Vec::new(),
            snapshot: Arc::new(NomineeSnapshot::default()),
            record: UserRecord::default(),
            event_mode: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    YearsLoaded(Vec<YearEntry>),
    SnapshotLoaded(Arc<NomineeSnapshot>),
    /// The record is expected to already carry merged picks.
    RecordLoaded(UserRecord),
    SetSeen { film_id: FilmId, seen: bool },
    SetPick { category: String, film_id: Option<FilmId> },
    SetEventMode(bool),
    SelectYear(u32),
    SelectCategory(String),
    SelectSort(SortOrder),
}

pub fn reduce(state: &ViewState, action: Action) -> ViewState {
    let mut next = state.clone();
    match action {
        Action::YearsLoaded(years) => {
            next.session.year = resolve_year(next.session.year, &years);
            next.years = years;
        }
        Action::SnapshotLoaded(snapshot) => {
            next.session.category = match next.surface {
                Surface::User => resolve_category(&next.session.category, &snapshot),
                Surface::Admin
                    if next.session.category != ALL_CATEGORIES
                        && !snapshot.has_category(&next.session.category) =>
                {
                    ALL_CATEGORIES.to_string()
                }
                Surface::Admin => next.session.category.clone(),
            };
            next.event_mode = snapshot.event_mode;
            next.snapshot = snapshot;
        }
        Action::RecordLoaded(record) => next.record = record,
        Action::SetSeen { film_id, seen } => {
            if seen {
                next.record.seen_film_ids.insert(film_id);
            } else {
                next.record.seen_film_ids.remove(&film_id);
            }
        }
        Action::SetPick { category, film_id } => match film_id {
            Some(film_id) => {
                next.record.picks_by_category.insert(category, film_id);
            }
            None => {
                next.record.picks_by_category.remove(&category);
            }
        },
        Action::SetEventMode(enabled) => next.event_mode = enabled,
        Action::SelectYear(year) => {
            next.session.year = Some(year);
            next.session.category = next.surface.default_category().to_string();
        }
        Action::SelectCategory(category) => next.session.category = category,
        Action::SelectSort(sort) => next.session.sort = sort,
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_core::model::{Category, DEFAULT_CATEGORY};

    fn snapshot_with(categories: &[&str], event_mode: bool) -> Arc<NomineeSnapshot> {
        Arc::new(NomineeSnapshot {
            categories: categories
                .iter()
                .map(|name| Category {
                    name: name.to_string(),
                    year_started: None,
                    year_ended: None,
                })
                .collect(),
            event_mode,
            ..Default::default()
        })
    }

    #[test]
    fn reduce_leaves_previous_state_untouched() {
        let before = ViewState::new(Surface::User, Session::default());
        let after = reduce(
            &before,
            Action::SetSeen {
                film_id: "f1".into(),
                seen: true,
            },
        );
        assert!(after.record.has_seen("f1"));
        assert!(!before.record.has_seen("f1"));
    }

    #[test]
    fn years_loaded_falls_back_to_first_year() {
        let mut session = Session::default();
        session.year = Some(1990);
        let state = ViewState::new(Surface::User, session);
        let next = reduce(
            &state,
            Action::YearsLoaded(vec![
                YearEntry { year: 2026, label: None },
                YearEntry { year: 2025, label: None },
            ]),
        );
        assert_eq!(next.session.year, Some(2026));
        assert_eq!(next.years.len(), 2);
    }

    #[test]
    fn snapshot_sets_event_mode_and_fixes_category() {
        let mut session = Session::default();
        session.category = "Retired Category".into();
        let state = ViewState::new(Surface::User, session);

        let next = reduce(&state, Action::SnapshotLoaded(snapshot_with(&["Sound"], true)));
        assert_eq!(next.session.category, "Sound");
        assert!(next.event_mode);
    }

    #[test]
    fn admin_surface_falls_back_to_all_films() {
        let mut session = Session::new(ALL_CATEGORIES);
        session.category = "Retired Category".into();
        let state = ViewState::new(Surface::Admin, session);

        let next = reduce(
            &state,
            Action::SnapshotLoaded(snapshot_with(&[DEFAULT_CATEGORY], false)),
        );
        assert_eq!(next.session.category, ALL_CATEGORIES);
    }

    #[test]
    fn pick_set_replace_and_clear() {
        let state = ViewState::new(Surface::User, Session::default());
        let picked = reduce(
            &state,
            Action::SetPick {
                category: "Sound".into(),
                film_id: Some("f1".into()),
            },
        );
        let replaced = reduce(
            &picked,
            Action::SetPick {
                category: "Sound".into(),
                film_id: Some("f2".into()),
            },
        );
        assert_eq!(replaced.record.pick("Sound").unwrap(), "f2");

        let cleared = reduce(
            &replaced,
            Action::SetPick {
                category: "Sound".into(),
                film_id: None,
            },
        );
        assert_eq!(cleared.record.pick("Sound"), None);
    }

    #[test]
    fn year_change_resets_category_per_surface() {
        let mut session = Session::default();
        session.category = "Sound".into();
        let user = reduce(
            &ViewState::new(Surface::User, session.clone()),
            Action::SelectYear(2025),
        );
        assert_eq!(user.session.year, Some(2025));
        assert_eq!(user.session.category, DEFAULT_CATEGORY);

        let admin = reduce(
            &ViewState::new(Surface::Admin, session),
            Action::SelectYear(2025),
        );
        assert_eq!(admin.session.category, ALL_CATEGORIES);
    }
}
