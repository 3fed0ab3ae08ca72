// Messages flowing into and out of the event loop.

use std::fmt;

use ballot_core::model::{FilmId, NomineeSnapshot, SortOrder, UserRecord};

use crate::api::ApiError;

/// Commands from whatever front end drives the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    ToggleSeen { film_id: FilmId },
    TogglePick { category: String, film_id: FilmId },
    SelectYear(u32),
    SelectCategory(String),
    SelectSort(SortOrder),
    /// Mirrors page visibility; live-sync ticks are skipped while hidden.
    SetVisible(bool),
    Refresh,
    Quit,
}

/// Results reported back to the loop by spawned tasks and timers.
#[derive(Debug)]
pub enum AppEvent {
    PollTick {
        generation: u64,
    },
    PollFetched {
        generation: u64,
        year: u32,
        /// Stamp from `MutationCoordinator::issue_fetch`.
        issued: u64,
        result: Result<Fetched, ApiError>,
    },
    MutationFinished {
        id: u64,
        result: Result<(), ApiError>,
    },
}

/// A snapshot and user record fetched together.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub snapshot: NomineeSnapshot,
    pub record: UserRecord,
}

/// User-visible notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Message(String),
    VotingClosed,
    LoginRequired,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Message(message) => f.write_str(message),
            Notice::VotingClosed => f.write_str("Voting for this category is closed."),
            Notice::LoginRequired => f.write_str("Admin login required."),
        }
    }
}

/// Which part of the view changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderScope {
    /// Selectors, banner, and films.
    Full,
    Films,
    Banner,
}
