// Shared fixtures for the ballot-app integration tests: an in-memory fake of
// the remote API, a renderer that records what it was asked to draw, and a
// harness that drives `AppState` one event at a time.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use ballot_app::api::{ApiError, PickUpdate, RemoteApi, SeenUpdate};
use ballot_app::app::AppState;
use ballot_app::protocol::{AppEvent, Notice, RenderScope};
use ballot_app::render::Renderer;
use ballot_app::state::ViewState;
use ballot_core::local::{UserKey, USER_KEY_STORAGE_KEY};
use ballot_core::model::{
    Category, Film, Nomination, NomineeSnapshot, UserRecord, YearEntry, DEFAULT_CATEGORY,
};
use ballot_core::storage::{KeyValueStore, MemoryStore};

pub const YEAR: u32 = 2026;
pub const USER: &str = "user-test";
pub const POLL: Duration = Duration::from_millis(5000);

// ===========================================================================
// Fixtures
// ===========================================================================

pub fn film(id: &str, title: &str) -> Film {
    Film {
        id: id.into(),
        title: title.into(),
        where_to_watch_url: None,
        free_to_watch: false,
        poster_url: None,
    }
}

pub fn snapshot() -> NomineeSnapshot {
    let category = |name: &str| Category {
        name: name.into(),
        year_started: None,
        year_ended: None,
    };
    let nomination = |category: &str, film_id: &str| Nomination {
        category: category.into(),
        film_id: film_id.into(),
        nominee: None,
    };
    NomineeSnapshot {
        year: Some(YEAR),
        categories: vec![category(DEFAULT_CATEGORY), category("Sound")],
        films: vec![film("f1", "Anora"), film("f2", "Conclave"), film("f3", "Flow")],
        nominations: vec![
            nomination(DEFAULT_CATEGORY, "f1"),
            nomination(DEFAULT_CATEGORY, "f2"),
            nomination("Sound", "f2"),
            nomination("Sound", "f3"),
        ],
        ..Default::default()
    }
}

pub fn live_snapshot() -> NomineeSnapshot {
    NomineeSnapshot {
        event_mode: true,
        ..snapshot()
    }
}

// ===========================================================================
// FakeApi
// ===========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Years,
    Nominees { year: u32, category: String },
    UserState { year: u32 },
    PutSeen(SeenUpdate),
    PutPick(PickUpdate),
}

/// Server-side state behind the fake.
pub struct Server {
    pub years: Vec<YearEntry>,
    pub snapshot: NomineeSnapshot,
    pub record: UserRecord,
    /// Status and body returned by `PUT /api/user-pick` when set.
    pub pick_failure: Option<(u16, String)>,
    pub seen_failure: Option<(u16, String)>,
}

pub struct FakeApi {
    server: Mutex<Server>,
    calls: Mutex<Vec<Call>>,
    /// When present, every write waits for a permit before answering.
    write_gate: Option<Arc<Semaphore>>,
}

impl FakeApi {
    pub fn new(snapshot: NomineeSnapshot) -> Arc<Self> {
        Arc::new(Self::build(snapshot, None))
    }

    /// A fake whose writes block until the returned semaphore is given
    /// permits.
    pub fn gated(snapshot: NomineeSnapshot) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Arc::new(Self::build(snapshot, Some(Arc::clone(&gate)))),
            gate,
        )
    }

    fn build(snapshot: NomineeSnapshot, write_gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            server: Mutex::new(Server {
                years: vec![
                    YearEntry {
                        year: YEAR,
                        label: Some("98th".into()),
                    },
                    YearEntry {
                        year: YEAR - 1,
                        label: None,
                    },
                ],
                snapshot,
                record: UserRecord::default(),
                pick_failure: None,
                seen_failure: None,
            }),
            calls: Mutex::new(Vec::new()),
            write_gate,
        }
    }

    pub fn server(&self) -> MutexGuard<'_, Server> {
        self.server.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pick_writes(&self) -> Vec<PickUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PutPick(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn nominee_fetches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Nominees { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.write_gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn list_years(&self) -> Result<Vec<YearEntry>, ApiError> {
        self.record(Call::Years);
        Ok(self.server().years.clone())
    }

    async fn fetch_nominees(&self, year: u32, category: &str) -> Result<NomineeSnapshot, ApiError> {
        self.record(Call::Nominees {
            year,
            category: category.to_string(),
        });
        Ok(self.server().snapshot.clone())
    }

    async fn fetch_user_record(&self, year: u32, _user_key: &str) -> Result<UserRecord, ApiError> {
        self.record(Call::UserState { year });
        Ok(self.server().record.clone())
    }

    async fn put_seen(&self, update: &SeenUpdate) -> Result<(), ApiError> {
        self.record(Call::PutSeen(update.clone()));
        self.wait_for_gate().await;
        let mut server = self.server();
        if let Some((status, body)) = &server.seen_failure {
            return Err(ApiError::http(*status, "/api/user-state", body.clone()));
        }
        if update.seen {
            server.record.seen_film_ids.insert(update.film_id.clone());
        } else {
            server.record.seen_film_ids.remove(&update.film_id);
        }
        Ok(())
    }

    async fn put_pick(&self, update: &PickUpdate) -> Result<(), ApiError> {
        self.record(Call::PutPick(update.clone()));
        self.wait_for_gate().await;
        let mut server = self.server();
        if let Some((status, body)) = &server.pick_failure {
            return Err(ApiError::http(*status, "/api/user-pick", body.clone()));
        }
        if update.picked {
            server
                .record
                .picks_by_category
                .insert(update.category.clone(), update.film_id.clone());
        } else {
            server.record.picks_by_category.remove(&update.category);
        }
        Ok(())
    }
}

// ===========================================================================
// RecordingRenderer
// ===========================================================================

#[derive(Debug, Clone)]
pub enum Rendered {
    View(RenderScope, ViewState),
    Notice(Notice),
}

#[derive(Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingRenderer {
    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Rendered> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    pub fn take_scopes(&self) -> Vec<RenderScope> {
        self.take()
            .into_iter()
            .filter_map(|r| match r {
                Rendered::View(scope, _) => Some(scope),
                Rendered::Notice(_) => None,
            })
            .collect()
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.take()
            .into_iter()
            .filter_map(|r| match r {
                Rendered::Notice(notice) => Some(notice),
                Rendered::View(..) => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, view: &ViewState, scope: RenderScope) {
        self.log
            .lock()
            .unwrap()
            .push(Rendered::View(scope, view.clone()));
    }

    fn notify(&mut self, notice: &Notice) {
        self.log.lock().unwrap().push(Rendered::Notice(notice.clone()));
    }
}

// ===========================================================================
// Harness
// ===========================================================================

pub struct Harness {
    pub state: AppState,
    pub events: mpsc::Receiver<AppEvent>,
    pub api: Arc<FakeApi>,
    pub store: Arc<dyn KeyValueStore>,
    pub renders: RecordingRenderer,
}

impl Harness {
    pub fn new(api: Arc<FakeApi>) -> Self {
        Self::with_store(api, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(api: Arc<FakeApi>, store: Arc<dyn KeyValueStore>) -> Self {
        store.set(USER_KEY_STORAGE_KEY, USER).unwrap();
        let user_key = UserKey::load_or_create(store.as_ref()).unwrap();
        let renders = RecordingRenderer::default();
        let (events_tx, events) = mpsc::channel(64);
        let state = AppState::new(
            Arc::clone(&api) as Arc<dyn RemoteApi>,
            Arc::clone(&store),
            user_key,
            Box::new(renders.clone()),
            events_tx,
            POLL,
        );
        Self {
            state,
            events,
            api,
            store,
            renders,
        }
    }

    /// Harness that has already completed its initial load.
    pub async fn started(api: Arc<FakeApi>) -> Self {
        let mut harness = Self::new(api);
        harness.state.start().await.unwrap();
        harness.renders.take();
        harness
    }

    pub async fn recv(&mut self) -> AppEvent {
        self.events.recv().await.expect("events channel open")
    }

    /// Receive the next event and feed it to the state.
    pub async fn step(&mut self) {
        let event = self.recv().await;
        self.state.handle_event(event);
    }
}
