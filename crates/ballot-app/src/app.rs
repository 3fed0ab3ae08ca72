// Application state and orchestration logic.
//
// One task owns all client state. Writes and poll fetches run in spawned
// tasks that report back over the events channel; front-end commands and
// cross-tab signals arrive on their own channels. `run` multiplexes the three
// with `tokio::select!`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use ballot_core::bus::signal_for_year;
use ballot_core::local::{load_session, save_session, PickCache, Surface, UserKey};
use ballot_core::model::{merge_picks, UserRecord, ALL_CATEGORIES};
use ballot_core::signature::live_sync_signature;
use ballot_core::storage::KeyValueStore;

use crate::api::{ApiError, RemoteApi};
use crate::protocol::{AppEvent, Fetched, Notice, RenderScope, UserCommand};
use crate::render::Renderer;
use crate::state::{reduce, Action, ViewState};
use crate::sync::coordinator::{Mutation, WriteRequest};
use crate::sync::{
    Begin, LiveSync, MutationCoordinator, Settled, Target, TargetKey, TargetValue, TickDecision,
};

/// Why a toggle was refused before anything was applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("voting is locked")]
    Locked,
    #[error("picks need a specific category")]
    AllCategories,
    #[error("no ceremony year selected")]
    NoYear,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub view: ViewState,
    /// Ticks are skipped while the client is hidden.
    pub visible: bool,
    api: Arc<dyn RemoteApi>,
    store: Arc<dyn KeyValueStore>,
    pick_cache: PickCache,
    user_key: UserKey,
    coordinator: MutationCoordinator,
    live_sync: LiveSync,
    renderer: Box<dyn Renderer>,
    events_tx: mpsc::Sender<AppEvent>,
}

impl AppState {
    /// Build the state, restoring the last session from `store`. The events
    /// sender must feed the receiver handed to [`run`].
    pub fn new(
        api: Arc<dyn RemoteApi>,
        store: Arc<dyn KeyValueStore>,
        user_key: UserKey,
        renderer: Box<dyn Renderer>,
        events_tx: mpsc::Sender<AppEvent>,
        poll_interval: Duration,
    ) -> Self {
        let session = load_session(store.as_ref(), Surface::User);
        Self {
            view: ViewState::new(Surface::User, session),
            visible: true,
            api,
            pick_cache: PickCache::new(Arc::clone(&store), user_key.clone()),
            store,
            user_key,
            coordinator: MutationCoordinator::new(),
            live_sync: LiveSync::new(poll_interval),
            renderer,
            events_tx,
        }
    }

    pub fn user_key(&self) -> &UserKey {
        &self.user_key
    }

    /// Whether the live-sync timer is running.
    pub fn is_live(&self) -> bool {
        self.live_sync.is_armed()
    }

    pub fn pending_writes(&self) -> usize {
        self.coordinator.len()
    }

    fn apply(&mut self, action: Action) {
        self.view = reduce(&self.view, action);
    }

    fn notify(&mut self, notice: Notice) {
        info!("Notice: {notice}");
        self.renderer.notify(&notice);
    }

    fn save_prefs(&self) {
        if let Err(e) = save_session(self.store.as_ref(), Surface::User, &self.view.session) {
            warn!("Failed to save preferences: {e}");
        }
    }

    fn save_pick_cache(&self, year: u32) {
        if let Err(e) = self.pick_cache.save(year, &self.view.record.picks_by_category) {
            warn!("Failed to write pick cache for {year}: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load the years list, settle on a year, and run the first refresh.
    pub async fn start(&mut self) -> Result<(), ApiError> {
        let years = self.api.list_years().await?;
        info!("Loaded {} ceremony years", years.len());
        self.apply(Action::YearsLoaded(years));
        self.refresh().await
    }

    /// Refetch the snapshot and user record for the current session. The
    /// poll timer is cancelled for the duration and re-armed afterwards from
    /// the resulting event mode.
    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        self.live_sync.disarm();

        let Some(year) = self.view.session.year else {
            warn!("No ceremony year available, nothing to load");
            self.renderer.render(&self.view, RenderScope::Full);
            return Ok(());
        };

        let category = self.view.session.category.clone();
        let issued = self.coordinator.issue_fetch();
        let outcome = match fetch(self.api.as_ref(), year, &category, &self.user_key).await {
            Ok(fetched) => {
                self.apply_fetched(year, issued, fetched);
                self.save_prefs();
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.live_sync
            .restart(self.view.event_mode, self.events_tx.clone());

        outcome?;
        self.renderer.render(&self.view, RenderScope::Full);
        Ok(())
    }

    /// Replace snapshot and record. Picks merge over the local cache, then
    /// writes the fetch may not reflect yet are laid back on top.
    fn apply_fetched(&mut self, year: u32, issued: u64, fetched: Fetched) {
        let Fetched {
            snapshot,
            mut record,
        } = fetched;
        record.picks_by_category =
            merge_picks(&self.pick_cache.load(year), &record.picks_by_category);
        self.coordinator.overlay(year, issued, &mut record);

        self.apply(Action::SnapshotLoaded(Arc::new(snapshot)));
        self.apply(Action::RecordLoaded(record));
    }

    async fn refresh_or_notify(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!("Refresh failed: {e}");
            self.notify(Notice::Message(format!("Failed to load app data: {e}")));
        }
    }

    // -----------------------------------------------------------------------
    // Optimistic writes
    // -----------------------------------------------------------------------

    pub fn toggle_seen(&mut self, film_id: &str) -> Result<(), MutationError> {
        let year = self.view.session.year.ok_or(MutationError::NoYear)?;
        let target = Target::Seen(film_id.to_string());
        let current = target.read(&self.view.record);
        let desired = TargetValue::Seen(!self.view.record.has_seen(film_id));

        self.apply_target(&target, &desired);
        self.renderer.render(&self.view, RenderScope::Films);
        self.begin(TargetKey { year, target }, current, desired);
        Ok(())
    }

    /// Pick `film_id` in `category`, or clear the pick if it is already the
    /// picked film. Refused without a network call while voting is locked.
    pub fn toggle_pick(&mut self, category: &str, film_id: &str) -> Result<(), MutationError> {
        if self.view.snapshot.voting_locked {
            self.notify(Notice::VotingClosed);
            return Err(MutationError::Locked);
        }
        if category == ALL_CATEGORIES {
            return Err(MutationError::AllCategories);
        }
        let year = self.view.session.year.ok_or(MutationError::NoYear)?;

        let target = Target::Pick(category.to_string());
        let current = target.read(&self.view.record);
        let already_picked = self.view.record.pick(category).map(String::as_str) == Some(film_id);
        let desired = TargetValue::Pick((!already_picked).then(|| film_id.to_string()));

        self.apply_target(&target, &desired);
        self.renderer.render(&self.view, RenderScope::Films);
        self.save_pick_cache(year);
        self.begin(TargetKey { year, target }, current, desired);
        Ok(())
    }

    fn apply_target(&mut self, target: &Target, value: &TargetValue) {
        let action = match (target, value) {
            (Target::Seen(film_id), TargetValue::Seen(seen)) => Action::SetSeen {
                film_id: film_id.clone(),
                seen: *seen,
            },
            (Target::Pick(category), TargetValue::Pick(film_id)) => Action::SetPick {
                category: category.clone(),
                film_id: film_id.clone(),
            },
            _ => return,
        };
        self.apply(action);
    }

    fn begin(&mut self, key: TargetKey, current: TargetValue, desired: TargetValue) {
        match self.coordinator.begin(key, current, desired) {
            Begin::Dispatch(mutation) => self.dispatch(mutation),
            Begin::Queued | Begin::Noop => {}
        }
    }

    fn dispatch(&mut self, mutation: Mutation) {
        let id = mutation.id;
        let Some(request) = mutation.request(&self.user_key) else {
            warn!("Write {id} has no request body, settling locally");
            self.on_mutation_finished(id, Ok(()));
            return;
        };

        debug!("Dispatching write {id} for {:?}", mutation.key.target);
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = match request {
                WriteRequest::Seen(update) => api.put_seen(&update).await,
                WriteRequest::Pick(update) => api.put_pick(&update).await,
            };
            let _ = tx.send(AppEvent::MutationFinished { id, result }).await;
        });
    }

    fn on_mutation_finished(&mut self, id: u64, result: Result<(), ApiError>) {
        let failure = result.err();
        match self.coordinator.finish(id, failure.is_none()) {
            Settled::Confirmed {
                next: Some(next), ..
            } => self.dispatch(next),
            Settled::Confirmed { key, next: None } => {
                debug!("Write {id} confirmed for {:?}", key.target);
            }
            Settled::RolledBack {
                key,
                restore,
                discarded,
            } => {
                let forbidden = failure.as_ref().is_some_and(ApiError::is_forbidden);
                let detail = failure.map(|e| e.to_string()).unwrap_or_default();
                warn!("Write {id} failed for {:?}: {detail}", key.target);

                self.roll_back(&key, &restore);
                let notice = match key.target {
                    Target::Pick(_) if forbidden => Notice::VotingClosed,
                    Target::Pick(_) => Notice::Message(format!("Unable to save My Pick. {detail}")),
                    Target::Seen(_) => {
                        Notice::Message(format!("Unable to update seen status. {detail}"))
                    }
                };
                self.notify(notice);
                if discarded {
                    self.notify(Notice::Message(
                        "A later change to the same item was discarded too.".into(),
                    ));
                }
            }
            Settled::Unknown => debug!("Ignoring result for unknown write {id}"),
        }
    }

    fn roll_back(&mut self, key: &TargetKey, restore: &TargetValue) {
        if self.view.session.year == Some(key.year) {
            self.apply_target(&key.target, restore);
            self.renderer.render(&self.view, RenderScope::Films);
            if matches!(key.target, Target::Pick(_)) {
                self.save_pick_cache(key.year);
            }
        } else if matches!(key.target, Target::Pick(_)) {
            // The user has moved to another year; fix that year's cache only.
            let mut cached = UserRecord {
                picks_by_category: self.pick_cache.load(key.year),
                ..Default::default()
            };
            key.target.write(&mut cached, restore);
            if let Err(e) = self.pick_cache.save(key.year, &cached.picks_by_category) {
                warn!("Failed to write pick cache for {}: {e}", key.year);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Live sync
    // -----------------------------------------------------------------------

    fn on_poll_tick(&mut self, generation: u64) {
        match self.live_sync.begin_tick(generation, self.visible) {
            TickDecision::Run => {}
            decision => {
                debug!("Live sync tick skipped: {decision:?}");
                return;
            }
        }
        let Some(year) = self.view.session.year else {
            self.live_sync.finish_tick(generation);
            return;
        };

        let issued = self.coordinator.issue_fetch();
        let api = Arc::clone(&self.api);
        let category = self.view.session.category.clone();
        let user_key = self.user_key.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetch(api.as_ref(), year, &category, &user_key).await;
            let _ = tx
                .send(AppEvent::PollFetched {
                    generation,
                    year,
                    issued,
                    result,
                })
                .await;
        });
    }

    fn on_poll_fetched(
        &mut self,
        generation: u64,
        year: u32,
        issued: u64,
        result: Result<Fetched, ApiError>,
    ) {
        if !self.live_sync.finish_tick(generation) || self.view.session.year != Some(year) {
            debug!("Discarding live sync result from superseded schedule (gen: {generation})");
            return;
        }
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Live sync tick failed: {e}");
                return;
            }
        };

        let before = live_sync_signature(&self.view.snapshot, &self.view.record.performance);
        let was_live = self.view.event_mode;
        self.apply_fetched(year, issued, fetched);

        self.renderer.render(&self.view, RenderScope::Banner);
        let after = live_sync_signature(&self.view.snapshot, &self.view.record.performance);
        if after != before {
            self.renderer.render(&self.view, RenderScope::Films);
        }

        if self.view.event_mode != was_live {
            info!("Event mode changed to {} on the server", self.view.event_mode);
            self.live_sync
                .restart(self.view.event_mode, self.events_tx.clone());
        }
    }

    /// React to a raw cross-tab payload. Payloads for another year, or that
    /// fail to parse, are ignored.
    pub async fn handle_signal(&mut self, raw: &str) {
        let Some(enabled) = signal_for_year(raw, self.view.session.year) else {
            return;
        };
        info!("Event mode set to {enabled} by another client");
        self.apply(Action::SetEventMode(enabled));
        self.live_sync.restart(enabled, self.events_tx.clone());
        if let Err(e) = self.refresh().await {
            warn!("Refresh after event-mode signal failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    pub async fn handle_command(&mut self, cmd: UserCommand) {
        match cmd {
            UserCommand::ToggleSeen { film_id } => {
                if let Err(e) = self.toggle_seen(&film_id) {
                    debug!("Seen toggle refused: {e}");
                }
            }
            UserCommand::TogglePick { category, film_id } => {
                if let Err(e) = self.toggle_pick(&category, &film_id) {
                    debug!("Pick toggle refused: {e}");
                }
            }
            UserCommand::SelectYear(year) => {
                info!("Switching to year {year}");
                self.apply(Action::SelectYear(year));
                self.save_prefs();
                self.refresh_or_notify().await;
            }
            UserCommand::SelectCategory(category) => {
                self.apply(Action::SelectCategory(category));
                self.save_prefs();
                self.refresh_or_notify().await;
            }
            UserCommand::SelectSort(sort) => {
                self.apply(Action::SelectSort(sort));
                self.save_prefs();
                self.renderer.render(&self.view, RenderScope::Films);
            }
            UserCommand::SetVisible(visible) => {
                debug!("Visibility changed: {visible}");
                self.visible = visible;
            }
            UserCommand::Refresh => self.refresh_or_notify().await,
            UserCommand::Quit => {
                // Handled in the main loop
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::PollTick { generation } => self.on_poll_tick(generation),
            AppEvent::PollFetched {
                generation,
                year,
                issued,
                result,
            } => self.on_poll_fetched(generation, year, issued, result),
            AppEvent::MutationFinished { id, result } => self.on_mutation_finished(id, result),
        }
    }

    pub fn shutdown(&mut self) {
        self.live_sync.disarm();
    }
}

async fn fetch(
    api: &dyn RemoteApi,
    year: u32,
    category: &str,
    user_key: &UserKey,
) -> Result<Fetched, ApiError> {
    let snapshot = api.fetch_nominees(year, category).await?;
    let record = api.fetch_user_record(year, user_key.as_str()).await?;
    Ok(Fetched { snapshot, record })
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the client event loop until `Quit` arrives or the command channel
/// closes.
///
/// Listens on three channels using `tokio::select!`:
/// 1. User commands from the front end
/// 2. Results from spawned writes, fetches, and the poll timer
/// 3. Raw cross-tab signal payloads
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    mut events_rx: mpsc::Receiver<AppEvent>,
    mut signal_rx: mpsc::Receiver<String>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Ballot event loop started");

    if let Err(e) = state.start().await {
        error!("Initial load failed: {e}");
        state.notify(Notice::Message(format!("Failed to load app data: {e}")));
    }

    // A closed signal channel just means no bus; stop polling it.
    let mut signals_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => state.handle_command(cmd).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            Some(event) = events_rx.recv() => state.handle_event(event),

            raw = signal_rx.recv(), if signals_open => {
                match raw {
                    Some(raw) => state.handle_signal(&raw).await,
                    None => {
                        debug!("Signal channel closed");
                        signals_open = false;
                    }
                }
            }
        }
    }

    state.shutdown();
    info!("Ballot event loop exiting");
    Ok(())
}
