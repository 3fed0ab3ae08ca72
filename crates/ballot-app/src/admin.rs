// Admin surface: ceremony-wide switches, winners, banner, per-film overrides,
// and the audit log.
//
// Every write is confirmed by the server before the view changes; the
// controller then reloads the snapshot instead of patching it. Toggling event
// mode also broadcasts the new flag to other clients on the signal bus.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use ballot_core::bus::{EventModeSignal, SignalBus};
use ballot_core::local::{load_session, save_session, Surface};
use ballot_core::model::SortOrder;
use ballot_core::storage::KeyValueStore;

use crate::api::admin::{AdminClient, AdminTransport, AuditFilter, AuditLog, Dashboard};
use crate::api::ApiError;
use crate::state::{reduce, Action, ViewState};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no ceremony year selected")]
    NoYear,

    #[error("unknown film: {0}")]
    UnknownFilm(String),
}

impl AdminError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, AdminError::Api(ApiError::AuthRequired))
    }
}

pub struct AdminController<T> {
    client: AdminClient<T>,
    bus: Arc<dyn SignalBus>,
    store: Arc<dyn KeyValueStore>,
    pub view: ViewState,
    pub dashboard: Dashboard,
}

impl<T: AdminTransport> AdminController<T> {
    pub fn new(client: AdminClient<T>, bus: Arc<dyn SignalBus>, store: Arc<dyn KeyValueStore>) -> Self {
        let session = load_session(store.as_ref(), Surface::Admin);
        Self {
            client,
            bus,
            store,
            view: ViewState::new(Surface::Admin, session),
            dashboard: Dashboard::default(),
        }
    }

    fn year(&self) -> Result<u32, AdminError> {
        self.view.session.year.ok_or(AdminError::NoYear)
    }

    fn apply(&mut self, action: Action) {
        self.view = reduce(&self.view, action);
    }

    fn save_prefs(&self) {
        if let Err(e) = save_session(self.store.as_ref(), Surface::Admin, &self.view.session) {
            warn!("Failed to save admin preferences: {e}");
        }
    }

    /// Verify the admin session, then load years and the first view.
    pub async fn start(&mut self) -> Result<(), AdminError> {
        self.client.ensure_session().await?;
        let years = self.client.list_years().await?;
        self.apply(Action::YearsLoaded(years));
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> Result<(), AdminError> {
        self.load_nominees().await?;
        self.load_dashboard().await;
        self.save_prefs();
        Ok(())
    }

    async fn load_nominees(&mut self) -> Result<(), AdminError> {
        let year = self.year()?;
        let snapshot = self
            .client
            .fetch_nominees(year, &self.view.session.category)
            .await?;
        self.apply(Action::SnapshotLoaded(Arc::new(snapshot)));
        Ok(())
    }

    /// Dashboard numbers are informational; failures zero them out.
    async fn load_dashboard(&mut self) {
        let Ok(year) = self.year() else {
            return;
        };
        self.dashboard = match self.client.dashboard(year).await {
            Ok(dashboard) => dashboard,
            Err(e) => {
                debug!("Dashboard unavailable: {e}");
                Dashboard::default()
            }
        };
    }

    pub async fn select_year(&mut self, year: u32) -> Result<(), AdminError> {
        self.apply(Action::SelectYear(year));
        self.save_prefs();
        self.refresh().await
    }

    pub async fn select_category(&mut self, category: &str) -> Result<(), AdminError> {
        self.apply(Action::SelectCategory(category.to_string()));
        self.save_prefs();
        self.refresh().await
    }

    pub fn select_sort(&mut self, sort: SortOrder) {
        self.apply(Action::SelectSort(sort));
        self.save_prefs();
    }

    /// Flip event mode, reload, and tell other clients. Returns the new flag.
    pub async fn toggle_event_mode(&mut self) -> Result<bool, AdminError> {
        let year = self.year()?;
        let enabled = !self.view.event_mode;
        self.client.set_event_mode(year, enabled).await?;
        self.load_nominees().await?;

        if let Err(e) = self.bus.publish(&EventModeSignal::new(year, enabled)) {
            warn!("Failed to broadcast event mode: {e}");
        }
        info!("Event mode for {year} set to {enabled}");
        Ok(enabled)
    }

    pub async fn toggle_voting_lock(&mut self) -> Result<bool, AdminError> {
        let year = self.year()?;
        let locked = !self.view.snapshot.voting_locked;
        self.client.set_voting_lock(year, locked).await?;
        self.load_nominees().await?;
        info!("Voting lock for {year} set to {locked}");
        Ok(locked)
    }

    /// Mark `film_id` as the winner of `category`, or unmark it if it already
    /// is. Returns whether the film is now the winner.
    pub async fn toggle_winner(&mut self, category: &str, film_id: &str) -> Result<bool, AdminError> {
        let year = self.year()?;
        let is_winner = self
            .view
            .snapshot
            .winners_by_category
            .get(category)
            .is_some_and(|winner| winner == film_id);
        self.client
            .set_winner(year, category, film_id, !is_winner)
            .await?;
        self.load_nominees().await?;
        self.load_dashboard().await;
        Ok(!is_winner)
    }

    pub async fn save_banner(&mut self, enabled: bool, text: &str) -> Result<(), AdminError> {
        let year = self.year()?;
        self.client.set_banner(year, enabled, text.trim()).await?;
        self.load_nominees().await?;
        self.load_dashboard().await;
        Ok(())
    }

    /// Set watch-link and poster overrides for a film. Empty strings clear
    /// them.
    pub async fn save_overrides(
        &mut self,
        film_id: &str,
        watch_url: &str,
        free_to_watch: bool,
        poster_url: &str,
    ) -> Result<(), AdminError> {
        let year = self.year()?;
        self.client
            .set_where_to_watch(year, film_id, watch_url.trim(), free_to_watch)
            .await?;
        self.client
            .set_poster(year, film_id, poster_url.trim())
            .await?;
        self.load_nominees().await?;
        self.load_dashboard().await;
        Ok(())
    }

    /// Clear the watch-link override, keeping the film's free-to-watch flag.
    pub async fn clear_watch_override(&mut self, film_id: &str) -> Result<(), AdminError> {
        let year = self.year()?;
        let free = self
            .view
            .snapshot
            .film(film_id)
            .map(|film| film.free_to_watch)
            .ok_or_else(|| AdminError::UnknownFilm(film_id.to_string()))?;
        self.client
            .set_where_to_watch(year, film_id, "", free)
            .await?;
        self.load_nominees().await?;
        self.load_dashboard().await;
        Ok(())
    }

    pub async fn clear_poster(&mut self, film_id: &str) -> Result<(), AdminError> {
        let year = self.year()?;
        self.client.set_poster(year, film_id, "").await?;
        self.load_nominees().await?;
        self.load_dashboard().await;
        Ok(())
    }

    /// Recent admin actions matching `filter`, newest first. Read-only; the
    /// view is left as is.
    pub async fn audit_logs(&self, filter: &AuditFilter) -> Result<AuditLog, AdminError> {
        let log = self.client.audit_logs(filter).await?;
        debug!("Loaded {} audit entries", log.logs.len());
        Ok(log)
    }

    pub async fn logout(&self) -> Result<(), AdminError> {
        self.client.logout().await?;
        Ok(())
    }
}
