// Locally persisted client state: the user identity token, view preferences,
// and the per-(year, user) pick cache.
//
// Everything read back from storage is treated as untrusted. Corrupt or
// unexpected payloads degrade to "absent" and never fail the caller.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{PickMap, Session, SortOrder, ALL_CATEGORIES, DEFAULT_CATEGORY};
use crate::storage::{KeyValueStore, StorageError};

pub const USER_KEY_STORAGE_KEY: &str = "oscars:user-key";
pub const USER_PREFS_KEY: &str = "oscars:user:prefs";
pub const ADMIN_PREFS_KEY: &str = "oscars:admin:prefs";

pub fn pick_cache_key(year: u32, user_key: &UserKey) -> String {
    format!("oscars:picks:{year}:{}", user_key.as_str())
}

/// Read a key, logging and swallowing storage failures.
fn read_raw(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read {key} from local store: {e}");
            None
        }
    }
}

/// Parse a stored JSON object; anything else counts as absent.
fn read_object(store: &dyn KeyValueStore, key: &str) -> Map<String, Value> {
    let Some(raw) = read_raw(store, key) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("Ignoring malformed local data under {key}");
            Map::new()
        }
    }
}

// ---------------------------------------------------------------------------
// User identity
// ---------------------------------------------------------------------------

/// Opaque per-origin identity. Generated once, persisted, never rotated, and
/// only ever sent as a correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey(String);

impl UserKey {
    /// Load the persisted key, generating and storing a fresh one on first use.
    pub fn load_or_create(store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        if let Some(existing) = read_raw(store, USER_KEY_STORAGE_KEY) {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return Ok(UserKey(trimmed.to_string()));
            }
        }
        let key = UserKey::generate();
        store.set(USER_KEY_STORAGE_KEY, key.as_str())?;
        Ok(key)
    }

    fn generate() -> Self {
        let bits: u128 = rand::rng().random();
        UserKey(format!("user-{bits:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Which client surface a preference blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    User,
    Admin,
}

impl Surface {
    pub fn prefs_key(&self) -> &'static str {
        match self {
            Surface::User => USER_PREFS_KEY,
            Surface::Admin => ADMIN_PREFS_KEY,
        }
    }

    /// Category selected after a year switch or when nothing is saved.
    pub fn default_category(&self) -> &'static str {
        match self {
            Surface::User => DEFAULT_CATEGORY,
            Surface::Admin => ALL_CATEGORIES,
        }
    }
}

/// Restore the last-viewed session, falling back to defaults field by field.
pub fn load_session(store: &dyn KeyValueStore, surface: Surface) -> Session {
    let prefs = read_object(store, surface.prefs_key());
    let mut session = Session::new(surface.default_category());

    if let Some(year) = prefs
        .get("year")
        .and_then(Value::as_u64)
        .and_then(|y| u32::try_from(y).ok())
    {
        session.year = Some(year);
    }
    if let Some(category) = prefs.get("category").and_then(Value::as_str) {
        session.category = category.to_string();
    }
    if let Some(sort) = prefs
        .get("sort")
        .and_then(Value::as_str)
        .and_then(SortOrder::parse)
    {
        session.sort = sort;
    }

    // The user surface has no pick controls on the all-films view, so it
    // never restores into it.
    if surface == Surface::User && session.category == ALL_CATEGORIES {
        session.category = DEFAULT_CATEGORY.to_string();
    }

    session
}

pub fn save_session(
    store: &dyn KeyValueStore,
    surface: Surface,
    session: &Session,
) -> Result<(), StorageError> {
    let blob = serde_json::json!({
        "year": session.year,
        "category": session.category,
        "sort": session.sort.as_str(),
    });
    store.set(surface.prefs_key(), &blob.to_string())
}

// ---------------------------------------------------------------------------
// Pick cache
// ---------------------------------------------------------------------------

/// Optimistic picks persisted before the server confirms them, so a restart
/// mid-write keeps the user's intent.
#[derive(Clone)]
pub struct PickCache {
    store: Arc<dyn KeyValueStore>,
    user_key: UserKey,
}

impl PickCache {
    pub fn new(store: Arc<dyn KeyValueStore>, user_key: UserKey) -> Self {
        PickCache { store, user_key }
    }

    pub fn load(&self, year: u32) -> PickMap {
        read_object(self.store.as_ref(), &pick_cache_key(year, &self.user_key))
            .into_iter()
            .filter_map(|(category, film)| match film {
                Value::String(film_id) => Some((category, film_id)),
                _ => None,
            })
            .collect()
    }

    pub fn save(&self, year: u32, picks: &PickMap) -> Result<(), StorageError> {
        let raw = serde_json::to_string(picks).unwrap_or_else(|_| "{}".to_string());
        self.store
            .set(&pick_cache_key(year, &self.user_key), &raw)
    }
}
