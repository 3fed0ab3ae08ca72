// Optimistic mutation bookkeeping.
//
// Each target (a film's seen flag, a category's pick) has at most one write
// in flight. Further toggles on a busy target are applied to the view right
// away and remembered as a single queued value, which replaces any earlier
// queued value. When the in-flight write succeeds the queued value (if it
// still differs) is dispatched next; when it fails the target is restored to
// its value before the first unconfirmed change and the queue is dropped,
// which the caller is told about.
//
// Every fetch is stamped from `issue_fetch` when it is sent. A confirmed value
// stays on top of fetched records until a fetch issued after the confirmation
// comes back, since older fetches may still carry the previous server value.

use std::collections::HashMap;

use tracing::debug;

use ballot_core::local::UserKey;
use ballot_core::model::{FilmId, UserRecord};

use crate::api::{PickUpdate, SeenUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Seen(FilmId),
    /// Keyed by category name.
    Pick(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetValue {
    Seen(bool),
    Pick(Option<FilmId>),
}

impl Target {
    /// Current value of this target in `record`.
    pub fn read(&self, record: &UserRecord) -> TargetValue {
        match self {
            Target::Seen(film_id) => TargetValue::Seen(record.has_seen(film_id)),
            Target::Pick(category) => TargetValue::Pick(record.pick(category).cloned()),
        }
    }

    /// Write `value` into `record`. Mismatched kinds are ignored.
    pub fn write(&self, record: &mut UserRecord, value: &TargetValue) {
        match (self, value) {
            (Target::Seen(film_id), TargetValue::Seen(true)) => {
                record.seen_film_ids.insert(film_id.clone());
            }
            (Target::Seen(film_id), TargetValue::Seen(false)) => {
                record.seen_film_ids.remove(film_id);
            }
            (Target::Pick(category), TargetValue::Pick(Some(film_id))) => {
                record
                    .picks_by_category
                    .insert(category.clone(), film_id.clone());
            }
            (Target::Pick(category), TargetValue::Pick(None)) => {
                record.picks_by_category.remove(category);
            }
            _ => debug!("Ignoring mismatched value {value:?} for {self:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub year: u32,
    pub target: Target,
}

/// One write on its way to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: u64,
    pub key: TargetKey,
    pub from: TargetValue,
    pub to: TargetValue,
}

/// Request body for a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Seen(SeenUpdate),
    Pick(PickUpdate),
}

impl Mutation {
    pub fn request(&self, user_key: &UserKey) -> Option<WriteRequest> {
        let year = self.key.year;
        let user_key = user_key.as_str().to_string();
        match (&self.key.target, &self.from, &self.to) {
            (Target::Seen(film_id), _, TargetValue::Seen(seen)) => {
                Some(WriteRequest::Seen(SeenUpdate {
                    year,
                    user_key,
                    film_id: film_id.clone(),
                    seen: *seen,
                }))
            }
            (Target::Pick(category), _, TargetValue::Pick(Some(film_id))) => {
                Some(WriteRequest::Pick(PickUpdate {
                    year,
                    user_key,
                    category: category.clone(),
                    film_id: film_id.clone(),
                    picked: true,
                }))
            }
            (Target::Pick(category), TargetValue::Pick(Some(film_id)), TargetValue::Pick(None)) => {
                Some(WriteRequest::Pick(PickUpdate {
                    year,
                    user_key,
                    category: category.clone(),
                    film_id: film_id.clone(),
                    picked: false,
                }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// Send this write now.
    Dispatch(Mutation),
    /// A write for the target is already in flight; this value waits.
    Queued,
    /// Nothing to do.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Confirmed {
        key: TargetKey,
        /// Queued follow-up write to dispatch.
        next: Option<Mutation>,
    },
    RolledBack {
        key: TargetKey,
        restore: TargetValue,
        /// A queued later value was thrown away with the failed write.
        discarded: bool,
    },
    /// No pending write with this id.
    Unknown,
}

#[derive(Debug)]
struct Pending {
    in_flight: Mutation,
    /// Value before the in-flight write (the last confirmed value).
    base: TargetValue,
    queued: Option<TargetValue>,
}

/// A confirmed value and the last fetch issued before it was confirmed.
#[derive(Debug)]
struct Landed {
    value: TargetValue,
    fetch_seq: u64,
}

#[derive(Debug, Default)]
pub struct MutationCoordinator {
    pending: HashMap<TargetKey, Pending>,
    landed: HashMap<TargetKey, Landed>,
    next_id: u64,
    fetch_seq: u64,
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutation(&mut self, key: TargetKey, from: TargetValue, to: TargetValue) -> Mutation {
        self.next_id += 1;
        Mutation {
            id: self.next_id,
            key,
            from,
            to,
        }
    }

    /// Register the user's intent to move `key` from `current` to `desired`.
    /// The caller has already applied `desired` to the view.
    pub fn begin(&mut self, key: TargetKey, current: TargetValue, desired: TargetValue) -> Begin {
        if let Some(pending) = self.pending.get_mut(&key) {
            pending.queued = (desired != pending.in_flight.to).then_some(desired);
            debug!("Write for {:?} in flight, queued {:?}", key.target, pending.queued);
            return Begin::Queued;
        }
        if current == desired {
            return Begin::Noop;
        }

        let mutation = self.mutation(key.clone(), current.clone(), desired);
        self.pending.insert(
            key,
            Pending {
                in_flight: mutation.clone(),
                base: current,
                queued: None,
            },
        );
        Begin::Dispatch(mutation)
    }

    /// Record the outcome of write `id`.
    pub fn finish(&mut self, id: u64, ok: bool) -> Settled {
        let Some(key) = self
            .pending
            .iter()
            .find(|(_, p)| p.in_flight.id == id)
            .map(|(key, _)| key.clone())
        else {
            return Settled::Unknown;
        };
        let Some(mut pending) = self.pending.remove(&key) else {
            return Settled::Unknown;
        };

        if !ok {
            let discarded = pending.queued.is_some_and(|queued| queued != pending.base);
            return Settled::RolledBack {
                key,
                restore: pending.base,
                discarded,
            };
        }

        let confirmed = pending.in_flight.to.clone();
        self.landed.insert(
            key.clone(),
            Landed {
                value: confirmed.clone(),
                fetch_seq: self.fetch_seq,
            },
        );
        match pending.queued.take() {
            Some(queued) if queued != confirmed => {
                let next = self.mutation(key.clone(), confirmed.clone(), queued);
                pending.in_flight = next.clone();
                pending.base = confirmed;
                self.pending.insert(key.clone(), pending);
                Settled::Confirmed {
                    key,
                    next: Some(next),
                }
            }
            _ => Settled::Confirmed { key, next: None },
        }
    }

    /// Stamp a fetch about to be sent. Pass the stamp back to [`overlay`]
    /// with its result.
    ///
    /// [`overlay`]: MutationCoordinator::overlay
    pub fn issue_fetch(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    /// Re-apply local values to a record fetched under stamp `fetch_seq`:
    /// confirmed values the fetch predates, then unconfirmed ones.
    pub fn overlay(&mut self, year: u32, fetch_seq: u64, record: &mut UserRecord) {
        self.landed
            .retain(|key, landed| key.year != year || fetch_seq <= landed.fetch_seq);
        for (key, landed) in &self.landed {
            if key.year == year {
                key.target.write(record, &landed.value);
            }
        }
        for (key, pending) in &self.pending {
            if key.year != year {
                continue;
            }
            let value = pending.queued.as_ref().unwrap_or(&pending.in_flight.to);
            key.target.write(record, value);
        }
    }

    pub fn is_pending(&self, key: &TargetKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
