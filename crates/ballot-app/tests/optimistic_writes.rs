// Optimistic seen/pick writes: immediate application, rollback on failure,
// voting-lock enforcement, per-target serialization, and merge behavior.

mod common;

use std::sync::Arc;

use ballot_app::app::MutationError;
use ballot_app::protocol::{AppEvent, Notice, RenderScope};
use ballot_core::local::{pick_cache_key, PickCache, UserKey};
use ballot_core::model::{PickMap, ALL_CATEGORIES, DEFAULT_CATEGORY};
use ballot_core::storage::{KeyValueStore, MemoryStore};

use common::*;

fn cached_picks(h: &Harness) -> PickMap {
    let user = UserKey::load_or_create(h.store.as_ref()).unwrap();
    PickCache::new(Arc::clone(&h.store), user).load(YEAR)
}

#[tokio::test]
async fn start_picks_first_year_and_default_category() {
    let api = FakeApi::new(snapshot());
    let mut h = Harness::new(api);
    h.state.start().await.unwrap();

    assert_eq!(h.state.view.session.year, Some(YEAR));
    assert_eq!(h.state.view.session.category, DEFAULT_CATEGORY);
    assert_eq!(
        h.api.calls()[..3],
        [
            Call::Years,
            Call::Nominees {
                year: YEAR,
                category: DEFAULT_CATEGORY.into()
            },
            Call::UserState { year: YEAR },
        ]
    );
    assert_eq!(h.renders.take_scopes(), vec![RenderScope::Full]);
    assert!(!h.state.is_live());
}

#[tokio::test]
async fn pick_is_visible_and_cached_before_the_server_answers() {
    let (api, gate) = FakeApi::gated(snapshot());
    let mut h = Harness::started(api).await;

    h.state.toggle_pick("Sound", "f2").unwrap();

    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
    assert_eq!(cached_picks(&h).get("Sound").unwrap(), "f2");
    assert_eq!(h.renders.take_scopes(), vec![RenderScope::Films]);
    assert_eq!(h.state.pending_writes(), 1);

    gate.add_permits(1);
    h.step().await;

    assert_eq!(h.state.pending_writes(), 0);
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
    let writes = h.api.pick_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].user_key, USER);
    assert!(writes[0].picked);
}

#[tokio::test]
async fn failed_pick_rolls_back_to_absent() {
    let api = FakeApi::new(snapshot());
    api.server().pick_failure = Some((500, "boom".into()));
    let mut h = Harness::started(api).await;

    h.state.toggle_pick("Sound", "f3").unwrap();
    h.step().await;

    assert_eq!(h.state.view.record.pick("Sound"), None);
    assert!(cached_picks(&h).is_empty());
    assert_eq!(
        h.renders.take_notices(),
        vec![Notice::Message(
            "Unable to save My Pick. API error 500: /api/user-pick - boom".into()
        )]
    );
}

#[tokio::test]
async fn forbidden_pick_restores_previous_film_and_reports_closed_voting() {
    let api = FakeApi::new(snapshot());
    api.server()
        .record
        .picks_by_category
        .insert("Sound".into(), "f2".into());
    let mut h = Harness::started(Arc::clone(&api)).await;
    api.server().pick_failure = Some((403, r#"{"ok":false,"error":"Voting is locked"}"#.into()));

    h.state.toggle_pick("Sound", "f3").unwrap();
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f3");
    h.step().await;

    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
    assert_eq!(cached_picks(&h).get("Sound").unwrap(), "f2");
    assert_eq!(h.renders.take_notices(), vec![Notice::VotingClosed]);
}

#[tokio::test]
async fn locked_voting_refuses_pick_without_network_write() {
    let mut locked = snapshot();
    locked.voting_locked = true;
    let mut h = Harness::started(FakeApi::new(locked)).await;

    let result = h.state.toggle_pick("Sound", "f2");

    assert_eq!(result, Err(MutationError::Locked));
    assert_eq!(h.state.view.record.pick("Sound"), None);
    assert!(h.api.pick_writes().is_empty());
    assert_eq!(h.renders.take_notices(), vec![Notice::VotingClosed]);
    assert_eq!(h.state.pending_writes(), 0);
}

#[tokio::test]
async fn all_films_view_has_no_pick_surface() {
    let mut h = Harness::started(FakeApi::new(snapshot())).await;
    assert_eq!(
        h.state.toggle_pick(ALL_CATEGORIES, "f1"),
        Err(MutationError::AllCategories)
    );
    assert!(h.api.pick_writes().is_empty());
}

#[tokio::test]
async fn picking_the_picked_film_clears_it() {
    let api = FakeApi::new(snapshot());
    api.server()
        .record
        .picks_by_category
        .insert("Sound".into(), "f2".into());
    let mut h = Harness::started(Arc::clone(&api)).await;

    h.state.toggle_pick("Sound", "f2").unwrap();
    assert_eq!(h.state.view.record.pick("Sound"), None);
    h.step().await;

    let writes = api.pick_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].film_id, "f2");
    assert!(!writes[0].picked);
    assert!(api.server().record.picks_by_category.is_empty());
}

#[tokio::test]
async fn failed_seen_toggle_restores_flag() {
    let api = FakeApi::new(snapshot());
    api.server().seen_failure = Some((502, String::new()));
    let mut h = Harness::started(api).await;

    h.state.toggle_seen("f1").unwrap();
    assert!(h.state.view.record.has_seen("f1"));
    h.step().await;

    assert!(!h.state.view.record.has_seen("f1"));
    assert_eq!(
        h.renders.take_notices(),
        vec![Notice::Message(
            "Unable to update seen status. API error 502: /api/user-state".into()
        )]
    );
}

#[tokio::test]
async fn second_toggle_waits_for_the_first_and_replaces_queue() {
    let (api, gate) = FakeApi::gated(snapshot());
    let mut h = Harness::started(Arc::clone(&api)).await;

    h.state.toggle_pick("Sound", "f2").unwrap();
    h.state.toggle_pick("Sound", "f3").unwrap();
    h.state.toggle_pick(DEFAULT_CATEGORY, "f1").unwrap();
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f3");

    // Let the first Sound write and the unrelated category land.
    gate.add_permits(2);
    h.step().await;
    h.step().await;

    // The queued Sound value is sent once the first write confirms.
    gate.add_permits(1);
    h.step().await;

    let sound: Vec<_> = api
        .pick_writes()
        .into_iter()
        .filter(|w| w.category == "Sound")
        .map(|w| w.film_id)
        .collect();
    assert_eq!(sound, vec!["f2".to_string(), "f3".to_string()]);
    assert_eq!(h.state.pending_writes(), 0);
    assert_eq!(api.server().record.picks_by_category.get("Sound").unwrap(), "f3");
}

#[tokio::test]
async fn failed_write_reports_the_discarded_follow_up() {
    let (api, gate) = FakeApi::gated(snapshot());
    api.server().pick_failure = Some((500, "boom".into()));
    let mut h = Harness::started(Arc::clone(&api)).await;

    h.state.toggle_pick("Sound", "f2").unwrap();
    h.state.toggle_pick("Sound", "f3").unwrap();
    h.renders.take();

    gate.add_permits(1);
    h.step().await;

    assert_eq!(h.state.view.record.pick("Sound"), None);
    assert!(cached_picks(&h).is_empty());
    assert_eq!(api.pick_writes().len(), 1);
    assert_eq!(
        h.renders.take_notices(),
        vec![
            Notice::Message("Unable to save My Pick. API error 500: /api/user-pick - boom".into()),
            Notice::Message("A later change to the same item was discarded too.".into()),
        ]
    );
}

#[tokio::test]
async fn refresh_mid_write_keeps_the_optimistic_pick() {
    let (api, gate) = FakeApi::gated(snapshot());
    let mut h = Harness::started(Arc::clone(&api)).await;

    h.state.toggle_pick("Sound", "f2").unwrap();
    h.state.refresh().await.unwrap();
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");

    gate.add_permits(1);
    h.step().await;
    h.state.refresh().await.unwrap();
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
}

#[tokio::test(start_paused = true)]
async fn poll_sent_before_confirmation_cannot_revert_the_write() {
    let (api, gate) = FakeApi::gated(live_snapshot());
    api.server()
        .record
        .picks_by_category
        .insert("Sound".into(), "f3".into());
    let mut h = Harness::started(Arc::clone(&api)).await;

    h.state.toggle_pick("Sound", "f2").unwrap();
    h.state.toggle_seen("f1").unwrap();

    // A poll goes out while both writes are still on the wire.
    let AppEvent::PollTick { generation } = h.recv().await else {
        panic!("expected a poll tick");
    };
    h.state.handle_event(AppEvent::PollTick { generation });
    let stale = h.recv().await;
    assert!(matches!(stale, AppEvent::PollFetched { .. }));

    gate.add_permits(2);
    h.step().await;
    h.step().await;
    assert_eq!(h.state.pending_writes(), 0);
    assert_eq!(api.server().record.picks_by_category.get("Sound").unwrap(), "f2");

    h.state.handle_event(stale);
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
    assert!(h.state.view.record.has_seen("f1"));
    assert_eq!(cached_picks(&h).get("Sound").unwrap(), "f2");

    // The next poll already reflects both writes.
    let AppEvent::PollTick { generation } = h.recv().await else {
        panic!("expected a poll tick");
    };
    h.state.handle_event(AppEvent::PollTick { generation });
    h.step().await;
    assert_eq!(h.state.view.record.pick("Sound").unwrap(), "f2");
    assert!(h.state.view.record.has_seen("f1"));
}

#[tokio::test]
async fn cached_picks_fill_gaps_and_remote_wins_on_overlap() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let api = FakeApi::new(snapshot());
    api.server()
        .record
        .picks_by_category
        .insert("Sound".into(), "f3".into());

    let mut h = Harness::with_store(api, Arc::clone(&store));
    let user = UserKey::load_or_create(store.as_ref()).unwrap();
    store
        .set(
            &pick_cache_key(YEAR, &user),
            &format!(r#"{{"Sound":"f2","{DEFAULT_CATEGORY}":"f1"}}"#),
        )
        .unwrap();

    h.state.start().await.unwrap();
    let picks = &h.state.view.record.picks_by_category;
    assert_eq!(picks.get("Sound").unwrap(), "f3");
    assert_eq!(picks.get(DEFAULT_CATEGORY).unwrap(), "f1");
}
