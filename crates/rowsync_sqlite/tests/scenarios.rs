//! End-to-end rounds between two SQLite stores in one process.

use rowsync_engine::{always_force_write, ProvisioningProvider, SyncState};
use rowsync_protocol::SyncDirection;
use rowsync_testkit::prelude::*;

#[test]
fn insert_reaches_the_peer_and_the_next_round_is_quiet() {
    with_store_pair(|a, b| {
        a.insert_user(1, "Alice");

        let agent = agent(a, b);
        let first = agent.synchronize().unwrap();
        assert_eq!(first.uploaded, 1);
        assert_eq!(b.users(), vec![(1, "Alice".to_string())]);
        assert_eq!(a.users(), b.users());

        let second = agent.synchronize().unwrap();
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.downloaded, 0);
        assert_eq!(agent.state(), SyncState::Synced);
        assert_eq!(agent.stats().rounds_completed, 2);
    });
}

fn diverge(a: &TestStore, b: &TestStore) {
    a.insert_user(1, "Alice");
    let agent = agent(a, b);
    agent.synchronize().unwrap();
    agent.synchronize().unwrap();

    a.update_user(1, "Alice from A");
    b.update_user(1, "Alice from B");
}

#[test]
fn concurrent_edits_keep_the_remote_row_with_skip() {
    with_store_pair(|a, b| {
        diverge(a, b);
        agent(a, b).synchronize_with(SyncDirection::UploadOnly).unwrap();
        assert_eq!(b.user_name(1).as_deref(), Some("Alice from B"));

        // Pulling afterwards converges on the remote's value.
        agent(a, b).synchronize().unwrap();
        assert_eq!(a.user_name(1).as_deref(), Some("Alice from B"));
        assert_eq!(b.user_name(1).as_deref(), Some("Alice from B"));
    });
}

#[test]
fn concurrent_edits_overwrite_the_remote_row_with_force_write() {
    with_store_pair(|a, b| {
        diverge(a, b);
        let agent = agent(a, b).with_remote_conflict_handler(always_force_write());
        agent.synchronize().unwrap();
        assert_eq!(b.user_name(1).as_deref(), Some("Alice from A"));
        assert_eq!(a.user_name(1).as_deref(), Some("Alice from A"));
    });
}

#[test]
fn deletes_propagate_both_ways() {
    with_store_pair(|a, b| {
        a.insert_user(1, "Alice");
        a.insert_user(2, "Bob");
        let agent = agent(a, b);
        agent.synchronize().unwrap();

        a.delete_user(1);
        b.delete_user(2);
        b.insert_user(3, "Carol");
        agent.synchronize().unwrap();

        assert_eq!(a.users(), vec![(3, "Carol".to_string())]);
        assert_eq!(b.users(), a.users());
    });
}

#[test]
fn three_stores_converge_through_a_hub() {
    let hub = TestStore::memory();
    let left = TestStore::memory();
    let right = TestStore::memory();

    left.insert_user(1, "from left");
    right.insert_user(2, "from right");

    for _ in 0..2 {
        agent(&left, &hub).synchronize().unwrap();
        agent(&right, &hub).synchronize().unwrap();
    }

    let expected = vec![(1, "from left".to_string()), (2, "from right".to_string())];
    assert_eq!(hub.users(), expected);
    assert_eq!(left.users(), expected);
    assert_eq!(right.users(), expected);
}

#[test]
fn sync_state_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.db");
    let b = TestStore::memory();

    {
        let a = TestStore::open_at(&path);
        a.insert_user(1, "Alice");
        agent(&a, &b).synchronize().unwrap();
    }

    let a = TestStore::open_at(&path);
    let quiet = agent(&a, &b).synchronize().unwrap();
    assert_eq!(quiet.uploaded, 0);
    assert_eq!(quiet.downloaded, 0);

    a.update_user(1, "Alicia");
    let round = agent(&a, &b).synchronize().unwrap();
    assert_eq!(round.uploaded, 1);
    assert_eq!(b.user_name(1).as_deref(), Some("Alicia"));
    assert!(a.sync_version(&CancelToken::new()).unwrap().current >= 3);
}

#[test]
fn peer_behind_retention_resnapshots_and_converges() {
    with_store_pair(|a, b| {
        a.insert_user(1, "Alice");
        agent(a, b).synchronize().unwrap();

        a.insert_user(2, "Bob");
        a.update_user(1, "Alicia");
        let current = a.sync_version(&CancelToken::new()).unwrap().current;
        a.apply_retention_policy(current + 1, &CancelToken::new()).unwrap();

        let strict = agent(a, b).with_resnapshot_on_stale(false);
        assert!(strict.synchronize().unwrap_err().is_stale_version());

        let agent = agent(a, b);
        let round = agent.synchronize().unwrap();
        assert_eq!(round.uploaded, 2);
        assert_eq!(agent.stats().resnapshots, 1);
        assert_eq!(b.users(), vec![(1, "Alicia".to_string()), (2, "Bob".to_string())]);
        assert_eq!(a.users(), b.users());
    });
}
