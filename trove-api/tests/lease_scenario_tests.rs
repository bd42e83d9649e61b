//! End-to-end lease scenario across two servers.
//!
//! Server A claims a player for five seconds and saves. Server B is turned
//! away while A's lease is live, takes over once it has expired, and reads
//! A's data. A is locked out from then on.

use trove_core::{ClaimOutcome, ErrorKind};
use trove_test_utils::assertions::{assert_error_kind, assert_error_message};
use trove_test_utils::LeaseRef;

mod test_support;
use test_support::Fleet;

const KEYS: [(&str, &str); 1] = [("user_id", "u1")];

#[tokio::test]
async fn test_five_second_claim_contend_takeover() {
    let fleet = Fleet::at_version(2, "v1");
    let (a, b) = (fleet.server(0), fleet.server(1));
    let lease_a = LeaseRef::new("u1", "s1");
    let lease_b = LeaseRef::new("u1", "s2");

    // t = 0: A acquires.
    let claim = a.claim_lock("u1", "s1", 5_000).await.unwrap();
    assert_eq!(claim.outcome, ClaimOutcome::Acquired);
    a.save(&lease_a, "players", KEYS, [("bank", b"100 gold".to_vec())])
        .await
        .unwrap();

    // t = 1s: B is turned away, and cannot touch data.
    fleet.clock.advance_ms(1_000);
    assert_error_message(
        &b.claim_lock("u1", "s2", 5_000).await,
        "lock is held by another server",
    );
    assert_error_message(
        &b.load(&lease_b, "players", KEYS, ["bank"]).await,
        "no lock held for this player",
    );

    // t = 5s: still A's, expiry is inclusive.
    fleet.clock.advance_ms(4_000);
    assert_error_kind(&b.claim_lock("u1", "s2", 5_000).await, ErrorKind::LeaseContended);

    // t = 6s: A's lease has lapsed; B takes over.
    fleet.clock.advance_ms(1_000);
    let claim = b.claim_lock("u1", "s2", 5_000).await.unwrap();
    assert_eq!(claim.outcome, ClaimOutcome::TakenOver);

    let data = b.load(&lease_b, "players", KEYS, ["bank"]).await.unwrap();
    assert_eq!(data.get("bank"), Some(&b"100 gold".to_vec()));

    // A is locked out: its cached lease is expired, and the store says B.
    assert_error_message(
        &a.save(&lease_a, "players", KEYS, [("bank", b"0 gold".to_vec())]).await,
        "lock has expired",
    );
    assert_error_message(&a.release_lock("u1", "s1").await, "cannot release: lock not held by you");
    assert_error_kind(&a.claim_lock("u1", "s1", 5_000).await, ErrorKind::LeaseContended);

    let status = b.lock_status("u1").await.unwrap();
    assert!(status.held);
    assert_eq!(status.owner_id.as_deref(), Some("s2"));

    // B releases; A can acquire again.
    b.release_lock("u1", "s2").await.unwrap();
    let claim = a.claim_lock("u1", "s1", 5_000).await.unwrap();
    assert_eq!(claim.outcome, ClaimOutcome::Acquired);
}

#[tokio::test]
async fn test_wrong_owner_reported_before_expiry() {
    let fleet = Fleet::at_version(1, "v1");
    let server = fleet.server(0);
    server.claim_lock("u1", "s1", 5_000).await.unwrap();
    fleet.clock.advance_ms(10_000);

    let impostor = LeaseRef::new("u1", "s9");
    assert_error_message(
        &server.exists(&impostor, "players", KEYS).await,
        "lock is owned by a different server",
    );
    // The wrong-owner check does not evict; the owner still sees expiry.
    let owner = LeaseRef::new("u1", "s1");
    assert_error_kind(&server.exists(&owner, "players", KEYS).await, ErrorKind::Expired);
    assert_error_kind(&server.exists(&owner, "players", KEYS).await, ErrorKind::NotHeld);
}

/// Spawn one claim per server at once and return the owners that won.
async fn race_claims(fleet: &Fleet) -> Vec<String> {
    let handles: Vec<_> = fleet
        .servers
        .iter()
        .enumerate()
        .map(|(i, server)| {
            let server = server.clone();
            let owner = Fleet::owner(i);
            tokio::spawn(async move {
                server
                    .claim_lock("u1", &owner, 5_000)
                    .await
                    .ok()
                    .map(|_| owner)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(owner) = handle.await.expect("claim task panicked") {
            winners.push(owner);
        }
    }
    winners
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_grant_exactly_one() {
    let fleet = Fleet::at_version(8, "v1");

    let winners = race_claims(&fleet).await;
    assert_eq!(winners.len(), 1, "winners: {winners:?}");
    let status = fleet.server(0).lock_status("u1").await.unwrap();
    assert_eq!(status.owner_id.as_deref(), Some(winners[0].as_str()));

    let gate_passes = (0..fleet.servers.len())
        .filter(|&i| {
            fleet
                .server(i)
                .leases()
                .validate_local("u1", &Fleet::owner(i))
                .is_ok()
        })
        .count();
    assert_eq!(gate_passes, 1);

    // Once the lease has expired, a racing takeover also has one winner.
    fleet.clock.advance_ms(5_001);
    let winners = race_claims(&fleet).await;
    assert_eq!(winners.len(), 1, "winners: {winners:?}");
}
