mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use slotclaim_coordinator::{DiscoveryConfig, RankFilter, TargetDiscovery, TargetFilter};
use slotclaim_network::Requester;
use slotclaim_protocol::Command;
use slotclaim_state::BlacklistLedger;

use common::{candidate_list, error_reply, target, ScriptedRequester};

fn discovery() -> TargetDiscovery {
    TargetDiscovery::new(
        DiscoveryConfig {
            stagger_interval: Duration::from_millis(1000),
            list_timeout: Duration::from_millis(5000),
        },
        TargetFilter::default(),
    )
}

fn scout_with(identity: &str, ranks: &[(&str, i64)]) -> ScriptedRequester {
    let targets: Vec<_> = ranks.iter().map(|(id, r)| target(id, *r)).collect();
    ScriptedRequester::new(identity, move |command, _| match command {
        Command::ListCandidates => Some(candidate_list(&targets)),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_highest_rank_wins_across_scouts_regardless_of_arrival() {
    let slow = scout_with("scout-a", &[("x", 4), ("y", 5)]).with_delay(Duration::from_millis(3000));
    let fast = scout_with("scout-b", &[("x", 4), ("z", 8)]);
    let scouts: Vec<&dyn Requester> = vec![&slow, &fast];

    let best = discovery()
        .discover(&scouts, None, &BlacklistLedger::default())
        .await
        .unwrap();
    assert_eq!(best.id, "z");
    assert_eq!(best.rank, 8);
}

#[tokio::test(start_paused = true)]
async fn test_same_target_reported_with_different_ranks() {
    let a = scout_with("scout-a", &[("shared", 4)]).with_delay(Duration::from_millis(10));
    let b = scout_with("scout-b", &[("shared", 7)]);
    let scouts: Vec<&dyn Requester> = vec![&a, &b];

    let best = discovery()
        .discover(&scouts, None, &BlacklistLedger::default())
        .await
        .unwrap();
    assert_eq!(best.id, "shared");
    assert_eq!(best.rank, 7);
}

#[tokio::test(start_paused = true)]
async fn test_last_claimed_never_returned() {
    let a = scout_with("scout-a", &[("prev", 10), ("next", 2)]);
    let scouts: Vec<&dyn Requester> = vec![&a];

    let best = discovery()
        .discover(&scouts, Some("prev"), &BlacklistLedger::default())
        .await
        .unwrap();
    assert_eq!(best.id, "next");
}

#[tokio::test(start_paused = true)]
async fn test_excluded_target_skipped() {
    let a = scout_with("scout-a", &[("bad", 11), ("ok", 5)]);
    let scouts: Vec<&dyn Requester> = vec![&a];
    let mut ledger = BlacklistLedger::new(2);
    ledger.record_failure("bad");
    ledger.record_failure("bad");

    let best = discovery().discover(&scouts, None, &ledger).await.unwrap();
    assert_eq!(best.id, "ok");
}

#[tokio::test(start_paused = true)]
async fn test_polls_are_staggered_by_scout_index() {
    let a = scout_with("scout-a", &[]);
    let b = scout_with("scout-b", &[]);
    let c = scout_with("scout-c", &[]);
    let scouts: Vec<&dyn Requester> = vec![&a, &b, &c];
    let start = tokio::time::Instant::now();

    let best = discovery()
        .discover(&scouts, None, &BlacklistLedger::default())
        .await;
    assert!(best.is_none());

    let sent_at = |s: &ScriptedRequester| s.sent.lock().unwrap()[0].2 - start;
    assert_eq!(sent_at(&a), Duration::ZERO);
    assert_eq!(sent_at(&b), Duration::from_millis(1000));
    assert_eq!(sent_at(&c), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_silent_or_failing_scouts_contribute_nothing() {
    let silent = ScriptedRequester::new("silent", |_, _| None);
    let failing = ScriptedRequester::new("failing", |command, _| {
        Some(error_reply(command, "rate limited"))
    });
    let good = scout_with("good", &[("t", 2)]);
    let scouts: Vec<&dyn Requester> = vec![&silent, &failing, &good];
    let start = tokio::time::Instant::now();

    let best = discovery()
        .discover(&scouts, None, &BlacklistLedger::default())
        .await
        .unwrap();
    assert_eq!(best.id, "t");
    // The silent scout times out after the list timeout.
    assert!(start.elapsed() >= Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_allow_list_restricts_ranks() {
    let filter = TargetFilter {
        allowed: RankFilter {
            enabled: true,
            ranks: BTreeSet::from([2]),
        },
        ..TargetFilter::default()
    };
    let discovery = TargetDiscovery::new(DiscoveryConfig::default(), filter);
    let a = scout_with("scout-a", &[("high", 11), ("low", 2)]);
    let scouts: Vec<&dyn Requester> = vec![&a];

    let best = discovery
        .discover(&scouts, None, &BlacklistLedger::default())
        .await
        .unwrap();
    assert_eq!(best.id, "low");
}

#[tokio::test(start_paused = true)]
async fn test_no_scouts_yields_nothing() {
    let scouts: Vec<&dyn Requester> = Vec::new();
    assert!(discovery()
        .discover(&scouts, None, &BlacklistLedger::default())
        .await
        .is_none());
}
