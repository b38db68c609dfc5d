use chrono::{DateTime, Duration, Utc};
use referral_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

const ADDR: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-04T09:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn setup() -> (Arc<ManualClock>, Platform) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(start()));
    let platform = Platform::with_clock(Rules::default(), clock.clone()).unwrap();
    (clock, platform)
}

/// Register `count` referrals under `upline`, each depositing enough to be active
fn active_referrals(platform: &Platform, upline: &str, count: usize) -> Vec<Account> {
    (0..count)
        .map(|_| {
            let acct = platform.register(Some(upline)).unwrap();
            platform.deposit(&acct.id, dec!(100)).unwrap();
            acct
        })
        .collect()
}

#[test]
fn test_v2_run_pays_two_generations() {
    let (_, p) = setup();
    let grandparent = p.register(None).unwrap();
    let parent = p.register(Some(&grandparent.id)).unwrap();
    let earner = p.register(Some(&parent.id)).unwrap();
    p.deposit(&earner.id, dec!(596)).unwrap();
    active_referrals(&p, &earner.id, 5);

    assert_eq!(p.compute_tier(&earner.id).unwrap().tier, Tier::V2);

    let outcome = p.attempt_run(&earner.id).unwrap();
    assert_eq!(outcome.profit.amount, dec!(3.345));
    assert_eq!(outcome.runs_remaining, 3);

    let legs: Vec<(String, u8, Decimal)> = outcome
        .commissions
        .iter()
        .map(|e| (e.account_id.clone(), e.generation.unwrap(), e.amount))
        .collect();
    assert_eq!(
        legs,
        vec![
            (parent.id.clone(), 1, dec!(0.669)),
            (grandparent.id.clone(), 2, dec!(0.1338)),
        ]
    );

    assert_eq!(p.account(&parent.id).unwrap().balance, dec!(4.669));
    assert_eq!(p.account(&grandparent.id).unwrap().balance, dec!(4.1338));
}

#[test]
fn test_fifth_v2_run_hits_cooldown() {
    let (clock, p) = setup();
    let earner = p.register(None).unwrap();
    p.deposit(&earner.id, dec!(596)).unwrap();
    active_referrals(&p, &earner.id, 5);

    for _ in 0..4 {
        p.attempt_run(&earner.id).unwrap();
        clock.advance(Duration::minutes(30));
    }

    match p.attempt_run(&earner.id) {
        Err(CoreError::RunBlocked(RunBlocked::Cooldown { retry_at })) => {
            assert_eq!(retry_at, start() + Duration::hours(24));
        }
        other => panic!("expected cooldown, got {other:?}"),
    }

    let status = p.run_status(&earner.id).unwrap();
    assert_eq!(status.state, WindowState::WindowExhausted);
    assert_eq!(status.runs_used, 4);

    clock.set(start() + Duration::hours(24));
    assert!(p.attempt_run(&earner.id).is_ok());
}

#[test]
fn test_v3_is_frozen_for_runs_and_withdrawals() {
    let (clock, p) = setup();
    let whale = p.register(None).unwrap();
    p.deposit(&whale.id, dec!(2996)).unwrap();
    active_referrals(&p, &whale.id, 15);

    let status = p.compute_tier(&whale.id).unwrap();
    assert_eq!(status.tier, Tier::V3);
    assert!(status.frozen);

    assert!(matches!(
        p.attempt_run(&whale.id),
        Err(CoreError::RunBlocked(RunBlocked::Frozen))
    ));

    clock.advance(Duration::days(10));
    assert!(matches!(
        p.withdraw(&whale.id, dec!(100), ADDR),
        Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::Frozen))
    ));

    // Frozen stays frozen until reviewed, even once referrals go idle
    clock.advance(Duration::days(60));
    assert_eq!(p.compute_tier(&whale.id).unwrap(), status);
}

#[test]
fn test_no_upline_means_no_commissions() {
    let (_, p) = setup();
    let solo = p.register(None).unwrap();
    p.deposit(&solo.id, dec!(96)).unwrap();

    let outcome = p.attempt_run(&solo.id).unwrap();
    assert!(outcome.commissions.is_empty());
    assert!(p.ledger().entries_related_to(&outcome.profit.id).unwrap().is_empty());
}

#[test]
fn test_allocation_retry_is_idempotent() {
    let (_, p) = setup();
    let upline = p.register(None).unwrap();
    let earner = p.register(Some(&upline.id)).unwrap();
    p.deposit(&earner.id, dec!(146)).unwrap();

    let outcome = p.attempt_run(&earner.id).unwrap();
    assert_eq!(outcome.commissions.len(), 1);
    let before = p.account(&upline.id).unwrap().balance;

    assert!(p.allocate_commissions(&outcome.profit.id).unwrap().is_empty());
    assert_eq!(p.account(&upline.id).unwrap().balance, before);
    assert_eq!(p.ledger().entries_related_to(&outcome.profit.id).unwrap().len(), 1);
}

#[test]
fn test_network_report_tracks_commissions_by_generation() {
    let (clock, p) = setup();
    let root = p.register(None).unwrap();
    let child = p.register(Some(&root.id)).unwrap();
    let grandchild = p.register(Some(&child.id)).unwrap();
    p.deposit(&child.id, dec!(296)).unwrap();
    p.deposit(&grandchild.id, dec!(96)).unwrap();

    clock.advance(Duration::hours(1));
    let since = clock.now();
    let child_run = p.attempt_run(&child.id).unwrap();
    let grandchild_run = p.attempt_run(&grandchild.id).unwrap();

    let report = p.network_report(&root.id, since).unwrap();
    assert_eq!(report.total_registered(), 2);
    assert_eq!(report.generations[0].active, 1);
    assert_eq!(report.generations[1].active, 0);
    assert_eq!(report.generations[0].team_profit, child_run.profit.amount);
    assert_eq!(report.generations[1].team_profit, grandchild_run.profit.amount);
    assert_eq!(report.generations[0].commission, child_run.profit.amount * dec!(0.20));
    assert_eq!(report.generations[1].commission, grandchild_run.profit.amount * dec!(0.04));

    // Nothing earned after the interval closes
    let later = p.network_report(&root.id, clock.now() + Duration::hours(1)).unwrap();
    assert!(later.total_commission().is_zero());
}

#[test]
fn test_withdrawal_lifecycle() {
    let (clock, p) = setup();
    let acct = p.register(None).unwrap();
    p.deposit(&acct.id, dec!(196)).unwrap();

    assert!(matches!(
        p.withdraw(&acct.id, dec!(50), ADDR),
        Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::Locked { .. }))
    ));

    clock.advance(Duration::days(3));
    assert!(matches!(
        p.withdraw(&acct.id, dec!(50), "not-an-address"),
        Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::InvalidAddress(_)))
    ));

    let record = p.withdraw(&acct.id, dec!(50), ADDR).unwrap();
    assert_eq!(record.received, dec!(47.5));
    assert_eq!(p.account(&acct.id).unwrap().balance, dec!(150));

    // The withdrawal itself restarts the lock
    assert!(matches!(
        p.withdraw(&acct.id, dec!(50), ADDR),
        Err(CoreError::WithdrawalBlocked(WithdrawalBlocked::Locked { .. }))
    ));

    clock.advance(Duration::days(5));
    let paid = p.settle_withdrawals();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].status, WithdrawalStatus::Paid);
    assert!(p.settle_withdrawals().is_empty());
}

#[test]
fn test_concurrent_runs_respect_allowance() {
    let (_, p) = setup();
    let p = Arc::new(p);
    let upline = p.register(None).unwrap();
    let earner = p.register(Some(&upline.id)).unwrap();
    p.deposit(&earner.id, dec!(96)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let p = Arc::clone(&p);
            let id = earner.id.clone();
            thread::spawn(move || p.attempt_run(&id))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let cooldowns = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::RunBlocked(RunBlocked::Cooldown { .. }))))
        .count();

    assert_eq!(ok, 3);
    assert_eq!(cooldowns, 5);
    assert_eq!(p.run_status(&earner.id).unwrap().runs_used, 3);
    assert!(p.audit().unwrap().iter().all(|r| r.is_consistent()));
}

#[test]
fn test_concurrent_downline_runs_keep_upline_consistent() {
    let (_, p) = setup();
    let p = Arc::new(p);
    let root = p.register(None).unwrap();
    let children: Vec<Account> = active_referrals(&p, &root.id, 6);

    let handles: Vec<_> = children
        .iter()
        .map(|child| {
            let p = Arc::clone(&p);
            let id = child.id.clone();
            thread::spawn(move || p.attempt_run(&id).unwrap())
        })
        .collect();

    let paid: Decimal = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap().commissions)
        .filter(|e| e.account_id == root.id)
        .map(|e| e.amount)
        .sum();

    let root_now = p.account(&root.id).unwrap();
    assert_eq!(root_now.balance, dec!(4) + paid);
    assert!(p.audit().unwrap().iter().all(|r| r.is_consistent()));
}

#[test]
fn test_balance_always_matches_ledger() {
    let (clock, p) = setup();
    let root = p.register(None).unwrap();
    let members = active_referrals(&p, &root.id, 3);
    p.deposit(&root.id, dec!(80)).unwrap();

    for day in 0..3 {
        for acct in members.iter().chain(std::iter::once(&root)) {
            let _ = p.attempt_run(&acct.id);
        }
        clock.advance(Duration::hours(8 + day));
    }
    clock.advance(Duration::days(3));
    p.withdraw(&members[0].id, dec!(25), ADDR).unwrap();

    for check in p.audit().unwrap() {
        assert!(check.is_consistent(), "{:?}", check);
        let sum: Decimal = p.entries(&check.account_id).unwrap().iter().map(|e| e.amount).sum();
        assert_eq!(sum, p.account(&check.account_id).unwrap().balance);
    }
}

#[test]
fn test_reward_claims_keep_referrals_active() {
    let (clock, p) = setup();
    let root = p.register(None).unwrap();
    p.deposit(&root.id, dec!(596)).unwrap();
    let members = active_referrals(&p, &root.id, 5);
    assert_eq!(p.account(&root.id).unwrap().tier, Tier::V2);

    clock.advance(Duration::days(31));
    assert_eq!(p.account(&root.id).unwrap().tier, Tier::V1);

    for acct in &members {
        let claim = p.claim_daily_reward(&acct.id).unwrap();
        assert_eq!(claim.amount, dec!(3));
    }
    assert_eq!(p.account(&root.id).unwrap().tier, Tier::V2);

    // Rewards pay no commission upstream
    assert_eq!(p.account(&root.id).unwrap().balance, dec!(600));
    assert!(matches!(
        p.claim_daily_reward(&members[0].id),
        Err(CoreError::ClaimBlocked(ClaimBlocked::AlreadyClaimed { .. }))
    ));
    assert!(p.audit().unwrap().iter().all(|r| r.is_consistent()));
}
