//! Settlement generator tests: finalize splits, persistence, idempotence.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use splitledger_core::{
    clock::ManualClock,
    config::LedgerConfig,
    engine::LedgerEngine,
    error::LedgerError,
    model::{NewExpense, NewSettlement, NotificationKind, SettlementStatus},
    settlement_generator::{GenerateOptions, ProposalOrigin},
    settlement_strategy::MaxPayer,
    split::SplitRule,
    store::LedgerStore,
    types::{is_settled_amount, GroupId, UserId},
};
use std::collections::BTreeMap;
use std::sync::Arc;

const PERSIST: GenerateOptions = GenerateOptions {
    include_existing: false,
    persist: true,
};

struct Flat {
    engine: LedgerEngine,
    clock:  Arc<ManualClock>,
    group:  GroupId,
    a:      UserId,
    b:      UserId,
    c:      UserId,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn flat_of_three() -> Flat {
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let engine = LedgerEngine::new(store, clock.clone(), LedgerConfig::default());

    let a = engine.add_user("alice").unwrap();
    let b = engine.add_user("bob").unwrap();
    let c = engine.add_user("carol").unwrap();
    let group = engine.create_group(a, "flat").unwrap().group_id;
    engine.add_member(a, group, b, false).unwrap();
    engine.add_member(a, group, c, false).unwrap();
    Flat { engine, clock, group, a, b, c }
}

fn pay(f: &Flat, paid_by: UserId, amount: Decimal) {
    let expense = NewExpense {
        group_id: f.group,
        paid_by,
        amount,
        description: "dinner".into(),
    };
    f.engine.record_expense(paid_by, &expense).unwrap();
}

// ── Proposals ─────────────────────────────────────────────────

#[test]
fn equal_split_proposes_two_transfers() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));

    let proposals = f
        .engine
        .generate_settlements(f.b, f.group, GenerateOptions::default())
        .unwrap();
    let pairs: Vec<_> = proposals.iter().map(|p| (p.payer, p.receiver, p.amount)).collect();
    assert_eq!(pairs, vec![(f.b, f.a, dec!(30)), (f.c, f.a, dec!(30))]);
    assert!(proposals.iter().all(|p| p.origin == ProposalOrigin::Proposed));
    assert!(proposals.iter().all(|p| p.settlement_id.is_none()));
}

#[test]
fn dry_run_writes_nothing() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    f.engine
        .generate_settlements(f.a, f.group, GenerateOptions::default())
        .unwrap();

    assert!(f.engine.group_settlements(f.a, f.group).unwrap().is_empty());
    assert_eq!(f.engine.store().notification_count().unwrap(), 0);
}

#[test]
fn no_transfer_is_zero_or_negative() {
    let f = flat_of_three();
    let d = f.engine.add_user("dave").unwrap();
    f.engine.add_member(f.a, f.group, d, false).unwrap();
    pay(&f, f.a, dec!(100));
    pay(&f, f.b, dec!(35));
    pay(&f, d, dec!(0.02));

    let proposals = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(!proposals.is_empty());
    assert!(proposals.iter().all(|p| p.amount > Decimal::ZERO));
    assert!(proposals.iter().all(|p| p.payer != p.receiver));
}

#[test]
fn group_without_expenses_has_nothing_to_settle() {
    let f = flat_of_three();
    let err = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap_err();
    assert!(matches!(err, LedgerError::NoExpenses { .. }));
}

#[test]
fn outsider_cannot_finalize() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    let outsider = f.engine.add_user("mallory").unwrap();
    let err = f.engine.generate_settlements(outsider, f.group, PERSIST).unwrap_err();
    assert!(matches!(err, LedgerError::Permission(_)));
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn persist_creates_pending_settlements_and_notifies_payers() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));

    let proposals = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(proposals.iter().all(|p| p.origin == ProposalOrigin::Created));

    let stored = f.engine.group_settlements(f.a, f.group).unwrap();
    assert_eq!(stored.len(), 2);
    for s in &stored {
        assert_eq!(s.status, SettlementStatus::Pending);
        assert_eq!(s.receiver, f.a);
        assert_eq!(s.amount, dec!(30));
        assert_eq!(s.due_date, start() + Duration::days(7));
    }

    for debtor in [f.b, f.c] {
        let inbox = f.engine.notifications_for(debtor).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::SettlementDue);
    }
    assert!(f.engine.notifications_for(f.a).unwrap().is_empty());
}

#[test]
fn second_persist_run_updates_instead_of_duplicating() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    let first = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();

    f.clock.advance(Duration::days(1));
    let second = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();

    let key = |p: &splitledger_core::settlement_generator::SettlementProposal| {
        (p.settlement_id, p.payer, p.receiver, p.amount)
    };
    assert_eq!(
        first.iter().map(key).collect::<Vec<_>>(),
        second.iter().map(key).collect::<Vec<_>>()
    );
    assert!(second.iter().all(|p| p.origin == ProposalOrigin::Updated));
    assert!(second.iter().all(|p| p.due_date == start() + Duration::days(8)));

    assert_eq!(f.engine.group_settlements(f.a, f.group).unwrap().len(), 2);
    // no fresh notifications for re-priced records
    assert_eq!(f.engine.store().notification_count().unwrap(), 2);
}

#[test]
fn duplicate_pending_pairs_collapse_into_one() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    for amount in [dec!(10), dec!(5)] {
        let request = NewSettlement {
            group_id: f.group,
            payer: f.b,
            receiver: f.a,
            amount,
            due_date: None,
        };
        f.engine.create_settlement(f.a, &request).unwrap();
    }

    f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    let stored = f.engine.group_settlements(f.a, f.group).unwrap();
    let bob_to_alice: Vec<_> = stored
        .iter()
        .filter(|s| s.payer == f.b && s.receiver == f.a && s.status == SettlementStatus::Pending)
        .collect();
    assert_eq!(bob_to_alice.len(), 1);
    assert_eq!(bob_to_alice[0].amount, dec!(30));
}

#[test]
fn overdue_debt_is_repriced_not_duplicated() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    let first = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();

    f.clock.advance(Duration::days(8));
    assert_eq!(f.engine.mark_overdue().unwrap().len(), 2);

    let second = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(second.iter().all(|p| p.origin == ProposalOrigin::Updated));
    assert_eq!(
        first.iter().map(|p| p.settlement_id).collect::<Vec<_>>(),
        second.iter().map(|p| p.settlement_id).collect::<Vec<_>>()
    );

    let stored = f.engine.group_settlements(f.a, f.group).unwrap();
    assert_eq!(stored.len(), 2);
    let bob_to_alice: Vec<_> = stored
        .iter()
        .filter(|s| s.payer == f.b && s.status.is_open())
        .collect();
    assert_eq!(bob_to_alice.len(), 1);
    assert_eq!(bob_to_alice[0].amount, dec!(30));
    // a fresh due date puts it back in the Pending cycle
    assert_eq!(bob_to_alice[0].status, SettlementStatus::Pending);
    assert_eq!(bob_to_alice[0].due_date, start() + Duration::days(15));
}

fn rent_split(shares: [(UserId, Decimal); 3]) -> SplitRule {
    SplitRule::Percentage(BTreeMap::from(shares))
}

#[test]
fn finalize_leaves_percentage_split_shares_alone() {
    let f = flat_of_three();
    let rent = NewExpense {
        group_id: f.group,
        paid_by: f.a,
        amount: dec!(100),
        description: "rent".into(),
    };
    let rule = rent_split([(f.a, dec!(0)), (f.b, dec!(100)), (f.c, dec!(0))]);
    let split = f.engine.record_split_expense(f.a, &rent, &rule).unwrap();
    assert_eq!(split.settlements.len(), 1);

    // the split's own settlement carries the debt, so nothing nets
    let proposals = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(proposals.is_empty());
    let balances = f.engine.compute_balances(f.a, f.group).unwrap();
    assert!(balances.members.values().all(|m| m.net_balance.is_zero()));

    let stored = f.engine.group_settlements(f.a, f.group).unwrap();
    let pairs: Vec<_> = stored
        .iter()
        .map(|s| (s.payer, s.receiver, s.amount, s.status))
        .collect();
    assert_eq!(pairs, vec![(f.b, f.a, dec!(100), SettlementStatus::Pending)]);
    assert_eq!(stored[0].split_expense, Some(split.expense.expense_id));
}

#[test]
fn split_shares_and_netted_debts_coexist() {
    let f = flat_of_three();
    let rent = NewExpense {
        group_id: f.group,
        paid_by: f.a,
        amount: dec!(100),
        description: "rent".into(),
    };
    let rule = rent_split([(f.a, dec!(0)), (f.b, dec!(100)), (f.c, dec!(0))]);
    let split = f.engine.record_split_expense(f.a, &rent, &rule).unwrap();
    let share_id = split.settlements[0].settlement_id;
    pay(&f, f.a, dec!(90));

    let first = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    let pairs: Vec<_> = first.iter().map(|p| (p.payer, p.receiver, p.amount)).collect();
    assert_eq!(pairs, vec![(f.b, f.a, dec!(30)), (f.c, f.a, dec!(30))]);
    assert!(first.iter().all(|p| p.origin == ProposalOrigin::Created));
    assert!(first.iter().all(|p| p.settlement_id != Some(share_id)));

    // the split share still confirms on its own without shifting the netting
    f.engine.confirm_settlement(f.a, share_id, None).unwrap();
    let second = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(second.iter().all(|p| p.origin == ProposalOrigin::Updated));
    assert_eq!(
        second.iter().map(|p| p.amount).collect::<Vec<_>>(),
        vec![dec!(30), dec!(30)]
    );

    let share = f.engine.store().get_settlement(share_id).unwrap();
    assert_eq!(share.amount, dec!(100));
    assert_eq!(share.status, SettlementStatus::Confirmed);
    assert_eq!(f.engine.group_settlements(f.a, f.group).unwrap().len(), 3);
}

#[test]
fn confirming_every_transfer_zeroes_the_group() {
    let f = flat_of_three();
    let d = f.engine.add_user("dave").unwrap();
    f.engine.add_member(f.a, f.group, d, false).unwrap();
    pay(&f, f.a, dec!(100));
    pay(&f, f.b, dec!(20));
    pay(&f, f.c, dec!(7.35));

    let proposals = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    for p in &proposals {
        let id = p.settlement_id.unwrap();
        f.engine.confirm_settlement(p.receiver, id, Some("bank transfer")).unwrap();
    }

    let balance = f.engine.compute_balances(f.a, f.group).unwrap();
    for member in balance.members.values() {
        assert!(
            is_settled_amount(member.net_balance),
            "member {} left at {}",
            member.member_id,
            member.net_balance
        );
    }
    let again = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    assert!(again.is_empty());
}

#[test]
fn include_existing_appends_untouched_settlements() {
    let f = flat_of_three();
    pay(&f, f.a, dec!(90));
    let proposals = f.engine.generate_settlements(f.a, f.group, PERSIST).unwrap();
    let bob_id = proposals
        .iter()
        .find(|p| p.payer == f.b)
        .and_then(|p| p.settlement_id)
        .unwrap();
    f.engine.confirm_settlement(f.a, bob_id, None).unwrap();

    let options = GenerateOptions {
        include_existing: true,
        persist: true,
    };
    let view = f.engine.generate_settlements(f.a, f.group, options).unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].payer, f.c);
    assert_eq!(view[0].origin, ProposalOrigin::Updated);
    assert_eq!(view[1].settlement_id, Some(bob_id));
    assert_eq!(view[1].origin, ProposalOrigin::Existing);
    assert_eq!(view[1].status, SettlementStatus::Confirmed);
}

#[test]
fn engine_strategy_can_be_swapped() {
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let engine = LedgerEngine::new(store, clock, LedgerConfig::default())
        .with_strategy(Box::new(MaxPayer));
    assert_eq!(engine.strategy_name(), "max_payer");

    let a = engine.add_user("alice").unwrap();
    let b = engine.add_user("bob").unwrap();
    let c = engine.add_user("carol").unwrap();
    let group = engine.create_group(a, "trip").unwrap().group_id;
    engine.add_member(a, group, b, false).unwrap();
    engine.add_member(a, group, c, false).unwrap();
    for (payer, amount) in [(a, dec!(60)), (b, dec!(30))] {
        let expense = NewExpense {
            group_id: group,
            paid_by: payer,
            amount,
            description: "fuel".into(),
        };
        engine.record_expense(payer, &expense).unwrap();
    }

    // fair share 30: bob is even, only carol owes, and she owes alice
    let proposals = engine
        .generate_settlements(a, group, GenerateOptions::default())
        .unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!((proposals[0].payer, proposals[0].receiver), (c, a));
    assert_eq!(proposals[0].amount, dec!(30));
}
