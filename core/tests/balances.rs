//! Balance calculator tests: net positions, confirmed settlements, access.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use splitledger_core::{
    balance_calculator::{compute_balances, total_net, ExpenseScope},
    clock::ManualClock,
    config::LedgerConfig,
    engine::LedgerEngine,
    error::LedgerError,
    model::{NewExpense, NewSettlement},
    store::LedgerStore,
    types::{is_settled_amount, GroupId, UserId},
};
use std::sync::Arc;

struct Flat {
    engine: LedgerEngine,
    group:  GroupId,
    a:      UserId,
    b:      UserId,
    c:      UserId,
}

fn flat_of_three() -> Flat {
    let store = LedgerStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
    let engine = LedgerEngine::new(store, clock, LedgerConfig::default());

    let a = engine.add_user("alice").unwrap();
    let b = engine.add_user("bob").unwrap();
    let c = engine.add_user("carol").unwrap();
    let group = engine.create_group(a, "flat").unwrap().group_id;
    engine.add_member(a, group, b, false).unwrap();
    engine.add_member(a, group, c, false).unwrap();
    Flat { engine, group, a, b, c }
}

fn expense(group_id: GroupId, paid_by: UserId, amount: Decimal) -> NewExpense {
    NewExpense {
        group_id,
        paid_by,
        amount,
        description: "groceries".into(),
    }
}

// ── Net positions ─────────────────────────────────────────────

#[test]
fn one_payer_equal_split() {
    let f = flat_of_three();
    f.engine.record_expense(f.a, &expense(f.group, f.a, dec!(90))).unwrap();

    let balance = f.engine.compute_balances(f.b, f.group).unwrap();
    assert_eq!(balance.group_name, "flat");
    assert_eq!(balance.members.len(), 3);

    let a = balance.member(f.a).unwrap();
    assert_eq!(a.paid_in, dec!(90));
    assert_eq!(a.fair_share, dec!(30));
    assert_eq!(a.net_balance, dec!(60));
    assert_eq!(a.owes, Decimal::ZERO);

    for member in [f.b, f.c] {
        let row = balance.member(member).unwrap();
        assert_eq!(row.paid_in, Decimal::ZERO);
        assert_eq!(row.net_balance, dec!(-30));
        assert_eq!(row.owes, dec!(30));
    }
}

/// is_owed reports what a member put in, not max(0, net).
#[test]
fn is_owed_is_the_contribution() {
    let f = flat_of_three();
    f.engine.record_expense(f.a, &expense(f.group, f.a, dec!(90))).unwrap();
    f.engine.record_expense(f.b, &expense(f.group, f.b, dec!(15))).unwrap();

    let balance = f.engine.compute_balances(f.a, f.group).unwrap();
    assert_eq!(balance.member(f.a).unwrap().is_owed, dec!(90));
    assert_eq!(balance.member(f.b).unwrap().is_owed, dec!(15));
    assert_eq!(balance.member(f.c).unwrap().is_owed, Decimal::ZERO);
    // bob is still a net debtor even though is_owed is positive
    assert!(balance.member(f.b).unwrap().net_balance < Decimal::ZERO);
}

#[test]
fn net_positions_sum_to_zero() {
    let f = flat_of_three();
    let amounts = [
        (f.a, dec!(100)),
        (f.b, dec!(33.33)),
        (f.c, dec!(0.01)),
        (f.a, dec!(47.5)),
        (f.c, dec!(12.99)),
    ];
    for (payer, amount) in amounts {
        f.engine.record_expense(payer, &expense(f.group, payer, amount)).unwrap();
        let balance = f.engine.compute_balances(f.a, f.group).unwrap();
        assert!(
            is_settled_amount(balance.total_net()),
            "net positions drifted: {}",
            balance.total_net()
        );
    }
}

#[test]
fn empty_member_list_is_rejected() {
    let err = compute_balances(7, &[], &[], &[], ExpenseScope::All).unwrap_err();
    assert!(matches!(err, LedgerError::EmptyGroup { group_id: 7 }));
}

#[test]
fn members_without_expenses_still_get_a_row() {
    let f = flat_of_three();
    let balance = f.engine.compute_balances(f.a, f.group).unwrap();
    assert_eq!(balance.members.len(), 3);
    assert!(balance.members.values().all(|m| m.net_balance == Decimal::ZERO));
}

// ── Settlements feed back ─────────────────────────────────────

#[test]
fn only_confirmed_settlements_move_balances() {
    let f = flat_of_three();
    f.engine.record_expense(f.a, &expense(f.group, f.a, dec!(90))).unwrap();
    let request = NewSettlement {
        group_id: f.group,
        payer: f.b,
        receiver: f.a,
        amount: dec!(30),
        due_date: None,
    };
    let settlement = f.engine.create_settlement(f.b, &request).unwrap();

    let pending = f.engine.compute_balances(f.a, f.group).unwrap();
    assert_eq!(pending.member(f.b).unwrap().net_balance, dec!(-30));

    f.engine.confirm_settlement(f.a, settlement.settlement_id, Some("cash")).unwrap();
    let confirmed = f.engine.compute_balances(f.a, f.group).unwrap();
    assert_eq!(confirmed.member(f.b).unwrap().net_balance, Decimal::ZERO);
    assert_eq!(confirmed.member(f.b).unwrap().owes, Decimal::ZERO);
    assert_eq!(confirmed.member(f.a).unwrap().net_balance, dec!(30));
    assert!(is_settled_amount(total_net(&confirmed.members)));
}

#[test]
fn unsettled_scope_ignores_closed_batches() {
    let f = flat_of_three();
    let old = f.engine.record_expense(f.a, &expense(f.group, f.a, dec!(90))).unwrap();
    f.engine.store().mark_expenses_settled(&[old.expense_id]).unwrap();
    f.engine.record_expense(f.c, &expense(f.group, f.c, dec!(30))).unwrap();

    let current = f
        .engine
        .compute_balances_with_scope(f.a, f.group, ExpenseScope::UnsettledOnly)
        .unwrap();
    assert_eq!(current.member(f.a).unwrap().paid_in, Decimal::ZERO);
    assert_eq!(current.member(f.c).unwrap().net_balance, dec!(20));

    let everything = f.engine.compute_balances(f.a, f.group).unwrap();
    assert_eq!(everything.member(f.a).unwrap().paid_in, dec!(90));
}

// ── Access and validation ─────────────────────────────────────

#[test]
fn outsider_cannot_read_balances() {
    let f = flat_of_three();
    let outsider = f.engine.add_user("mallory").unwrap();
    let err = f.engine.compute_balances(outsider, f.group).unwrap_err();
    assert!(matches!(err, LedgerError::Permission(_)));
}

#[test]
fn unknown_group_is_not_found() {
    let f = flat_of_three();
    let err = f.engine.compute_balances(f.a, 999).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "group", id: 999 }));
}

#[test]
fn expense_validation() {
    let f = flat_of_three();
    let outsider = f.engine.add_user("mallory").unwrap();

    let err = f.engine.record_expense(f.a, &expense(f.group, outsider, dec!(10))).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "non-member payer: {err}");

    let err = f.engine.record_expense(f.a, &expense(f.group, f.a, Decimal::ZERO)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "zero amount: {err}");

    let mut blank = expense(f.group, f.a, dec!(5));
    blank.description = "  ".into();
    let err = f.engine.record_expense(f.a, &blank).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "blank description: {err}");

    let err = f.engine.record_expense(outsider, &expense(f.group, f.a, dec!(10))).unwrap_err();
    assert!(matches!(err, LedgerError::Permission(_)), "outsider caller: {err}");

    assert!(f.engine.store().group_expenses(f.group).unwrap().is_empty());
}
