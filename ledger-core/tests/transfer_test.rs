//! Transfer behaviour against both store implementations
//!
//! Every scenario runs once on a DuckDB file and once on the in-memory store.
//!
//! Run with: cargo test --test transfer_test

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use ledger_core::adapters::duckdb::DuckDbStore;
use ledger_core::adapters::memory::MemoryStore;
use ledger_core::ports::LedgerStore;
use ledger_core::services::{AccountService, LedgerRepository, TransferPolicy};
use ledger_core::{AccountId, Error, TransactionFilter};

type Service<S> = AccountService<LedgerRepository<S>>;

fn service<S: LedgerStore>(store: S) -> Service<S> {
    let repository = LedgerRepository::new(Arc::new(store), TransferPolicy::default());
    AccountService::new(Arc::new(repository))
}

fn duckdb_service() -> (TempDir, Service<DuckDbStore>) {
    let temp_dir = TempDir::new().unwrap();
    let store = DuckDbStore::open(&temp_dir.path().join("ledger.duckdb"), 2).unwrap();
    store.run_migrations().unwrap();
    (temp_dir, service(store))
}

fn memory_service() -> Service<MemoryStore> {
    service(MemoryStore::new())
}

fn balance<S: LedgerStore>(service: &Service<S>, id: u64) -> Decimal {
    service.get_account(AccountId(id)).unwrap().balance
}

/// Generates one test per store for a scenario function
macro_rules! on_both_stores {
    ($($name:ident),* $(,)?) => {
        mod duckdb_store {
            $(
                #[test]
                fn $name() {
                    let (_dir, service) = super::duckdb_service();
                    super::$name(&service);
                }
            )*
        }

        mod memory_store {
            $(
                #[test]
                fn $name() {
                    let service = super::memory_service();
                    super::$name(&service);
                }
            )*
        }
    };
}

on_both_stores!(
    full_balance_then_overdraft,
    exact_balance_leaves_zero,
    insufficient_funds_changes_nothing,
    same_account_is_rejected,
    invalid_amounts_are_rejected,
    missing_accounts_are_reported,
    duplicate_account_is_rejected,
    transfers_conserve_total,
    every_transfer_is_recorded,
    history_filters_by_account,
    fractional_amounts_are_exact,
);

fn full_balance_then_overdraft<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(100.0)).unwrap();
    service.create_account(AccountId(2), dec!(0.0)).unwrap();

    service.transfer(AccountId(1), AccountId(2), dec!(100.0)).unwrap();
    assert_eq!(balance(service, 1), dec!(0.0));
    assert_eq!(balance(service, 2), dec!(100.0));
    assert_eq!(service.history(&TransactionFilter::all()).unwrap().len(), 1);

    let err = service.transfer(AccountId(1), AccountId(2), dec!(1.0)).unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { account: AccountId(1), .. }));
    assert_eq!(balance(service, 1), dec!(0.0));
    assert_eq!(balance(service, 2), dec!(100.0));
    assert_eq!(service.history(&TransactionFilter::all()).unwrap().len(), 1);
}

fn exact_balance_leaves_zero<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(10), dec!(42.42)).unwrap();
    service.create_account(AccountId(11), dec!(0.58)).unwrap();

    let record = service.transfer(AccountId(10), AccountId(11), dec!(42.42)).unwrap();
    assert_eq!(record.amount, dec!(42.42));
    assert_eq!(balance(service, 10), Decimal::ZERO);
    assert_eq!(balance(service, 11), dec!(43));
}

fn insufficient_funds_changes_nothing<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(5)).unwrap();
    service.create_account(AccountId(2), dec!(5)).unwrap();

    let err = service.transfer(AccountId(1), AccountId(2), dec!(5.0000000001)).unwrap_err();
    match err {
        Error::InsufficientFunds { account, balance, requested } => {
            assert_eq!(account, AccountId(1));
            assert_eq!(balance, dec!(5));
            assert_eq!(requested, dec!(5.0000000001));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(balance(service, 1), dec!(5));
    assert_eq!(balance(service, 2), dec!(5));
    assert!(service.history(&TransactionFilter::all()).unwrap().is_empty());
}

fn same_account_is_rejected<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(10)).unwrap();

    let err = service.transfer(AccountId(1), AccountId(1), dec!(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(balance(service, 1), dec!(10));
    assert!(service.history(&TransactionFilter::all()).unwrap().is_empty());
}

fn invalid_amounts_are_rejected<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(10)).unwrap();
    service.create_account(AccountId(2), dec!(0)).unwrap();

    for amount in [dec!(0), dec!(-1), dec!(0.00000000001)] {
        let err = service.transfer(AccountId(1), AccountId(2), amount).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "amount {}", amount);
    }
    assert!(matches!(
        service.create_account(AccountId(3), dec!(-0.01)),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(balance(service, 1), dec!(10));
}

fn missing_accounts_are_reported<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(10)).unwrap();

    assert!(matches!(
        service.get_account(AccountId(99)),
        Err(Error::AccountNotFound(AccountId(99)))
    ));
    assert!(matches!(
        service.transfer(AccountId(1), AccountId(99), dec!(1)),
        Err(Error::AccountNotFound(AccountId(99)))
    ));
    assert!(matches!(
        service.transfer(AccountId(98), AccountId(1), dec!(1)),
        Err(Error::AccountNotFound(AccountId(98)))
    ));
    assert_eq!(balance(service, 1), dec!(10));
}

fn duplicate_account_is_rejected<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(5), dec!(1)).unwrap();

    let err = service.create_account(AccountId(5), dec!(500)).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey(_)));
    assert_eq!(balance(service, 5), dec!(1));
}

fn transfers_conserve_total<S: LedgerStore>(service: &Service<S>) {
    for (id, opening) in [(1, dec!(300)), (2, dec!(150.5)), (3, dec!(0))] {
        service.create_account(AccountId(id), opening).unwrap();
    }
    let before = service.total_balance().unwrap();

    // (from, to, amount, expected to commit)
    let moves = [
        (1, 2, dec!(75.25), true),
        (2, 3, dec!(200), true),
        (3, 1, dec!(12.125), true),
        (1, 3, dec!(1000), false),
        (2, 1, dec!(25.75), true),
    ];
    for (from, to, amount, commits) in moves {
        let result = service.transfer(AccountId(from), AccountId(to), amount);
        if commits {
            let record = result.unwrap();
            assert_eq!(record.amount, amount);
        } else {
            assert!(
                matches!(result, Err(Error::InsufficientFunds { account, .. }) if account == AccountId(from)),
                "{} -> {} of {}: {:?}",
                from,
                to,
                amount,
                result
            );
        }
    }

    assert_eq!(service.total_balance().unwrap(), before);
    assert_eq!(balance(service, 1), dec!(262.625));
    assert_eq!(balance(service, 2), dec!(0));
    assert_eq!(balance(service, 3), dec!(187.875));
    assert_eq!(service.history(&TransactionFilter::all()).unwrap().len(), 4);
    for view in service.list_accounts().unwrap() {
        assert!(view.balance >= Decimal::ZERO);
    }
}

fn every_transfer_is_recorded<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(1000)).unwrap();
    service.create_account(AccountId(2), dec!(1000)).unwrap();

    let mut expected = Vec::new();
    for i in 1..=10u32 {
        let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
        let amount = Decimal::from(i);
        let record = service.transfer(AccountId(from), AccountId(to), amount).unwrap();
        expected.push(record);
    }

    let history = service.history(&TransactionFilter::all()).unwrap();
    assert_eq!(history.len(), 10);
    for (recorded, returned) in history.iter().zip(&expected) {
        assert_eq!(recorded.id, returned.id);
        assert_eq!(recorded.source_account, returned.source_account);
        assert_eq!(recorded.destination_account, returned.destination_account);
        assert_eq!(recorded.amount, returned.amount);
    }
    assert!(history.windows(2).all(|pair| pair[0].id < pair[1].id));
}

fn history_filters_by_account<S: LedgerStore>(service: &Service<S>) {
    for id in 1..=3 {
        service.create_account(AccountId(id), dec!(10)).unwrap();
    }
    service.transfer(AccountId(1), AccountId(2), dec!(1)).unwrap();
    service.transfer(AccountId(2), AccountId(3), dec!(1)).unwrap();
    service.transfer(AccountId(3), AccountId(1), dec!(1)).unwrap();
    service.transfer(AccountId(1), AccountId(3), dec!(1)).unwrap();

    let for_two = service.history(&TransactionFilter::for_account(AccountId(2))).unwrap();
    assert_eq!(for_two.len(), 2);
    assert!(for_two.iter().all(|tx| {
        tx.source_account == AccountId(2) || tx.destination_account == AccountId(2)
    }));

    let limited = service
        .history(&TransactionFilter::for_account(AccountId(1)).with_limit(2))
        .unwrap();
    assert_eq!(limited.len(), 2);
}

fn fractional_amounts_are_exact<S: LedgerStore>(service: &Service<S>) {
    service.create_account(AccountId(1), dec!(0.3)).unwrap();
    service.create_account(AccountId(2), dec!(0)).unwrap();

    service.transfer(AccountId(1), AccountId(2), dec!(0.1)).unwrap();
    service.transfer(AccountId(1), AccountId(2), dec!(0.1)).unwrap();
    service.transfer(AccountId(1), AccountId(2), dec!(0.1)).unwrap();

    assert_eq!(balance(service, 1), Decimal::ZERO);
    assert_eq!(balance(service, 2), dec!(0.3));
}
