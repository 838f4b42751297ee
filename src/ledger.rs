use crate::directory::require_user;
use crate::error::{AmistError, AmistResult};
use crate::model::{PointsTransaction, TransactionFilter, TransactionType};
use crate::service::{new_id, Amist};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub user_id: &'a str,
    pub amount: i64,
    pub kind: TransactionType,
    pub description: &'a str,
    pub created_by: Option<&'a str>,
    pub related_id: Option<&'a str>,
}

impl<S: Store> Amist<S> {
    /// Appends one ledger entry. Entries are never edited; a mistake is
    /// undone by recording the opposite amount.
    pub fn record_transaction(&self, new: NewTransaction<'_>) -> AmistResult<PointsTransaction> {
        if new.amount == 0 {
            return Err(AmistError::InvalidAmount);
        }
        let tx = PointsTransaction {
            id: new_id(),
            user_id: new.user_id.to_string(),
            amount: new.amount,
            kind: new.kind,
            description: new.description.trim().to_string(),
            created_at: self.now(),
            created_by: new.created_by.map(str::to_string),
            related_id: new.related_id.map(str::to_string),
        };
        self.store.atomically(|store| -> AmistResult<()> {
            require_user(store, &tx.user_id, None)?;
            // The balance must stay representable or SUM() fails for good.
            if store.balance(&tx.user_id)?.checked_add(tx.amount).is_none() {
                return Err(AmistError::InvalidInput(
                    "amount would overflow balance".into(),
                ));
            }
            store.append_transaction(&tx)?;
            Ok(())
        })?;
        tracing::info!(
            user_id = %tx.user_id,
            amount = tx.amount,
            kind = tx.kind.as_str(),
            "points recorded"
        );
        Ok(tx)
    }

    /// Zero for users with no entries.
    pub fn get_balance(&self, user_id: &str) -> AmistResult<i64> {
        Ok(self.store.balance(user_id)?)
    }

    pub fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> AmistResult<Vec<PointsTransaction>> {
        Ok(self.store.list_transactions(user_id, filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::service::testing::{memory_core, t0, FixedClock};
    use crate::service::Clock;
    use crate::store::SqliteStore;
    use chrono::Duration;

    fn award<'a>(user_id: &'a str, amount: i64, kind: TransactionType) -> NewTransaction<'a> {
        NewTransaction {
            user_id,
            amount,
            kind,
            description: "x",
            created_by: None,
            related_id: None,
        }
    }

    #[test]
    fn zero_amount_is_rejected() {
        let (core, _, _) = memory_core();
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        let err = core
            .record_transaction(award(&u.id, 0, TransactionType::Bonus))
            .unwrap_err();
        assert!(matches!(err, AmistError::InvalidAmount));
        assert!(core.list_transactions(&u.id, &TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn overflowing_amount_is_refused_and_ledger_unchanged() {
        let core = Amist::new(SqliteStore::open_in_memory().unwrap());
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        core.record_transaction(award(&u.id, i64::MAX, TransactionType::Bonus))
            .unwrap();

        let err = core
            .record_transaction(award(&u.id, i64::MAX, TransactionType::Bonus))
            .unwrap_err();
        assert!(matches!(err, AmistError::InvalidInput(_)));
        assert_eq!(err.code(), "bad_params");
        assert_eq!(
            core.list_transactions(&u.id, &TransactionFilter::default()).unwrap().len(),
            1
        );
        assert_eq!(core.get_balance(&u.id).unwrap(), i64::MAX);

        core.record_transaction(award(&u.id, -1, TransactionType::Reward))
            .unwrap();
        assert_eq!(core.get_balance(&u.id).unwrap(), i64::MAX - 1);
    }

    #[test]
    fn negative_overflow_is_refused_in_memory_too() {
        let (core, _, _) = memory_core();
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        core.record_transaction(award(&u.id, i64::MIN, TransactionType::Reward))
            .unwrap();
        let err = core
            .record_transaction(award(&u.id, -1, TransactionType::Reward))
            .unwrap_err();
        assert!(matches!(err, AmistError::InvalidInput(_)));
        assert_eq!(core.get_balance(&u.id).unwrap(), i64::MIN);
    }

    #[test]
    fn recorded_entry_equals_stored_row() {
        let clock = FixedClock::at(t0() + Duration::nanoseconds(1_234_567_891));
        let core = Amist::new(SqliteStore::open_in_memory().unwrap()).with_clock(clock);
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        let recorded = core
            .record_transaction(award(&u.id, 15, TransactionType::Bonus))
            .unwrap();
        let listed = core.list_transactions(&u.id, &TransactionFilter::default()).unwrap();
        assert_eq!(listed, vec![recorded.clone()]);
        assert_eq!(recorded.created_at.timestamp_subsec_nanos(), 234_567_000);
    }

    #[test]
    fn unknown_user_is_not_found() {
        let (core, _, _) = memory_core();
        let err = core
            .record_transaction(award("ghost", 5, TransactionType::Bonus))
            .unwrap_err();
        assert!(matches!(err, AmistError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn balance_is_sum_of_listed_transactions() {
        let (core, clock, _) = memory_core();
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        assert_eq!(core.get_balance(&u.id).unwrap(), 0);

        for amount in [40, 25, -10, 100, -55] {
            core.record_transaction(award(&u.id, amount, TransactionType::Assignment))
                .unwrap();
            clock.advance(Duration::minutes(1));
        }
        let listed = core.list_transactions(&u.id, &TransactionFilter::default()).unwrap();
        assert_eq!(listed.len(), 5);
        assert_eq!(
            core.get_balance(&u.id).unwrap(),
            listed.iter().map(|t| t.amount).sum::<i64>()
        );
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn list_filters_by_since_and_type() {
        let (core, clock, _) = memory_core();
        let u = core.create_user("u1@x.cl", "U1", Role::Student).unwrap();
        core.record_transaction(award(&u.id, 10, TransactionType::Bonus)).unwrap();
        clock.advance(Duration::hours(1));
        let cut = clock.now();
        core.record_transaction(award(&u.id, 20, TransactionType::Assignment)).unwrap();
        core.record_transaction(award(&u.id, 30, TransactionType::Bonus)).unwrap();

        let since = core
            .list_transactions(
                &u.id,
                &TransactionFilter {
                    since: Some(cut),
                    ..TransactionFilter::default()
                },
            )
            .unwrap();
        assert_eq!(since.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![20, 30]);

        let bonus = core
            .list_transactions(
                &u.id,
                &TransactionFilter {
                    kind: Some(TransactionType::Bonus),
                    ..TransactionFilter::default()
                },
            )
            .unwrap();
        assert_eq!(bonus.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![10, 30]);
    }
}
