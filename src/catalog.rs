use crate::error::{AmistError, AmistResult};
use crate::model::{NewReward, Reward, RewardFilter, RewardPatch};
use crate::service::{new_id, Amist};
use crate::store::Store;
use chrono::{DateTime, Utc};

const DEFAULT_CATEGORY: &str = "general";

fn validate(reward: &Reward) -> AmistResult<()> {
    if reward.title.is_empty() {
        return Err(AmistError::InvalidReward("title must not be empty".into()));
    }
    if reward.points_cost <= 0 {
        return Err(AmistError::InvalidReward(format!(
            "pointsCost must be > 0 (got {})",
            reward.points_cost
        )));
    }
    if reward.stock < 0 {
        return Err(AmistError::InvalidReward(format!(
            "stock must be >= 0 (got {})",
            reward.stock
        )));
    }
    Ok(())
}

fn category_or_default(raw: &str) -> String {
    let c = raw.trim();
    if c.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        c.to_string()
    }
}

/// True iff the reward is active, in stock and not past its expiry at `at`.
pub fn is_redeemable(reward: &Reward, at: DateTime<Utc>) -> bool {
    reward.is_redeemable(at)
}

impl<S: Store> Amist<S> {
    pub fn create_reward(&self, draft: NewReward) -> AmistResult<Reward> {
        let reward = Reward {
            id: new_id(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            points_cost: draft.points_cost,
            stock: draft.stock,
            active: draft.active,
            category: category_or_default(&draft.category),
            created_by: draft.created_by,
            created_at: self.now(),
            expires_at: draft.expires_at,
        };
        validate(&reward)?;
        self.store.insert_reward(&reward)?;
        tracing::info!(reward_id = %reward.id, cost = reward.points_cost, stock = reward.stock, "reward created");
        Ok(reward)
    }

    pub fn update_reward(&self, id: &str, patch: RewardPatch) -> AmistResult<Reward> {
        self.store.atomically(|store| -> AmistResult<_> {
            let mut reward = store
                .get_reward(id)?
                .ok_or_else(|| AmistError::not_found("reward", id))?;
            if let Some(v) = patch.title {
                reward.title = v.trim().to_string();
            }
            if let Some(v) = patch.description {
                reward.description = v.trim().to_string();
            }
            if let Some(v) = patch.points_cost {
                reward.points_cost = v;
            }
            if let Some(v) = patch.stock {
                reward.stock = v;
            }
            if let Some(v) = patch.active {
                reward.active = v;
            }
            if let Some(v) = patch.category {
                reward.category = category_or_default(&v);
            }
            if let Some(v) = patch.expires_at {
                reward.expires_at = v;
            }
            validate(&reward)?;
            store.save_reward(&reward)?;
            tracing::info!(reward_id = %reward.id, "reward updated");
            Ok(reward)
        })
    }

    pub fn get_reward(&self, id: &str) -> AmistResult<Reward> {
        self.store
            .get_reward(id)?
            .ok_or_else(|| AmistError::not_found("reward", id))
    }

    pub fn list_rewards(&self, filter: &RewardFilter) -> AmistResult<Vec<Reward>> {
        Ok(self
            .store
            .list_rewards()?
            .into_iter()
            .filter(|r| !filter.active_only || r.active)
            .filter(|r| filter.redeemable_at.map_or(true, |at| r.is_redeemable(at)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{memory_core, t0};
    use chrono::Duration;

    fn draft(cost: i64, stock: i64) -> NewReward {
        NewReward {
            title: "Recreo extra".into(),
            points_cost: cost,
            stock,
            active: true,
            created_by: "teacher-1".into(),
            ..NewReward::default()
        }
    }

    #[test]
    fn create_validates_cost_and_stock() {
        let (core, _, _) = memory_core();
        assert!(matches!(core.create_reward(draft(0, 1)), Err(AmistError::InvalidReward(_))));
        assert!(matches!(core.create_reward(draft(10, -1)), Err(AmistError::InvalidReward(_))));
        let r = core.create_reward(draft(10, 0)).unwrap();
        assert_eq!(r.category, "general");
    }

    #[test]
    fn update_is_partial_and_missing_is_not_found() {
        let (core, _, _) = memory_core();
        let r = core.create_reward(draft(60, 1)).unwrap();
        let updated = core
            .update_reward(
                &r.id,
                RewardPatch {
                    stock: Some(5),
                    ..RewardPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.stock, 5);
        assert_eq!(updated.points_cost, 60);
        assert_eq!(updated.title, "Recreo extra");

        let err = core.update_reward("missing", RewardPatch::default()).unwrap_err();
        assert!(matches!(err, AmistError::NotFound { entity: "reward", .. }));
    }

    #[test]
    fn invalid_patch_leaves_reward_untouched() {
        let (core, _, _) = memory_core();
        let r = core.create_reward(draft(60, 1)).unwrap();
        let err = core
            .update_reward(
                &r.id,
                RewardPatch {
                    title: Some("Nuevo".into()),
                    points_cost: Some(-3),
                    ..RewardPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AmistError::InvalidReward(_)));
        assert_eq!(core.get_reward(&r.id).unwrap(), r);
    }

    #[test]
    fn redeemable_requires_active_stock_and_unexpired() {
        let (core, _, _) = memory_core();
        let mut r = core.create_reward(draft(60, 1)).unwrap();
        let now = t0();
        assert!(is_redeemable(&r, now));

        r.expires_at = Some(now + Duration::hours(1));
        assert!(is_redeemable(&r, now));
        assert!(!is_redeemable(&r, now + Duration::hours(1)));

        r.expires_at = None;
        r.stock = 0;
        assert!(!is_redeemable(&r, now));

        r.stock = 1;
        r.active = false;
        assert!(!is_redeemable(&r, now));
    }

    #[test]
    fn list_can_filter_to_redeemable() {
        let (core, _, _) = memory_core();
        core.create_reward(draft(10, 1)).unwrap();
        core.create_reward(draft(10, 0)).unwrap();
        let all = core.list_rewards(&RewardFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        let open = core
            .list_rewards(&RewardFilter {
                redeemable_at: Some(t0()),
                ..RewardFilter::default()
            })
            .unwrap();
        assert_eq!(open.len(), 1);
    }
}
