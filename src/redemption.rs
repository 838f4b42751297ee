//! Reward claims: `pending` on request, then exactly one transition to
//! `approved` or `rejected`.
//!
//! Requesting does not reserve anything. Points and stock are checked again
//! when the claim is approved, inside the same store transaction that writes
//! the debit, the stock decrement and the claim status. If the re-check fails
//! the claim is rejected with a reason instead of returning an error, so every
//! processed claim ends in a terminal state.

use crate::directory::require_user;
use crate::error::{AmistError, AmistResult};
use crate::events::{AmistEvent, ClaimRef};
use crate::model::{ClaimFilter, ClaimStatus, Decision, PointsTransaction, RewardClaim, TransactionType};
use crate::service::{new_id, Amist};
use crate::store::Store;
use chrono::{DateTime, Utc};

fn claim_ref(claim: &RewardClaim) -> ClaimRef {
    ClaimRef {
        claim_id: claim.id.clone(),
        user_id: claim.user_id.clone(),
        reward_id: claim.reward_id.clone(),
        points_spent: claim.points_spent,
    }
}

fn finish(claim: &mut RewardClaim, status: ClaimStatus, at: DateTime<Utc>, by: &str, reason: Option<String>) {
    claim.status = status;
    claim.processed_at = Some(at);
    claim.processed_by = Some(by.to_string());
    claim.reason = reason;
}

/// Why an approval cannot go through any more, or `None` if it can.
fn approval_blocker<S: Store>(
    store: &S,
    claim: &RewardClaim,
    at: DateTime<Utc>,
) -> AmistResult<Option<String>> {
    let Some(reward) = store.get_reward(&claim.reward_id)? else {
        return Ok(Some("reward no longer exists".to_string()));
    };
    if let Some(reason) = reward.unredeemable_reason(at) {
        return Ok(Some(reason.to_string()));
    }
    let balance = store.balance(&claim.user_id)?;
    if balance < claim.points_spent {
        return Ok(Some(format!(
            "insufficient points: balance {balance}, required {}",
            claim.points_spent
        )));
    }
    Ok(None)
}

impl<S: Store> Amist<S> {
    pub fn request_redemption(&self, user_id: &str, reward_id: &str) -> AmistResult<RewardClaim> {
        let now = self.now();
        let claim = self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, user_id, None)?;
            let reward = store
                .get_reward(reward_id)?
                .ok_or_else(|| AmistError::RewardNotFound(reward_id.to_string()))?;
            if let Some(reason) = reward.unredeemable_reason(now) {
                return Err(AmistError::RewardNotRedeemable(reason.to_string()));
            }
            let balance = store.balance(user_id)?;
            if balance < reward.points_cost {
                return Err(AmistError::InsufficientPoints {
                    balance,
                    required: reward.points_cost,
                });
            }
            let claim = RewardClaim {
                id: new_id(),
                user_id: user_id.to_string(),
                reward_id: reward.id.clone(),
                points_spent: reward.points_cost,
                status: ClaimStatus::Pending,
                claimed_at: now,
                processed_at: None,
                processed_by: None,
                reason: None,
            };
            store.insert_claim(&claim)?;
            Ok(claim)
        })?;
        tracing::info!(claim_id = %claim.id, user_id, reward_id, "redemption requested");
        self.events.publish(AmistEvent::ClaimRequested(claim_ref(&claim)), now);
        Ok(claim)
    }

    /// Applies a reviewer's decision. `note` is stored as the rejection
    /// reason for manual rejections.
    pub fn process_claim(
        &self,
        claim_id: &str,
        decision: Decision,
        processed_by: &str,
        note: Option<&str>,
    ) -> AmistResult<RewardClaim> {
        let now = self.now();
        let claim = self.store.atomically(|store| -> AmistResult<_> {
            let mut claim = store
                .get_claim(claim_id)?
                .ok_or_else(|| AmistError::not_found("claim", claim_id))?;
            if claim.status.is_terminal() {
                return Err(AmistError::ClaimNotPending {
                    id: claim.id,
                    status: claim.status.to_string(),
                });
            }

            match decision {
                Decision::Reject => {
                    let reason = note.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
                    finish(&mut claim, ClaimStatus::Rejected, now, processed_by, reason);
                }
                Decision::Approve => match approval_blocker(store, &claim, now)? {
                    Some(reason) => {
                        tracing::warn!(claim_id, reason = %reason, "approval re-check failed, rejecting");
                        finish(&mut claim, ClaimStatus::Rejected, now, processed_by, Some(reason));
                    }
                    None => {
                        store.append_transaction(&PointsTransaction {
                            id: new_id(),
                            user_id: claim.user_id.clone(),
                            amount: -claim.points_spent,
                            kind: TransactionType::Reward,
                            description: format!("reward claim {}", claim.id),
                            created_at: now,
                            created_by: Some(processed_by.to_string()),
                            related_id: Some(claim.id.clone()),
                        })?;
                        let mut reward = store
                            .get_reward(&claim.reward_id)?
                            .ok_or_else(|| AmistError::RewardNotFound(claim.reward_id.clone()))?;
                        reward.stock -= 1;
                        store.save_reward(&reward)?;
                        finish(&mut claim, ClaimStatus::Approved, now, processed_by, None);
                    }
                },
            }
            store.save_claim(&claim)?;
            Ok(claim)
        })?;

        tracing::info!(claim_id, status = %claim.status, processed_by, "claim processed");
        let event = match claim.status {
            ClaimStatus::Approved => AmistEvent::ClaimApproved(claim_ref(&claim)),
            _ => AmistEvent::ClaimRejected {
                claim: claim_ref(&claim),
                reason: claim.reason.clone(),
            },
        };
        self.events.publish(event, now);
        Ok(claim)
    }

    pub fn get_claim(&self, id: &str) -> AmistResult<RewardClaim> {
        self.store
            .get_claim(id)?
            .ok_or_else(|| AmistError::not_found("claim", id))
    }

    pub fn list_claims(&self, filter: &ClaimFilter) -> AmistResult<Vec<RewardClaim>> {
        Ok(self.store.list_claims(filter)?)
    }
}
