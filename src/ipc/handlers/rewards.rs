use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{
    attributed_to, authorize, core, opt_bool, opt_datetime, opt_i64, opt_str, required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{NewReward, RewardFilter, RewardPatch};
use crate::roles::Capability;
use serde_json::{json, Value};

fn handle_rewards_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = authorize(req, Capability::ManageRewards, "manage rewards")?;
    let core = core(state)?;
    let created_by = attributed_to(
        actor.as_ref(),
        opt_str(req, "createdBy")?,
        "create rewards for another author",
    )?;
    let mut params = req.params.clone();
    if let (Some(id), Some(obj)) = (created_by, params.as_object_mut()) {
        obj.insert("createdBy".into(), Value::String(id));
    }
    let draft: NewReward =
        serde_json::from_value(params).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let reward = core.create_reward(draft)?;
    Ok(json!({ "reward": to_json(&reward)? }))
}

fn handle_rewards_update(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageRewards, "manage rewards")?;
    let core = core(state)?;
    let reward_id = required_str(req, "rewardId")?;
    let expires_at = match req.params.get("expiresAt") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(_) => Some(opt_datetime(req, "expiresAt")?),
    };
    let patch = RewardPatch {
        title: opt_str(req, "title")?,
        description: opt_str(req, "description")?,
        points_cost: opt_i64(req, "pointsCost")?,
        stock: opt_i64(req, "stock")?,
        active: opt_bool(req, "active")?,
        category: opt_str(req, "category")?,
        expires_at,
    };
    let reward = core.update_reward(&reward_id, patch)?;
    Ok(json!({ "reward": to_json(&reward)? }))
}

fn handle_rewards_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let reward_id = required_str(req, "rewardId")?;
    let reward = core.get_reward(&reward_id)?;
    let redeemable = reward.is_redeemable(core.now());
    Ok(json!({ "reward": to_json(&reward)?, "redeemable": redeemable }))
}

fn handle_rewards_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let redeemable_only = opt_bool(req, "redeemableOnly")?.unwrap_or(false);
    let filter = RewardFilter {
        active_only: opt_bool(req, "activeOnly")?.unwrap_or(false),
        redeemable_at: redeemable_only.then(|| core.now()),
    };
    let rewards = core.list_rewards(&filter)?;
    Ok(json!({ "rewards": to_json(&rewards)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rewards.create" => handle_rewards_create(state, req),
        "rewards.update" => handle_rewards_update(state, req),
        "rewards.get" => handle_rewards_get(state, req),
        "rewards.list" => handle_rewards_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
