use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{
    actor, attributed_to, authorize, authorize_own, authorize_self_or, core, opt_parsed, opt_str, parsed,
    required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClaimFilter, Decision};
use crate::roles::Capability;
use serde_json::json;

fn handle_claims_request(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    let reward_id = required_str(req, "rewardId")?;
    authorize_own(req, &user_id, Capability::RequestRedemption, "redeem for others")?;
    let claim = core.request_redemption(&user_id, &reward_id)?;
    Ok(json!({ "claim": to_json(&claim)? }))
}

fn handle_claims_process(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = authorize(req, Capability::ProcessClaims, "process claims")?;
    let core = core(state)?;
    let claim_id = required_str(req, "claimId")?;
    let decision: Decision = parsed(req, "decision")?;
    let processed_by = attributed_to(
        actor.as_ref(),
        opt_str(req, "processedBy")?,
        "process claims for another reviewer",
    )?
    .ok_or_else(|| HandlerErr::bad_params("missing processedBy"))?;
    let note = opt_str(req, "note")?;
    let claim = core.process_claim(&claim_id, decision, &processed_by, note.as_deref())?;
    let balance = core.get_balance(&claim.user_id)?;
    Ok(json!({ "claim": to_json(&claim)?, "balance": balance }))
}

fn handle_claims_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let claim_id = required_str(req, "claimId")?;
    let claim = core.get_claim(&claim_id)?;
    authorize_self_or(req, &claim.user_id, Capability::ProcessClaims, "view other claims")?;
    Ok(json!({ "claim": to_json(&claim)? }))
}

fn handle_claims_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let mut filter = ClaimFilter {
        user_id: opt_str(req, "userId")?,
        reward_id: opt_str(req, "rewardId")?,
        status: opt_parsed(req, "status")?,
    };
    // Without review rights a caller only sees their own claims.
    if let Some(a) = actor(req)? {
        if !a.role.allows(Capability::ProcessClaims) {
            match filter.user_id.clone() {
                Some(id) if id != a.id => {
                    authorize_self_or(req, &id, Capability::ProcessClaims, "view other claims")?;
                }
                _ => filter.user_id = Some(a.id),
            }
        }
    }
    let claims = core.list_claims(&filter)?;
    Ok(json!({ "claims": to_json(&claims)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "claims.request" => handle_claims_request(state, req),
        "claims.process" => handle_claims_process(state, req),
        "claims.get" => handle_claims_get(state, req),
        "claims.list" => handle_claims_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
