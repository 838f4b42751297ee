use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{
    attributed_to, authorize, authorize_self_or, core, opt_datetime, opt_parsed, opt_str, opt_usize, parsed,
    required_i64, required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::NewTransaction;
use crate::model::{TransactionFilter, TransactionType};
use crate::roles::Capability;
use serde_json::json;

fn handle_ledger_record(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = authorize(req, Capability::AwardPoints, "award points")?;
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    let amount = required_i64(req, "amount")?;
    let kind: TransactionType = parsed(req, "type")?;
    let description = opt_str(req, "description")?.unwrap_or_default();
    let related_id = opt_str(req, "relatedId")?;
    let created_by = attributed_to(
        actor.as_ref(),
        opt_str(req, "createdBy")?,
        "record points for another author",
    )?;
    let tx = core.record_transaction(NewTransaction {
        user_id: &user_id,
        amount,
        kind,
        description: &description,
        created_by: created_by.as_deref(),
        related_id: related_id.as_deref(),
    })?;
    let balance = core.get_balance(&user_id)?;
    Ok(json!({ "transaction": to_json(&tx)?, "balance": balance }))
}

fn handle_ledger_balance(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ViewAnyBalance, "view other balances")?;
    let balance = core.get_balance(&user_id)?;
    Ok(json!({ "userId": user_id, "balance": balance }))
}

fn handle_ledger_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ViewAnyBalance, "view other ledgers")?;
    let filter = TransactionFilter {
        since: opt_datetime(req, "since")?,
        kind: opt_parsed(req, "type")?,
        limit: opt_usize(req, "limit")?,
    };
    let txs = core.list_transactions(&user_id, &filter)?;
    Ok(json!({ "transactions": to_json(&txs)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "ledger.record" => handle_ledger_record(state, req),
        "ledger.balance" => handle_ledger_balance(state, req),
        "ledger.list" => handle_ledger_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
