use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::roles::{Capability, Role};
use crate::service::Amist;
use crate::store::SqliteStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

pub fn core<'a>(state: &'a AppState) -> Result<&'a Amist<SqliteStore>, HandlerErr> {
    state
        .core
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn param<'a>(req: &'a Request, key: &str) -> Option<&'a Value> {
    req.params.get(key).filter(|v| !v.is_null())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    param(req, key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    opt_i64(req, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

pub fn opt_usize(req: &Request, key: &str) -> Result<Option<usize>, HandlerErr> {
    match opt_i64(req, key)? {
        None => Ok(None),
        Some(n) => usize::try_from(n)
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be >= 0", key))),
    }
}

pub fn opt_bool(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn opt_datetime(req: &Request, key: &str) -> Result<Option<DateTime<Utc>>, HandlerErr> {
    let Some(raw) = opt_str(req, key)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| HandlerErr::bad_params(format!("{} must be an RFC 3339 timestamp: {}", key, e)))
}

pub fn parsed<T: FromStr<Err = String>>(req: &Request, key: &str) -> Result<T, HandlerErr> {
    required_str(req, key)?
        .parse()
        .map_err(HandlerErr::bad_params)
}

pub fn opt_parsed<T: FromStr<Err = String>>(req: &Request, key: &str) -> Result<Option<T>, HandlerErr> {
    opt_str(req, key)?
        .map(|s| s.parse().map_err(HandlerErr::bad_params))
        .transpose()
}

pub fn string_array(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(v) = param(req, key) else {
        return Ok(Vec::new());
    };
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array of strings", key)))
        })
        .collect()
}

/// Caller identity as asserted by the host application.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

pub fn actor(req: &Request) -> Result<Option<Actor>, HandlerErr> {
    let Some(v) = param(req, "actor") else {
        return Ok(None);
    };
    let id = v
        .get("id")
        .and_then(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("actor.id is required"))?;
    let role = v
        .get("role")
        .and_then(|x| x.as_str())
        .ok_or_else(|| HandlerErr::bad_params("actor.role is required"))?
        .parse::<Role>()
        .map_err(HandlerErr::bad_params)?;
    Ok(Some(Actor {
        id: id.to_string(),
        role,
    }))
}

fn forbidden(actor: &Actor, what: &str) -> HandlerErr {
    tracing::warn!(actor_id = %actor.id, role = actor.role.as_str(), what, "forbidden");
    HandlerErr::new("forbidden", format!("{} may not {}", actor.role, what)).with_details(
        serde_json::json!({ "actorId": actor.id, "role": actor.role.as_str() }),
    )
}

/// Requests without an actor are trusted (host-side tooling).
pub fn authorize(req: &Request, cap: Capability, what: &str) -> Result<Option<Actor>, HandlerErr> {
    let actor = actor(req)?;
    if let Some(a) = actor.as_ref() {
        if !a.role.allows(cap) {
            return Err(forbidden(a, what));
        }
    }
    Ok(actor)
}

/// Acting on one's own record is always allowed; otherwise `cap` is needed.
pub fn authorize_self_or(
    req: &Request,
    subject_id: &str,
    cap: Capability,
    what: &str,
) -> Result<(), HandlerErr> {
    if let Some(a) = actor(req)? {
        if a.id != subject_id && !a.role.allows(cap) {
            return Err(forbidden(&a, what));
        }
    }
    Ok(())
}

/// Needs `cap` and the subject must be the actor itself.
pub fn authorize_own(
    req: &Request,
    subject_id: &str,
    cap: Capability,
    what: &str,
) -> Result<(), HandlerErr> {
    if let Some(a) = actor(req)? {
        if a.id != subject_id || !a.role.allows(cap) {
            return Err(forbidden(&a, what));
        }
    }
    Ok(())
}

/// Author id recorded on a write. With an actor present the record is
/// attributed to the actor; naming someone else is refused.
pub fn attributed_to(
    actor: Option<&Actor>,
    given: Option<String>,
    what: &str,
) -> Result<Option<String>, HandlerErr> {
    let given = given.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    match (actor, given) {
        (Some(a), Some(id)) if id != a.id => Err(forbidden(a, what)),
        (Some(a), _) => Ok(Some(a.id.clone())),
        (None, given) => Ok(given),
    }
}
