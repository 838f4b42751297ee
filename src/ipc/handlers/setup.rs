use crate::db;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{authorize, core};
use crate::ipc::types::{AppState, Request, DEFAULT_OUTBOX_LIMIT};
use crate::roles::Capability;
use crate::service::CoreConfig;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    CourseCode,
    Notifications,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [Self::CourseCode, Self::Notifications];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "courseCode" => Some(Self::CourseCode),
            "notifications" => Some(Self::Notifications),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::CourseCode => "courseCode",
            Self::Notifications => "notifications",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::CourseCode => "setup.courseCode",
            Self::Notifications => "setup.notifications",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    let core = CoreConfig::default();
    match section {
        SetupSection::CourseCode => json!({
            "maxAttempts": core.code_max_attempts,
            "suffixLength": core.code_suffix_len
        }),
        SetupSection::Notifications => json!({
            "enabled": true,
            "outboxLimit": DEFAULT_OUTBOX_LIMIT
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        let value = match (section, k.as_str()) {
            (SetupSection::CourseCode, "maxAttempts") => Value::from(parse_i64_range(v, k, 1, 20)?),
            (SetupSection::CourseCode, "suffixLength") => Value::from(parse_i64_range(v, k, 3, 8)?),
            (SetupSection::Notifications, "enabled") => Value::Bool(parse_bool(v, k)?),
            (SetupSection::Notifications, "outboxLimit") => {
                Value::from(parse_i64_range(v, k, 10, 10_000)?)
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        };
        obj.insert(k.clone(), value);
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let single = Map::from_iter([(k.clone(), v.clone())]);
                if let Err(msg) = merge_section_patch(section, &mut current, &single) {
                    tracing::warn!(section = section.name(), %msg, "ignoring saved setting");
                }
            }
        }
    }
    Ok(current)
}

/// Settings that change how the core and the outbox behave.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    pub core: CoreConfig,
    pub notifications_enabled: bool,
    pub outbox_limit: usize,
}

pub fn load_runtime_settings(conn: &Connection) -> anyhow::Result<RuntimeSettings> {
    let code = load_section(conn, SetupSection::CourseCode)?;
    let notifications = load_section(conn, SetupSection::Notifications)?;
    let defaults = CoreConfig::default();
    Ok(RuntimeSettings {
        core: CoreConfig {
            code_max_attempts: code["maxAttempts"]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.code_max_attempts),
            code_suffix_len: code["suffixLength"]
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.code_suffix_len),
        },
        notifications_enabled: notifications["enabled"].as_bool().unwrap_or(true),
        outbox_limit: notifications["outboxLimit"]
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_OUTBOX_LIMIT),
    })
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = core(state)?.store().conn();
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let value = load_section(conn, section)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        out.insert(section.name().to_string(), value);
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "change workspace settings")?;
    let section_raw = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section =
        SetupSection::parse(section_raw).ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch_obj = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let conn = core(state)?.store().conn();
    let mut current =
        load_section(conn, section).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let settings = load_runtime_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    if let Some(core) = state.core.as_mut() {
        core.set_config(settings.core);
    }
    state
        .outbox
        .configure(settings.notifications_enabled, settings.outbox_limit);
    tracing::info!(section = section.name(), "settings updated");
    Ok(json!({ "ok": true, (section.name()): current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let s = load_runtime_settings(&conn).unwrap();
        assert_eq!(s.core, CoreConfig::default());
        assert!(s.notifications_enabled);
        assert_eq!(s.outbox_limit, DEFAULT_OUTBOX_LIMIT);
    }

    #[test]
    fn out_of_range_saved_value_falls_back() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        db::settings_set_json(
            &conn,
            "setup.courseCode",
            &json!({ "maxAttempts": 99, "suffixLength": 6 }),
        )
        .unwrap();
        let s = load_runtime_settings(&conn).unwrap();
        assert_eq!(s.core.code_max_attempts, 5);
        assert_eq!(s.core.code_suffix_len, 6);
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let mut current = default_section(SetupSection::Notifications);
        let patch = Map::from_iter([("color".to_string(), json!("red"))]);
        let e = merge_section_patch(SetupSection::Notifications, &mut current, &patch).unwrap_err();
        assert!(e.contains("unknown notifications field"));
    }
}
