use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{
    authorize, authorize_self_or, core, opt_parsed, opt_str, parsed, required_str, string_array,
    to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Capability, Role};
use serde_json::json;

fn handle_users_create(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "create users")?;
    let core = core(state)?;
    let email = required_str(req, "email")?;
    let name = required_str(req, "name")?;
    let role: Role = parsed(req, "role")?;
    let user = core.create_user(&email, &name, role)?;
    Ok(json!({ "user": to_json(&user)? }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ViewAnyBalance, "view other users")?;
    let user = core.get_user(&user_id)?;
    Ok(json!({ "user": to_json(&user)? }))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ViewAnyBalance, "list users")?;
    let core = core(state)?;
    let role: Option<Role> = opt_parsed(req, "role")?;
    let users = core.list_users(role)?;
    Ok(json!({ "users": to_json(&users)? }))
}

fn handle_student_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ManageUsers, "edit other profiles")?;
    let school = opt_str(req, "school")?.unwrap_or_default();
    let grade = opt_str(req, "grade")?.unwrap_or_default();
    let profile = core.upsert_student_profile(&user_id, &school, &grade)?;
    Ok(json!({ "profile": to_json(&profile)? }))
}

fn handle_teacher_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ManageUsers, "edit other profiles")?;
    let school = opt_str(req, "school")?.unwrap_or_default();
    let subjects = string_array(req, "subjects")?;
    let profile = core.upsert_teacher_profile(&user_id, &school, &subjects)?;
    Ok(json!({ "profile": to_json(&profile)? }))
}

fn handle_tutor_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ManageUsers, "edit other profiles")?;
    let relationship = opt_str(req, "relationship")?.unwrap_or_default();
    let profile = core.upsert_tutor_profile(&user_id, &relationship)?;
    Ok(json!({ "profile": to_json(&profile)? }))
}

fn handle_assign_tutor(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageUsers, "assign tutors")?;
    let core = core(state)?;
    let student_id = required_str(req, "studentId")?;
    let tutor_id = required_str(req, "tutorId")?;
    let profile = core.assign_tutor(&student_id, &tutor_id)?;
    Ok(json!({ "profile": to_json(&profile)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => handle_users_create(state, req),
        "users.get" => handle_users_get(state, req),
        "users.list" => handle_users_list(state, req),
        "profiles.student.upsert" => handle_student_upsert(state, req),
        "profiles.teacher.upsert" => handle_teacher_upsert(state, req),
        "profiles.tutor.upsert" => handle_tutor_upsert(state, req),
        "students.assignTutor" => handle_assign_tutor(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
