use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{authorize_self_or, core, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use serde_json::json;

fn handle_student_profile(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let user_id = required_str(req, "userId")?;
    authorize_self_or(req, &user_id, Capability::ViewAnyBalance, "view other students")?;
    let view = core.get_student_profile(&user_id)?;
    to_json(&view)
}

fn handle_teacher_courses(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let teacher_id = required_str(req, "teacherId")?;
    authorize_self_or(req, &teacher_id, Capability::ManageUsers, "view other teachers")?;
    let courses = core.get_teacher_courses(&teacher_id)?;
    Ok(json!({ "courses": to_json(&courses)? }))
}

fn handle_tutor_students(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let tutor_id = required_str(req, "tutorId")?;
    authorize_self_or(req, &tutor_id, Capability::ManageUsers, "view other tutors")?;
    let students = core.get_tutor_students(&tutor_id)?;
    Ok(json!({ "students": to_json(&students)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "views.studentProfile" => handle_student_profile(state, req),
        "views.teacherCourses" => handle_teacher_courses(state, req),
        "views.tutorStudents" => handle_tutor_students(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
