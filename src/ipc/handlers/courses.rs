use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{authorize, authorize_own, core, opt_str, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use serde_json::json;

fn handle_generate_code(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageCourses, "manage courses")?;
    let core = core(state)?;
    let school = required_str(req, "school")?;
    let grade = opt_str(req, "grade")?.unwrap_or_default();
    let code = core.generate_course_code(&school, &grade)?;
    Ok(json!({ "code": code }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let actor = authorize(req, Capability::ManageCourses, "manage courses")?;
    let core = core(state)?;
    let name = required_str(req, "name")?;
    let school = required_str(req, "school")?;
    let grade = opt_str(req, "grade")?.unwrap_or_default();
    let teacher_id = match opt_str(req, "teacherId")? {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => actor
            .map(|a| a.id)
            .ok_or_else(|| HandlerErr::bad_params("missing teacherId"))?,
    };
    let course = core.create_course(&name, &grade, &school, &teacher_id)?;
    Ok(json!({ "course": to_json(&course)? }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let course_id = required_str(req, "courseId")?;
    let course = core.get_course(&course_id)?;
    let teacher_ids = core.course_teacher_ids(&course.id)?;
    Ok(json!({ "course": to_json(&course)?, "teacherIds": teacher_ids }))
}

fn handle_courses_join(state: &mut AppState, req: &Request) -> HandlerResult {
    let core = core(state)?;
    let student_id = required_str(req, "studentId")?;
    let code = required_str(req, "code")?;
    authorize_own(req, &student_id, Capability::JoinCourse, "join courses for others")?;
    let course = core.join_course_by_code(&student_id, &code)?;
    Ok(json!({ "course": to_json(&course)? }))
}

fn handle_add_teacher(state: &mut AppState, req: &Request) -> HandlerResult {
    authorize(req, Capability::ManageCourses, "manage courses")?;
    let core = core(state)?;
    let course_id = required_str(req, "courseId")?;
    let teacher_id = required_str(req, "teacherId")?;
    let teacher_ids = core.add_course_teacher(&course_id, &teacher_id)?;
    Ok(json!({ "courseId": course_id, "teacherIds": teacher_ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.generateCode" => handle_generate_code(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.join" => handle_courses_join(state, req),
        "courses.addTeacher" => handle_add_teacher(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
