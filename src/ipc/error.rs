use crate::error::AmistError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn details_for(e: &AmistError) -> Option<serde_json::Value> {
    match e {
        AmistError::InsufficientPoints { balance, required } => {
            Some(json!({ "balance": balance, "required": required }))
        }
        AmistError::ClaimNotPending { id, status } => Some(json!({ "claimId": id, "status": status })),
        AmistError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
        AmistError::CodeGenerationExhausted { attempts } => Some(json!({ "attempts": attempts })),
        AmistError::RewardNotFound(id) => Some(json!({ "rewardId": id })),
        AmistError::InvalidCourseCode(code) => Some(json!({ "code": code })),
        AmistError::RoleMismatch {
            id,
            expected,
            actual,
        } => Some(json!({ "userId": id, "expected": expected, "actual": actual })),
        _ => None,
    }
}

impl From<AmistError> for HandlerErr {
    fn from(e: AmistError) -> Self {
        if let AmistError::Store(inner) = &e {
            tracing::error!(error = %inner, "store failure");
        }
        Self {
            code: e.code(),
            message: e.to_string(),
            details: details_for(&e),
        }
    }
}

pub fn respond(id: &str, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amist_errors_keep_code_and_details() {
        let resp = respond(
            "7",
            Err(AmistError::InsufficientPoints {
                balance: 40,
                required: 60,
            }
            .into()),
        );
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"]["code"], "insufficient_points");
        assert_eq!(resp["error"]["details"]["required"], 60);
    }

    #[test]
    fn ok_wraps_result() {
        let resp = respond("1", Ok(json!({ "balance": 3 })));
        assert_eq!(resp, json!({ "id": "1", "ok": true, "result": { "balance": 3 } }));
    }
}
