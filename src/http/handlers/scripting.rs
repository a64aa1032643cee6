use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use super::common;
use crate::browser::driver;
use crate::core::error::{ApiError, ApiResult};
use crate::core::types::{AssertRequest, AssertResponse, EvalRequest, EvalResponse};
use crate::daemon::DaemonState;

pub async fn eval(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<EvalRequest>,
) -> ApiResult<Json<EvalResponse>> {
    if req.script.trim().is_empty() {
        return Err(ApiError::bad_request("missing script"));
    }
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let result = driver::evaluate(&page, &req.script).await.map_err(ApiError::from)?;
    Ok(Json(EvalResponse { result }))
}

/// Objects render as pretty JSON, everything else as its literal form — the
/// same text a user would compare against on the command line.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Always a 200; `pass` carries the verdict and the CLI maps false to
/// exit 1. With `expected` the comparison is string equality on the
/// stringified result, otherwise plain truthiness.
pub async fn assert_script(
    State(daemon): State<Arc<DaemonState>>,
    Json(req): Json<AssertRequest>,
) -> ApiResult<Json<AssertResponse>> {
    if req.script.trim().is_empty() {
        return Err(ApiError::bad_request("missing script"));
    }
    let _op = daemon.op_lock.lock().await;
    let page = common::active_page(&daemon).await?;
    let result = driver::evaluate(&page, &req.script).await.map_err(ApiError::from)?;

    let actual = stringify(&result);
    let pass = match &req.expected {
        Some(expected) => &actual == expected,
        None => truthy(&result),
    };
    Ok(Json(AssertResponse {
        pass,
        actual,
        expected: req.expected,
        message: req.message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_stringify_literally() {
        assert_eq!(stringify(&json!(2)), "2");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!("two")), "two");
        assert_eq!(stringify(&Value::Null), "null");
    }

    #[test]
    fn objects_stringify_pretty() {
        let s = stringify(&json!({"a": 1}));
        assert!(s.contains('\n'));
        assert!(s.contains("\"a\": 1"));
    }

    #[test]
    fn truthiness_matches_javascript() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!({})));
    }
}
