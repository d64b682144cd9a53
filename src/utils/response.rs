//! JSON envelope for `--json` output.

use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

impl<T: Serialize> Response<T> {
    pub fn success(data: T) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Response::Success { data })
    }
}

impl Response<()> {
    pub fn error(msg: &str) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Response::<()>::Error {
            error: msg.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let out = Response::success(vec![1, 2]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_error_envelope() {
        let out = Response::error("calendar_id is not set").unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "calendar_id is not set");
        assert!(value.get("data").is_none());
    }
}
