use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Reply to one control request. Serializes to a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Success carrying `data`. A value that is not a JSON object is
    /// wrapped as `{"value": ...}`.
    pub fn with<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(Value::Object(map)) => Self {
                data: Some(map),
                ..Self::ok()
            },
            Ok(other) => Self::with(&json!({ "value": other })),
            Err(e) => Self::error(format!("cannot encode response: {e}")),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Wire form: compact JSON followed by a newline.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }).to_string());
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_line() {
        assert_eq!(Response::ok().to_line(), "{\"success\":true}\n");
    }

    #[test]
    fn test_error_line() {
        let line = Response::error("unknown command: FOO").to_line();
        assert_eq!(line, "{\"success\":false,\"error\":\"unknown command: FOO\"}\n");
    }

    #[test]
    fn test_with_struct_and_scalar() {
        #[derive(Serialize)]
        struct Pong {
            timestamp: u64,
        }
        let r = Response::with(&Pong { timestamp: 42 });
        assert_eq!(r.data.unwrap()["timestamp"], 42);

        let r = Response::with(&7);
        assert_eq!(r.data.unwrap()["value"], 7);
    }

    #[test]
    fn test_parse_back() {
        let line = Response::with(&json!({ "frequency": 14078000 })).to_line();
        let back: Response = serde_json::from_str(line.trim_end()).unwrap();
        assert!(back.success);
        assert_eq!(back.data.unwrap()["frequency"], 14078000);
        assert!(back.error.is_none());
    }
}
