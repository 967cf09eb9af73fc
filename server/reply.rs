use serde_json::{json, Value};

/// Status code plus JSON body, before it is framed as an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Reply {
        Reply { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Reply {
        Reply {
            status,
            body: json!({ "type": "error", "message": message.into() }),
        }
    }

    /// A previous holder of the engine lock panicked mid-operation, so the
    /// parameters may be half updated.
    pub fn engine_unavailable() -> Reply {
        Reply::error(500, "Engine unavailable")
    }
}
