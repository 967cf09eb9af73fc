use serde_json::json;
use tracing::debug;

use crate::handlers::status_for;
use crate::reply::Reply;
use crate::state::SharedEngine;

pub fn handle(image: &[f64], engine: &SharedEngine) -> Reply {
    let Ok(network) = engine.read() else {
        return Reply::engine_unavailable();
    };

    match network.predict(image) {
        Ok(label) => {
            debug!(%label, "prediction");
            Reply::ok(json!({ "type": "test", "result": label }))
        }
        Err(err) => Reply::error(status_for(&err), format!("Prediction failed: {err}")),
    }
}
