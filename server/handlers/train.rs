use serde_json::json;
use tracing::{info, warn};

use digit_ocr::TrainingExample;

use crate::handlers::status_for;
use crate::reply::Reply;
use crate::state::SharedEngine;

/// Trains on the batch, then persists the result.
///
/// If the batch fails part-way the examples before the bad one have already
/// changed the parameters, so they are saved before the error is reported.
/// Every reply carries the number of examples applied.
pub fn handle(examples: &[TrainingExample], engine: &SharedEngine) -> Reply {
    let Ok(mut network) = engine.write() else {
        return Reply::engine_unavailable();
    };

    match network.train(examples) {
        Ok(applied) => match network.save() {
            Ok(()) => {
                info!(applied, "training batch applied");
                Reply::ok(json!({ "type": "train", "status": "ok", "applied": applied }))
            }
            Err(err) => failure(status_for(&err), format!("Training failed: {err}"), applied),
        },
        Err(err) => {
            let applied = err.example_index().unwrap_or(0);
            warn!(applied, error = %err, "training batch rejected");
            if applied > 0 {
                if let Err(save_err) = network.save() {
                    warn!(error = %save_err, "could not save partially applied batch");
                    return failure(
                        500,
                        format!("Training failed: {err}; save failed: {save_err}"),
                        applied,
                    );
                }
            }
            failure(status_for(&err), format!("Training failed: {err}"), applied)
        }
    }
}

fn failure(status: u16, message: String, applied: usize) -> Reply {
    let mut reply = Reply::error(status, message);
    reply.body["applied"] = json!(applied);
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::shared;
    use digit_ocr::{Error, MemoryStore, ModelStore, Network, PersistedModel, INPUT_SIZE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    /// Loads nothing and refuses every save.
    struct FullDisk;

    impl ModelStore for FullDisk {
        fn load(&self) -> digit_ocr::Result<Option<PersistedModel>> {
            Ok(None)
        }

        fn save(&self, _model: &PersistedModel) -> digit_ocr::Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        fn describe(&self) -> String {
            "full disk".to_owned()
        }
    }

    fn engine_on_full_disk() -> SharedEngine {
        let network =
            Network::with_store(4, Some(Box::new(FullDisk)), &mut StdRng::seed_from_u64(3))
                .unwrap();
        shared(network)
    }

    fn message(reply: &Reply) -> &str {
        reply.body["message"].as_str().unwrap()
    }

    fn engine_with_store() -> (SharedEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let network = Network::with_store(
            4,
            Some(Box::new(store.clone())),
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
        (shared(network), store)
    }

    #[test]
    fn successful_batch_is_saved() {
        let (engine, store) = engine_with_store();
        let batch = vec![TrainingExample::new(vec![1.0; INPUT_SIZE], 5); 2];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["status"], "ok");
        assert_eq!(reply.body["applied"], 2);
        let saved = store.snapshot().expect("model saved");
        assert_eq!(&saved, &engine.read().unwrap().parameters().to_persisted());
    }

    #[test]
    fn bad_label_is_a_client_error_and_keeps_earlier_examples() {
        let (engine, store) = engine_with_store();
        let batch = vec![
            TrainingExample::new(vec![1.0; INPUT_SIZE], 5),
            TrainingExample::new(vec![1.0; INPUT_SIZE], 10),
        ];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["type"], "error");
        assert_eq!(reply.body["applied"], 1);
        assert!(message(&reply).starts_with("Training failed:"));
        assert!(store.snapshot().is_some());
    }

    #[test]
    fn failure_on_first_example_saves_nothing() {
        let (engine, store) = engine_with_store();
        let batch = vec![TrainingExample::new(vec![1.0; 3], 1)];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["applied"], 0);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn unsaved_partial_batch_is_a_server_error_naming_both_failures() {
        let engine = engine_on_full_disk();
        let batch = vec![
            TrainingExample::new(vec![1.0; INPUT_SIZE], 5),
            TrainingExample::new(vec![1.0; INPUT_SIZE], 10),
        ];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 500);
        assert_eq!(reply.body["type"], "error");
        assert_eq!(reply.body["applied"], 1);
        assert!(message(&reply).starts_with("Training failed: label 10"));
        assert!(message(&reply).contains("save failed:"));
        assert!(message(&reply).contains("disk full"));
    }

    #[test]
    fn bad_first_example_on_full_disk_skips_the_save() {
        let engine = engine_on_full_disk();
        let batch = vec![TrainingExample::new(vec![1.0; INPUT_SIZE], -1)];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["applied"], 0);
        assert!(!message(&reply).contains("save failed"));
    }

    #[test]
    fn failed_save_of_a_full_batch_reports_applied_count() {
        let engine = engine_on_full_disk();
        let batch = vec![TrainingExample::new(vec![1.0; INPUT_SIZE], 2); 3];

        let reply = handle(&batch, &engine);

        assert_eq!(reply.status, 500);
        assert_eq!(reply.body["applied"], 3);
        assert!(message(&reply).contains("disk full"));
    }
}
