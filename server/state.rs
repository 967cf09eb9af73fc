use std::sync::{Arc, RwLock};

use digit_ocr::Network;

/// The one engine instance, shared by every request thread.
///
/// Training takes the write lock for the whole batch plus the save that
/// follows it; predictions take read locks and may overlap each other.
pub type SharedEngine = Arc<RwLock<Network>>;

pub fn shared(network: Network) -> SharedEngine {
    Arc::new(RwLock::new(network))
}
