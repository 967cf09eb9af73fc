pub mod predict;
pub mod train;

use digit_ocr::Error;

/// Caller mistakes map to 400, storage and engine failures to 500.
pub fn status_for(err: &Error) -> u16 {
    if err.is_invalid_input() {
        400
    } else {
        500
    }
}
