use std::io::Cursor;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::warn;

use crate::handlers;
use crate::reply::Reply;
use crate::request::{parse_command, Command, RequestError};
use crate::state::SharedEngine;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("static header is valid")
}

fn allow_origin() -> Header {
    header("Access-Control-Allow-Origin", "*")
}

/// Headers on every JSON reply.
pub fn json_headers() -> Vec<Header> {
    vec![header("Content-Type", "application/json"), allow_origin()]
}

/// Headers answering the browser's CORS preflight.
pub fn preflight_headers() -> Vec<Header> {
    vec![
        allow_origin(),
        header("Access-Control-Allow-Methods", "POST, OPTIONS"),
        header("Access-Control-Allow-Headers", "Content-Type"),
    ]
}

pub fn json_response(reply: Reply) -> Response<Cursor<Vec<u8>>> {
    let bytes = reply.body.to_string().into_bytes();
    let len = bytes.len();
    Response::new(
        StatusCode(reply.status),
        json_headers(),
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn preflight() -> Response<Cursor<Vec<u8>>> {
    Response::new(
        StatusCode(200),
        preflight_headers(),
        Cursor::new(Vec::new()),
        Some(0),
        None,
    )
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// What to do with a request, decided from its method alone.
#[derive(Debug, PartialEq)]
pub enum Route {
    Preflight,
    ReadBody,
    Reject(Reply),
}

pub fn route(method: &Method) -> Route {
    match method {
        Method::Options => Route::Preflight,
        Method::Post => Route::ReadBody,
        _ => Route::Reject(Reply::error(405, "Method not allowed")),
    }
}

/// Routes one request. Any path is accepted; only the method and the body
/// shape matter.
pub fn dispatch(mut request: Request, engine: SharedEngine) {
    let response = match route(request.method()) {
        Route::Preflight => preflight(),
        Route::ReadBody => {
            let mut body = Vec::new();
            match request.as_reader().read_to_end(&mut body) {
                Ok(_) => json_response(handle_body(&body, &engine)),
                Err(err) => json_response(Reply::error(400, format!("Invalid JSON: {err}"))),
            }
        }
        Route::Reject(reply) => json_response(reply),
    };

    if let Err(err) = request.respond(response) {
        warn!(error = %err, "failed to write response");
    }
}

pub fn handle_body(body: &[u8], engine: &SharedEngine) -> Reply {
    match parse_command(body) {
        Ok(Command::Train(examples)) => handlers::train::handle(&examples, engine),
        Ok(Command::Predict(image)) => handlers::predict::handle(&image, engine),
        Err(RequestError::InvalidJson(msg)) => Reply::error(400, format!("Invalid JSON: {msg}")),
        Err(RequestError::InvalidRequest) => Reply::error(400, "Invalid request"),
    }
}
