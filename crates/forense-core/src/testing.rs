//! Scripted transport for exercising the session protocol without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::api::{ApiError, HttpRequest, HttpResponse, Transport};

type Route = (Method, String);

/// Replies per `(method, path)` in the order scripted. The last reply of a
/// route repeats forever; unscripted routes fail as unreachable.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<Route, VecDeque<Result<HttpResponse, ApiError>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: Result<HttpResponse, ApiError>) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(method, path, Ok(HttpResponse::new(status, body.to_string())))
    }

    pub fn respond_text(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(method, path, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail(&self, method: Method, path: &str, error: ApiError) -> &Self {
        self.push(method, path, Err(error))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| &r.method == method && r.path == path)
            .count()
    }

    fn next_reply(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (request.method.clone(), request.path.clone());
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("empty route".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ApiError::Network("empty route".into()))),
            None => Err(ApiError::Network(format!(
                "connection refused: {} {}",
                request.method, request.path
            ))),
        }
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>> {
        let reply = self.next_reply(&request);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Box::pin(async move { reply })
    }
}

/// Token payload as returned by the auth endpoints
pub(crate) fn token_body(access: &str, refresh: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "access_expires_in": expires_in,
    })
}
