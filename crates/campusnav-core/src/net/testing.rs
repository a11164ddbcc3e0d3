//! Scripted fetcher used by cache tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Fetcher, NetError, Request, Response, ResponseType};

#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url` with status 200 as a same-origin response.
    pub fn route(&self, url: &str, body: &str) {
        self.route_response(url, 200, ResponseType::Basic, body);
    }

    pub fn route_response(&self, url: &str, status: u16, response_type: ResponseType, body: &str) {
        let response = Response {
            status,
            response_type,
            url: url.to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
        };
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline(request.url.clone()));
        }
        let routes = self.routes.lock().unwrap();
        match routes.get(&request.url) {
            Some(response) => Ok(response.clone()),
            None => Ok(Response {
                status: 404,
                response_type: ResponseType::Basic,
                url: request.url.clone(),
                headers: Vec::new(),
                body: b"not found".to_vec(),
            }),
        }
    }
}
