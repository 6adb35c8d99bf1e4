use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;

/// Plays the role of the deployed contact-form handler for client tests.
#[derive(Clone)]
pub struct FakeContactEndpoint {
    status: StatusCode,
    body: String,
    delay: Duration,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeContactEndpoint {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({"success": true, "message": "Message sent successfully!"}).to_string(),
            delay: Duration::ZERO,
            received: Default::default(),
        }
    }

    pub fn respond_with(self, status: u16, body: Value) -> Self {
        self.respond_with_raw(status, body.to_string())
    }

    pub fn respond_with_raw(self, status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.into(),
            ..self
        }
    }

    pub fn respond_after(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    pub async fn start(self) -> RunningFakeContactEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let received = self.received.clone();
        let app = Router::new().route("/", post(receive)).with_state(self);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        RunningFakeContactEndpoint {
            url: format!("http://{address}/"),
            received,
        }
    }
}

impl Default for FakeContactEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningFakeContactEndpoint {
    url: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl RunningFakeContactEndpoint {
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// JSON bodies of every request received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive(State(state): State<FakeContactEndpoint>, Json(body): Json<Value>) -> Response {
    state.received.lock().unwrap().push(body);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body,
    )
        .into_response()
}
