use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/recaptcha/api/siteverify";

/// In-process stand-in for the reCAPTCHA `siteverify` endpoint.
#[derive(Clone)]
pub struct FakeRecaptcha {
    required_secret: Cow<'static, str>,
    required_token: Option<String>,
    error_codes: Option<Vec<String>>,
    single_use_tokens: bool,
    return_invalid_response: bool,
    delay: Duration,
    requests: Arc<Mutex<Vec<VerifyRequest>>>,
    used_tokens: Arc<Mutex<HashSet<String>>>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct VerifyRequest {
    pub secret: String,
    pub response: String,
    pub remoteip: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes", skip_serializing_if = "Vec::is_empty")]
    error_codes: Vec<String>,
}

impl FakeRecaptcha {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            error_codes: None,
            single_use_tokens: false,
            return_invalid_response: false,
            delay: Duration::ZERO,
            requests: Default::default(),
            used_tokens: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl AsRef<str>) -> Self {
        Self {
            required_token: Some(required_token.as_ref().into()),
            ..self
        }
    }

    /// Answers every request with `success: false` and the given error codes.
    pub fn return_error_codes<I, S>(self, error_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            error_codes: Some(error_codes.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn single_use_tokens(self) -> Self {
        Self {
            single_use_tokens: true,
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn respond_after(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Binds an ephemeral port and serves until the test's runtime shuts down.
    pub async fn start(self) -> RunningFakeRecaptcha {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = self.requests.clone();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        RunningFakeRecaptcha {
            verify_url: format!("http://{address}{VERIFY_PATH}"),
            requests,
        }
    }
}

pub struct RunningFakeRecaptcha {
    verify_url: String,
    requests: Arc<Mutex<Vec<VerifyRequest>>>,
}

impl RunningFakeRecaptcha {
    pub fn verify_url(&self) -> String {
        self.verify_url.clone()
    }

    pub fn requests(&self) -> Vec<VerifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn verify(State(state): State<FakeRecaptcha>, Form(payload): Form<VerifyRequest>) -> Response {
    state.requests.lock().unwrap().push(payload.clone());
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    if state.return_invalid_response {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html><body>Service unavailable</body></html>",
        )
            .into_response();
    }
    if let Some(error_codes) = state.error_codes {
        return Json(VerifyResponsePayload {
            success: false,
            error_codes,
        })
        .into_response();
    }
    let error_codes = if payload.secret != state.required_secret {
        vec!["invalid-input-secret".into()]
    } else if payload.response.is_empty() {
        vec!["missing-input-response".into()]
    } else if state
        .required_token
        .as_ref()
        .is_some_and(|token| *token != payload.response)
    {
        vec!["invalid-input-response".into()]
    } else if state.single_use_tokens
        && !state
            .used_tokens
            .lock()
            .unwrap()
            .insert(payload.response.clone())
    {
        vec!["timeout-or-duplicate".into()]
    } else {
        vec![]
    };
    Json(VerifyResponsePayload {
        success: error_codes.is_empty(),
        error_codes,
    })
    .into_response()
}
