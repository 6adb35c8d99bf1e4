use lambda_http::{
    http::{header, HeaderValue, StatusCode},
    Body, Response,
};
use serde::Serialize;
use std::borrow::Cow;
use tracing::error;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_HEADERS: &str = "Content-Type";
const ALLOW_METHODS: &str = "POST, OPTIONS";

const ACCEPTED_MESSAGE: &str = "Message sent successfully!";
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const INTERNAL_ERROR_BODY: &str = r#"{"success":false,"message":"Internal server error"}"#;

/// The outcome reported to the form: one per request, fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    status: StatusCode,
    body: SubmissionResultBody,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct SubmissionResultBody {
    success: bool,
    message: Cow<'static, str>,
}

impl SubmissionResult {
    pub fn accepted() -> Self {
        Self::new(StatusCode::OK, true, ACCEPTED_MESSAGE)
    }

    pub fn rejected(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, false, message)
    }

    /// The generic failure. Detail about what went wrong belongs in the log, not here.
    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            INTERNAL_ERROR_MESSAGE,
        )
    }

    fn new(status: StatusCode, success: bool, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            body: SubmissionResultBody {
                success,
                message: message.into(),
            },
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let body = match serde_json::to_string(&self.body) {
            Ok(body) => body,
            Err(error) => {
                error!("Error serialising response body: {error}");
                return internal_error_response();
            }
        };
        Response::builder()
            .status(self.status)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap_or_else(|error| {
                error!("Error building response: {error}");
                internal_error_response()
            })
    }
}

/// Answer to the browser's CORS preflight.
pub fn preflight_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS)
        .body("".into())
        .unwrap_or_else(|error| {
            error!("Error building preflight response: {error}");
            internal_error_response()
        })
}

fn internal_error_response() -> Response<Body> {
    let mut response = Response::new(Body::from(INTERNAL_ERROR_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
