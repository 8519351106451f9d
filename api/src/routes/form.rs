use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use webwrap_core::{Decoded, DecodedArguments, Outcome, OutputFile, RequestContext};

use crate::error::AppError;
use crate::extract::PostedForm;
use crate::state::AppState;

const FAVICON_PATH: &str = "/favicon.ico";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
/// How long past the deadline the response waits for a killed command to
/// report back.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// Every path is handled here: GET/HEAD serve the page, POST submits it
/// regardless of path.
pub fn router() -> Router<AppState> {
    Router::new().fallback(dispatch)
}

async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let result = match method {
        Method::GET => page(&state, req.uri().path()).await,
        Method::HEAD => page(&state, req.uri().path()).await.map(strip_body),
        Method::POST => submit(state, req).await,
        _ => Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n")),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

async fn page(state: &AppState, path: &str) -> Result<Response, AppError> {
    match path {
        "/" => {
            let html = state.wrapper.render_page(None)?;
            Ok(html_response(StatusCode::OK, html))
        }
        FAVICON_PATH => Ok(match favicon(state).await {
            Some(icon) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/x-icon"),
                    (header::CACHE_CONTROL, "public, max-age=31536000"),
                ],
                icon,
            )
                .into_response(),
            None => not_found(),
        }),
        _ => Ok(not_found()),
    }
}

async fn favicon(state: &AppState) -> Option<Vec<u8>> {
    let path = state.favicon.as_ref()?;
    match tokio::fs::read(path).await {
        Ok(icon) => Some(icon),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "favicon unavailable");
            None
        }
    }
}

async fn submit(state: AppState, req: Request) -> Result<Response, AppError> {
    let context = request_context(&req);
    let PostedForm(fields) = PostedForm::from_request(req, &state).await?;

    let args = match state.wrapper.decode(&fields, Some(&context))? {
        Decoded::SubmitAction(button) => {
            tracing::info!(dest = %button.dest, action = button.kind.as_str(), "submit action pressed");
            return Ok(text(StatusCode::OK, state.wrapper.describe_action(&button)));
        }
        Decoded::Arguments(args) => args,
    };

    let outcome = run(&state, args.clone()).await?;
    let mut response = match outcome {
        Outcome::Completed { exit_code: 0, output } => text(StatusCode::OK, output),
        Outcome::Completed { exit_code, output } => {
            tracing::info!(exit_code, "program exited with an error");
            let html = state.wrapper.render_page(Some(&output))?;
            html_response(StatusCode::BAD_REQUEST, html)
        }
        Outcome::OutputFile(file) => attachment(file),
        Outcome::Faulted(diagnostic) => text(StatusCode::OK, diagnostic),
    };
    append_program_headers(response.headers_mut(), &args);
    Ok(response)
}

/// Run the program off the async workers, bounded by the configured timeout.
async fn run(state: &AppState, args: DecodedArguments) -> Result<Outcome, AppError> {
    let wrapper = state.wrapper.clone();
    let timeout = state.execution_timeout;
    let task = tokio::task::spawn_blocking(move || wrapper.execute(&args, Some(timeout)));
    // In-process programs cannot be killed; their task finishes detached.
    match tokio::time::timeout(timeout + DEADLINE_GRACE, task).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => Err(AppError::Internal(format!("execution task failed: {err}"))),
        Err(_) => {
            tracing::warn!(timeout_secs = state.execution_timeout.as_secs_f64(), "program timed out");
            Ok(Outcome::Faulted(format!(
                "Error: program did not finish within {:?}\n",
                state.execution_timeout
            )))
        }
    }
}

fn request_context(req: &Request) -> RequestContext {
    RequestContext {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        headers: req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    }
}

fn append_program_headers(headers: &mut HeaderMap, args: &DecodedArguments) {
    for (name, value) in args.response_headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(%name, "dropping invalid response header from program"),
        }
    }
}

fn attachment(file: OutputFile) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file.name.replace('"', "\\\""));
    let last_modified = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    let length = file.content.len();

    let mut response = Response::new(Body::from(file.content));
    let headers = response.headers_mut();
    insert(headers, header::CONTENT_TYPE, &file.content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Some(encoding) = file.encoding {
        insert(headers, header::CONTENT_ENCODING, encoding);
    }
    insert(headers, header::CONTENT_DISPOSITION, &disposition);
    insert(headers, header::LAST_MODIFIED, &last_modified);
    response
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "unencodable header value"),
    }
}

fn html_response(status: StatusCode, html: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, TEXT_HTML.to_string()),
            (header::CONTENT_LENGTH, html.len().to_string()),
        ],
        html,
    )
        .into_response()
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body.into()).into_response()
}

fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, "Not Found\n")
}

fn strip_body(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}
