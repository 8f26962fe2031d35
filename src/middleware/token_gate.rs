//! Service-token gate for the generated CRUD surface.
//!
//! Runs after the access gate, so the resolved service is already in the
//! request extensions. Message endpoints are deliberately not behind this
//! gate (see DESIGN.md).

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::middleware::access_gate::ServiceContext;

pub async fn enforce(req: Request, next: Next) -> Result<Response, AppError> {
    let service = req
        .extensions()
        .get::<ServiceContext>()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("token gate ran before access gate")))?;

    // Should not occur post-creation; a token-less row means something
    // upstream is misconfigured, not that the caller is unauthorized.
    if service.0.access_token.is_empty() {
        return Err(AppError::Forbidden);
    }

    let candidate = candidate_token(&req).ok_or(AppError::Unauthorized)?;
    if !tokens_match(&candidate, &service.0.access_token) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Candidate token, in priority order: dedicated header, bearer
/// authorization, query parameter fallback.
fn candidate_token(req: &Request) -> Option<String> {
    let headers = req.headers();

    if let Some(v) = headers.get("x-service-token").and_then(|v| v.to_str().ok()) {
        return Some(v.trim().to_string());
    }

    if let Some(v) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(v.trim().to_string());
    }

    query_param(req.uri().query()?, "token")
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name && !v.is_empty()).then(|| v.to_string())
    })
}

/// Constant-time comparison; the length check short-circuits but leaks
/// nothing useful since token length is fixed and public.
pub fn tokens_match(candidate: &str, expected: &str) -> bool {
    candidate.len() == expected.len()
        && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}
