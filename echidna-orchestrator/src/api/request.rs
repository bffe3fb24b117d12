//! Request API Handler
//!
//! `POST /api/request` accepts a form-encoded URL submission or a multipart
//! tar submission, authorized by token or by HTTP basic credentials.

use std::net::{IpAddr, SocketAddr};

use axum::{
    Form,
    extract::{ConnectInfo, FromRequest, Multipart, Request, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use echidna_core::dto::request::SubmissionForm;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::auth::parse_basic;
use crate::service::request_service::{Submission, TarUpload};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// POST /api/request
/// Register a publication request and start its pipeline
///
/// Answers `202` with the request ID as soon as the pipeline is started.
pub async fn submit_request(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<(StatusCode, String)> {
    let origin = client_origin(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        state.service.config().trust_proxy,
    );
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let submission = if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<SubmissionForm>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Submission::from_parts(form, None, None, origin)
    } else if content_type.starts_with("multipart/form-data") {
        let credentials = match request.headers().get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(parse_basic)
                    .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?,
            ),
            None => None,
        };
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let (form, tar) = read_multipart(multipart).await?;

        let user = match credentials {
            Some((username, password)) => {
                let user = state.authenticator.authenticate(&username, &password).await;
                if user.is_none() {
                    tracing::warn!("Basic authentication failed for user {}", username);
                    return Err(ApiError::Unauthorized("Unauthorized".to_string()));
                }
                user
            }
            None => None,
        };
        Submission::from_parts(form, tar, user, origin)
    } else {
        return Err(ApiError::UnsupportedMediaType(
            "Form Content-Type not supported".to_string(),
        ));
    }
    .map_err(|e| ApiError::MissingParameters(e.to_string()))?;

    let accepted = state.service.submit(submission).await?;
    Ok((StatusCode::ACCEPTED, accepted.id.to_string()))
}

/// Collect the fields of a tar submission
///
/// A `url` field is not part of this method and is ignored.
async fn read_multipart(
    mut multipart: Multipart,
) -> ApiResult<(SubmissionForm, Option<TarUpload>)> {
    let mut form = SubmissionForm::default();
    let mut tar = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "tar" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            if !file_name.is_empty() || !bytes.is_empty() {
                tar = Some(TarUpload { file_name, bytes });
            }
            continue;
        }

        let slot = match name.as_str() {
            "token" => &mut form.token,
            "decision" => &mut form.decision,
            "dry-run" => &mut form.dry_run,
            "cc" => &mut form.cc,
            _ => {
                tracing::debug!("Ignoring multipart field '{}'", name);
                continue;
            }
        };
        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        *slot = Some(value);
    }

    Ok((form, tar))
}

/// Address a request came from
///
/// Behind a trusted proxy the first `X-Forwarded-For` entry wins over the
/// peer address; otherwise the header is ignored.
pub fn client_origin(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> Option<IpAddr> {
    let forwarded = trust_proxy
        .then(|| headers.get(FORWARDED_FOR))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_origin_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("140.82.112.1, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));

        assert_eq!(
            client_origin(&headers, Some(&peer), true),
            Some("140.82.112.1".parse().unwrap())
        );
    }

    #[test]
    fn test_client_origin_ignores_forwarded_for_without_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("140.82.112.1"));
        let peer = ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 4000)));

        assert_eq!(
            client_origin(&headers, Some(&peer), false),
            Some("203.0.113.9".parse().unwrap())
        );
        assert_eq!(client_origin(&headers, None, false), None);
    }

    #[test]
    fn test_client_origin_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("unknown"));
        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 4000)));

        assert_eq!(
            client_origin(&headers, Some(&peer), true),
            Some("192.0.2.7".parse().unwrap())
        );
        assert_eq!(client_origin(&HeaderMap::new(), None, true), None);
    }
}
