use axum::{
    body::Body,
    extract::Request,
    http::{self, HeaderName, header},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use shared::config::server::Config;
use std::{str::FromStr, sync::Arc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    http::error::{ApiError, AppResult},
    middleware::request_context::{RequestContext, request_id_header},
};

/// Attaches the caller's user id to the [`RequestContext`], rejecting anonymous requests.
#[instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> AppResult<Response> {
    let config = req
        .extensions()
        .get::<Arc<Config>>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("configuration extension missing"))?;

    let user_id = resolve_user(req.headers(), &config)?
        .ok_or_else(|| ApiError::unauthorized("missing session"))?;
    debug!(%user_id, "request authenticated");

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.user_id = Some(user_id);
    } else {
        let request_id = req
            .headers()
            .get(request_id_header(&config))
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        req.extensions_mut().insert(RequestContext {
            request_id,
            user_id: Some(user_id),
        });
    }

    Ok(next.run(req).await)
}

/// Trusted user header first, then the session cookie.
fn resolve_user(headers: &http::HeaderMap, config: &Config) -> AppResult<Option<Uuid>> {
    if let Some(name) = config.session.user_header.as_deref() {
        let name = HeaderName::from_str(name)
            .map_err(|_| ApiError::internal_server_error("invalid user header name"))?;
        if let Some(value) = headers.get(&name) {
            let user_id = value
                .to_str()
                .ok()
                .and_then(|value| Uuid::parse_str(value.trim()).ok())
                .ok_or_else(|| ApiError::unauthorized("malformed user header"))?;
            return Ok(Some(user_id));
        }
    }

    Ok(
        extract_session_cookie(headers, &config.session.session_cookie_name)
            .map(|session_id| session_user_id(&session_id)),
    )
}

/// Stable user id for a session id.
pub fn session_user_id(session_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, session_id.as_bytes())
}

fn extract_session_cookie(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(value)
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Extension, Router,
        http::{Request, StatusCode},
        middleware::from_fn,
        routing::get,
    };
    use tower::ServiceExt;

    fn router(config: Config) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(context): Extension<RequestContext>| async move {
                    context.user_id.map(|id| id.to_string()).unwrap_or_default()
                }),
            )
            .layer(from_fn(auth_middleware))
            .layer(Extension(Arc::new(config)))
    }

    async fn call(config: Config, request: Request<Body>) -> (StatusCode, String) {
        let response = router(config).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn session_cookie_maps_to_stable_user() {
        let request = Request::builder()
            .uri("/whoami")
            .header(header::COOKIE, "theme=dark; session=abc")
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(Config::default(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, session_user_id("abc").to_string());
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected() {
        let request = Request::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();

        let (status, _) = call(Config::default(), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn trusted_user_header_wins_over_cookie() {
        let mut config = Config::default();
        config.session.user_header = Some("x-docchat-user".into());
        let user = Uuid::new_v4();

        let request = Request::builder()
            .uri("/whoami")
            .header("x-docchat-user", user.to_string())
            .header(header::COOKIE, "session=abc")
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(config, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user.to_string());
    }

    #[tokio::test]
    async fn malformed_user_header_is_rejected() {
        let mut config = Config::default();
        config.session.user_header = Some("x-docchat-user".into());

        let request = Request::builder()
            .uri("/whoami")
            .header("x-docchat-user", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let (status, _) = call(config, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
