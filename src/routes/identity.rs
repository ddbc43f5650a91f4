use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header carrying the caller's authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity extracted from [`USER_ID_HEADER`]. Authentication happens upstream.
#[derive(Debug, Clone)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerId(value.to_string()))
            .ok_or_else(AppError::missing_identity)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<CallerId, AppError> {
        let (mut parts, _) = request.into_parts();
        CallerId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_trimmed_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "  uid-42 ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0, "uid-42");
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(
            extract(missing).await,
            Err(AppError::Unauthorized { .. })
        ));

        let blank = Request::builder()
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(blank).await,
            Err(AppError::Unauthorized { .. })
        ));
    }
}
