use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// JSON body that may be left out entirely.
///
/// A missing, blank or `null` body yields `T::default()`. Anything else must
/// parse as `T`; a malformed or mistyped body is a validation error.
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(format!("unreadable request body: {}", e.body_text())))?;
        parse_optional(&bytes).map(Self)
    }
}

fn parse_optional<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice::<Option<T>>(bytes)
        .map(Option::unwrap_or_default)
        .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Body {
        days: Option<i64>,
    }

    #[test]
    fn blank_body_means_defaults() {
        assert_eq!(parse_optional::<Body>(b"").unwrap(), Body::default());
        assert_eq!(parse_optional::<Body>(b"  \n").unwrap(), Body::default());
        assert_eq!(parse_optional::<Body>(b"{}").unwrap(), Body::default());
        assert_eq!(parse_optional::<Body>(b"null").unwrap(), Body::default());
    }

    #[test]
    fn mistyped_field_is_rejected() {
        let err = parse_optional::<Body>(br#"{"days":"30"}"#).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        assert!(err.to_string().contains("invalid request body"));
    }

    #[test]
    fn well_formed_body_is_kept() {
        assert_eq!(parse_optional::<Body>(br#"{"days":30}"#).unwrap(), Body { days: Some(30) });
    }
}
