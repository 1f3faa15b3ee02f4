//! Caller identity, as forwarded by the upstream authenticator.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::models::user::{Actor, Role};
use crate::utils::error::{AppError, AppResult};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> AppResult<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| AppError::AuthError(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::AuthError(format!("{} header is not valid text", name)))
}

pub fn actor_from_headers(headers: &HeaderMap) -> AppResult<Actor> {
    let user_id = Uuid::parse_str(header(headers, USER_ID_HEADER)?.trim())
        .map_err(|_| AppError::AuthError("invalid user id".to_string()))?;
    let role: Role = header(headers, USER_ROLE_HEADER)?.parse()?;

    Ok(Actor::new(user_id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_actor_from_headers() {
        let id = Uuid::new_v4();
        let actor = actor_from_headers(&headers(&[
            (USER_ID_HEADER, &id.to_string()),
            (USER_ROLE_HEADER, "Organizer"),
        ]))
        .unwrap();

        assert_eq!(actor, Actor::new(id, Role::Organizer));
    }

    #[test]
    fn test_missing_or_invalid_identity() {
        assert!(matches!(
            actor_from_headers(&headers(&[(USER_ROLE_HEADER, "user")])),
            Err(AppError::AuthError(_))
        ));
        assert!(matches!(
            actor_from_headers(&headers(&[
                (USER_ID_HEADER, "42"),
                (USER_ROLE_HEADER, "user")
            ])),
            Err(AppError::AuthError(_))
        ));
        assert!(matches!(
            actor_from_headers(&headers(&[
                (USER_ID_HEADER, &Uuid::new_v4().to_string()),
                (USER_ROLE_HEADER, "superuser")
            ])),
            Err(AppError::AuthError(_))
        ));
    }
}
