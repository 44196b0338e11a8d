//! Identity extraction.
//!
//! The upstream session layer authenticates the caller and forwards the user
//! id in `x-user-id`. The extractor resolves it to a `CurrentUser` from the
//! users table so handlers see role and company scope.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::{EngineError, EngineResult};
use crate::models::user::{CurrentUser, UserRow};
use crate::routes::StaffingState;
use crate::schema::users;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Parse the forwarded user id header.
pub fn user_id_from_parts(parts: &Parts) -> EngineResult<i64> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| EngineError::Unauthorized("Authentication required".to_string()))?;

    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| EngineError::Unauthorized("Malformed user id header".to_string()))
}

/// Load an active user.
pub async fn load_current_user(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> EngineResult<CurrentUser> {
    let row: Option<UserRow> = users::table
        .find(user_id)
        .select(UserRow::as_select())
        .first(conn)
        .await
        .optional()?;

    match row {
        Some(row) if row.active => CurrentUser::try_from(row),
        Some(_) => Err(EngineError::Unauthorized(format!(
            "User {user_id} is inactive"
        ))),
        None => Err(EngineError::Unauthorized(format!(
            "Unknown user {user_id}"
        ))),
    }
}

impl FromRequestParts<StaffingState> for CurrentUser {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &StaffingState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from_parts(parts)?;
        let mut conn = state.pool.get().await?;
        let user = load_current_user(&mut conn, user_id).await?;
        tracing::debug!(user_id, role = %user.role, "Resolved current user");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/staffing/api/shifts/1/fill");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        assert!(matches!(
            user_id_from_parts(&parts_with(None)),
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_malformed_header_is_unauthorized() {
        assert!(matches!(
            user_id_from_parts(&parts_with(Some("dana"))),
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_numeric_header_parses() {
        assert_eq!(user_id_from_parts(&parts_with(Some(" 42 "))).unwrap(), 42);
    }
}
