//! Permission gate: who may manage a shift.
//!
//! Admins and staff manage everything. Company users manage shifts of their
//! own company's jobs. Anyone else needs a delegated grant on the shift, its
//! job, or its client company.

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::{EngineError, EngineResult};
use crate::models::assignment::AssignedPersonnel;
use crate::models::permission::{CrewChiefPermission, NewCrewChiefPermission, ScopeType};
use crate::models::shift::ShiftContext;
use crate::models::user::{CurrentUser, UserRole};
use crate::schema::{companies, crew_chief_permissions, jobs, shifts, users};
use crate::services::shift_service;

/// The ownership chain a grant can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftScope {
    pub shift_id: i64,
    pub job_id: i64,
    pub company_id: i64,
}

impl From<&ShiftContext> for ShiftScope {
    fn from(ctx: &ShiftContext) -> Self {
        Self {
            shift_id: ctx.shift.id,
            job_id: ctx.job_id(),
            company_id: ctx.company_id,
        }
    }
}

/// Pure decision over already-loaded grants.
pub fn decide(user: &CurrentUser, scope: &ShiftScope, grants: &[CrewChiefPermission]) -> bool {
    if user.role.is_manager() {
        return true;
    }
    if user.role == UserRole::CompanyUser && user.company_id == Some(scope.company_id) {
        return true;
    }
    grants
        .iter()
        .filter(|g| g.user_id == user.id)
        .any(|g| match g.scope() {
            Some(ScopeType::Shift) => g.scope_id == scope.shift_id,
            Some(ScopeType::Job) => g.scope_id == scope.job_id,
            Some(ScopeType::Client) => g.scope_id == scope.company_id,
            None => false,
        })
}

async fn grants_for(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> EngineResult<Vec<CrewChiefPermission>> {
    let grants = crew_chief_permissions::table
        .filter(crew_chief_permissions::user_id.eq(user_id))
        .select(CrewChiefPermission::as_select())
        .load(conn)
        .await?;
    Ok(grants)
}

/// Whether `user` may manage the shift.
pub async fn can_manage_shift(
    conn: &mut AsyncPgConnection,
    user: &CurrentUser,
    shift_id: i64,
) -> EngineResult<bool> {
    let ctx = shift_service::load_shift_context(conn, shift_id).await?;
    can_manage_context(conn, user, &ctx).await
}

async fn can_manage_context(
    conn: &mut AsyncPgConnection,
    user: &CurrentUser,
    ctx: &ShiftContext,
) -> EngineResult<bool> {
    let scope = ShiftScope::from(ctx);
    // Role alone settles managers and company users; skip the grant lookup.
    if decide(user, &scope, &[]) {
        return Ok(true);
    }
    let grants = grants_for(conn, user.id).await?;
    Ok(decide(user, &scope, &grants))
}

/// Gate for every shift mutation: returns the shift context or `Forbidden`.
pub async fn require_manage_shift(
    conn: &mut AsyncPgConnection,
    user: &CurrentUser,
    shift_id: i64,
) -> EngineResult<ShiftContext> {
    let ctx = shift_service::load_shift_context(conn, shift_id).await?;
    if can_manage_context(conn, user, &ctx).await? {
        Ok(ctx)
    } else {
        tracing::warn!(user_id = user.id, shift_id, "Shift management denied");
        Err(EngineError::Forbidden(format!(
            "You do not have permission to manage shift {shift_id}"
        )))
    }
}

/// The assigned worker acts on their own slot; anyone else needs the gate.
pub async fn require_worker_or_manager(
    conn: &mut AsyncPgConnection,
    user: &CurrentUser,
    assignment: &AssignedPersonnel,
) -> EngineResult<()> {
    if assignment.user_id == Some(user.id) {
        return Ok(());
    }
    require_manage_shift(conn, user, assignment.shift_id).await?;
    Ok(())
}

pub fn require_admin(user: &CurrentUser, action: &str) -> EngineResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "Only administrators can {action}"
        )))
    }
}

async fn scope_target_exists(
    conn: &mut AsyncPgConnection,
    scope: ScopeType,
    scope_id: i64,
) -> EngineResult<bool> {
    let exists = match scope {
        ScopeType::Shift => {
            diesel::select(diesel::dsl::exists(shifts::table.find(scope_id)))
                .get_result::<bool>(conn)
                .await?
        }
        ScopeType::Job => {
            diesel::select(diesel::dsl::exists(jobs::table.find(scope_id)))
                .get_result::<bool>(conn)
                .await?
        }
        ScopeType::Client => {
            diesel::select(diesel::dsl::exists(companies::table.find(scope_id)))
                .get_result::<bool>(conn)
                .await?
        }
    };
    Ok(exists)
}

fn duplicate_grant(user_id: i64, scope: ScopeType, scope_id: i64) -> EngineError {
    EngineError::Conflict(format!(
        "User {user_id} already holds a {scope} grant on {scope_id}"
    ))
}

/// Grant `user_id` management rights over a shift, job, or client.
pub async fn grant(
    conn: &mut AsyncPgConnection,
    admin: &CurrentUser,
    user_id: i64,
    scope: ScopeType,
    scope_id: i64,
) -> EngineResult<CrewChiefPermission> {
    require_admin(admin, "grant crew chief permissions")?;

    let new_grant = NewCrewChiefPermission {
        user_id,
        scope_type: scope.as_str().to_string(),
        scope_id,
        granted_by: Some(admin.id),
    };

    let result = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let user_exists = diesel::select(diesel::dsl::exists(users::table.find(user_id)))
                    .get_result::<bool>(conn)
                    .await?;
                if !user_exists {
                    return Err(EngineError::NotFound(format!("User {user_id} not found")));
                }
                if !scope_target_exists(conn, scope, scope_id).await? {
                    return Err(EngineError::NotFound(format!("{scope} {scope_id} not found")));
                }

                let held = diesel::select(diesel::dsl::exists(
                    crew_chief_permissions::table
                        .filter(crew_chief_permissions::user_id.eq(user_id))
                        .filter(crew_chief_permissions::scope_type.eq(scope.as_str()))
                        .filter(crew_chief_permissions::scope_id.eq(scope_id)),
                ))
                .get_result::<bool>(conn)
                .await?;
                if held {
                    return Err(duplicate_grant(user_id, scope, scope_id));
                }

                diesel::insert_into(crew_chief_permissions::table)
                    .values(&new_grant)
                    .returning(CrewChiefPermission::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(|e| match EngineError::from(e) {
                        EngineError::Conflict(_) => duplicate_grant(user_id, scope, scope_id),
                        other => other,
                    })
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(
        grant_id = result.id,
        user_id,
        scope = %scope,
        scope_id,
        granted_by = admin.id,
        "Crew chief permission granted"
    );
    Ok(result)
}

/// Revoke a grant.
pub async fn revoke(
    conn: &mut AsyncPgConnection,
    admin: &CurrentUser,
    grant_id: i64,
) -> EngineResult<()> {
    require_admin(admin, "revoke crew chief permissions")?;

    let deleted = diesel::delete(crew_chief_permissions::table.find(grant_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(EngineError::NotFound(format!(
            "Permission {grant_id} not found"
        )));
    }

    tracing::info!(grant_id, revoked_by = admin.id, "Crew chief permission revoked");
    Ok(())
}

/// List a user's grants.
pub async fn list_grants(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    user_id: i64,
) -> EngineResult<Vec<CrewChiefPermission>> {
    if actor.id != user_id {
        require_admin(actor, "view other users' permissions")?;
    }
    grants_for(conn, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: UserRole, company_id: Option<i64>) -> CurrentUser {
        CurrentUser {
            id,
            name: format!("user-{id}"),
            role,
            company_id,
        }
    }

    fn grant(user_id: i64, scope: &str, scope_id: i64) -> CrewChiefPermission {
        CrewChiefPermission {
            id: 1,
            user_id,
            scope_type: scope.to_string(),
            scope_id,
            granted_by: Some(1),
            create_date: None,
        }
    }

    const SCOPE: ShiftScope = ShiftScope {
        shift_id: 10,
        job_id: 20,
        company_id: 30,
    };

    #[test]
    fn test_managers_always_allowed() {
        assert!(decide(&user(1, UserRole::Admin, None), &SCOPE, &[]));
        assert!(decide(&user(2, UserRole::Staff, None), &SCOPE, &[]));
    }

    #[test]
    fn test_company_user_limited_to_own_company() {
        assert!(decide(&user(3, UserRole::CompanyUser, Some(30)), &SCOPE, &[]));
        assert!(!decide(&user(3, UserRole::CompanyUser, Some(31)), &SCOPE, &[]));
        assert!(!decide(&user(3, UserRole::CompanyUser, None), &SCOPE, &[]));
    }

    #[test]
    fn test_crew_chief_needs_matching_grant() {
        let chief = user(5, UserRole::CrewChief, None);
        assert!(!decide(&chief, &SCOPE, &[]));
        assert!(decide(&chief, &SCOPE, &[grant(5, "shift", 10)]));
        assert!(decide(&chief, &SCOPE, &[grant(5, "job", 20)]));
        assert!(decide(&chief, &SCOPE, &[grant(5, "client", 30)]));
        assert!(!decide(&chief, &SCOPE, &[grant(5, "shift", 11)]));
        assert!(!decide(&chief, &SCOPE, &[grant(5, "job", 10)]));
    }

    #[test]
    fn test_grants_of_other_users_ignored() {
        let chief = user(5, UserRole::CrewChief, None);
        assert!(!decide(&chief, &SCOPE, &[grant(6, "shift", 10)]));
    }

    #[test]
    fn test_employee_without_grant_denied() {
        assert!(!decide(&user(7, UserRole::Employee, None), &SCOPE, &[]));
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&user(1, UserRole::Admin, None), "unlock").is_ok());
        assert!(matches!(
            require_admin(&user(2, UserRole::Staff, None), "unlock"),
            Err(EngineError::Forbidden(_))
        ));
    }
}
