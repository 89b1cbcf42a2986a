//! Role and permission registry.
//!
//! Roles and permissions are seeded by migration and rarely change at
//! runtime. A user's effective permission set is the union across every role
//! they hold; it is computed here at token-issue time and embedded in the
//! access token, so role changes only affect tokens issued afterwards.

use diesel::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::models::{NewUserRole, Permission, Role};
use crate::schema::{permissions, role_permissions, roles, user_roles};

/// Role names plus the deduplicated `resource:action` permission strings for
/// a user, in the shape embedded in access-token claims.
pub fn load_claims_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<(Vec<String>, Vec<String>), diesel::result::Error> {
    let role_names: Vec<String> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq(user_id))
        .select(roles::name)
        .order(roles::name.asc())
        .load(conn)?;

    let mut permission_claims: Vec<String> = user_roles::table
        .inner_join(role_permissions::table.on(role_permissions::role_id.eq(user_roles::role_id)))
        .inner_join(
            permissions::table.on(permissions::id.eq(role_permissions::permission_id)),
        )
        .filter(user_roles::user_id.eq(user_id))
        .select(Permission::as_select())
        .load::<Permission>(conn)?
        .into_iter()
        .map(|p| p.claim())
        .collect();

    permission_claims.sort();
    permission_claims.dedup();

    Ok((role_names, permission_claims))
}

/// Attaches a single role by name, used at registration for the default role
/// matching the account type. Fails if the role is missing, since defaults
/// are seeded by migration.
pub fn attach_role(
    conn: &mut PgConnection,
    user_id: Uuid,
    role_name: &str,
) -> Result<(), diesel::result::Error> {
    let role_id: Uuid = roles::table
        .filter(roles::name.eq(role_name))
        .select(roles::id)
        .first(conn)?;

    diesel::insert_into(user_roles::table)
        .values(&NewUserRole { user_id, role_id })
        .on_conflict_do_nothing()
        .execute(conn)?;

    Ok(())
}

/// Replaces the user's entire role set. Not an incremental add/remove: every
/// existing assignment is deleted and the resolved set inserted. Unknown role
/// names are skipped with a warning rather than rejected.
///
/// Returns the names that were actually assigned. Callers run this inside a
/// transaction.
pub fn replace_roles(
    conn: &mut PgConnection,
    user_id: Uuid,
    role_names: &[String],
) -> Result<Vec<String>, diesel::result::Error> {
    let resolved: Vec<(Uuid, String)> = roles::table
        .filter(roles::name.eq_any(role_names))
        .select((roles::id, roles::name))
        .load(conn)?;

    if resolved.len() < role_names.len() {
        let known: Vec<&String> = resolved.iter().map(|(_, name)| name).collect();
        let skipped: Vec<&String> = role_names
            .iter()
            .filter(|name| !known.contains(name))
            .collect();
        warn!(user_id = %user_id, ?skipped, "Skipping unknown role names");
    }

    diesel::delete(user_roles::table.filter(user_roles::user_id.eq(user_id))).execute(conn)?;

    let new_rows: Vec<NewUserRole> = resolved
        .iter()
        .map(|(role_id, _)| NewUserRole {
            user_id,
            role_id: *role_id,
        })
        .collect();

    diesel::insert_into(user_roles::table)
        .values(&new_rows)
        .execute(conn)?;

    Ok(resolved.into_iter().map(|(_, name)| name).collect())
}

/// Every role with its attached permissions, for the registry listing.
pub fn list_roles_with_permissions(
    conn: &mut PgConnection,
) -> Result<Vec<(Role, Vec<Permission>)>, diesel::result::Error> {
    let all_roles: Vec<Role> = roles::table
        .order(roles::name.asc())
        .select(Role::as_select())
        .load(conn)?;

    let mut result = Vec::with_capacity(all_roles.len());
    for role in all_roles {
        let perms: Vec<Permission> = role_permissions::table
            .inner_join(permissions::table)
            .filter(role_permissions::role_id.eq(role.id))
            .select(Permission::as_select())
            .order((permissions::resource.asc(), permissions::action.asc()))
            .load(conn)?;
        result.push((role, perms));
    }

    Ok(result)
}
