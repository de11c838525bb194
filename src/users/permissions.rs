use super::model::User;

/// Answers permission queries for a user.
pub trait PermissionPolicy: Send + Sync {
    fn has_perm(&self, user: &User, perm: &str) -> bool;
    fn has_module_perms(&self, user: &User, app_label: &str) -> bool;
}

/// Inactive users get nothing. Admins get everything. Staff may see every
/// module but hold no individual permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffAdminPolicy;

impl PermissionPolicy for StaffAdminPolicy {
    fn has_perm(&self, user: &User, _perm: &str) -> bool {
        user.is_active && user.is_admin()
    }

    fn has_module_perms(&self, user: &User, _app_label: &str) -> bool {
        user.is_active && (user.is_admin() || user.is_staff())
    }
}
