use std::fmt;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::{hash_password, is_password_usable, make_unusable_password, verify_password};
use super::permissions::{PermissionPolicy, StaffAdminPolicy};

pub const EMAIL_MAX_LENGTH: usize = 255;
pub const FIRST_NAME_MAX_LENGTH: usize = 32;
pub const LAST_NAME_MAX_LENGTH: usize = 64;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    password_hash: String, // Argon2 PHC string or unusable marker
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub staff: bool,
    pub admin: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Assembles a record once the store has assigned identity and timestamps.
    pub(crate) fn from_draft(
        draft: UserDraft,
        id: Uuid,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            email: draft.email,
            password_hash: draft.password_hash,
            first_name: draft.first_name,
            last_name: draft.last_name,
            is_active: draft.is_active,
            staff: draft.staff,
            admin: draft.admin,
            created_at,
            updated_at,
        }
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn set_password(&mut self, plain: &str) -> anyhow::Result<()> {
        self.password_hash = hash_password(plain)?;
        Ok(())
    }

    pub fn set_unusable_password(&mut self) {
        self.password_hash = make_unusable_password();
    }

    pub fn has_usable_password(&self) -> bool {
        is_password_usable(&self.password_hash)
    }

    pub fn check_password(&self, plain: &str) -> anyhow::Result<bool> {
        verify_password(plain, &self.password_hash)
    }

    pub fn is_staff(&self) -> bool {
        self.staff
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn has_perm(&self, perm: &str) -> bool {
        StaffAdminPolicy.has_perm(self, perm)
    }

    pub fn has_module_perms(&self, app_label: &str) -> bool {
        StaffAdminPolicy.has_module_perms(self, app_label)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

/// A user that has not been saved yet.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub email: String,
    password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub staff: bool,
    pub admin: bool,
}

impl UserDraft {
    /// Starts with an unusable password; call `set_password` to give it one.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: make_unusable_password(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            staff: false,
            admin: false,
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn set_password(&mut self, plain: &str) -> anyhow::Result<()> {
        self.password_hash = hash_password(plain)?;
        Ok(())
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a saved-looking user without going through a store.
    pub fn user_with_flags(is_active: bool, staff: bool, admin: bool) -> User {
        let mut draft = UserDraft::new("someone@example.com").with_names("Some", "One");
        draft.is_active = is_active;
        draft.staff = staff;
        draft.admin = admin;
        let now = OffsetDateTime::now_utc();
        User::from_draft(draft, Uuid::new_v4(), now, now)
    }
}
