use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, instrument, warn};

use crate::{
    error::{AppError, FieldErrors},
    state::AppState,
    users::{
        model::{User, UserDraft},
        repo::UserStore,
    },
};

/// Trims the address and lower-cases the domain. The local part is left as
/// given, since mailbox names may be case sensitive.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Creation pathways for user records.
#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn UserStore>,
}

impl FromRef<AppState> for UserManager {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone())
    }
}

impl UserManager {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Without a password the account gets an unusable one and can't log in.
    #[instrument(skip(self, password))]
    pub async fn create_user(&self, email: &str, password: Option<&str>) -> Result<User, AppError> {
        if email.trim().is_empty() {
            warn!("create_user without email");
            return Err(AppError::Validation(FieldErrors::single(
                "email",
                "Users must have an email address",
            )));
        }

        let mut draft = UserDraft::new(normalize_email(email));
        if let Some(password) = password {
            draft.set_password(password)?;
        }
        let user = self.store.insert(draft).await?;
        info!(user_id = %user.id, usable_password = user.has_usable_password(), "user created");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn create_superuser(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let mut user = self.create_user(email, Some(password)).await?;
        user.first_name = first_name.to_string();
        user.last_name = last_name.to_string();
        user.staff = true;
        user.admin = true;
        let user = self.store.update(&user).await?;
        info!(user_id = %user.id, "superuser created");
        Ok(user)
    }

    /// Persists an already validated draft.
    pub async fn register(&self, draft: UserDraft) -> Result<User, AppError> {
        Ok(self.store.insert(draft).await?)
    }

    /// Checks credentials. Returns the user only when it is active, has a
    /// usable password and the password matches.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let Some(user) = self.store.find_by_email(&normalize_email(email)).await? else {
            return Ok(None);
        };
        if !user.is_active || !user.check_password(password)? {
            warn!(user_id = %user.id, "authentication rejected");
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Option<User>, AppError> {
        Ok(self.store.find_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::MemoryUserStore;

    fn manager() -> (UserManager, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (UserManager::new(store.clone()), store)
    }

    #[test]
    fn normalize_lowercases_domain_only() {
        assert_eq!(normalize_email("Ada@Example.COM"), "Ada@example.com");
        assert_eq!(normalize_email("  ada@example.com "), "ada@example.com");
        assert_eq!(normalize_email("weird@local@HOST.org"), "weird@local@host.org");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[tokio::test]
    async fn create_user_hashes_password() {
        let (manager, _) = manager();
        let user = manager
            .create_user("ada@example.com", Some("Str0ngP@ssw0rd!"))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash(), "Str0ngP@ssw0rd!");
        assert!(user.check_password("Str0ngP@ssw0rd!").unwrap());
        assert!(user.is_active);
        assert!(!user.is_staff() && !user.is_admin());
    }

    #[tokio::test]
    async fn create_user_rejects_empty_email_and_persists_nothing() {
        let (manager, store) = manager();
        for email in ["", "   "] {
            let err = manager.create_user(email, Some("whatever")).await.unwrap_err();
            match err {
                AppError::Validation(fields) => assert_eq!(
                    fields.get("email").unwrap(),
                    ["Users must have an email address"]
                ),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn create_user_without_password_is_unusable() {
        let (manager, _) = manager();
        let user = manager.create_user("nopass@example.com", None).await.unwrap();
        assert!(!user.has_usable_password());
        assert!(manager
            .authenticate("nopass@example.com", "")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_email_differing_in_domain_case_conflicts() {
        let (manager, store) = manager();
        manager.create_user("a@example.com", Some("pw-one-1")).await.unwrap();
        let err = manager
            .create_user("a@EXAMPLE.com", Some("pw-two-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn create_superuser_sets_flags_and_names() {
        let (manager, _) = manager();
        let user = manager
            .create_superuser("root@Example.com", "Grace", "Hopper", "C0b0l-Rules!")
            .await
            .unwrap();
        assert!(user.staff && user.admin);
        assert!(user.is_staff() && user.is_admin());
        assert_eq!(user.to_string(), "Grace Hopper");
        assert_eq!(user.email, "root@example.com");
        assert!(user.has_perm("users.delete_user"));

        let stored = manager.get(user.id).await.unwrap().unwrap();
        assert!(stored.is_admin());
        assert_eq!(stored.created_at, user.created_at);
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_activity() {
        let (manager, store) = manager();
        let user = manager
            .create_user("ada@example.com", Some("Str0ngP@ssw0rd!"))
            .await
            .unwrap();

        let found = manager
            .authenticate("ada@EXAMPLE.com", "Str0ngP@ssw0rd!")
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(manager
            .authenticate("ada@example.com", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(manager
            .authenticate("missing@example.com", "Str0ngP@ssw0rd!")
            .await
            .unwrap()
            .is_none());

        let mut inactive = user.clone();
        inactive.is_active = false;
        store.update(&inactive).await.unwrap();
        assert!(manager
            .authenticate("ada@example.com", "Str0ngP@ssw0rd!")
            .await
            .unwrap()
            .is_none());
    }
}
