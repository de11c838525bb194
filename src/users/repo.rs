use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::model::{User, UserDraft};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, \
                            is_active, staff, admin, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    #[error("user not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Primary key source for new users.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Persistence contract for users. Emails are unique across the store;
/// `insert` and `update` fail with `DuplicateEmail` rather than overwrite.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Assigns id and both timestamps, then persists.
    async fn insert(&self, draft: UserDraft) -> Result<User, StoreError>;
    /// Saves mutable fields and bumps `updated_at`. `id` and `created_at` are kept.
    async fn update(&self, user: &User) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

pub struct PgUserStore {
    db: PgPool,
    ids: Arc<dyn IdGenerator>,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self::with_id_generator(db, Arc::new(UuidV4Generator))
    }

    pub fn with_id_generator(db: PgPool, ids: Arc<dyn IdGenerator>) -> Self {
        Self { db, ids }
    }
}

fn map_write_error(e: sqlx::Error, email: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::DuplicateEmail(email.to_string());
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, draft: UserDraft) -> Result<User, StoreError> {
        let id = self.ids.next_id();
        let now = OffsetDateTime::now_utc();
        let sql = format!(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name,
                               is_active, staff, admin, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&draft.email)
            .bind(draft.password_hash())
            .bind(&draft.first_name)
            .bind(&draft.last_name)
            .bind(draft.is_active)
            .bind(draft.staff)
            .bind(draft.admin)
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_write_error(e, &draft.email))
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = $2, password_hash = $3, first_name = $4, last_name = $5,
                   is_active = $6, staff = $7, admin = $8, updated_at = $9
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(user.password_hash())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.is_active)
            .bind(user.staff)
            .bind(user.admin)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_write_error(e, &user.email))?
            .ok_or(StoreError::NotFound(user.id))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

#[derive(Default)]
struct MemoryTables {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

/// In-process store. The email index and the rows share one lock, so a
/// check-and-insert is atomic.
pub struct MemoryUserStore {
    tables: RwLock<MemoryTables>,
    ids: Arc<dyn IdGenerator>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UuidV4Generator))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            tables: RwLock::new(MemoryTables::default()),
            ids,
        }
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, draft: UserDraft) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&draft.email) {
            return Err(StoreError::DuplicateEmail(draft.email));
        }
        let now = OffsetDateTime::now_utc();
        let user = User::from_draft(draft, self.ids.next_id(), now, now);
        tables.by_email.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let (old_email, created_at) = match tables.users.get(&user.id) {
            Some(existing) => (existing.email.clone(), existing.created_at),
            None => return Err(StoreError::NotFound(user.id)),
        };
        if old_email != user.email {
            if tables.by_email.contains_key(&user.email) {
                return Err(StoreError::DuplicateEmail(user.email.clone()));
            }
            tables.by_email.remove(&old_email);
            tables.by_email.insert(user.email.clone(), user.id);
        }
        let mut saved = user.clone();
        saved.created_at = created_at;
        saved.updated_at = OffsetDateTime::now_utc();
        tables.users.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }
}
