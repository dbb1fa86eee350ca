use chrono::Utc;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("{0} not found")] NotFound(&'static str),
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// A whole-document edit applied under the backend's per-document write guard.
pub type QuestionEdit = Box<dyn FnOnce(&mut Question) -> RepoResult<()> + Send>;

use async_trait::async_trait;

#[async_trait]
pub trait QuestionRepo: Send + Sync {
    /// Newest first; `tag` keeps only questions carrying that exact tag.
    async fn list_questions(&self, tag: Option<&str>) -> RepoResult<Vec<Question>>;
    async fn insert_question(&self, question: Question) -> RepoResult<Question>;
    async fn get_question(&self, id: Id) -> RepoResult<Question>;
    /// Load, edit and save one question document. A failed edit leaves the
    /// stored document untouched.
    async fn modify_question(&self, id: Id, edit: QuestionEdit) -> RepoResult<Question>;

    async fn add_answer(&self, question_id: Id, answer: Answer) -> RepoResult<Question> {
        self.modify_question(question_id, Box::new(move |q| {
            q.push_answer(answer);
            Ok(())
        }))
        .await
    }

    async fn add_comment(&self, question_id: Id, answer_id: Id, comment: Comment) -> RepoResult<Question> {
        self.modify_question(question_id, Box::new(move |q| q.push_comment(answer_id, comment).map(|_| ())))
            .await
    }

    async fn vote(&self, question_id: Id, target: VoteTarget, dir: VoteDirection) -> RepoResult<i64> {
        let q = self
            .modify_question(question_id, Box::new(move |q| q.apply_vote(target, dir).map(|_| ())))
            .await?;
        q.tally(target).ok_or(RepoError::NotFound("Answer"))
    }

    async fn accept_answer(&self, question_id: Id, answer_id: Id) -> RepoResult<Question> {
        self.modify_question(question_id, Box::new(move |q| q.accept_answer(answer_id).map(|_| ())))
            .await
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// `Conflict` when the email or the username is already taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification>;
    /// Newest first.
    async fn list_notifications(&self, user_id: &str) -> RepoResult<Vec<Notification>>;
    /// Returns how many notifications flipped from unread to read.
    async fn mark_all_read(&self, user_id: &str) -> RepoResult<u64>;
}

pub trait Repo: QuestionRepo + UserRepo + NotificationRepo {}

impl<T> Repo for T where T: QuestionRepo + UserRepo + NotificationRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Serialize, Deserialize};
    use std::collections::HashMap;
    use std::path::{PathBuf, Path};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        questions: HashMap<Id, Question>,
        users: HashMap<Id, User>,
        notifications: Vec<Notification>,
    }

    /// Process-local store persisted as a JSON snapshot after every write.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        /// Writes the snapshot while the caller still holds the write guard, so
        /// snapshots land in commit order. The file is replaced by rename.
        fn persist(&self, state: &State) {
            let path = self.snapshot_path.as_path();
            let bytes = match serde_json::to_vec_pretty(state) {
                Ok(b) => b,
                Err(e) => { tracing::error!(error = %e, "failed to encode snapshot"); return; }
            };
            if let Some(dir) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to create snapshot dir");
                }
            }
            let tmp = path.with_extension("json.tmp");
            if let Err(e) = std::fs::write(&tmp, bytes) {
                tracing::error!(path = %tmp.display(), error = %e, "failed to write snapshot");
                return;
            }
            if let Err(e) = std::fs::rename(&tmp, path) {
                tracing::error!(path = %path.display(), error = %e, "failed to replace snapshot");
            }
        }

        pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
            let snapshot_path = dir.into().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl QuestionRepo for InMemRepo {
        async fn list_questions(&self, tag: Option<&str>) -> RepoResult<Vec<Question>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.questions.values()
                .filter(|q| tag.map_or(true, |t| q.tags.iter().any(|qt| qt == t)))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn insert_question(&self, question: Question) -> RepoResult<Question> {
            let mut s = self.write()?;
            if s.questions.contains_key(&question.id) { return Err(RepoError::Conflict); }
            s.questions.insert(question.id, question.clone());
            self.persist(&s);
            Ok(question)
        }

        async fn get_question(&self, id: Id) -> RepoResult<Question> {
            let s = self.read()?;
            s.questions.get(&id).cloned().ok_or(RepoError::NotFound("Question"))
        }

        async fn modify_question(&self, id: Id, edit: QuestionEdit) -> RepoResult<Question> {
            let mut s = self.write()?;
            let stored = s.questions.get_mut(&id).ok_or(RepoError::NotFound("Question"))?;
            let mut doc = stored.clone();
            edit(&mut doc)?;
            *stored = doc.clone();
            self.persist(&s);
            Ok(doc)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.email == new.email || u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let user = User {
                id: Uuid::new_v4(),
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                bio: None,
                location: None,
                profile_image: None,
                created_at: Utc::now(),
            };
            s.users.insert(user.id, user.clone());
            self.persist(&s);
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).cloned().ok_or(RepoError::NotFound("User"))
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.users.values().find(|u| u.username == username).cloned().ok_or(RepoError::NotFound("User"))
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let mut s = self.write()?;
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound("User"))?;

            if let Some(bio) = upd.bio { user.bio = Some(bio); }
            if let Some(location) = upd.location { user.location = Some(location); }
            if let Some(image) = upd.profile_image { user.profile_image = Some(image); }

            let updated = user.clone();
            self.persist(&s);
            Ok(updated)
        }
    }

    #[async_trait]
    impl NotificationRepo for InMemRepo {
        async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let mut s = self.write()?;
            let n = Notification {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                kind: new.kind,
                related_id: new.related_id,
                message: new.message,
                read: false,
                created_at: Utc::now(),
            };
            s.notifications.push(n.clone());
            self.persist(&s);
            Ok(n)
        }

        async fn list_notifications(&self, user_id: &str) -> RepoResult<Vec<Notification>> {
            let s = self.read()?;
            // reversed first so equal timestamps still come out latest-inserted first
            let mut v: Vec<_> = s.notifications.iter().rev()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn mark_all_read(&self, user_id: &str) -> RepoResult<u64> {
            let mut s = self.write()?;
            let mut updated = 0;
            for n in s.notifications.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
                n.read = true;
                updated += 1;
            }
            if updated > 0 { self.persist(&s); }
            Ok(updated)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};
    use uuid::Uuid;

    impl From<sqlx::Error> for RepoError {
        fn from(e: sqlx::Error) -> Self {
            match e.as_database_error() {
                Some(db) if db.is_unique_violation() => RepoError::Conflict,
                _ => RepoError::Internal(e.to_string()),
            }
        }
    }

    /// Questions are stored whole as JSONB documents; users and notifications
    /// are plain rows.
    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Connect lazily and bring the schema up to date.
        pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(database_url)?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Ok(Self::new(pool))
        }
    }

    #[derive(sqlx::FromRow)]
    struct NotificationRow {
        id: Uuid,
        user_id: String,
        kind: String,
        related_id: Option<Uuid>,
        message: Option<String>,
        read: bool,
        created_at: chrono::DateTime<Utc>,
    }

    impl TryFrom<NotificationRow> for Notification {
        type Error = RepoError;

        fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
            let kind = NotificationKind::parse(&r.kind)
                .ok_or_else(|| RepoError::Internal(format!("unknown notification kind {:?}", r.kind)))?;
            Ok(Notification {
                id: r.id,
                user_id: r.user_id,
                kind,
                related_id: r.related_id,
                message: r.message,
                read: r.read,
                created_at: r.created_at,
            })
        }
    }

    #[async_trait]
    impl QuestionRepo for PgRepo {
        async fn list_questions(&self, tag: Option<&str>) -> RepoResult<Vec<Question>> {
            let docs = match tag {
                Some(t) => sqlx::query_scalar::<_, Json<Question>>(
                    "SELECT doc FROM questions WHERE doc->'tags' ? $1 ORDER BY created_at DESC",
                )
                .bind(t)
                .fetch_all(&self.pool).await?,
                None => sqlx::query_scalar::<_, Json<Question>>(
                    "SELECT doc FROM questions ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool).await?,
            };
            Ok(docs.into_iter().map(|d| d.0).collect())
        }

        async fn insert_question(&self, question: Question) -> RepoResult<Question> {
            sqlx::query("INSERT INTO questions (id, created_at, doc) VALUES ($1,$2,$3)")
                .bind(question.id)
                .bind(question.created_at)
                .bind(Json(&question))
                .execute(&self.pool).await?;
            Ok(question)
        }

        async fn get_question(&self, id: Id) -> RepoResult<Question> {
            sqlx::query_scalar::<_, Json<Question>>("SELECT doc FROM questions WHERE id=$1")
                .bind(id)
                .fetch_optional(&self.pool).await?
                .map(|d| d.0)
                .ok_or(RepoError::NotFound("Question"))
        }

        async fn modify_question(&self, id: Id, edit: QuestionEdit) -> RepoResult<Question> {
            let mut tx = self.pool.begin().await?;
            // row lock serialises concurrent edits of the same document
            let Json(mut doc) = sqlx::query_scalar::<_, Json<Question>>(
                "SELECT doc FROM questions WHERE id=$1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut *tx).await?
            .ok_or(RepoError::NotFound("Question"))?;
            edit(&mut doc)?;
            sqlx::query("UPDATE questions SET doc=$2 WHERE id=$1")
                .bind(id)
                .bind(Json(&doc))
                .execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(doc)
        }
    }

    const USER_COLUMNS: &str = "id, username, email, password_hash, bio, location, profile_image, created_at";

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let sql = format!(
                "INSERT INTO users (id, username, email, password_hash) VALUES ($1,$2,$3,$4) RETURNING {USER_COLUMNS}"
            );
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(Uuid::new_v4())
                .bind(&new.username)
                .bind(&new.email)
                .bind(&new.password_hash)
                .fetch_one(&self.pool).await?;
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id=$1");
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool).await?
                .ok_or(RepoError::NotFound("User"))
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username=$1");
            sqlx::query_as::<_, User>(&sql)
                .bind(username)
                .fetch_optional(&self.pool).await?
                .ok_or(RepoError::NotFound("User"))
        }

        async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
            let sql = format!(
                "UPDATE users SET bio = COALESCE($2, bio), location = COALESCE($3, location), \
                 profile_image = COALESCE($4, profile_image) WHERE id=$1 RETURNING {USER_COLUMNS}"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .bind(upd.bio.as_ref())
                .bind(upd.location.as_ref())
                .bind(upd.profile_image.as_ref())
                .fetch_optional(&self.pool).await?
                .ok_or(RepoError::NotFound("User"))
        }
    }

    #[async_trait]
    impl NotificationRepo for PgRepo {
        async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
            let row = sqlx::query_as::<_, NotificationRow>(
                "INSERT INTO notifications (id, user_id, kind, related_id, message) VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, user_id, kind, related_id, message, read, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(&new.user_id)
            .bind(new.kind.as_str())
            .bind(new.related_id)
            .bind(new.message.as_ref())
            .fetch_one(&self.pool).await?;
            row.try_into()
        }

        async fn list_notifications(&self, user_id: &str) -> RepoResult<Vec<Notification>> {
            let rows = sqlx::query_as::<_, NotificationRow>(
                "SELECT id, user_id, kind, related_id, message, read, created_at FROM notifications \
                 WHERE user_id=$1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool).await?;
            rows.into_iter().map(Notification::try_from).collect()
        }

        async fn mark_all_read(&self, user_id: &str) -> RepoResult<u64> {
            let res = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id=$1 AND read = FALSE")
                .bind(user_id)
                .execute(&self.pool).await?;
            Ok(res.rows_affected())
        }
    }
}
