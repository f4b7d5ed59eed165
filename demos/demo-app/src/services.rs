use std::sync::Arc;

use mitsuki::prelude::*;
use mitsuki::DependencyRequest;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::User;

/// In-memory user store.
#[derive(Clone)]
pub struct UserRepository {
    users: Arc<RwLock<Vec<User>>>,
}

impl Component for UserRepository {
    fn kind() -> ComponentKind {
        ComponentKind::Repository
    }

    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        let users = vec![
            User {
                id: 1,
                name: "Alice".into(),
                email: "alice@example.com".into(),
                password_hash: "argon2id$demo".into(),
            },
            User {
                id: 2,
                name: "Bob".into(),
                email: "bob@example.com".into(),
                password_hash: "argon2id$demo".into(),
            },
        ];
        Ok(Self {
            users: Arc::new(RwLock::new(users)),
        })
    }
}

impl UserRepository {
    pub async fn list(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn get_by_id(&self, id: u64) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    pub async fn insert(&self, name: String, email: String) -> User {
        let mut users = self.users.write().await;
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            name,
            email,
            password_hash: "argon2id$demo".into(),
        };
        users.push(user.clone());
        user
    }

    pub async fn remove(&self, id: u64) -> bool {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        users.len() < before
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

/// Business rules on top of the repository; capacity comes from
/// configuration.
#[derive(Clone)]
pub struct UserService {
    repo: UserRepository,
    max_users: i64,
}

impl Component for UserService {
    fn kind() -> ComponentKind {
        ComponentKind::Service
    }

    fn dependencies() -> Vec<DependencyRequest> {
        vec![
            DependencyRequest::component::<UserRepository>("repo"),
            DependencyRequest::value_or("max_users", "app.max-users", 100_i64),
        ]
    }

    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Self {
            repo: ctx.component("repo")?,
            max_users: ctx.value("max_users")?,
        })
    }
}

impl UserService {
    pub async fn list(&self) -> Vec<User> {
        self.repo.list().await
    }

    pub async fn get(&self, id: u64) -> Option<User> {
        self.repo.get_by_id(id).await
    }

    pub async fn create(&self, name: String, email: String) -> Result<User, HttpError> {
        if self.repo.count().await as i64 >= self.max_users {
            return Err(HttpError::conflict("user capacity reached"));
        }
        Ok(self.repo.insert(name, email).await)
    }

    pub async fn delete(&self, id: u64) -> bool {
        self.repo.remove(id).await
    }
}

/// Hourly job pruning demo users back to the seeded pair.
#[derive(Clone)]
pub struct CleanupJob {
    repo: UserRepository,
}

impl Component for CleanupJob {
    fn dependencies() -> Vec<DependencyRequest> {
        vec![DependencyRequest::component::<UserRepository>("repo")]
    }

    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Self {
            repo: ctx.component("repo")?,
        })
    }
}

impl Scheduled for CleanupJob {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "prune",
            TriggerSpec::cron("0 0 * * * *"),
            |job: CleanupJob| async move {
                let mut removed = 0;
                for user in job.repo.list().await {
                    if user.id > 2 && job.repo.remove(user.id).await {
                        removed += 1;
                    }
                }
                if removed > 0 {
                    info!(removed, "pruned demo users");
                }
            },
        )]
    }
}
