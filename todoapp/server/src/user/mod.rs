use crate::entities::user;
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::Utc;
use rand::RngCore;
use sea_orm::*;

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct User {
    id: i32,
    username: String,
}

impl User {
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User::new(model.id, model.username)
    }
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("A user with username '{0}' already exists")]
    DuplicateUsername(String),
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Hashes a password into an argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, UserServiceError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| UserServiceError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserServiceError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash) else {
        tracing::warn!("Stored password hash could not be parsed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub struct UserService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> UserService<'_> {
        UserService { db }
    }

    /// Creates a user with a hashed password.
    ///
    /// # Returns
    ///
    /// The created `User`, or `DuplicateUsername` if the username is taken.
    #[tracing::instrument(skip(self, password))]
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        if self.find_by_username(username).await?.is_some() {
            return Err(UserServiceError::DuplicateUsername(username.to_string()));
        }

        let active_model = user::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            password_hash: ActiveValue::Set(hash_password(password)?),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await.map_err(|err| {
            match err.sql_err() {
                // Lost a race with a concurrent signup for the same name.
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    UserServiceError::DuplicateUsername(username.to_string())
                }
                _ => UserServiceError::Database(err),
            }
        })?;
        tracing::info!(user_id = created_model.id, "Created user");
        Ok(User::from(created_model))
    }

    /// Checks a username and password pair.
    ///
    /// Returns `Ok(None)` both for unknown usernames and wrong passwords so
    /// callers cannot tell the two apart.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(model) = self.find_by_username(username).await? else {
            return Ok(None);
        };
        if verify_password(password, &model.password_hash) {
            Ok(Some(User::from(model)))
        } else {
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>, UserServiceError> {
        let model = user::Entity::find_by_id(id).one(self.db).await?;
        Ok(model.map(User::from))
    }

    /// Deletes a user. Their tasks are removed by the foreign key cascade.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: i32) -> Result<(), UserServiceError> {
        let result = user::Entity::delete_by_id(id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(UserServiceError::UserNotFound(id));
        }
        Ok(())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<user::Model>, UserServiceError> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await?;
        Ok(model)
    }
}
