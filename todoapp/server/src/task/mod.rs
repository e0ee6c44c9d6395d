use crate::entities::task;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::*;
use std::str::FromStr;

pub use crate::entities::task::TaskStatus;

pub mod api;
pub mod web;

/// A to-do item owned by exactly one user.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    owner_id: i32,
    description: String,
    due_date: Option<NaiveDate>,
    status: TaskStatus,
    complete_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the ID of the user owning this task.
    pub fn owner_id(&self) -> i32 {
        self.owner_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the date the task was last moved to `complete`, if it is complete.
    pub fn complete_date(&self) -> Option<NaiveDate> {
        self.complete_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies a partial update in place.
    ///
    /// Only the fields present in `changes` are touched. The completion date is
    /// recomputed only when the status actually changes value.
    fn apply(&mut self, changes: TaskChanges, today: NaiveDate) {
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(due_date) = changes.due_date {
            self.due_date = due_date;
        }
        if let Some(status) = changes.status {
            if status != self.status {
                self.status = status;
                self.complete_date = completion_date_for(status, today);
            }
        }
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.user_id,
            description: model.description,
            due_date: model.due_date,
            status: model.status,
            complete_date: model.complete_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn completion_date_for(status: TaskStatus, today: NaiveDate) -> Option<NaiveDate> {
    match status {
        TaskStatus::Complete => Some(today),
        TaskStatus::InProgress => None,
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Complete => "complete",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TaskValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-progress" => Ok(TaskStatus::InProgress),
            "complete" => Ok(TaskStatus::Complete),
            other => Err(TaskValidationError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons task input is rejected before it reaches the database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskValidationError {
    #[error("Description is required.")]
    MissingDescription,
    #[error("Invalid due date. Use YYYY-MM-DD.")]
    InvalidDueDate(String),
    #[error("Status must be one of: in-progress, complete.")]
    InvalidStatus(String),
}

/// Parses an optional ISO-8601 date. An empty string means "no date".
pub fn parse_due_date(value: Option<&str>) -> Result<Option<NaiveDate>, TaskValidationError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| TaskValidationError::InvalidDueDate(raw.to_string())),
    }
}

fn require_description(description: Option<String>) -> Result<String, TaskValidationError> {
    match description {
        Some(description) if !description.is_empty() => Ok(description),
        _ => Err(TaskValidationError::MissingDescription),
    }
}

/// A validated task that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    description: String,
    due_date: Option<NaiveDate>,
    status: TaskStatus,
}

impl NewTask {
    /// Builds a task from raw input, defaulting the status to `in-progress`.
    pub fn new(
        description: Option<String>,
        due_date: Option<NaiveDate>,
        status: Option<TaskStatus>,
    ) -> Result<Self, TaskValidationError> {
        Ok(Self {
            description: require_description(description)?,
            due_date,
            status: status.unwrap_or_default(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }
}

/// A partial update. `None` leaves the corresponding field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    description: Option<String>,
    due_date: Option<Option<NaiveDate>>,
    status: Option<TaskStatus>,
}

impl TaskChanges {
    /// Builds a partial update. A present description must not be empty;
    /// `due_date: Some(None)` clears the due date.
    pub fn new(
        description: Option<String>,
        due_date: Option<Option<NaiveDate>>,
        status: Option<TaskStatus>,
    ) -> Result<Self, TaskValidationError> {
        let description = match description {
            Some(description) => Some(require_description(Some(description))?),
            None => None,
        };
        Ok(Self {
            description,
            due_date,
            status,
        })
    }
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// The task does not exist or belongs to another user.
    #[error("Task {0} not found")]
    NotFound(i32),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService<'_> {
        TaskService { db }
    }

    /// Lists every task owned by `owner_id`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(&self, owner_id: i32) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .filter(task::Column::UserId.eq(owner_id))
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Persists a new task for `owner_id`.
    ///
    /// A task created as `complete` gets today's date as its completion date.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        owner_id: i32,
        new_task: NewTask,
    ) -> Result<Task, TaskServiceError> {
        let now = Utc::now();
        let complete_date = completion_date_for(new_task.status, now.date_naive());
        let active_model = task::ActiveModel {
            user_id: ActiveValue::Set(owner_id),
            description: ActiveValue::Set(new_task.description),
            due_date: ActiveValue::Set(new_task.due_date),
            status: ActiveValue::Set(new_task.status),
            complete_date: ActiveValue::Set(complete_date),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        tracing::info!(task_id = created_model.id, "Created task");
        Ok(Task::from(created_model))
    }

    /// Retrieves a task by ID, provided `owner_id` owns it.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, owner_id: i32, id: i32) -> Result<Task, TaskServiceError> {
        self.find_owned(owner_id, id).await.map(Task::from)
    }

    /// Applies a partial update to a task owned by `owner_id`.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(
        &self,
        owner_id: i32,
        id: i32,
        changes: TaskChanges,
    ) -> Result<Task, TaskServiceError> {
        let model = self.find_owned(owner_id, id).await?;
        let now = Utc::now();

        let mut updated = Task::from(model.clone());
        updated.apply(changes, now.date_naive());

        let mut active_model: task::ActiveModel = model.into();
        active_model.description = ActiveValue::Set(updated.description);
        active_model.due_date = ActiveValue::Set(updated.due_date);
        active_model.status = ActiveValue::Set(updated.status);
        active_model.complete_date = ActiveValue::Set(updated.complete_date);
        active_model.updated_at = ActiveValue::Set(now);
        let updated_model = active_model.update(self.db).await?;

        Ok(Task::from(updated_model))
    }

    /// Deletes a task owned by `owner_id`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, owner_id: i32, id: i32) -> Result<(), TaskServiceError> {
        let result = task::Entity::delete_many()
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::UserId.eq(owner_id))
            .exec(self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(TaskServiceError::NotFound(id));
        }
        tracing::info!(task_id = id, "Deleted task");
        Ok(())
    }

    async fn find_owned(&self, owner_id: i32, id: i32) -> Result<task::Model, TaskServiceError> {
        task::Entity::find_by_id(id)
            .filter(task::Column::UserId.eq(owner_id))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(id))
    }
}
