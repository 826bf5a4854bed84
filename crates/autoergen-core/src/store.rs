//! File-backed users, projects and generation log.
//!
//! `users.json` and `projects.json` are rewritten atomically (temp file +
//! rename); `logs.jsonl` is append-only, one entry per line. All operations on
//! one [`Store`] are serialized through a mutex.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth;

pub const DEFAULT_PROJECT_NAME: &str = "My First ERD Project";
pub const DEFAULT_PROJECT_DESCRIPTION: &str = "Default workspace";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: u64,
    pub project_id: u64,
    pub user_prompt: String,
    pub llm_response: String,
    /// Generation time in seconds.
    pub execution_time: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub project_id: u64,
    pub user_prompt: String,
    pub llm_response: String,
    pub execution_time: f64,
}

/// Anything that can record one prompt/response row.
pub trait LogSink: Send + Sync {
    fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;
}

pub struct Store {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn users_path(&self) -> PathBuf {
        self.dir.join("users.json")
    }

    fn projects_path(&self) -> PathBuf {
        self.dir.join("projects.json")
    }

    fn logs_path(&self) -> PathBuf {
        self.dir.join("logs.jsonl")
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic while holding the lock leaves the files as they were.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Users ---

    /// Register a user and their default project.
    pub fn create_user(&self, email: &str, password: &str) -> Result<User, StoreError> {
        auth::validate_email(email).map_err(StoreError::Validation)?;
        auth::validate_password_strength(password).map_err(StoreError::Validation)?;
        let email = email.trim().to_string();

        let _guard = self.guard();
        let mut users: Vec<User> = read_list(&self.users_path())?;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&email)) {
            return Err(StoreError::Conflict(format!("email already registered: {email}")));
        }

        let password_hash =
            auth::hash_password(password).map_err(|e| StoreError::Hash(e.to_string()))?;
        let user = User {
            id: next_id(users.iter().map(|u| u.id)),
            email,
            password_hash,
            created_at: Utc::now(),
        };
        // The default project is written first so no account exists without it.
        let project =
            self.insert_project(user.id, DEFAULT_PROJECT_NAME, DEFAULT_PROJECT_DESCRIPTION)?;
        users.push(user.clone());
        if let Err(e) = write_list(&self.users_path(), &users) {
            if let Err(rollback) = self.remove_project(project.id) {
                tracing::warn!(project_id = project.id, error = %rollback, "failed to roll back default project");
            }
            return Err(e);
        }
        tracing::info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// `Ok(None)` for an unknown email or a wrong password.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let users: Vec<User> = {
            let _guard = self.guard();
            read_list(&self.users_path())?
        };
        let Some(user) = users
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
        else {
            return Ok(None);
        };
        let ok = auth::verify_password(password, &user.password_hash)
            .map_err(|e| StoreError::Hash(e.to_string()))?;
        Ok(ok.then_some(user))
    }

    pub fn user(&self, user_id: u64) -> Result<User, StoreError> {
        let _guard = self.guard();
        read_list::<User>(&self.users_path())?
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound {
                entity: "user",
                id: user_id,
            })
    }

    // --- Projects ---

    pub fn create_project(
        &self,
        user_id: u64,
        name: &str,
        description: &str,
    ) -> Result<Project, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("project name must not be empty".into()));
        }
        self.user(user_id)?;
        let _guard = self.guard();
        self.insert_project(user_id, name.trim(), description)
    }

    /// Caller holds the lock.
    fn remove_project(&self, project_id: u64) -> Result<(), StoreError> {
        let mut projects: Vec<Project> = read_list(&self.projects_path())?;
        projects.retain(|p| p.id != project_id);
        write_list(&self.projects_path(), &projects)
    }

    fn insert_project(
        &self,
        user_id: u64,
        name: &str,
        description: &str,
    ) -> Result<Project, StoreError> {
        let mut projects: Vec<Project> = read_list(&self.projects_path())?;
        let project = Project {
            id: next_id(projects.iter().map(|p| p.id)),
            user_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        projects.push(project.clone());
        write_list(&self.projects_path(), &projects)?;
        Ok(project)
    }

    /// Projects owned by `user_id`, oldest first.
    pub fn projects_for(&self, user_id: u64) -> Result<Vec<Project>, StoreError> {
        let _guard = self.guard();
        let mut projects: Vec<Project> = read_list::<Project>(&self.projects_path())?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        projects.sort_by_key(|p| (p.created_at, p.id));
        Ok(projects)
    }

    /// The user's oldest project, which receives generation logs by default.
    pub fn default_project(&self, user_id: u64) -> Result<Option<Project>, StoreError> {
        Ok(self.projects_for(user_id)?.into_iter().next())
    }

    // --- Logs ---

    /// Log entries for one project, oldest first.
    pub fn logs_for(&self, project_id: u64) -> Result<Vec<LogEntry>, StoreError> {
        let _guard = self.guard();
        Ok(read_logs(&self.logs_path())?
            .into_iter()
            .filter(|l| l.project_id == project_id)
            .collect())
    }
}

impl LogSink for Store {
    fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let _guard = self.guard();
        let projects: Vec<Project> = read_list(&self.projects_path())?;
        if !projects.iter().any(|p| p.id == entry.project_id) {
            return Err(StoreError::NotFound {
                entity: "project",
                id: entry.project_id,
            });
        }

        let path = self.logs_path();
        let existing = read_logs(&path)?;
        let log = LogEntry {
            id: next_id(existing.iter().map(|l| l.id)),
            project_id: entry.project_id,
            user_prompt: entry.user_prompt,
            llm_response: entry.llm_response,
            execution_time: entry.execution_time,
            created_at: Utc::now(),
        };

        let mut line = serde_json::to_string(&log)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(log_id = log.id, project_id = log.project_id, "generation logged");
        Ok(log)
    }
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().unwrap_or(0) + 1
}

fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_list<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(items)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_logs(path: &Path) -> Result<Vec<LogEntry>, StoreError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut logs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        logs.push(serde_json::from_str(&line)?);
    }
    Ok(logs)
}
