use mimic_common::action::ObservationSession;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SessionLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session {0} is still recording")]
    NotSealed(uuid::Uuid),
}

/// Sealed sessions on disk, one directory per task, one JSON file per session.
pub struct SessionLog {
    base_path: PathBuf,
}

impl SessionLog {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub async fn save(&self, session: &ObservationSession) -> Result<PathBuf, SessionLogError> {
        if !session.is_sealed() {
            return Err(SessionLogError::NotSealed(session.session_id));
        }

        let task_dir = self.base_path.join(task_dir_name(&session.task_name));
        if !task_dir.exists() {
            fs::create_dir_all(&task_dir).await?;
        }

        let file_path = task_dir.join(format!("{}.json", session.session_id));
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&file_path, json).await?;
        Ok(file_path)
    }

    /// All sessions of a task, ordered by attempt number then start time.
    pub async fn load_task(&self, task_name: &str) -> Result<Vec<ObservationSession>, SessionLogError> {
        let task_dir = self.base_path.join(task_dir_name(task_name));
        if !task_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(task_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_file(&path).await {
                Ok(session) if session.task_name == task_name => sessions.push(session),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }

        sessions.sort_by(|a, b| {
            a.attempt_number
                .cmp(&b.attempt_number)
                .then(a.start_time.cmp(&b.start_time))
        });
        Ok(sessions)
    }

    pub async fn load_file(path: &Path) -> Result<ObservationSession, SessionLogError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Number of attempts already stored for a task.
    pub async fn attempt_count(&self, task_name: &str) -> Result<usize, SessionLogError> {
        Ok(self.load_task(task_name).await?.len())
    }

    pub async fn delete_task(&self, task_name: &str) -> Result<(), SessionLogError> {
        let task_dir = self.base_path.join(task_dir_name(task_name));
        if task_dir.exists() {
            fs::remove_dir_all(task_dir).await?;
        }
        Ok(())
    }
}

fn task_dir_name(task_name: &str) -> String {
    task_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mimic_common::action::RawAction;

    fn sealed(task: &str, attempt: u32) -> ObservationSession {
        let mut session = ObservationSession::new(task, attempt);
        session.actions.push(RawAction::key(0, "a"));
        session.end_time = Some(Utc::now());
        session
    }

    #[tokio::test]
    async fn test_save_and_load_in_attempt_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().to_path_buf());

        log.save(&sealed("rename file", 2)).await.unwrap();
        log.save(&sealed("rename file", 1)).await.unwrap();
        log.save(&sealed("other", 1)).await.unwrap();

        let sessions = log.load_task("rename file").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].attempt_number, 1);
        assert_eq!(sessions[1].attempt_number, 2);
    }

    #[tokio::test]
    async fn test_unsealed_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().to_path_buf());
        let session = ObservationSession::new("t", 1);
        assert!(matches!(
            log.save(&session).await,
            Err(SessionLogError::NotSealed(_))
        ));
    }
}
