//! Durable session history
//!
//! One pretty-printed JSON file per session under the archive directory.

use std::path::PathBuf;

use crate::error::{CoreError, Result};
use crate::persist::{read_json, write_json_atomic};
use crate::types::identifiers::SessionId;
use crate::types::session::Session;

/// Directory-backed store of finished session state
#[derive(Debug, Clone)]
pub struct SessionArchive {
    dir: PathBuf,
}

impl SessionArchive {
    /// Archive rooted at `dir` (created lazily on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a session snapshot, replacing any earlier one
    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;
        write_json_atomic(&path, session).await?;
        log::trace!("[{}] archived to {}", session.id, path.display());
        Ok(())
    }

    /// Load one archived session
    pub async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        read_json(&self.path_for(id)?).await
    }

    /// Load every archived session, skipping unreadable files
    pub async fn load_all(&self) -> Result<Vec<Session>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Session>(&path).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable archive {}: {e}", path.display()),
            }
        }
        Ok(sessions)
    }

    /// Remove a session's archive file; missing files are not an error
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, id: &SessionId) -> Result<PathBuf> {
        let valid = !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CoreError::protocol(format!("Invalid session id: {id}")));
        }
        Ok(self.dir.join(format!("{}.json", id.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::Message;

    #[tokio::test]
    async fn save_load_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SessionArchive::new(dir.path().join("sessions"));
        let mut session = Session::new(SessionId::generate(), dir.path().into(), "t".into());
        session.messages.push(Message::user("hello"));

        archive.save(&session).await.unwrap();
        let loaded = archive.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(archive.load_all().await.unwrap().len(), 1);

        archive.remove(&session.id).await.unwrap();
        assert!(archive.load(&session.id).await.unwrap().is_none());
        archive.remove(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let archive = SessionArchive::new("/tmp/unused");
        assert!(archive.load(&SessionId::new("../etc/passwd")).await.is_err());
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SessionArchive::new(dir.path().join("absent"));
        assert!(archive.load_all().await.unwrap().is_empty());
    }
}
