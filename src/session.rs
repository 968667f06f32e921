//! Simulated login.
//!
//! The logged-in user is mirrored to a single JSON file under the session
//! directory. [`SessionStore`] is hydrated once at startup, writes through on
//! every change and removes the file on logout.

use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Storage key of the persisted user.
pub const STORAGE_KEY: &str = "lms_user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Instructor => f.write_str("instructor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn demo_student() -> Self {
        Self {
            id: 1,
            name: "Alice Student".to_string(),
            role: Role::Student,
        }
    }

    pub fn demo_instructor() -> Self {
        Self {
            id: 2,
            name: "Bob Instructor".to_string(),
            role: Role::Instructor,
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    user: RwLock<Option<User>>,
}

impl SessionStore {
    /// Restore the session persisted under `dir`. Unreadable JSON is discarded
    /// and treated as no session.
    pub fn hydrate(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(format!("{STORAGE_KEY}.json"));
        let user = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<User>(&content) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("discarding corrupt session {}: {}", path.display(), e);
                    fs::remove_file(&path)?;
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            user: RwLock::new(user),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    /// Replace the session user and persist it, `None` clears the session.
    pub fn set_user(&self, user: Option<User>) -> Result<()> {
        match &user {
            Some(user) => {
                if let Some(dir) = self.path.parent() {
                    fs::create_dir_all(dir)?;
                }
                let content =
                    serde_json::to_string(user).map_err(|e| Error::Fatal(e.into()))?;
                fs::write(&self.path, content)?;
            }
            None => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        *self.user.write() = user;
        Ok(())
    }

    pub fn login_as_student(&self) -> Result<User> {
        self.login(User::demo_student())
    }

    pub fn login_as_instructor(&self) -> Result<User> {
        self.login(User::demo_instructor())
    }

    fn login(&self, user: User) -> Result<User> {
        self.set_user(Some(user.clone()))?;
        info!("logged in as {} ({})", user.name, user.role);
        Ok(user)
    }

    pub fn logout(&self) -> Result<()> {
        self.set_user(None)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.user.read().as_ref().is_some_and(|u| u.role == role)
    }

    pub fn is_instructor(&self) -> bool {
        self.has_role(Role::Instructor)
    }

    pub fn is_student(&self) -> bool {
        self.has_role(Role::Student)
    }

    /// The logged-in user, or [`Error::Unauthenticated`].
    pub fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(Error::Unauthenticated)
    }

    /// The logged-in user when it has `role`.
    pub fn require_role(&self, role: Role) -> Result<User> {
        let user = self.require_user()?;
        if user.role != role {
            warn!("access denied to {}, role required: {}", user.name, role);
            return Err(Error::Forbidden { required: role });
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_is_written_through_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::hydrate(dir.path().join("state")).unwrap();
        assert!(!session.is_authenticated());

        session.login_as_instructor().unwrap();
        assert!(session.path().exists());

        let restored = SessionStore::hydrate(dir.path().join("state")).unwrap();
        assert_eq!(restored.current_user(), Some(User::demo_instructor()));
        assert!(restored.is_instructor());
        assert!(!restored.is_student());
    }

    #[test]
    fn logout_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::hydrate(dir.path()).unwrap();
        session.login_as_student().unwrap();
        session.logout().unwrap();
        assert!(!session.path().exists());
        assert!(session.current_user().is_none());
        // logging out twice is fine
        session.logout().unwrap();
    }

    #[test]
    fn corrupt_session_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lms_user.json");
        fs::write(&path, "{not json").unwrap();

        let session = SessionStore::hydrate(dir.path()).unwrap();
        assert!(session.current_user().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn role_guard() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::hydrate(dir.path()).unwrap();
        assert!(matches!(
            session.require_role(Role::Student),
            Err(Error::Unauthenticated)
        ));

        session.login_as_student().unwrap();
        assert_eq!(session.require_role(Role::Student).unwrap().id, 1);
        assert!(matches!(
            session.require_role(Role::Instructor),
            Err(Error::Forbidden {
                required: Role::Instructor
            })
        ));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&User::demo_student()).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"Alice Student","role":"student"}"#);
    }
}
