use crate::common::{AuthFlowError, Result, StorageConfig};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub const KEY_TOKEN: &str = "token";
pub const KEY_USER_EMAIL: &str = "userEmail";
pub const KEY_USER_PROFILE: &str = "userProfile";

/// String-keyed client state, written by the flow controller only on the
/// Success transition. Other screens read it; the flow itself never does.
pub trait StateStore: Send {
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Display profile persisted for the dashboard screens, JSON-encoded under
/// `userProfile`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub role: String,
    pub location: String,
    pub website: String,
    pub phone: String,
    pub avatar: String,
    pub skills: Vec<String>,
}

impl UserProfile {
    pub fn from_registration(profile: &crate::validate::RegistrationProfile) -> Self {
        Self {
            name: format!("{} {}", profile.first_name, profile.last_name),
            email: profile.email.clone(),
            role: "Aegis User".to_string(),
            location: profile.country.clone(),
            website: String::new(),
            phone: String::new(),
            avatar: String::new(),
            skills: vec!["Digital Security".to_string()],
        }
    }
}

/// File-backed store: one JSON map in the platform data directory.
pub struct FileStore {
    state_file: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("com", "aegis", "AegisAuth")
                .ok_or_else(|| AuthFlowError::Storage("failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf(),
        };
        fs::create_dir_all(&data_dir)?;

        let state_file = data_dir.join("state.json");
        let entries = if state_file.exists() {
            let contents = fs::read_to_string(&state_file)?;
            serde_json::from_str(&contents)
                .map_err(|e| AuthFlowError::Storage(format!("corrupt state file: {e}")))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            state_file,
            entries,
        })
    }
}

impl StateStore for FileStore {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        let encoded = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| AuthFlowError::Storage(format!("failed to serialize state: {e}")))?;
        fs::write(&self.state_file, encoded)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }
}

/// In-memory substitute for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::RegistrationProfile;

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: Some(dir.path().to_path_buf()),
        };

        {
            let mut store = FileStore::new(&config).unwrap();
            store.set(KEY_TOKEN, "t1").unwrap();
            store.set(KEY_USER_EMAIL, "a@b.com").unwrap();
        }

        let store = FileStore::new(&config).unwrap();
        assert_eq!(store.get(KEY_TOKEN).unwrap().as_deref(), Some("t1"));
        assert_eq!(
            store.get(KEY_USER_EMAIL).unwrap().as_deref(),
            Some("a@b.com")
        );
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get(KEY_TOKEN).unwrap(), None);
        store.set(KEY_TOKEN, "t2").unwrap();
        assert_eq!(store.get(KEY_TOKEN).unwrap().as_deref(), Some("t2"));
    }

    #[test]
    fn profile_from_registration() {
        let profile = UserProfile::from_registration(&RegistrationProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "secret1".to_string(),
            country: "UK".to_string(),
            agreed_to_terms: true,
        });

        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.location, "UK");

        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains(r#""name":"Ada Lovelace""#));
        assert!(!json.contains("secret1"));
    }
}
