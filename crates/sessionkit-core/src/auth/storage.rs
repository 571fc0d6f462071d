//! Durable key/value slots backing the token store.
//!
//! Each slot carries its own max-age, so the credential, its expiry and the
//! "had a session" marker expire independently. Writes are applied as a
//! batch so a clear never leaves a half-wiped credential behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sealed::Sealer;
use crate::clock::Clock;

/// Session file name in the cache directory
pub const SESSION_FILE: &str = "session.json";

/// A single change to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    Set {
        key: &'static str,
        value: String,
        max_age: Option<Duration>,
    },
    Remove {
        key: &'static str,
    },
}

impl SlotWrite {
    pub fn key(&self) -> &'static str {
        match self {
            SlotWrite::Set { key, .. } | SlotWrite::Remove { key } => key,
        }
    }
}

pub trait SlotStorage: Send + Sync {
    /// Read a live (non-expired) slot.
    fn get(&self, key: &str) -> Option<String>;

    /// Apply a batch of writes. The in-memory view is updated even when
    /// persisting fails; the error reports the persistence failure.
    fn apply(&self, writes: &[SlotWrite]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredSlot {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSlot {
    pub fn new(value: String, max_age: Option<Duration>, now: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: max_age.map(|age| now + age),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        is_live(self.expires_at, now)
    }
}

pub(crate) fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|at| now < at).unwrap_or(true)
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local slots; nothing survives a restart.
pub struct MemoryStorage {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, StoredSlot>>,
}

impl MemoryStorage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl SlotStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.slots
            .lock()
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    fn apply(&self, writes: &[SlotWrite]) -> Result<()> {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        for write in writes {
            match write {
                SlotWrite::Set { key, value, max_age } => {
                    slots.insert(key.to_string(), StoredSlot::new(value.clone(), *max_age, now));
                }
                SlotWrite::Remove { key } => {
                    slots.remove(*key);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum SlotValue {
    Plain { value: String },
    Sealed { nonce: Vec<u8>, data: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileSlot {
    value: SlotValue,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<Vec<u8>>,
    #[serde(default)]
    slots: HashMap<String, FileSlot>,
}

/// Slots persisted as JSON in a file readable only by the owner.
///
/// With a passphrase configured, slot values are sealed at rest; sealed
/// slots that cannot be opened read as absent.
pub struct FileStorage {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    sealer: Option<Sealer>,
    file: Mutex<SessionFile>,
}

impl FileStorage {
    /// Open (or lazily create) the slot file at `path`
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let file = Self::load(&path)?;
        debug!(path = %path.display(), slots = file.slots.len(), "Session file loaded");

        Ok(Self {
            path,
            clock,
            sealer: None,
            file: Mutex::new(file),
        })
    }

    /// Seal values with a key derived from `passphrase`
    pub fn with_passphrase(mut self, passphrase: &str) -> Result<Self> {
        let salt = {
            let mut file = self.file.lock();
            file.salt.get_or_insert_with(Sealer::generate_salt).clone()
        };
        self.sealer = Some(Sealer::derive(passphrase, &salt)?);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<SessionFile> {
        if !path.exists() {
            return Ok(SessionFile::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;

        match serde_json::from_str(&contents) {
            Ok(file) => Ok(file),
            Err(e) => {
                // A corrupt file is treated as "no session" rather than a hard failure
                warn!(path = %path.display(), error = %e, "Ignoring unparseable session file");
                Ok(SessionFile::default())
            }
        }
    }

    fn decode(&self, slot: &FileSlot) -> Option<String> {
        match &slot.value {
            SlotValue::Plain { value } => Some(value.clone()),
            SlotValue::Sealed { nonce, data } => self.sealer.as_ref()?.open(nonce, data),
        }
    }

    fn encode(&self, value: &str) -> Result<SlotValue> {
        match &self.sealer {
            Some(sealer) => {
                let (nonce, data) = sealer.seal(value)?;
                Ok(SlotValue::Sealed { nonce, data })
            }
            None => Ok(SlotValue::Plain {
                value: value.to_string(),
            }),
        }
    }

    fn save(&self, file: &SessionFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(file).context("Failed to serialize session file")?;

        // Write with restricted permissions
        #[cfg(unix)]
        {
            use std::fs::OpenOptions;
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut out = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            out.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;

            // `mode` only applies on create; tighten a file that already existed
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }
}

impl SlotStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let file = self.file.lock();
        let slot = file.slots.get(key)?;
        if !is_live(slot.expires_at, now) {
            return None;
        }
        self.decode(slot)
    }

    fn apply(&self, writes: &[SlotWrite]) -> Result<()> {
        let now = self.clock.now();
        let mut file = self.file.lock();

        file.slots.retain(|_, slot| is_live(slot.expires_at, now));

        for write in writes {
            match write {
                SlotWrite::Set { key, value, max_age } => {
                    let slot = FileSlot {
                        value: self.encode(value)?,
                        expires_at: max_age.map(|age| now + age),
                    };
                    file.slots.insert(key.to_string(), slot);
                }
                SlotWrite::Remove { key } => {
                    file.slots.remove(*key);
                }
            }
        }

        self.save(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn set(key: &'static str, value: &str, max_age: Option<Duration>) -> SlotWrite {
        SlotWrite::Set {
            key,
            value: value.to_string(),
            max_age,
        }
    }

    #[test]
    fn test_memory_slots_expire_independently() {
        let clock = Arc::new(ManualClock::default());
        let storage = MemoryStorage::new(clock.clone());

        storage
            .apply(&[
                set("short", "a", Some(Duration::seconds(10))),
                set("long", "b", Some(Duration::days(30))),
                set("forever", "c", None),
            ])
            .unwrap();

        clock.advance(Duration::seconds(10));
        assert_eq!(storage.get("short"), None);
        assert_eq!(storage.get("long").as_deref(), Some("b"));
        assert_eq!(storage.get("forever").as_deref(), Some("c"));
    }

    #[test]
    fn test_memory_remove() {
        let storage = MemoryStorage::new(Arc::new(ManualClock::default()));
        storage.apply(&[set("k", "v", None)]).unwrap();
        storage.apply(&[SlotWrite::Remove { key: "k" }]).unwrap();
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());

        let storage = FileStorage::open(&path, clock.clone()).unwrap();
        storage
            .apply(&[set("auth_access_token", "tok", Some(Duration::minutes(15)))])
            .unwrap();

        let reopened = FileStorage::open(&path, clock).unwrap();
        assert_eq!(reopened.get("auth_access_token").as_deref(), Some("tok"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SESSION_FILE);
        let storage = FileStorage::open(&path, Arc::new(ManualClock::default())).unwrap();
        storage.apply(&[set("k", "v", None)]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let storage = FileStorage::open(&path, Arc::new(ManualClock::default())).unwrap();
        storage.apply(&[set("k", "v", None)]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_storage_sealed_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());

        let storage = FileStorage::open(&path, clock.clone())
            .unwrap()
            .with_passphrase("s3cret")
            .unwrap();
        storage.apply(&[set("auth_access_token", "tok-123", None)]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("tok-123"));

        let same_key = FileStorage::open(&path, clock.clone())
            .unwrap()
            .with_passphrase("s3cret")
            .unwrap();
        assert_eq!(same_key.get("auth_access_token").as_deref(), Some("tok-123"));

        let wrong_key = FileStorage::open(&path, clock.clone())
            .unwrap()
            .with_passphrase("guess")
            .unwrap();
        assert_eq!(wrong_key.get("auth_access_token"), None);

        let no_key = FileStorage::open(&path, clock).unwrap();
        assert_eq!(no_key.get("auth_access_token"), None);
    }

    #[test]
    fn test_file_storage_ignores_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);
        fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path, Arc::new(ManualClock::default())).unwrap();
        assert_eq!(storage.get("anything"), None);
    }
}
