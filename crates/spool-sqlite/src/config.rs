use serde::Deserialize;

/// SQLite settings, read from `SPOOL_SQLITE_*`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqliteConfig {
    /// Database file. `None` keeps everything in memory.
    pub db_path: Option<String>,
}

impl SqliteConfig {
    pub fn load() -> Result<Self, envy::Error> {
        envy::prefixed("SPOOL_SQLITE_").from_env::<Self>()
    }

    pub fn in_memory() -> Self {
        Self { db_path: None }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            db_path: Some(path.into()),
        }
    }
}
