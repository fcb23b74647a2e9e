use thiserror::Error;

/// Fatal conditions that abort a migration run.
///
/// "Already present" is never an error; see [`crate::InsertOutcome`].
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Destination unreachable or unauthenticated at startup.
    #[error("connection error: {0}")]
    Connection(String),

    /// The local store failed to produce an entry.
    #[error("source read error: {0}")]
    SourceRead(String),

    /// The destination rejected or failed a single conditional insert.
    #[error("insert failed for key {key}: {reason}")]
    Insert { key: String, reason: String },

    /// Invalid location, missing directories or bad options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A worker task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl MigrateError {
    pub fn insert(key: &[u8], reason: impl Into<String>) -> Self {
        Self::Insert {
            key: key_preview(key),
            reason: reason.into(),
        }
    }
}

const KEY_PREVIEW_LEN: usize = 48;

/// Render an opaque key for log and error messages.
///
/// UTF-8 keys are shown as text, anything else as hex; both are truncated.
pub fn key_preview(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => {
            if text.chars().count() > KEY_PREVIEW_LEN {
                let cut: String = text.chars().take(KEY_PREVIEW_LEN).collect();
                format!("{cut}…")
            } else {
                text.to_string()
            }
        }
        _ => {
            let shown = &key[..key.len().min(KEY_PREVIEW_LEN / 2)];
            let hex: String = shown.iter().map(|b| format!("{b:02x}")).collect();
            if shown.len() < key.len() {
                format!("0x{hex}…")
            } else {
                format!("0x{hex}")
            }
        }
    }
}
