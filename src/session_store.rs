use std::sync::Mutex;

use serde_json::Value;

pub const SESSION_BLOB_MAX_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSlot {
    DocumentContent,
    ChatHistory,
}

impl SessionSlot {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::DocumentContent => "document-content",
            Self::ChatHistory => "chat-history",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionStoreError {
    #[error("{slot} is {size} bytes, limit is {limit} bytes")]
    TooLarge {
        slot: &'static str,
        size: usize,
        limit: usize,
    },
}

/// Page scratch data kept for the life of the desktop process. Nothing is
/// written to disk.
#[derive(Debug, Default)]
pub struct SessionStore {
    document_content: Mutex<Option<Value>>,
    chat_history: Mutex<Option<Value>>,
}

impl SessionStore {
    pub fn set(&self, slot: SessionSlot, value: Value) -> Result<(), SessionStoreError> {
        let size = serde_json::to_vec(&value).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if size > SESSION_BLOB_MAX_BYTES {
            return Err(SessionStoreError::TooLarge {
                slot: slot.as_label(),
                size,
                limit: SESSION_BLOB_MAX_BYTES,
            });
        }
        *lock_slot(self.slot(slot)) = Some(value);
        Ok(())
    }

    /// `Value::Null` when nothing was stored yet.
    pub fn get(&self, slot: SessionSlot) -> Value {
        lock_slot(self.slot(slot)).clone().unwrap_or(Value::Null)
    }

    fn slot(&self, slot: SessionSlot) -> &Mutex<Option<Value>> {
        match slot {
            SessionSlot::DocumentContent => &self.document_content,
            SessionSlot::ChatHistory => &self.chat_history,
        }
    }
}

fn lock_slot(slot: &Mutex<Option<Value>>) -> std::sync::MutexGuard<'_, Option<Value>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
