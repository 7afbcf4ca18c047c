//! Maps every `goclaw-core` subsystem error onto [`goclaw_core::RuntimeError`]
//! so the JSON-RPC error objects in [`crate::rpc`] have one source of truth
//! for "what kind of failure was this".

use goclaw_core::memory::StoreError;
use goclaw_core::session::SessionError;
use goclaw_core::RuntimeError;

pub(crate) fn from_session_error(e: SessionError) -> RuntimeError {
    RuntimeError::Internal(e.to_string())
}

pub(crate) fn from_store_error(e: StoreError) -> RuntimeError {
    match e {
        StoreError::NotFound(m) => RuntimeError::NotFound(m),
        StoreError::Closed => RuntimeError::Unavailable("memory store is closed".to_string()),
        StoreError::Storage(m) => RuntimeError::Internal(m),
        StoreError::Serialization(e) => RuntimeError::Internal(e.to_string()),
    }
}
