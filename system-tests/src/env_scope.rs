// system-tests/src/env_scope.rs
// ============================================================================
// Module: Environment Scope
// Description: Scoped, restorable mutation of process environment variables.
// Purpose: Isolate per-case proxy settings and restore them on every exit path.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`EnvScope`] is the only code in the workspace that mutates the process
//! environment. A scope holds a process-wide lock for its whole lifetime, so
//! two scopes never interleave mutations even when the test runner uses
//! threads.
//!
//! Invariants:
//! - The first mutation of a key snapshots its prior value (or absence); later
//!   mutations never overwrite the snapshot.
//! - Restoration puts every recorded key back to its snapshot, unsetting keys
//!   that were absent, and then forgets the snapshot.
//! - Dropping a scope restores it, including during unwinding.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::ffi::OsString;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use thiserror::Error;

// ============================================================================
// SECTION: Process Lock
// ============================================================================

/// Serializes every environment scope in the process.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Raw process environment mutation.
mod env_mut {
    #![allow(unsafe_code, reason = "Harness mutates process env for proxy scenarios.")]

    use std::ffi::OsStr;

    /// Sets an environment variable for the current process.
    pub(super) fn set_var(key: &str, value: &OsStr) {
        // SAFETY: Callers hold ENV_LOCK; no other code in the workspace mutates env.
        unsafe {
            std::env::set_var(key, value);
        }
    }

    /// Removes an environment variable from the current process.
    pub(super) fn remove_var(key: &str) {
        // SAFETY: Callers hold ENV_LOCK; no other code in the workspace mutates env.
        unsafe {
            std::env::remove_var(key);
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Environment scope misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvScopeError {
    /// A key was restored without having been mutated in this scope.
    #[error("environment key {0} was never recorded in this scope")]
    NotRecorded(String),
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Snapshot of one key mutated in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverride {
    /// Variable name.
    key: String,
    /// Value before the first mutation; `None` when the key was unset.
    original: Option<OsString>,
    /// True while the live value differs from the snapshot.
    applied: bool,
}

impl EnvOverride {
    /// Returns the variable name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the recorded original value.
    #[must_use]
    pub fn original(&self) -> Option<&OsStr> {
        self.original.as_deref()
    }

    /// Returns true while the override is applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied
    }

    /// Puts the snapshot back into the process environment.
    fn restore(&mut self) {
        match &self.original {
            Some(value) => env_mut::set_var(&self.key, value),
            None => env_mut::remove_var(&self.key),
        }
        self.applied = false;
    }
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Exclusive, self-restoring view of the process environment.
#[derive(Debug)]
pub struct EnvScope {
    /// Recorded keys in first-mutation order.
    overrides: Vec<EnvOverride>,
    /// Held for the scope's lifetime; released after `Drop::drop` restores.
    _lock: MutexGuard<'static, ()>,
}

impl EnvScope {
    /// Acquires the process-wide environment lock, blocking until free.
    ///
    /// A lock poisoned by a panicking holder is recovered: that holder's
    /// scope already restored its keys while unwinding.
    #[must_use]
    pub fn acquire() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        Self {
            overrides: Vec::new(),
            _lock: lock,
        }
    }

    /// Sets `key` to `value`, snapshotting the prior value on first touch.
    pub fn set_scoped(&mut self, key: &str, value: impl AsRef<OsStr>) {
        self.record(key);
        env_mut::set_var(key, value.as_ref());
    }

    /// Unsets `key`, snapshotting the prior value on first touch.
    pub fn remove_scoped(&mut self, key: &str) {
        self.record(key);
        env_mut::remove_var(key);
    }

    /// Returns the recorded snapshot for `key`.
    ///
    /// `None` means the key was never recorded; `Some(None)` means it was
    /// unset before the first mutation.
    #[must_use]
    pub fn original(&self, key: &str) -> Option<Option<&OsStr>> {
        self.find(key).map(EnvOverride::original)
    }

    /// Returns the recorded keys in first-mutation order.
    #[must_use]
    pub fn recorded_keys(&self) -> Vec<&str> {
        self.overrides.iter().map(EnvOverride::key).collect()
    }

    /// Restores one recorded key and forgets its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EnvScopeError::NotRecorded`] when `key` was never mutated
    /// in this scope.
    pub fn restore_one(&mut self, key: &str) -> Result<(), EnvScopeError> {
        let index = self
            .overrides
            .iter()
            .position(|entry| entry.key == key)
            .ok_or_else(|| EnvScopeError::NotRecorded(key.to_string()))?;
        let mut entry = self.overrides.remove(index);
        entry.restore();
        Ok(())
    }

    /// Restores every recorded key and clears the snapshot.
    pub fn restore_all(&mut self) {
        for mut entry in self.overrides.drain(..) {
            entry.restore();
        }
    }

    /// Records the current value of `key` unless already recorded.
    fn record(&mut self, key: &str) {
        if let Some(entry) = self.overrides.iter_mut().find(|entry| entry.key == key) {
            entry.applied = true;
            return;
        }
        self.overrides.push(EnvOverride {
            key: key.to_string(),
            original: std::env::var_os(key),
            applied: true,
        });
    }

    /// Returns the override for `key`.
    fn find(&self, key: &str) -> Option<&EnvOverride> {
        self.overrides.iter().find(|entry| entry.key == key)
    }
}

impl Drop for EnvScope {
    fn drop(&mut self) {
        self.restore_all();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
