//! Buffering bridge to a log core that becomes available later.
//!
//! Until a target is registered, entries are held in a bounded buffer. On
//! registration the buffer is replayed in order and every later write goes
//! straight to the target. The target is never called with the state lock
//! held, so it may itself log through `tracing` or a [`Logger`].
//!
//! [`Logger`]: beacon_common::Logger

use std::sync::Arc;

use beacon_common::{Field, INTERNAL_TARGET, Level, LogCore, LogEntry, LogError, Result};
use parking_lot::RwLock;

/// Maximum number of entries held before a target is attached. Entries
/// beyond it are dropped.
pub const BUFFER_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct BufferedLog {
    entry: LogEntry,
    fields: Vec<Field>,
}

#[derive(Default)]
struct SharedState {
    target: Option<Arc<dyn LogCore>>,
    buffer: Vec<BufferedLog>,
    // Set while `register_target` drains the buffer. Writers keep queueing
    // behind the entries being replayed.
    replaying: bool,
}

/// Log core whose backend is attached at most once, after creation.
///
/// Handles derived with [`LogCore::with`] share the same buffer and target.
#[derive(Clone)]
pub struct BridgeCore {
    shared: Arc<RwLock<SharedState>>,
    fields: Vec<Field>,
    level: Level,
}

impl BridgeCore {
    /// Create a bridge that accepts entries at or above `level` while no
    /// target is attached.
    pub fn new(level: Level) -> Self {
        Self {
            shared: Arc::new(RwLock::new(SharedState {
                target: None,
                buffer: Vec::with_capacity(BUFFER_CAPACITY),
                replaying: false,
            })),
            fields: Vec::new(),
            level,
        }
    }

    /// Attach the target, replay the buffer into it and release the buffer.
    ///
    /// The buffer is replayed outside the lock. Entries written meanwhile
    /// are queued and replayed after it, so the target sees every entry once
    /// and in write order. Fails with [`LogError::AlreadyAttached`] if a
    /// target is already set or being attached.
    pub fn register_target(&self, target: Arc<dyn LogCore>) -> Result<()> {
        let mut pending = {
            let mut shared = self.shared.write();
            if shared.target.is_some() || shared.replaying {
                return Err(LogError::AlreadyAttached);
            }
            shared.replaying = true;
            std::mem::take(&mut shared.buffer)
        };

        loop {
            for log in &pending {
                replay(target.as_ref(), log);
            }

            let mut shared = self.shared.write();
            if shared.buffer.is_empty() {
                shared.target = Some(target);
                shared.replaying = false;
                shared.buffer = Vec::new();
                return Ok(());
            }
            pending = std::mem::take(&mut shared.buffer);
        }
    }

    /// Whether a target has been attached.
    pub fn is_attached(&self) -> bool {
        self.shared.read().target.is_some()
    }

    fn target(&self) -> Option<Arc<dyn LogCore>> {
        self.shared.read().target.clone()
    }

    /// Number of entries waiting for a target.
    pub fn buffered_len(&self) -> usize {
        self.shared.read().buffer.len()
    }
}

fn replay(target: &dyn LogCore, log: &BufferedLog) {
    if !target.check(&log.entry) {
        return;
    }
    if let Err(e) = target.write(&log.entry, &log.fields) {
        tracing::warn!(
            target: INTERNAL_TARGET,
            logger = %log.entry.logger_name,
            error = %e,
            "log replay failed"
        );
    }
}

impl LogCore for BridgeCore {
    fn enabled(&self, level: Level) -> bool {
        if let Some(target) = self.target() {
            return target.enabled(level);
        }

        level >= self.level
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn LogCore> {
        let mut all = Vec::with_capacity(self.fields.len() + fields.len());
        all.extend_from_slice(&self.fields);
        all.extend_from_slice(fields);

        Arc::new(Self {
            shared: self.shared.clone(),
            fields: all,
            level: self.level,
        })
    }

    fn check(&self, entry: &LogEntry) -> bool {
        if let Some(target) = self.target() {
            return target.check(entry);
        }

        entry.level >= self.level
    }

    fn write(&self, entry: &LogEntry, fields: &[Field]) -> Result<()> {
        let mut all = Vec::with_capacity(self.fields.len() + fields.len());
        all.extend_from_slice(&self.fields);
        all.extend_from_slice(fields);

        if all.iter().any(Field::is_internal_marker) {
            return Ok(());
        }

        // Attachment happens once; after it the read lock is enough.
        if let Some(target) = self.target() {
            return target.write(entry, &all);
        }

        let mut shared = self.shared.write();
        let Some(target) = shared.target.clone() else {
            if shared.replaying || shared.buffer.len() < BUFFER_CAPACITY {
                shared.buffer.push(BufferedLog {
                    entry: entry.clone(),
                    fields: all,
                });
            }
            return Ok(());
        };
        drop(shared);

        target.write(entry, &all)
    }

    fn sync(&self) -> Result<()> {
        match self.target() {
            Some(target) => target.sync(),
            None => Ok(()),
        }
    }
}
