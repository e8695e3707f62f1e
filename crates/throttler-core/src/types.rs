//! Domain identifiers shared by every throttler component.

use std::time::Instant;

/// Identifies the (keyspace, shard, local cell) this throttler instance governs.
///
/// A `Target` is immutable for the lifetime of an open interval (see the throttler
/// facade's state machine): it is captured once by `open()` and never mutated until
/// the next `close()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub local_cell: String,
}

impl Target {
    pub fn new(
        keyspace: impl Into<String>,
        shard: impl Into<String>,
        local_cell: impl Into<String>,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            local_cell: local_cell.into(),
        }
    }
}

/// The role a tablet plays for its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabletRole {
    Primary,
    Replica,
    Rdonly,
    Other,
}

/// Identifies one tablet server: a cell name plus an opaque numeric uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabletIdentity {
    pub cell: String,
    pub uid: u32,
}

impl TabletIdentity {
    pub fn new(cell: impl Into<String>, uid: u32) -> Self {
        Self {
            cell: cell.into(),
            uid,
        }
    }
}

/// One reported health reading from a tablet, timestamped at the moment the
/// fan-in received it (not when the tablet produced it — clocks across tablets
/// are not assumed to agree).
#[derive(Debug, Clone)]
pub struct TabletHealthSample {
    pub tablet: TabletIdentity,
    pub role: TabletRole,
    pub keyspace: String,
    pub shard: String,
    pub replication_lag_seconds: f64,
    pub received_at: Instant,
}

impl TabletHealthSample {
    /// Whether this sample is usable at all: finite, non-negative lag from a replica.
    pub fn is_usable(&self) -> bool {
        self.role == TabletRole::Replica
            && self.replication_lag_seconds.is_finite()
            && self.replication_lag_seconds >= 0.0
    }

    pub fn matches_target(&self, target: &Target) -> bool {
        self.keyspace == target.keyspace && self.shard == target.shard
    }
}
