use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one archive run, shared with the media tasks.
#[derive(Debug, Default)]
pub struct ArchiveStats {
    messages: AtomicU64,
    duplicates: AtomicU64,
    members: AtomicU64,
    users: AtomicU64,
    media_saved: AtomicU64,
    media_dropped: AtomicU64,
    media_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub duplicates: u64,
    pub members: u64,
    pub users: u64,
    pub media_saved: u64,
    pub media_dropped: u64,
    pub media_failed: u64,
}

impl ArchiveStats {
    pub fn message_archived(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn member_archived(&self) {
        self.members.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_archived(&self) {
        self.users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn media_saved(&self) {
        self.media_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn media_dropped(&self) {
        self.media_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn media_failed(&self) {
        self.media_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            members: self.members.load(Ordering::Relaxed),
            users: self.users.load(Ordering::Relaxed),
            media_saved: self.media_saved.load(Ordering::Relaxed),
            media_dropped: self.media_dropped.load(Ordering::Relaxed),
            media_failed: self.media_failed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages ({} duplicates), {} members, {} users, media: {} saved, {} dropped, {} failed",
            self.messages,
            self.duplicates,
            self.members,
            self.users,
            self.media_saved,
            self.media_dropped,
            self.media_failed
        )
    }
}
