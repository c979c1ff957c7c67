use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Client-side unread tally. `has_unread` is derived from `count`, so the
/// two can never disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadState {
    count: u64,
}

impl UnreadState {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn has_unread(&self) -> bool {
        self.count > 0
    }

    pub(crate) fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    pub(crate) fn set(&mut self, count: u64) {
        self.count = count;
    }
}

impl Serialize for UnreadState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("UnreadState", 2)?;
        s.serialize_field("count", &self.count)?;
        s.serialize_field("hasUnread", &self.has_unread())?;
        s.end()
    }
}
