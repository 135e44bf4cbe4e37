//! Data-transfer channel status tracking.
//!
//! The transfer subsystem reports the same status many times over a channel's
//! life. The tracker remembers the last status per channel and only yields a
//! [`StatusChange`] when it differs, so the coordinator sees each status once.

use dashmap::{DashMap, mapref::entry::Entry};
use shuttle_core::protocol::{ChannelState, ChannelStatus, TransferStatus};

/// A status transition worth reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub channel: String,
    pub deal_db_id: i64,
    pub state: ChannelState,
}

impl From<StatusChange> for TransferStatus {
    fn from(change: StatusChange) -> Self {
        TransferStatus {
            chanid: change.channel,
            deal_db_id: change.deal_db_id,
            state: change.state,
        }
    }
}

#[derive(Debug)]
struct Tracked {
    deal_db_id: i64,
    last: Option<ChannelStatus>,
}

#[derive(Debug, Default)]
pub struct ChannelTracker {
    channels: DashMap<String, Tracked>,
}

impl ChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring `channel` on behalf of a deal.
    ///
    /// Re-tracking a channel resets its last seen status.
    pub fn track(&self, channel: &str, deal_db_id: i64) {
        self.channels.insert(
            channel.to_string(),
            Tracked {
                deal_db_id,
                last: None,
            },
        );
    }

    /// Record an event, returning a change if its status differs from the
    /// last one seen. Events for untracked channels are ignored.
    ///
    /// A terminal status removes the channel once reported.
    pub fn observe(&self, channel: &str, state: &ChannelState) -> Option<StatusChange> {
        // entry lock serializes events for one channel
        let Entry::Occupied(mut entry) = self.channels.entry(channel.to_string()) else {
            return None;
        };
        let tracked = entry.get_mut();
        if tracked.last == Some(state.status) {
            return None;
        }
        tracked.last = Some(state.status);
        let change = StatusChange {
            channel: channel.to_string(),
            deal_db_id: tracked.deal_db_id,
            state: state.clone(),
        };
        if state.status.is_terminal() {
            entry.remove();
        }
        Some(change)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: ChannelStatus) -> ChannelState {
        ChannelState::new(status)
    }

    #[test]
    fn test_untracked_channel_is_ignored() {
        let tracker = ChannelTracker::new();
        assert!(tracker.observe("chan-1", &state(ChannelStatus::Ongoing)).is_none());
    }

    #[test]
    fn test_emits_once_per_distinct_status() {
        let tracker = ChannelTracker::new();
        tracker.track("chan-1", 9);

        let events = [
            ChannelStatus::Requested,
            ChannelStatus::Requested,
            ChannelStatus::Ongoing,
            ChannelStatus::Ongoing,
            ChannelStatus::Ongoing,
            ChannelStatus::TransferFinished,
            ChannelStatus::TransferFinished,
            ChannelStatus::Completed,
        ];
        let emitted: Vec<_> = events
            .iter()
            .filter_map(|s| tracker.observe("chan-1", &state(*s)))
            .map(|c| c.state.status)
            .collect();

        assert_eq!(
            emitted,
            vec![
                ChannelStatus::Requested,
                ChannelStatus::Ongoing,
                ChannelStatus::TransferFinished,
                ChannelStatus::Completed,
            ]
        );
    }

    #[test]
    fn test_change_carries_deal_id() {
        let tracker = ChannelTracker::new();
        tracker.track("chan-2", 77);
        let change = tracker
            .observe("chan-2", &state(ChannelStatus::Ongoing))
            .unwrap();
        assert_eq!(change.deal_db_id, 77);

        let status: TransferStatus = change.into();
        assert_eq!(status.chanid, "chan-2");
        assert_eq!(status.deal_db_id, 77);
    }

    #[test]
    fn test_terminal_status_stops_tracking() {
        let tracker = ChannelTracker::new();
        tracker.track("chan-3", 1);
        assert!(tracker.observe("chan-3", &state(ChannelStatus::Failed)).is_some());
        assert!(tracker.is_empty());
        assert!(tracker.observe("chan-3", &state(ChannelStatus::Ongoing)).is_none());
    }

    #[test]
    fn test_channels_are_independent() {
        let tracker = ChannelTracker::new();
        tracker.track("a", 1);
        tracker.track("b", 2);
        assert!(tracker.observe("a", &state(ChannelStatus::Ongoing)).is_some());
        assert!(tracker.observe("b", &state(ChannelStatus::Ongoing)).is_some());
        assert!(tracker.observe("a", &state(ChannelStatus::Ongoing)).is_none());
        assert!(tracker.observe("b", &state(ChannelStatus::Cancelled)).is_some());
        assert_eq!(tracker.len(), 1);
        assert!(tracker.observe("a", &state(ChannelStatus::TransferFinished)).is_some());
    }
}
