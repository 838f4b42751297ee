//! Notifications emitted after a state change commits. Delivery (push,
//! email) belongs to whoever drains the outbox; publishing never blocks on it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRef {
    pub claim_id: String,
    pub user_id: String,
    pub reward_id: String,
    pub points_spent: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AmistEvent {
    ClaimRequested(ClaimRef),
    ClaimApproved(ClaimRef),
    ClaimRejected {
        #[serde(flatten)]
        claim: ClaimRef,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CourseJoined {
        student_id: String,
        course_id: String,
        previous_course_id: Option<String>,
    },
}

impl AmistEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClaimRequested(_) => "claim.requested",
            Self::ClaimApproved(_) => "claim.approved",
            Self::ClaimRejected { .. } => "claim.rejected",
            Self::CourseJoined { .. } => "course.joined",
        }
    }
}

/// `at` is the commit time of the change, taken from the core's clock.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: AmistEvent, at: DateTime<Utc>);
}

/// Logs and forgets. Used when nothing consumes notifications.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: AmistEvent, at: DateTime<Utc>) {
        tracing::info!(event = event.name(), %at, payload = ?event, "event");
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub seq: u64,
    pub event: &'static str,
    pub at: DateTime<Utc>,
    pub data: AmistEvent,
}

#[derive(Debug)]
struct OutboxState {
    enabled: bool,
    limit: usize,
    next_seq: u64,
    queue: VecDeque<EventEnvelope>,
}

/// Bounded in-process queue. When full the oldest envelope is dropped.
#[derive(Debug)]
pub struct Outbox {
    state: Mutex<OutboxState>,
}

impl Outbox {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState {
                enabled: true,
                limit: limit.max(1),
                next_seq: 1,
                queue: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn configure(&self, enabled: bool, limit: usize) {
        let mut st = self.lock();
        st.enabled = enabled;
        st.limit = limit.max(1);
        while st.queue.len() > st.limit {
            st.queue.pop_front();
        }
    }

    pub fn drain(&self) -> Vec<EventEnvelope> {
        self.lock().queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for Outbox {
    fn publish(&self, event: AmistEvent, at: DateTime<Utc>) {
        let mut st = self.lock();
        if !st.enabled {
            tracing::debug!(event = event.name(), "notifications disabled, dropping");
            return;
        }
        let seq = st.next_seq;
        st.next_seq += 1;
        if st.queue.len() >= st.limit {
            if let Some(dropped) = st.queue.pop_front() {
                tracing::warn!(seq = dropped.seq, event = dropped.event, "outbox full, dropping oldest");
            }
        }
        st.queue.push_back(EventEnvelope {
            seq,
            event: event.name(),
            at,
            data: event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    fn joined(n: u32) -> AmistEvent {
        AmistEvent::CourseJoined {
            student_id: format!("s{n}"),
            course_id: "c1".into(),
            previous_course_id: None,
        }
    }

    #[test]
    fn outbox_drops_oldest_when_full() {
        let outbox = Outbox::new(2);
        outbox.publish(joined(1), at());
        outbox.publish(joined(2), at());
        outbox.publish(joined(3), at());
        let drained = outbox.drain();
        assert_eq!(drained.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
        assert!(drained.iter().all(|e| e.at == at()));
        assert!(outbox.is_empty());
    }

    #[test]
    fn disabled_outbox_keeps_nothing() {
        let outbox = Outbox::new(10);
        outbox.configure(false, 10);
        outbox.publish(joined(1), at());
        assert!(outbox.drain().is_empty());
    }

    #[test]
    fn rejected_event_serializes_flat() {
        let ev = AmistEvent::ClaimRejected {
            claim: ClaimRef {
                claim_id: "c".into(),
                user_id: "u".into(),
                reward_id: "r".into(),
                points_spent: 60,
            },
            reason: Some("reward is out of stock".into()),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["claimId"], "c");
        assert_eq!(v["pointsSpent"], 60);
        assert_eq!(v["reason"], "reward is out of stock");
        assert_eq!(ev.name(), "claim.rejected");
    }
}
