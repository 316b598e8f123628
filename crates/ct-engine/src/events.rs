//! In-process event bus.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use ct_core::User;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A user's preferences were written.
    UserUpdated(User),
    /// New heartbeats were stored for a user. `earliest` is the oldest of
    /// them, which may lie before heartbeats stored earlier.
    HeartbeatsCreated {
        user: User,
        count: usize,
        earliest: DateTime<Utc>,
    },
}

/// Broadcast bus. Publishing never blocks; slow subscribers miss events
/// instead of holding up the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use ct_core::UserId;

    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let user = User::new(UserId::new("alice").unwrap(), DateTime::UNIX_EPOCH);
        let earliest = DateTime::UNIX_EPOCH;
        bus.publish(Event::HeartbeatsCreated {
            user: user.clone(),
            count: 2,
            earliest,
        });

        assert_eq!(
            receiver.try_recv().unwrap(),
            Event::HeartbeatsCreated {
                user,
                count: 2,
                earliest
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        let user = User::new(UserId::new("alice").unwrap(), DateTime::UNIX_EPOCH);
        bus.publish(Event::UserUpdated(user));
    }
}
