use crate::entity::Entity;
use crate::mask::Mask;
use crate::segment::{Location, SegmentIndex};
use std::fmt;

/// Notifications emitted by a [`ComponentStore`](crate::ComponentStore).
///
/// Events are sent synchronously from within the call which caused them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new segment has been created.
    SegmentCreated { segment: SegmentIndex, mask: Mask },
    /// An entity has been spawned into a segment.
    EntityInserted { entity: Entity, location: Location },
    /// An entity has been migrated to another segment by a resolve.
    EntityMoved {
        entity: Entity,
        source: Location,
        target: Location,
    },
    /// An entity has been despawned.
    EntityRemoved { entity: Entity, location: Location },
}

/// Describes a type which can receive store events.
pub trait EventSender: Send + Sync {
    /// Sends the given event to the listener.
    /// Returns `true` if the listener is still alive.
    fn send(&self, event: Event) -> bool;
}

impl EventSender for crossbeam_channel::Sender<Event> {
    fn send(&self, event: Event) -> bool {
        !matches!(
            self.try_send(event),
            Err(crossbeam_channel::TrySendError::Disconnected(_))
        )
    }
}

#[derive(Default)]
pub(crate) struct Subscribers {
    subscribers: Vec<Box<dyn EventSender>>,
}

impl Subscribers {
    pub fn push(&mut self, sender: Box<dyn EventSender>) {
        self.subscribers.push(sender);
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Sends the event to every subscriber, forgetting the ones which are gone.
    pub fn send(&mut self, event: Event) {
        for i in (0..self.subscribers.len()).rev() {
            if !self.subscribers[i].send(event.clone()) {
                self.subscribers.swap_remove(i);
            }
        }
    }

    /// Sends the event built by `f`. The event is not built if nobody listens.
    pub fn send_with<F: FnOnce() -> Event>(&mut self, f: F) {
        if !self.is_empty() {
            self.send(f());
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_forgotten() {
        let mut subscribers = Subscribers::default();
        let (alive_tx, alive_rx) = crossbeam_channel::unbounded();
        let (dead_tx, dead_rx) = crossbeam_channel::unbounded::<Event>();
        subscribers.push(Box::new(alive_tx));
        subscribers.push(Box::new(dead_tx));
        drop(dead_rx);

        subscribers.send(Event::SegmentCreated {
            segment: SegmentIndex::EMPTY,
            mask: Mask::new(),
        });

        assert_eq!(subscribers.subscribers.len(), 1);
        assert!(matches!(
            alive_rx.try_recv(),
            Ok(Event::SegmentCreated { .. })
        ));
    }
}
