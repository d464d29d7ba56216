use tokio::sync::broadcast;

use crate::types::ForgeEvent;

/// Broadcasts forge lifecycle events to every subscriber.
///
/// Publishing never waits on subscribers. One that falls more than
/// `capacity` events behind loses the oldest ones and sees a lag error.
pub struct EventBus {
    tx: broadcast::Sender<ForgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many subscribers the event reached.
    pub fn publish(&self, event: ForgeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ForgeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(generation: u32) -> ForgeEvent {
        ForgeEvent::GenerationStarted {
            generation,
            population: 3,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(started(1)), 1);
        match rx.recv().await.unwrap() {
            ForgeEvent::GenerationStarted { generation, .. } => assert_eq!(generation, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.publish(ForgeEvent::CycleFailed {
                generation: 0,
                error: "boom".into(),
            }),
            0
        );
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for generation in 1..=3 {
            bus.publish(started(generation));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        match rx.recv().await.unwrap() {
            ForgeEvent::GenerationStarted { generation, .. } => assert_eq!(generation, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
