use tokio::sync::mpsc;

/// Fan-out of events to subscribers in subscription order.
///
/// Publishing never blocks: every subscriber owns an unbounded queue and a
/// subscriber that dropped its [`Subscription`] is pruned on the next publish.
pub struct EventBus<E> {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<E: Clone> EventBus<E> {
    pub fn subscribe(&mut self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, tx));
        Subscription { id, rx }
    }

    pub fn publish(&mut self, event: E) {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }
}

/// Receiving end of an [`EventBus`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next event; `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn unsubscribe(self) {}
}
