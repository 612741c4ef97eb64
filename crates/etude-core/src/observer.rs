use tracing::warn;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Listener<E> = Box<dyn FnMut(&E) -> Result<(), ListenerError> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out of notifications to registered listeners.
///
/// Each listener runs in isolation: an `Err` from one is logged and the
/// remaining listeners still receive the notification.
pub struct Notifier<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

impl<E: std::fmt::Debug> Notifier<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> Result<(), ListenerError> + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&mut self, event: &E) {
        for (id, listener) in self.listeners.iter_mut() {
            if let Err(err) = listener(event) {
                warn!(listener = id.0, ?event, %err, "listener failed");
            }
        }
    }
}

impl<E: std::fmt::Debug> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}
