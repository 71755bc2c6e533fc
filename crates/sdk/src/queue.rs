//! Size-or-idle batch queue.

use chrono::{DateTime, Utc};

use tracker_core::EventPayload;

/// One queued event with its client-side emission time.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub payload: EventPayload,
    pub queued_at: DateTime<Utc>,
}

/// Accumulates events until the batch fills; the owning task drains it on
/// the idle timer.
#[derive(Debug)]
pub struct BatchQueue {
    items: Vec<QueuedEvent>,
    batch_size: usize,
}

impl BatchQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
        }
    }

    /// Append one event. Returns the full batch when the size threshold is
    /// reached, `None` otherwise.
    pub fn push(&mut self, event: QueuedEvent) -> Option<Vec<QueuedEvent>> {
        self.items.push(event);
        if self.items.len() >= self.batch_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Drain whatever is queued.
    pub fn take(&mut self) -> Vec<QueuedEvent> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::PageViewData;

    fn event(url: &str) -> QueuedEvent {
        QueuedEvent {
            payload: EventPayload::PageView(PageViewData {
                url: url.into(),
                title: None,
                referrer: None,
                time_on_page: None,
            }),
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn push_returns_batch_at_threshold() {
        let mut queue = BatchQueue::new(3);
        assert!(queue.push(event("/a")).is_none());
        assert!(queue.push(event("/b")).is_none());

        let batch = queue.push(event("/c")).expect("batch at threshold");
        assert_eq!(batch.len(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn take_drains_partial_batch() {
        let mut queue = BatchQueue::new(10);
        queue.push(event("/a"));
        queue.push(event("/b"));

        let batch = queue.take();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.take().is_empty());
    }

    #[test]
    fn batch_size_has_a_floor_of_one() {
        let mut queue = BatchQueue::new(0);
        assert!(queue.push(event("/a")).is_some());
    }
}
