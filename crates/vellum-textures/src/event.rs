//! Cache events for the frame driver.

use std::collections::VecDeque;

use crate::error::TextureError;

/// Events emitted by the texture cache.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureEvent {
    /// A load completed and the texture is now resident.
    Loaded {
        /// Cache key.
        key: String,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },

    /// A load failed. Nothing was cached.
    LoadFailed {
        /// Cache key.
        key: String,
        /// The failure.
        error: TextureError,
    },

    /// A texture was freed after sitting idle; its record remains.
    Evicted {
        /// Cache key.
        key: String,
    },

    /// A record was deleted because nothing references it.
    Removed {
        /// Cache key.
        key: String,
    },

    /// A record was invalidated and will reload on next use.
    Invalidated {
        /// Cache key.
        key: String,
    },
}

impl TextureEvent {
    /// The key this event relates to.
    pub fn key(&self) -> &str {
        match self {
            TextureEvent::Loaded { key, .. }
            | TextureEvent::LoadFailed { key, .. }
            | TextureEvent::Evicted { key }
            | TextureEvent::Removed { key }
            | TextureEvent::Invalidated { key } => key,
        }
    }

    /// Check if this is a load completion.
    pub fn is_loaded(&self) -> bool {
        matches!(self, TextureEvent::Loaded { .. })
    }

    /// Check if this is a load failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, TextureEvent::LoadFailed { .. })
    }

    /// Check if this event freed a texture or a record.
    pub fn is_reclaim(&self) -> bool {
        matches!(
            self,
            TextureEvent::Evicted { .. } | TextureEvent::Removed { .. }
        )
    }
}

/// Events kept by default before the oldest are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// A bounded buffer of texture events, drained once per frame.
///
/// When full, pushing drops the oldest event. A frame driver that drains
/// every frame never hits the limit.
#[derive(Debug)]
pub struct TextureEventBuffer {
    events: VecDeque<TextureEvent>,
    capacity: usize,
    dropped: u64,
}

impl TextureEventBuffer {
    /// Create an empty buffer holding up to [`DEFAULT_EVENT_CAPACITY`] events.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty buffer holding up to `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Push an event, dropping the oldest one if the buffer is full.
    pub fn push(&mut self, event: TextureEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            if self.dropped == 0 {
                tracing::warn!(
                    capacity = self.capacity,
                    "texture event buffer full; dropping oldest events until drained"
                );
            }
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Take every buffered event, oldest first.
    pub fn take(&mut self) -> Vec<TextureEvent> {
        self.dropped = 0;
        std::mem::take(&mut self.events).into()
    }

    /// Check if there are any events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped since the last [`take`](Self::take).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for TextureEventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_and_kind() {
        let loaded = TextureEvent::Loaded {
            key: "ui/a.tex".into(),
            width: 4,
            height: 4,
        };
        assert_eq!(loaded.key(), "ui/a.tex");
        assert!(loaded.is_loaded());
        assert!(!loaded.is_reclaim());

        let evicted = TextureEvent::Evicted { key: "b".into() };
        assert!(evicted.is_reclaim());

        let failed = TextureEvent::LoadFailed {
            key: "c".into(),
            error: TextureError::Cancelled,
        };
        assert!(failed.is_failed());
    }

    #[test]
    fn test_buffer_take_empties() {
        let mut buffer = TextureEventBuffer::new();
        buffer.push(TextureEvent::Removed { key: "x".into() });
        buffer.push(TextureEvent::Invalidated { key: "y".into() });
        assert_eq!(buffer.len(), 2);

        let events = buffer.take();
        assert_eq!(events.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_drops_oldest() {
        let mut buffer = TextureEventBuffer::with_capacity(3);
        for key in ["a", "b", "c", "d", "e"] {
            buffer.push(TextureEvent::Evicted { key: key.into() });
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 2);

        let keys: Vec<_> = buffer.take().iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, ["c", "d", "e"]);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_zero_capacity_keeps_latest_event() {
        let mut buffer = TextureEventBuffer::with_capacity(0);
        buffer.push(TextureEvent::Removed { key: "x".into() });
        buffer.push(TextureEvent::Removed { key: "y".into() });
        assert_eq!(buffer.take(), vec![TextureEvent::Removed { key: "y".into() }]);
    }
}
