use uuid::Uuid;

/// Maximum concurrently registered chat listeners per script instance.
pub const MAX_LISTENERS: usize = 64;

/// Sentinel handle returned when the listener table is full, so script
/// code can branch on the failure instead of unwinding.
pub const INVALID_LISTENER: i32 = -1;

#[derive(Debug, Clone)]
struct Listener {
    channel: i32,
    name: String,
    source: Option<Uuid>,
    message: String,
    active: bool,
}

impl Listener {
    fn accepts(&self, channel: i32, name: &str, source: &Uuid, message: &str) -> bool {
        if !self.active || self.channel != channel {
            return false;
        }
        // empty filters match anything, per the chat-listen contract
        if !self.name.is_empty() && self.name != name {
            return false;
        }
        if let Some(filter_source) = &self.source {
            if filter_source != source {
                return false;
            }
        }
        if !self.message.is_empty() && self.message != message {
            return false;
        }
        true
    }
}

/// The chat-listener table of one script instance. Handles are dense
/// indices in `[0, MAX_LISTENERS)`, always the lowest free slot.
pub struct ListenerRegistry {
    slots: Vec<Option<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_LISTENERS).map(|_| None).collect(),
        }
    }

    /// Registers a listener, returning its handle, or
    /// [`INVALID_LISTENER`] when all slots are taken.
    pub fn listen(
        &mut self,
        channel: i32,
        name: impl Into<String>,
        source: Option<Uuid>,
        message: impl Into<String>,
    ) -> i32 {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return INVALID_LISTENER;
        };
        self.slots[slot] = Some(Listener {
            channel,
            name: name.into(),
            source,
            message: message.into(),
            active: true,
        });
        slot as i32
    }

    /// Unregisters one listener; unknown handles are ignored.
    pub fn remove(&mut self, handle: i32) {
        if let Some(slot) = self.slot_index(handle) {
            self.slots[slot] = None;
        }
    }

    /// Enables or disables one listener without freeing its slot.
    pub fn set_active(&mut self, handle: i32, active: bool) {
        if let Some(slot) = self.slot_index(handle) {
            if let Some(listener) = &mut self.slots[slot] {
                listener.active = active;
            }
        }
    }

    /// Atomic teardown used on reset, state change and removal.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether any active listener would accept this chat line.
    pub fn accepts(&self, channel: i32, name: &str, source: &Uuid, message: &str) -> bool {
        self.slots.iter().flatten().any(|listener| {
            listener.accepts(channel, name, source, message)
        })
    }

    fn slot_index(&self, handle: i32) -> Option<usize> {
        if handle < 0 || handle as usize >= MAX_LISTENERS {
            return None;
        }
        Some(handle as usize)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_lowest_free_slot() {
        let mut registry = ListenerRegistry::new();
        assert_eq!(registry.listen(0, "", None, ""), 0);
        assert_eq!(registry.listen(0, "", None, ""), 1);
        registry.remove(0);
        assert_eq!(registry.listen(0, "", None, ""), 0);
    }

    #[test]
    fn cap_returns_sentinel_not_an_error() {
        let mut registry = ListenerRegistry::new();
        for expected in 0..MAX_LISTENERS {
            assert_eq!(registry.listen(5, "", None, ""), expected as i32);
        }
        assert_eq!(registry.listen(5, "", None, ""), INVALID_LISTENER);

        registry.remove(17);
        assert_eq!(registry.listen(5, "", None, ""), 17);
        assert_eq!(registry.listen(5, "", None, ""), INVALID_LISTENER);
    }

    #[test]
    fn filters_narrow_the_match() {
        let mut registry = ListenerRegistry::new();
        let speaker = Uuid::new_v4();
        registry.listen(4, "announcer", None, "");
        assert!(registry.accepts(4, "announcer", &speaker, "anything"));
        assert!(!registry.accepts(4, "someone else", &speaker, "anything"));
        assert!(!registry.accepts(5, "announcer", &speaker, "anything"));
    }

    #[test]
    fn deactivated_listeners_do_not_match() {
        let mut registry = ListenerRegistry::new();
        let speaker = Uuid::new_v4();
        let handle = registry.listen(0, "", None, "");
        registry.set_active(handle, false);
        assert!(!registry.accepts(0, "name", &speaker, "hi"));
        registry.set_active(handle, true);
        assert!(registry.accepts(0, "name", &speaker, "hi"));
    }

    #[test]
    fn clear_releases_every_slot() {
        let mut registry = ListenerRegistry::new();
        for _ in 0..10 {
            registry.listen(0, "", None, "");
        }
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.listen(0, "", None, ""), 0);
    }
}
