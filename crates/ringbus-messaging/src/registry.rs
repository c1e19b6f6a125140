use crate::{MessageChannel, MessagingError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to a named channel.
pub type ChannelRef<P> = Arc<dyn MessageChannel<P>>;

/// Resolves channel names, as found in `reply_to` and `error_channel`
/// headers, to channels.
pub struct ChannelRegistry<P> {
    channels: RwLock<HashMap<String, ChannelRef<P>>>,
}

impl<P> ChannelRegistry<P> {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `channel` under `name`, returning the channel it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        channel: ChannelRef<P>,
    ) -> Option<ChannelRef<P>> {
        self.channels.write().insert(name.into(), channel)
    }

    pub fn unregister(&self, name: &str) -> Option<ChannelRef<P>> {
        self.channels.write().remove(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ChannelRef<P>, MessagingError> {
        self.channels
            .read()
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| MessagingError::UnknownChannel {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

impl<P> Default for ChannelRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
