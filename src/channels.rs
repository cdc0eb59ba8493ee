use crate::prelude::*;

/// Control messages understood by every long-running component.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChannelData {
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Channels {
    pub to_listener: broadcast::Sender<ChannelData>,
    pub to_engine: broadcast::Sender<ChannelData>,
    pub to_plot_feed: broadcast::Sender<ChannelData>,
    pub to_simulator: broadcast::Sender<ChannelData>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            to_listener: Self::channel(),
            to_engine: Self::channel(),
            to_plot_feed: Self::channel(),
            to_simulator: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(16).0
    }
}
