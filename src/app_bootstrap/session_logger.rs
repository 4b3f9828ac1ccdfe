//! Host subscriber that mirrors queue and session notifications to the log.
//!
//! Stands in for a platform media-session binding on headless hosts.

use log::{debug, info, warn};
use tokio::sync::broadcast::Receiver;

use crate::playback::snapshot::PlaybackState;
use crate::protocol::{Message, QueueMessage, SessionMessage};

pub struct SessionLogger {
    bus_consumer: Receiver<Message>,
    last_state: Option<PlaybackState>,
}

/// One-line summary of a bus message.
pub fn describe_message(message: &Message) -> String {
    match message {
        Message::Queue(QueueMessage::QueueUpdated { title, items }) => {
            format!("queue \"{}\" with {} items", title, items.len())
        }
        Message::Queue(QueueMessage::MetadataChanged(track)) => {
            format!("now playing \"{}\" by {}", track.title, track.artist)
        }
        Message::Queue(QueueMessage::CurrentQueueIndexUpdated(index)) => {
            format!("queue index {}", index)
        }
        Message::Queue(QueueMessage::MetadataRetrieveError) => "no metadata".to_string(),
        Message::Session(SessionMessage::PlaybackStart) => "playback start".to_string(),
        Message::Session(SessionMessage::PlaybackStop) => "playback stop".to_string(),
        Message::Session(SessionMessage::NotificationRequired) => {
            "notification required".to_string()
        }
        Message::Session(SessionMessage::PlaybackStateUpdated(snapshot)) => {
            let mut line = format!("state {:?}", snapshot.state);
            if let Some(position_ms) = snapshot.position_ms {
                line.push_str(&format!(" at {}ms", position_ms));
            }
            if let Some(error) = &snapshot.error_message {
                line.push_str(&format!(" ({})", error));
            }
            line
        }
    }
}

impl SessionLogger {
    pub fn new(bus_consumer: Receiver<Message>) -> Self {
        Self {
            bus_consumer,
            last_state: None,
        }
    }

    fn handle_message(&mut self, message: Message) {
        let line = describe_message(&message);
        match &message {
            Message::Session(SessionMessage::PlaybackStateUpdated(snapshot)) => {
                // Position ticks repeat the same state; only transitions are interesting.
                if self.last_state == Some(snapshot.state) && snapshot.error_message.is_none() {
                    debug!("SessionLogger: {}", line);
                } else {
                    info!("SessionLogger: {}", line);
                }
                self.last_state = Some(snapshot.state);
            }
            Message::Queue(QueueMessage::MetadataRetrieveError) => {
                warn!("SessionLogger: {}", line)
            }
            Message::Session(SessionMessage::NotificationRequired)
            | Message::Queue(QueueMessage::CurrentQueueIndexUpdated(_)) => {
                debug!("SessionLogger: {}", line)
            }
            _ => info!("SessionLogger: {}", line),
        }
    }

    pub fn last_state(&self) -> Option<PlaybackState> {
        self.last_state
    }

    pub fn run(&mut self) {
        info!("SessionLogger: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SessionLogger: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("SessionLogger: stopped");
    }
}
