//! Event stream transport
//!
//! Publishers push `(data, event, id)` triples into an [`EventBus`]; every
//! connected `/events` client receives them as server-sent events.

use axum::response::sse::Event;
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 100;

/// One event as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub data: String,
    pub event: String,
    pub id: String,
}

/// Anything that accepts events for delivery to subscribers.
pub trait EventSink: Send + Sync {
    fn send_event_message(&self, data: &str, event: &str, id: &str);
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Stream of SSE frames for one client; ends when the bus is dropped.
    pub fn sse_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        futures::stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((Ok(event.to_sse()), rx)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Event subscriber lagged, skipped {} events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl EventSink for EventBus {
    fn send_event_message(&self, data: &str, event: &str, id: &str) {
        let event = ServerEvent {
            data: data.to_string(),
            event: event.to_string(),
            id: id.to_string(),
        };
        // Err only means nobody is listening right now
        if self.tx.send(event).is_err() {
            log::trace!("No event subscribers");
        }
    }
}

impl ServerEvent {
    /// Convert to an SSE frame. SSE cannot carry carriage returns in data, nor
    /// line breaks in the event name or id.
    pub fn to_sse(&self) -> Event {
        let data = self.data.replace("\r\n", "\n").replace('\r', "\n");
        let mut sse = Event::default()
            .event(single_line(&self.event))
            .data(data);
        let id = single_line(&self.id);
        if !id.is_empty() {
            sse = sse.id(id);
        }
        sse
    }
}

fn single_line(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.send_event_message(r#"{"ops":1}"#, "stats:echo", "");

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            ServerEvent {
                data: r#"{"ops":1}"#.to_string(),
                event: "stats:echo".to_string(),
                id: String::new(),
            }
        );
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.send_event_message("x", "stats:echo", "");
    }

    #[tokio::test]
    async fn test_sse_stream_yields_events() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.sse_stream());

        bus.send_event_message("one", "stats:a", "");
        bus.send_event_message("two\r\nlines", "stats:b", "7");

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_sse_stream_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.sse_stream());
        drop(bus);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_to_sse_sanitises_fields() {
        let event = ServerEvent {
            data: "a\r\nb\rc".to_string(),
            event: "stats:\necho".to_string(),
            id: "\r".to_string(),
        };
        // Would panic inside axum if carriage returns leaked through
        let _ = event.to_sse();
        assert_eq!(single_line("stats:\necho"), "stats:echo");
    }
}
