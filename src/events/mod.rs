use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sender half of the domain-event channel.
///
/// Delivery is fire-and-forget from the coordinator's perspective: a
/// unit of work is successful once its transaction commits, whether or
/// not the events behind it reach any subscriber.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends a batch of post-commit events, logging rather than failing
    /// when a subscriber has gone away. Called only after a successful
    /// commit; a send failure must never roll anything back.
    pub async fn send_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.send(event).await {
                warn!(error = %e, "Dropping post-commit event; no active subscriber");
            }
        }
    }
}

/// Builds a bounded event channel pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

// The events the engine emits after a committed unit of work. Every
// variant carries a generated `event_id` so subscribers can deduplicate
// redelivered events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock events: one per product touched by a committed unit of work.
    StockChanged {
        event_id: Uuid,
        branch_id: Uuid,
        product_id: Uuid,
        new_quantity: i32,
        change_type: String,
    },

    // Sale events
    SaleCreated {
        event_id: Uuid,
        sale_id: Uuid,
        branch_id: Uuid,
        sale_number: String,
        total_amount: Decimal,
    },
    SaleUpdated {
        event_id: Uuid,
        sale_id: Uuid,
        branch_id: Uuid,
        status: String,
    },
    SaleDeleted {
        event_id: Uuid,
        sale_id: Uuid,
        branch_id: Uuid,
    },

    // Return events
    ReturnCreated {
        event_id: Uuid,
        return_id: Uuid,
        branch_id: Uuid,
        return_number: String,
    },
    ReturnStatusUpdated {
        event_id: Uuid,
        return_id: Uuid,
        branch_id: Uuid,
        status: String,
    },

    // Generic event for custom messages
    Generic {
        event_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    pub fn stock_changed(
        branch_id: Uuid,
        product_id: Uuid,
        new_quantity: i32,
        change_type: impl Into<String>,
    ) -> Self {
        Event::StockChanged {
            event_id: Uuid::new_v4(),
            branch_id,
            product_id,
            new_quantity,
            change_type: change_type.into(),
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Event::Generic {
            event_id: Uuid::new_v4(),
            message: message.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// The unique identifier subscribers deduplicate on.
    pub fn event_id(&self) -> Uuid {
        match self {
            Event::StockChanged { event_id, .. }
            | Event::SaleCreated { event_id, .. }
            | Event::SaleUpdated { event_id, .. }
            | Event::SaleDeleted { event_id, .. }
            | Event::ReturnCreated { event_id, .. }
            | Event::ReturnStatusUpdated { event_id, .. }
            | Event::Generic { event_id, .. } => *event_id,
        }
    }
}

// Trait for event subscribers; handlers process events asynchronously
// and report failures as strings, which the drain loop logs.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the event channel, fanning each event out to the registered
/// handlers. Runs until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Box<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(event_id = %event.event_id(), "Received event: {:?}", event);

        let results = join_all(
            handlers
                .iter()
                .map(|handler| handler.handle_event(event.clone())),
        )
        .await;
        for result in results {
            if let Err(e) = result {
                warn!(event_id = %event.event_id(), error = %e, "Event handler failed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_carry_unique_ids() {
        let a = Event::stock_changed(Uuid::new_v4(), Uuid::new_v4(), 5, "sale");
        let b = Event::stock_changed(Uuid::new_v4(), Uuid::new_v4(), 5, "sale");
        assert_ne!(a.event_id(), b.event_id());
    }

    #[tokio::test]
    async fn send_all_survives_dropped_receiver() {
        let (sender, rx) = channel(4);
        drop(rx);
        // Must not panic or error out of the post-commit path.
        sender
            .send_all(vec![Event::with_message("orphaned")])
            .await;
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (sender, mut rx) = channel(4);
        let first = Event::with_message("first");
        let second = Event::with_message("second");
        let first_id = first.event_id();
        let second_id = second.event_id();

        sender.send(first).await.unwrap();
        sender.send(second).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_id(), first_id);
        assert_eq!(rx.recv().await.unwrap().event_id(), second_id);
    }
}
