pub mod publisher;

use serde::Serialize;

use circles_shared::clients::rabbitmq::RabbitMQClient;
use circles_shared::types::Event;

/// Where committed domain events go.
#[derive(Clone)]
pub enum EventBus {
    RabbitMq(RabbitMQClient),
    Disabled,
    #[cfg(test)]
    Recording(std::sync::Arc<std::sync::Mutex<Vec<(String, serde_json::Value)>>>),
}

impl EventBus {
    /// Best effort: a failed publish is logged and otherwise ignored.
    pub async fn publish<T: Serialize>(&self, routing_key: &str, event: Event<T>) {
        match self {
            EventBus::RabbitMq(client) => {
                if let Err(e) = client.publish(routing_key, &event).await {
                    tracing::error!(error = %e, routing_key = %routing_key, "failed to publish event");
                }
            }
            EventBus::Disabled => {
                tracing::debug!(routing_key = %routing_key, "event publishing disabled");
            }
            #[cfg(test)]
            EventBus::Recording(sink) => {
                if let (Ok(value), Ok(mut sink)) = (serde_json::to_value(&event), sink.lock()) {
                    sink.push((routing_key.to_string(), value));
                }
            }
        }
    }

    #[cfg(test)]
    pub fn recording() -> (Self, std::sync::Arc<std::sync::Mutex<Vec<(String, serde_json::Value)>>>) {
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        (EventBus::Recording(sink.clone()), sink)
    }
}
