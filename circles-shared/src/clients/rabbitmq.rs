//! Outbound side of the circles event stream.
//!
//! Moderation commands publish committed changes (`circles.membership.*`,
//! `circles.role.*`, `circles.sanction.*`, `circles.post.*`,
//! `circles.concern.*`) to one durable topic exchange. Notification and feed
//! services bind their own queues; nothing here consumes.

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;

use crate::types::Event;

pub const EXCHANGE_NAME: &str = "circles.events";

const PERSISTENT: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker rejected event: {0}")]
    Broker(#[from] lapin::Error),
}

#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        let options = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .exchange_declare(EXCHANGE_NAME, ExchangeKind::Topic, options, FieldTable::default())
            .await?;

        tracing::info!(exchange = EXCHANGE_NAME, "event exchange ready");
        Ok(Self { channel })
    }

    /// Publishes `event` and waits for the broker's confirmation.
    pub async fn publish<T: Serialize>(&self, routing_key: &str, event: &Event<T>) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties(event),
            )
            .await?
            .await?;

        tracing::debug!(routing_key, event_id = %event.id, "event published");
        Ok(())
    }
}

/// AMQP properties mirroring the envelope, so consumers can route or
/// deduplicate without decoding the body.
fn properties<T: Serialize>(event: &Event<T>) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from("application/json"))
        .with_delivery_mode(PERSISTENT)
        .with_message_id(ShortString::from(event.id.to_string()))
        .with_kind(ShortString::from(event.event_type.clone()))
        .with_app_id(ShortString::from(event.source.clone()))
        .with_timestamp(event.timestamp.timestamp().max(0) as u64)
}
