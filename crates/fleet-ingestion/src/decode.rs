//! Decodes raw bus messages into [`InboundEvent`]s.
//!
//! Decoding happens exactly once, here, at the ingestion boundary. Nothing
//! downstream of [`decode_message`] ever sees an untyped JSON value; per §9
//! of the design notes this is what keeps the health store, risk engine and
//! orchestrators from becoming coupled to the wire shape.

use crate::bus::BusMessage;
use fleet_common::{
    FactoryRestartPayload, HeartbeatPayload, InboundEvent, ReadingPayload, SensorFailurePayload,
};
use serde::Deserialize;

/// A message this dispatcher does not recognize, or whose payload didn't
/// parse. Both are dropped by the caller, never a crash.
#[derive(Debug)]
pub enum DecodeOutcome {
    Event(InboundEvent),
    UnknownTopic(String),
    Malformed { topic: String, error: String },
}

/// Topic-embedded fallback discriminator, used when the topic name alone is
/// ambiguous (mirrors the source router's "topic OR embedded `message_type`"
/// dispatch).
#[derive(Deserialize)]
struct MessageTypeHint {
    #[serde(default)]
    message_type: Option<String>,
}

fn canonical_topic(msg: &BusMessage) -> String {
    let suffix = msg
        .topic
        .rsplit('.')
        .next()
        .unwrap_or(msg.topic.as_str())
        .to_string();
    if suffix != "heartbeat"
        && suffix != "readings"
        && suffix != "sensor-failure"
        && suffix != "restart"
    {
        if let Ok(hint) = serde_json::from_str::<MessageTypeHint>(&msg.payload) {
            if let Some(mt) = hint.message_type {
                return mt;
            }
        }
    }
    suffix
}

/// Decode one raw [`BusMessage`] into a typed [`InboundEvent`], or report why
/// it was dropped.
pub fn decode_message(msg: &BusMessage) -> DecodeOutcome {
    let topic = canonical_topic(msg);
    match topic.as_str() {
        "heartbeat" => parse::<HeartbeatPayload>(&msg.payload, &topic)
            .map(InboundEvent::Heartbeat),
        "readings" => parse::<ReadingPayload>(&msg.payload, &topic).map(InboundEvent::Reading),
        "sensor-failure" => {
            parse::<SensorFailurePayload>(&msg.payload, &topic).map(InboundEvent::SensorFailure)
        }
        "restart" => {
            parse::<FactoryRestartPayload>(&msg.payload, &topic).map(InboundEvent::FactoryRestart)
        }
        other => return DecodeOutcome::UnknownTopic(other.to_string()),
    }
    .map_or_else(
        |error| DecodeOutcome::Malformed {
            topic: topic.clone(),
            error,
        },
        DecodeOutcome::Event,
    )
}

fn parse<T: for<'de> Deserialize<'de>>(payload: &str, topic: &str) -> Result<T, String> {
    serde_json::from_str(payload).map_err(|e| format!("{topic}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str, payload: &str) -> BusMessage {
        BusMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn decodes_canonical_heartbeat_topic() {
        let m = msg(
            "factory.heartbeat",
            r#"{"sensorId":"s1","factoryId":"f1","timestamp":"2026-01-01T00:00:00Z"}"#,
        );
        match decode_message(&m) {
            DecodeOutcome::Event(InboundEvent::Heartbeat(p)) => {
                assert_eq!(p.sensor_id.as_str(), "s1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unknown_topic_is_reported_not_crashed() {
        let m = msg("factory.telemetry-firmware", "{}");
        assert!(matches!(decode_message(&m), DecodeOutcome::UnknownTopic(_)));
    }

    #[test]
    fn malformed_payload_is_reported_not_crashed() {
        let m = msg("factory.heartbeat", "{not json");
        assert!(matches!(decode_message(&m), DecodeOutcome::Malformed { .. }));
    }

    #[test]
    fn falls_back_to_embedded_message_type_when_topic_is_ambiguous() {
        let m = msg(
            "bus.generic",
            r#"{"message_type":"heartbeat","sensorId":"s1","factoryId":"f1","timestamp":"2026-01-01T00:00:00Z"}"#,
        );
        match decode_message(&m) {
            DecodeOutcome::Event(InboundEvent::Heartbeat(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
