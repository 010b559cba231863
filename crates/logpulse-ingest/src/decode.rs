//! Broker message decoding.

use logpulse_types::{
    ClassificationType, EventKind, IngestEvent, NewAnomalyParam, NewClassification, NewLogEntry,
};
use serde::Deserialize;
use serde_json::Value;

/// A broker payload that could not be turned into events.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid {kind} message: {source}")]
    Json {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct LogMessage {
    message: String,
    #[serde(default = "default_level")]
    level: String,
}

fn default_level() -> String {
    "INFO".to_string()
}

#[derive(Deserialize)]
struct ClassificationMessage {
    #[serde(default)]
    normal: u32,
    #[serde(default)]
    anomaly: u32,
    #[serde(default)]
    unidentified: u32,
    #[serde(default)]
    anomaly_params: Vec<EmbeddedParam>,
    #[serde(default)]
    unidentified_params: Vec<EmbeddedParam>,
}

#[derive(Deserialize)]
struct EmbeddedParam {
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct ParamMessage {
    #[serde(alias = "value")]
    param_value: Value,
    #[serde(default = "default_tag")]
    classification_type: ClassificationType,
}

fn default_tag() -> ClassificationType {
    ClassificationType::Anomaly
}

/// Renders a JSON value as parameter text. Strings are taken verbatim.
fn param_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decodes one message from the topic for `kind`.
///
/// Classification messages may embed `anomaly_params` and
/// `unidentified_params` arrays; these become parameter events that follow
/// the classification event in the returned order.
///
/// # Errors
///
/// Returns `DecodeError::Json` if the payload is not valid JSON of the
/// expected shape.
pub fn decode_message(kind: EventKind, payload: &[u8]) -> Result<Vec<IngestEvent>, DecodeError> {
    let json_err = |source| DecodeError::Json { kind, source };

    match kind {
        EventKind::Log => {
            let msg: LogMessage = serde_json::from_slice(payload).map_err(json_err)?;
            Ok(vec![IngestEvent::Log(NewLogEntry {
                message: msg.message,
                log_level: msg.level,
            })])
        }
        EventKind::Classification => {
            let msg: ClassificationMessage = serde_json::from_slice(payload).map_err(json_err)?;
            let mut events = Vec::with_capacity(
                1 + msg.anomaly_params.len() + msg.unidentified_params.len(),
            );
            events.push(IngestEvent::Classification(NewClassification {
                normal_count: msg.normal,
                anomaly_count: msg.anomaly,
                unidentified_count: msg.unidentified,
            }));
            for (params, tag) in [
                (msg.anomaly_params, ClassificationType::Anomaly),
                (msg.unidentified_params, ClassificationType::Unidentified),
            ] {
                events.extend(params.into_iter().map(|p| {
                    IngestEvent::AnomalyParam(NewAnomalyParam {
                        param_value: param_text(p.value),
                        classification_type: tag,
                    })
                }));
            }
            Ok(events)
        }
        EventKind::AnomalyParam => {
            let msg: ParamMessage = serde_json::from_slice(payload).map_err(json_err)?;
            Ok(vec![IngestEvent::AnomalyParam(NewAnomalyParam {
                param_value: param_text(msg.param_value),
                classification_type: msg.classification_type,
            })])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_defaults_to_info() {
        let events = decode_message(EventKind::Log, br#"{"message":"hello"}"#).unwrap();
        assert_eq!(
            events,
            vec![IngestEvent::Log(NewLogEntry {
                message: "hello".to_string(),
                log_level: "INFO".to_string(),
            })]
        );
    }

    #[test]
    fn classification_expands_embedded_params_in_order() {
        let payload = br#"{
            "normal": 90, "anomaly": 2, "unidentified": 1,
            "anomaly_params": [{"value": "Corrupted block: blk_1"}, {"value": 42}],
            "unidentified_params": [{"value": "Unknown block status: blk_2"}]
        }"#;
        let events = decode_message(EventKind::Classification, payload).unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            IngestEvent::Classification(NewClassification {
                normal_count: 90,
                anomaly_count: 2,
                unidentified_count: 1,
            })
        );
        let params: Vec<(String, ClassificationType)> = events[1..]
            .iter()
            .map(|e| match e {
                IngestEvent::AnomalyParam(p) => (p.param_value.clone(), p.classification_type),
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(
            params,
            vec![
                ("Corrupted block: blk_1".to_string(), ClassificationType::Anomaly),
                ("42".to_string(), ClassificationType::Anomaly),
                ("Unknown block status: blk_2".to_string(), ClassificationType::Unidentified),
            ]
        );
    }

    #[test]
    fn missing_counts_default_to_zero() {
        let events = decode_message(EventKind::Classification, br#"{"anomaly": 3}"#).unwrap();
        assert_eq!(
            events,
            vec![IngestEvent::Classification(NewClassification {
                normal_count: 0,
                anomaly_count: 3,
                unidentified_count: 0,
            })]
        );
    }

    #[test]
    fn param_accepts_value_alias_and_tag() {
        let events = decode_message(
            EventKind::AnomalyParam,
            br#"{"value": "Missing replicas: blk_9", "classification_type": "unidentified"}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![IngestEvent::AnomalyParam(NewAnomalyParam {
                param_value: "Missing replicas: blk_9".to_string(),
                classification_type: ClassificationType::Unidentified,
            })]
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(decode_message(EventKind::Log, b"not json").is_err());
        assert!(decode_message(EventKind::Log, br#"{"level":"INFO"}"#).is_err());
        assert!(decode_message(EventKind::Classification, br#"{"normal": -1}"#).is_err());
        assert!(decode_message(
            EventKind::AnomalyParam,
            br#"{"param_value": "x", "classification_type": "normal"}"#
        )
        .is_err());
    }
}
