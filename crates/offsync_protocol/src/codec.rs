//! Queue codec.
//!
//! The persisted queue is a JSON array of [`QueuedOperation`]s in replay order.

use crate::error::ProtocolResult;
use crate::operation::QueuedOperation;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a queue to its persisted JSON form.
pub fn encode_queue<P: Serialize>(operations: &[QueuedOperation<P>]) -> ProtocolResult<String> {
    Ok(serde_json::to_string(operations)?)
}

/// Decodes a persisted queue. Blank input decodes to an empty queue.
pub fn decode_queue<P: DeserializeOwned>(data: &str) -> ProtocolResult<Vec<QueuedOperation<P>>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::operation::OperationKind;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[test]
    fn queue_roundtrip_preserves_order() {
        let mut ops = vec![
            QueuedOperation::new(OperationKind::Create, "widgets", json!({"name": "x"})),
            QueuedOperation::new(OperationKind::Update, "widgets", json!({"id": 1, "name": "y"})),
            QueuedOperation::new(OperationKind::Delete, "gadgets", json!("g-9")),
        ];
        ops[1].retry_count = 2;

        let encoded = encode_queue(&ops).unwrap();
        let decoded: Vec<QueuedOperation<Value>> = decode_queue(&encoded).unwrap();

        assert_eq!(decoded, ops);
    }

    #[test]
    fn blank_input_is_empty_queue() {
        let decoded: Vec<QueuedOperation> = decode_queue("  \n").unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn corrupt_input_is_error() {
        let result: ProtocolResult<Vec<QueuedOperation>> = decode_queue("{not json");
        assert!(matches!(result, Err(ProtocolError::Codec(_))));

        let result: ProtocolResult<Vec<QueuedOperation>> = decode_queue(r#"[{"id": 1}]"#);
        assert!(matches!(result, Err(ProtocolError::Codec(_))));
    }

    #[test]
    fn typed_payloads() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Widget {
            name: String,
            count: u32,
        }

        let ops = vec![QueuedOperation::new(
            OperationKind::Create,
            "widgets",
            Widget {
                name: "bolt".into(),
                count: 3,
            },
        )];

        let encoded = encode_queue(&ops).unwrap();
        let decoded: Vec<QueuedOperation<Widget>> = decode_queue(&encoded).unwrap();
        assert_eq!(decoded[0].payload.count, 3);
        assert_eq!(decoded, ops);
    }
}
