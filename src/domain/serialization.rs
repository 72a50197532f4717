use crate::domain::message::{Envelope, Message, MessageMetadata, CURRENT_SCHEMA_VERSION};
use crate::domain::model::CorrelationId;
use thiserror::Error;

/// シリアライゼーションエラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SerializationError {
    #[error("JSON serialization failed: {message}. Message type: {message_type}")]
    JsonSerializationFailed {
        message: String,
        message_type: String,
    },

    #[error("JSON deserialization failed: {message}. Expected type: {expected_type}, Input: {input_preview}")]
    JsonDeserializationFailed {
        message: String,
        expected_type: String,
        input_preview: String,
    },

    #[error("Schema version incompatibility: Expected version {expected}, found {actual}. Message type: {message_type}")]
    SchemaVersionIncompatible {
        expected: u32,
        actual: u32,
        message_type: String,
    },

    #[error("Topic mismatch: expected {expected}, found {actual}")]
    TopicMismatch { expected: String, actual: String },
}

impl SerializationError {
    /// 入力データのプレビューを生成（デバッグ用、最大100文字）
    fn create_input_preview(input: &str) -> String {
        if input.chars().count() <= 100 {
            input.to_string()
        } else {
            let head: String = input.chars().take(97).collect();
            format!("{}...", head)
        }
    }

    /// JSONデシリアライゼーションエラーを作成
    pub fn json_deserialization_failed(
        message: String,
        expected_type: String,
        input: &str,
    ) -> Self {
        Self::JsonDeserializationFailed {
            message,
            expected_type,
            input_preview: Self::create_input_preview(input),
        }
    }
}

/// メッセージシリアライザー
/// メッセージと封筒の相互変換を行う
#[derive(Debug, Clone)]
pub struct MessageSerializer {
    /// サポートするスキーマバージョンの範囲
    supported_versions: std::ops::RangeInclusive<u32>,
}

impl MessageSerializer {
    /// 新しいメッセージシリアライザーを作成
    pub fn new() -> Self {
        Self {
            supported_versions: 1..=CURRENT_SCHEMA_VERSION,
        }
    }

    /// メッセージを封筒に詰める
    ///
    /// # Arguments
    /// * `key` - パーティションキー（相関ID）
    /// * `message` - 送信するメッセージ
    pub fn encode<M: Message>(
        &self,
        key: CorrelationId,
        message: &M,
    ) -> Result<Envelope, SerializationError> {
        let payload = serde_json::to_string(message).map_err(|e| {
            SerializationError::JsonSerializationFailed {
                message: e.to_string(),
                message_type: M::TYPE_NAME.to_string(),
            }
        })?;

        Ok(Envelope {
            metadata: MessageMetadata::new(),
            topic: M::TOPIC,
            key,
            payload,
        })
    }

    /// 封筒からメッセージを取り出す
    pub fn decode<M: Message>(&self, envelope: &Envelope) -> Result<M, SerializationError> {
        if envelope.topic != M::TOPIC {
            return Err(SerializationError::TopicMismatch {
                expected: M::TOPIC.to_string(),
                actual: envelope.topic.to_string(),
            });
        }

        let version = envelope.metadata.schema_version;
        if !self.supported_versions.contains(&version) {
            return Err(SerializationError::SchemaVersionIncompatible {
                expected: *self.supported_versions.end(),
                actual: version,
                message_type: M::TYPE_NAME.to_string(),
            });
        }

        if envelope.payload.trim().is_empty() {
            return Err(SerializationError::json_deserialization_failed(
                "Empty JSON input".to_string(),
                M::TYPE_NAME.to_string(),
                "",
            ));
        }

        serde_json::from_str::<M>(&envelope.payload).map_err(|e| {
            SerializationError::json_deserialization_failed(
                e.to_string(),
                M::TYPE_NAME.to_string(),
                &envelope.payload,
            )
        })
    }

    /// スキーマバージョンをサポートしているか
    pub fn supports_version(&self, version: u32) -> bool {
        self.supported_versions.contains(&version)
    }
}

impl Default for MessageSerializer {
    fn default() -> Self {
        Self::new()
    }
}
