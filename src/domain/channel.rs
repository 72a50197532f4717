use crate::domain::message::{Envelope, Message, Topic};
use crate::domain::model::CorrelationId;
use crate::domain::serialization::{MessageSerializer, SerializationError};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// メッセージハンドラーエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Domain error: {0}")]
    DomainError(String),
    #[error("Transient error (retryable): {0}")]
    TransientError(String),
    #[error("Permanent error (not retryable): {0}")]
    PermanentError(String),
}

impl HandlerError {
    /// 再試行しても結果が変わらないエラーか
    /// リポジトリの失敗は TransientError として届く
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            HandlerError::PermanentError(_) | HandlerError::DomainError(_)
        )
    }
}

/// メッセージハンドラートレイト
/// 特定のメッセージ型を処理するハンドラーを定義
#[async_trait]
pub trait MessageHandler<M>: Send + Sync {
    /// 復元したメッセージを処理する
    ///
    /// # Arguments
    /// * `key` - 封筒のキー（相関ID）
    /// * `message` - 復元したメッセージ
    async fn handle(&self, key: CorrelationId, message: M) -> Result<(), HandlerError>;

    /// ペイロードを復元できなかったメッセージを処理する
    /// 既定では再試行しないエラーとして扱う
    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        let _ = key;
        Err(HandlerError::PermanentError(error.to_string()))
    }
}

#[async_trait]
impl<M, H> MessageHandler<M> for Arc<H>
where
    M: Send + 'static,
    H: MessageHandler<M> + ?Sized,
{
    async fn handle(&self, key: CorrelationId, message: M) -> Result<(), HandlerError> {
        (**self).handle(key, message).await
    }

    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        (**self).handle_malformed(key, error).await
    }
}

/// 型消去されたメッセージハンドラー
/// 異なるメッセージ型のハンドラーを統一的に扱うため
#[async_trait]
pub trait DynMessageHandler: Send + Sync {
    async fn handle_envelope(&self, envelope: &Envelope) -> Result<(), HandlerError>;
    fn topic(&self) -> Topic;
    fn handler_name(&self) -> &str;
    fn supports_schema_version(&self, version: u32) -> bool;
}

/// 封筒を指定のメッセージ型に復元してからハンドラーに渡すラッパー
pub struct TypedHandlerWrapper<M, H>
where
    M: Message,
    H: MessageHandler<M>,
{
    handler: H,
    name: String,
    serializer: MessageSerializer,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> TypedHandlerWrapper<M, H>
where
    M: Message,
    H: MessageHandler<M>,
{
    pub fn new(handler: H) -> Self {
        Self::with_name(handler, format!("{}Handler", M::TYPE_NAME))
    }

    pub fn with_name(handler: H, name: String) -> Self {
        Self {
            handler,
            name,
            serializer: MessageSerializer::new(),
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, H> DynMessageHandler for TypedHandlerWrapper<M, H>
where
    M: Message,
    H: MessageHandler<M>,
{
    async fn handle_envelope(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        match self.serializer.decode::<M>(envelope) {
            Ok(message) => self.handler.handle(envelope.key, message).await,
            Err(SerializationError::TopicMismatch { expected, actual }) => {
                Err(HandlerError::ProcessingFailed(format!(
                    "Topic mismatch: expected {}, found {}",
                    expected, actual
                )))
            }
            Err(error) => self.handler.handle_malformed(envelope.key, error).await,
        }
    }

    fn topic(&self) -> Topic {
        M::TOPIC
    }

    fn handler_name(&self) -> &str {
        &self.name
    }

    fn supports_schema_version(&self, version: u32) -> bool {
        self.serializer.supports_version(version)
    }
}
