use crate::domain::channel::{DynMessageHandler, HandlerError, MessageHandler, TypedHandlerWrapper};
use crate::domain::message::{Envelope, Message, Topic};
use crate::domain::port::{ChannelError, Logger, MessageChannel};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Mutex, RwLock};

const COMPONENT: &str = "InMemoryMessageChannel";

/// デッドレターキューエントリ
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub envelope: Envelope,
    pub handler_name: String,
    pub error: String,
    pub attempt_count: u32,
    pub is_retryable: bool,
    pub added_at: SystemTime,
}

/// メッセージチャネル設定
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// 最大試行回数
    pub max_retry_attempts: u32,
    /// リトライ間隔
    pub retry_delay: Duration,
    /// デッドレターキューの最大サイズ
    pub dead_letter_queue_max_size: usize,
    /// ハンドラータイムアウト
    pub handler_timeout: Duration,
    /// 購読ごとのパーティション数
    pub partitions: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            dead_letter_queue_max_size: 1000,
            handler_timeout: Duration::from_secs(30),
            partitions: 4,
        }
    }
}

/// 購読1件分の情報
/// パーティションごとに1つのワーカーが順番に処理する
struct Subscription {
    topic: Topic,
    handler_name: String,
    partitions: Vec<mpsc::UnboundedSender<Envelope>>,
}

/// ワーカー間で共有する配信処理
struct Dispatcher {
    config: ChannelConfig,
    dead_letter_queue: Mutex<VecDeque<DeadLetterEntry>>,
    logger: Arc<dyn Logger>,
}

impl Dispatcher {
    /// ハンドラーの実行（エラー処理とリトライ機能付き）
    async fn execute_handler_with_retry(
        &self,
        handler: &dyn DynMessageHandler,
        envelope: &Envelope,
    ) -> Result<(), (HandlerError, u32)> {
        let mut attempts = 0;
        let mut last_error = None;

        // スキーマバージョンの互換性チェック
        let version = envelope.metadata.schema_version;
        if !handler.supports_schema_version(version) {
            return Err((
                HandlerError::PermanentError(format!(
                    "Handler {} does not support schema version {}",
                    handler.handler_name(),
                    version
                )),
                0,
            ));
        }

        let max_attempts = self.config.max_retry_attempts.max(1);
        while attempts < max_attempts {
            attempts += 1;

            // タイムアウト付きでハンドラーを実行
            let result =
                tokio::time::timeout(self.config.handler_timeout, handler.handle_envelope(envelope))
                    .await;

            match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(handler_error)) => {
                    let permanent = handler_error.is_permanent();
                    last_error = Some(handler_error);

                    // 永続的エラーの場合はリトライしない
                    if permanent {
                        break;
                    }
                }
                Err(_elapsed) => {
                    last_error = Some(HandlerError::TransientError("Handler timeout".to_string()));
                }
            }

            // 最後の試行でない場合は待機
            if attempts < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err((
            last_error.unwrap_or(HandlerError::ProcessingFailed("Unknown error".to_string())),
            attempts,
        ))
    }

    /// 1件の封筒をハンドラーに配信し、失敗したらデッドレターキューに送る
    async fn deliver(&self, handler: &dyn DynMessageHandler, envelope: Envelope) {
        if let Err((error, attempts)) = self.execute_handler_with_retry(handler, &envelope).await {
            let mut context = HashMap::new();
            context.insert("topic".to_string(), envelope.topic.to_string());
            context.insert("handler".to_string(), handler.handler_name().to_string());
            context.insert("attempts".to_string(), attempts.to_string());
            self.logger.error(
                COMPONENT,
                &format!("Message delivery failed: {}", error),
                Some(envelope.key.as_uuid()),
                Some(context),
            );

            self.add_to_dead_letter_queue(envelope, handler.handler_name().to_string(), &error, attempts)
                .await;
        }
    }

    /// 失敗したメッセージをデッドレターキューに追加
    async fn add_to_dead_letter_queue(
        &self,
        envelope: Envelope,
        handler_name: String,
        error: &HandlerError,
        attempt_count: u32,
    ) {
        let mut dlq = self.dead_letter_queue.lock().await;

        // キューサイズの制限チェック
        if dlq.len() >= self.config.dead_letter_queue_max_size {
            dlq.pop_front();
        }

        dlq.push_back(DeadLetterEntry {
            envelope,
            handler_name,
            error: error.to_string(),
            attempt_count,
            is_retryable: matches!(error, HandlerError::TransientError(_)),
            added_at: SystemTime::now(),
        });
    }
}

/// インメモリのメッセージチャネル
/// トピックごとの購読をキーでパーティション分割し、同じキーのメッセージは発行順に届く
/// 異なるキーのメッセージは並行して処理される
#[derive(Clone)]
pub struct InMemoryMessageChannel {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    dispatcher: Arc<Dispatcher>,
}

impl InMemoryMessageChannel {
    /// 設定を指定してチャネルを作成
    ///
    /// # 例
    /// ```no_run
    /// use order_discount_saga::adapter::driven::{ChannelConfig, InMemoryMessageChannel, TracingLogger};
    /// use std::sync::Arc;
    ///
    /// let config = ChannelConfig {
    ///     max_retry_attempts: 5,
    ///     retry_delay: std::time::Duration::from_millis(50),
    ///     ..ChannelConfig::default()
    /// };
    /// let channel = InMemoryMessageChannel::new(config, Arc::new(TracingLogger::new()));
    /// ```
    pub fn new(config: ChannelConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            dispatcher: Arc::new(Dispatcher {
                config,
                dead_letter_queue: Mutex::new(VecDeque::new()),
                logger,
            }),
        }
    }

    /// メッセージ型のハンドラーを購読として登録
    /// 登録時にパーティション数分のワーカーを起動する
    pub async fn subscribe<M, H>(&self, handler: H) -> Result<(), ChannelError>
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let wrapped: Arc<dyn DynMessageHandler> = Arc::new(TypedHandlerWrapper::<M, H>::new(handler));
        self.subscribe_dyn(wrapped).await
    }

    /// 型消去済みのハンドラーを購読として登録
    pub async fn subscribe_dyn(
        &self,
        handler: Arc<dyn DynMessageHandler>,
    ) -> Result<(), ChannelError> {
        let partition_count = self.dispatcher.config.partitions;
        if partition_count == 0 {
            return Err(ChannelError::SubscriptionFailed(
                "partitions must be at least 1".to_string(),
            ));
        }

        let mut partitions = Vec::with_capacity(partition_count);
        for _ in 0..partition_count {
            let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();
            let handler = handler.clone();
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                while let Some(envelope) = receiver.recv().await {
                    dispatcher.deliver(handler.as_ref(), envelope).await;
                }
            });
            partitions.push(sender);
        }

        let mut context = HashMap::new();
        context.insert("topic".to_string(), handler.topic().to_string());
        context.insert("partitions".to_string(), partition_count.to_string());
        self.dispatcher.logger.debug(
            COMPONENT,
            &format!("Subscribed {}", handler.handler_name()),
            None,
            Some(context),
        );

        self.subscriptions.write().await.push(Subscription {
            topic: handler.topic(),
            handler_name: handler.handler_name().to_string(),
            partitions,
        });
        Ok(())
    }

    /// デッドレターキューの内容を取得
    pub async fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dispatcher
            .dead_letter_queue
            .lock()
            .await
            .iter()
            .cloned()
            .collect()
    }

    /// 購読しているハンドラー名の一覧
    pub async fn subscribers(&self, topic: Topic) -> Vec<String> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.handler_name.clone())
            .collect()
    }

    fn partition_for(envelope: &Envelope, partition_count: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        envelope.key.hash(&mut hasher);
        (hasher.finish() % partition_count as u64) as usize
    }
}

#[async_trait]
impl MessageChannel for InMemoryMessageChannel {
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0usize;

        for subscription in subscriptions.iter().filter(|s| s.topic == envelope.topic) {
            let index = Self::partition_for(&envelope, subscription.partitions.len());
            subscription.partitions[index]
                .send(envelope.clone())
                .map_err(|_| {
                    ChannelError::PublishingFailed(format!(
                        "Worker for {} is not running",
                        subscription.handler_name
                    ))
                })?;
            delivered += 1;
        }

        if delivered == 0 {
            self.dispatcher.logger.debug(
                COMPONENT,
                &format!("No subscribers for topic {}", envelope.topic),
                Some(envelope.key.as_uuid()),
                None,
            );
        }

        Ok(())
    }
}
