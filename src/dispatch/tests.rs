//! End-to-end scheduling scenarios over the in-memory backends.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use serde_json::json;
use tokio::sync::Notify;
use uuid::Uuid;

use super::*;
use crate::config::settings::{PlatformsConfig, TelegramPlatformConfig};
use crate::config::{ClaimStrategy, SchedulerConfig};
use crate::error::{AppError, AppResult};
use crate::lock::{GLOBAL_PROCESSING_LOCK, LockManager, LockToken, MemoryLockManager, job_lock_key};
use crate::models::{
    DeliveryContext, DeliveryFilter, DeliveryPatch, DeliveryStatus, DispatchTarget, Integration,
    IntegrationDeliveryCount, IntegrationStatus, Message, MessageCounts, MessageDelivery,
    NewDelivery, NewMessage, PlatformKind, SelectedConversation,
};
use crate::platforms::{AdapterRegistry, PlatformAdapter, SendOutcome};
use crate::queue::{CoordinationError, MemoryWorkIndex, ReadyQueue, WorkIndex};
use crate::store::{DeliveryStore, MemoryDeliveryStore};

// ============================================================================
// Scripted adapter
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Deliver(&'static str),
    Reject(&'static str),
    Error,
    Panic,
}

/// Adapter answering from a per-conversation script, then a default step.
struct ScriptedAdapter {
    default: Step,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Duration,
}

impl ScriptedAdapter {
    fn new(default: Step) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn script(self, conversation: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(conversation.to_string(), steps.into());
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Telegram
    }

    async fn send(&self, conversation_external_id: &str, content: &str) -> AppResult<SendOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((conversation_external_id.to_string(), content.to_string()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(conversation_external_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone());

        match step {
            Step::Deliver(id) => Ok(SendOutcome::delivered(Some(id.to_string()))),
            Step::Reject(error) => Ok(SendOutcome::rejected(error)),
            Step::Error => Err(AppError::ExternalApi {
                platform: "telegram".to_string(),
                message: "connection reset".to_string(),
                source: None,
            }),
            Step::Panic => panic!("adapter exploded"),
        }
    }
}

// ============================================================================
// Backend doubles
// ============================================================================

/// Work index whose `fail_on`-th enqueue fails.
struct FailingEnqueue {
    inner: MemoryWorkIndex,
    fail_on: usize,
    enqueues: AtomicUsize,
}

impl FailingEnqueue {
    fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryWorkIndex::new(),
            fail_on,
            enqueues: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkIndex for FailingEnqueue {
    async fn enqueue(&self, member: &str, due_at_ms: i64) -> Result<(), CoordinationError> {
        if self.enqueues.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(CoordinationError::Connection("connection refused".to_string()));
        }
        self.inner.enqueue(member, due_at_ms).await
    }

    async fn range_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        self.inner.range_ready(max_due_ms, limit).await
    }

    async fn remove(&self, members: &[String]) -> Result<usize, CoordinationError> {
        self.inner.remove(members).await
    }

    async fn pop_ready(
        &self,
        max_due_ms: i64,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        self.inner.pop_ready(max_due_ms, limit).await
    }

    async fn len(&self) -> Result<usize, CoordinationError> {
        self.inner.len().await
    }
}

/// Parks the first holder of the global claim lock until `resume` fires.
struct ParkedGlobalLock {
    inner: MemoryLockManager,
    armed: AtomicBool,
    acquired: Notify,
    resume: Notify,
}

impl ParkedGlobalLock {
    fn new() -> Self {
        Self {
            inner: MemoryLockManager::new(),
            armed: AtomicBool::new(true),
            acquired: Notify::new(),
            resume: Notify::new(),
        }
    }
}

#[async_trait]
impl LockManager for ParkedGlobalLock {
    async fn try_acquire(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let acquired = self.inner.try_acquire(key, token, ttl).await?;
        if acquired && key == GLOBAL_PROCESSING_LOCK && self.armed.swap(false, Ordering::SeqCst) {
            self.acquired.notify_one();
            self.resume.notified().await;
        }
        Ok(acquired)
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, CoordinationError> {
        self.inner.release(key, token).await
    }
}

/// Memory store whose re-arm of one failed delivery errors.
struct RearmFailsFor {
    inner: Arc<MemoryDeliveryStore>,
    delivery_id: Uuid,
}

#[async_trait]
impl DeliveryStore for RearmFailsFor {
    async fn create_message(&self, new_message: NewMessage) -> AppResult<Message> {
        self.inner.create_message(new_message).await
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        self.inner.get_message(id).await
    }

    async fn update_message_sent_at_if_null(
        &self,
        message_id: Uuid,
        sent_at: Timestamp,
    ) -> AppResult<bool> {
        self.inner.update_message_sent_at_if_null(message_id, sent_at).await
    }

    async fn create_deliveries(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.inner.create_deliveries(deliveries).await
    }

    async fn update_delivery_if_status(
        &self,
        id: Uuid,
        expected: &[DeliveryStatus],
        patch: &DeliveryPatch,
    ) -> AppResult<usize> {
        if id == self.delivery_id && expected.contains(&DeliveryStatus::Failed) {
            return Err(AppError::Database {
                operation: "update_delivery_if_status".to_string(),
                source: anyhow::anyhow!("connection reset by peer"),
            });
        }
        self.inner.update_delivery_if_status(id, expected, patch).await
    }

    async fn find_deliveries_by_status(
        &self,
        status: DeliveryStatus,
        filter: &DeliveryFilter,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.inner.find_deliveries_by_status(status, filter, limit).await
    }

    async fn find_overdue_scheduled(
        &self,
        due_before: Timestamp,
        limit: i64,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.inner.find_overdue_scheduled(due_before, limit).await
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<MessageDelivery> {
        self.inner.get_delivery(id).await
    }

    async fn list_deliveries_for_message(
        &self,
        message_id: Uuid,
    ) -> AppResult<Vec<MessageDelivery>> {
        self.inner.list_deliveries_for_message(message_id).await
    }

    async fn count_deliveries_by_status(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(DeliveryStatus, i64)>> {
        self.inner.count_deliveries_by_status(user_id).await
    }

    async fn count_messages(&self, user_id: Uuid, now: Timestamp) -> AppResult<MessageCounts> {
        self.inner.count_messages(user_id, now).await
    }

    async fn count_deliveries_by_integration(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<IntegrationDeliveryCount>> {
        self.inner.count_deliveries_by_integration(user_id).await
    }

    async fn find_dispatch_targets(
        &self,
        user_id: Uuid,
        integration_ids: Option<&[Uuid]>,
    ) -> AppResult<Vec<DispatchTarget>> {
        self.inner.find_dispatch_targets(user_id, integration_ids).await
    }

    async fn load_delivery_context(&self, delivery_id: Uuid) -> AppResult<DeliveryContext> {
        self.inner.load_delivery_context(delivery_id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: Arc<MemoryDeliveryStore>,
    index: Arc<MemoryWorkIndex>,
    locks: Arc<MemoryLockManager>,
    adapter: Arc<ScriptedAdapter>,
    engine: FanoutEngine,
    scheduler: Arc<DeliveryScheduler>,
    user_id: Uuid,
    integration: Integration,
    conversations: Vec<SelectedConversation>,
}

impl Harness {
    async fn new(adapter: ScriptedAdapter, conversation_ids: &[&str]) -> Self {
        Self::with_strategy(adapter, conversation_ids, ClaimStrategy::Atomic).await
    }

    async fn with_strategy(
        adapter: ScriptedAdapter,
        conversation_ids: &[&str],
        strategy: ClaimStrategy,
    ) -> Self {
        let store = Arc::new(MemoryDeliveryStore::new());
        let user_id = Uuid::new_v4();

        let integration = Integration {
            id: Uuid::new_v4(),
            user_id,
            name: "Ops bot".to_string(),
            platform: PlatformKind::Telegram,
            status: IntegrationStatus::Connected,
            config: json!({ "botToken": "1:test" }),
        };
        store.insert_integration(integration.clone()).unwrap();

        let conversations: Vec<SelectedConversation> = conversation_ids
            .iter()
            .map(|external_id| SelectedConversation {
                id: Uuid::new_v4(),
                integration_id: integration.id,
                external_id: external_id.to_string(),
                name: format!("chat {external_id}"),
                conversation_type: "group".to_string(),
                active: true,
                created_at: Timestamp::now(),
            })
            .collect();
        for conversation in &conversations {
            store.insert_conversation(conversation.clone()).unwrap();
        }

        let index = Arc::new(MemoryWorkIndex::new());
        let locks = Arc::new(MemoryLockManager::new());
        let adapter = Arc::new(adapter);
        let (engine, scheduler) = build_instance(
            store.clone(),
            index.clone(),
            locks.clone(),
            scripted_registry(&adapter),
            strategy,
        );

        Self {
            store,
            index,
            locks,
            adapter,
            engine,
            scheduler,
            user_id,
            integration,
            conversations,
        }
    }

    /// Replaces engine and scheduler, keeping the shared backends.
    fn rewire(&mut self, registry: Arc<AdapterRegistry>, strategy: ClaimStrategy) {
        let (engine, scheduler) = build_instance(
            self.store.clone(),
            self.index.clone(),
            self.locks.clone(),
            registry,
            strategy,
        );
        self.engine = engine;
        self.scheduler = scheduler;
    }

    /// Another scheduler instance over the same store, index and locks.
    fn instance(&self, locks: Arc<dyn LockManager>, strategy: ClaimStrategy) -> Arc<DeliveryScheduler> {
        let registry = scripted_registry(&self.adapter);
        build_instance(self.store.clone(), self.index.clone(), locks, registry, strategy).1
    }

    fn targets(&self) -> Vec<DispatchTarget> {
        vec![DispatchTarget {
            integration: self.integration.clone(),
            conversations: self.conversations.clone(),
        }]
    }

    async fn message(&self, scheduled_for: Option<Timestamp>) -> Message {
        self.store
            .create_message(NewMessage {
                user_id: self.user_id,
                content: "Deploy finished".to_string(),
                scheduled_for,
            })
            .await
            .unwrap()
    }

    async fn statuses(&self, message_id: Uuid) -> Vec<DeliveryStatus> {
        self.store
            .list_deliveries_for_message(message_id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.status)
            .collect()
    }
}

fn scripted_registry(adapter: &Arc<ScriptedAdapter>) -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    let adapter = adapter.clone();
    registry.register(PlatformKind::Telegram, move |_| {
        Ok(adapter.clone() as Arc<dyn PlatformAdapter>)
    });
    Arc::new(registry)
}

fn build_instance(
    store: Arc<dyn DeliveryStore>,
    index: Arc<dyn WorkIndex>,
    locks: Arc<dyn LockManager>,
    registry: Arc<AdapterRegistry>,
    strategy: ClaimStrategy,
) -> (FanoutEngine, Arc<DeliveryScheduler>) {
    let config = SchedulerConfig {
        claim_strategy: strategy,
        ..SchedulerConfig::default()
    };
    let queue = ReadyQueue::new(index, locks.clone(), strategy, config.global_lock_ttl());
    let engine = FanoutEngine::new(store.clone(), queue.clone(), registry);
    let sweeper = Arc::new(RetrySweeper::new(store.clone(), engine.clone(), &config));
    let scheduler = Arc::new(DeliveryScheduler::new(
        queue,
        locks,
        store,
        engine.clone(),
        sweeper,
        config,
    ));
    (engine, scheduler)
}

fn minutes(n: i64) -> SignedDuration {
    SignedDuration::from_mins(n)
}

// ============================================================================
// Scenario A: immediate send to two conversations
// ============================================================================

#[tokio::test]
async fn test_immediate_send_to_two_conversations() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("m-1")), &["c1", "c2"]).await;
    let message = h.message(None).await;

    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();

    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(report.sent_count(), 2);
    assert_eq!(h.adapter.call_count(), 2);

    let mut called: Vec<String> = h.adapter.calls().into_iter().map(|(c, _)| c).collect();
    called.sort();
    assert_eq!(called, vec!["c1", "c2"]);

    for delivery in h.store.list_deliveries_for_message(message.id).await.unwrap() {
        assert_eq!(delivery.status, DeliveryStatus::Sent);
        assert_eq!(delivery.external_id.as_deref(), Some("m-1"));
        assert_eq!(delivery.retry_count, 0);
        assert!(delivery.sent_at.is_some());
        assert!(delivery.error_message.is_none());
    }
    assert!(h.store.get_message(message.id).await.unwrap().sent_at.is_some());
    assert_eq!(h.index.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_targets_collapse() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1", "c2"]).await;
    let message = h.message(None).await;

    let mut targets = h.targets();
    targets.push(targets[0].clone());
    let mut inactive = h.conversations[0].clone();
    inactive.id = Uuid::new_v4();
    inactive.active = false;
    targets[0].conversations.push(inactive);

    let report = h.engine.fan_out(&message, &targets).await.unwrap();
    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(h.adapter.call_count(), 2);
}

#[tokio::test]
async fn test_disconnected_integration_and_no_targets() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    let message = h.message(None).await;

    let mut targets = h.targets();
    targets[0].integration.status = IntegrationStatus::Expired;

    let report = h.engine.fan_out(&message, &targets).await.unwrap();
    assert!(report.deliveries.is_empty());
    assert!(report.outcomes.is_empty());

    let report = h.engine.fan_out(&message, &[]).await.unwrap();
    assert!(report.deliveries.is_empty());
    assert_eq!(h.adapter.call_count(), 0);
}

#[tokio::test]
async fn test_one_failing_sibling_does_not_affect_others() {
    let adapter = ScriptedAdapter::new(Step::Deliver("ok"))
        .script("c2", vec![Step::Panic])
        .script("c3", vec![Step::Error]);
    let h = Harness::new(adapter, &["c1", "c2", "c3"]).await;
    let message = h.message(None).await;

    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    assert_eq!(report.sent_count(), 1);

    let deliveries = h.store.list_deliveries_for_message(message.id).await.unwrap();
    let by_conversation = |external_id: &str| {
        let conversation = h
            .conversations
            .iter()
            .find(|c| c.external_id == external_id)
            .unwrap();
        deliveries
            .iter()
            .find(|d| d.selected_conversation_id == conversation.id)
            .unwrap()
            .clone()
    };

    assert_eq!(by_conversation("c1").status, DeliveryStatus::Sent);

    let panicked = by_conversation("c2");
    assert_eq!(panicked.status, DeliveryStatus::Failed);
    assert!(panicked.error_message.unwrap().contains("adapter exploded"));
    assert_eq!(panicked.retry_count, 1);

    let errored = by_conversation("c3");
    assert_eq!(errored.status, DeliveryStatus::Failed);
    assert!(errored.error_message.unwrap().contains("connection reset"));

    // Partial success still marks the message as sent.
    assert!(h.store.get_message(message.id).await.unwrap().sent_at.is_some());
}

#[tokio::test]
async fn test_misconfigured_integration_fails_delivery() {
    let mut h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    // No adapter registered for Telegram.
    h.rewire(Arc::new(AdapterRegistry::new()), ClaimStrategy::Atomic);
    let message = h.message(None).await;

    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    assert!(matches!(
        report.outcomes[0].1,
        SendDisposition::Failed { ref error } if error.contains("misconfigured")
    ));
    assert_eq!(h.statuses(message.id).await, vec![DeliveryStatus::Failed]);
    assert!(h.store.get_message(message.id).await.unwrap().sent_at.is_none());
}

#[tokio::test]
async fn test_unreachable_platform_error_keeps_token_out_of_record() {
    let mut h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    let platforms = PlatformsConfig {
        telegram: TelegramPlatformConfig {
            api_base: "http://127.0.0.1:1".to_string(),
        },
        ..PlatformsConfig::default()
    };
    h.rewire(
        Arc::new(AdapterRegistry::with_defaults(reqwest::Client::new(), &platforms)),
        ClaimStrategy::Atomic,
    );
    let message = h.message(None).await;

    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    let delivery = h.store.get_delivery(report.deliveries[0].id).await.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    let error = delivery.error_message.unwrap();
    assert!(error.contains("request failed"), "{error}");
    assert!(!error.contains("bot1:test"), "{error}");
}

// ============================================================================
// Scenario B: scheduled one hour ahead
// ============================================================================

#[tokio::test]
async fn test_scheduled_message_sent_when_due() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("s-1")), &["c1", "c2"]).await;
    let now = Timestamp::now();
    let due = now.checked_add(minutes(60)).unwrap();
    let message = h.message(Some(due)).await;

    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(
        h.statuses(message.id).await,
        vec![DeliveryStatus::Scheduled, DeliveryStatus::Scheduled]
    );
    assert_eq!(h.index.len().await.unwrap(), 2);

    // Not due yet.
    let tick = h.scheduler.tick_at(now).await.unwrap();
    assert_eq!(tick.claimed, 0);
    assert_eq!(h.adapter.call_count(), 0);

    let later = due.checked_add(SignedDuration::from_secs(1)).unwrap();
    let tick = h.scheduler.tick_at(later).await.unwrap();
    assert_eq!(tick.claimed, 2);
    assert_eq!(tick.sent, 2);
    assert_eq!(
        h.statuses(message.id).await,
        vec![DeliveryStatus::Sent, DeliveryStatus::Sent]
    );

    // Claimed jobs never come back.
    let tick = h.scheduler.tick_at(later).await.unwrap();
    assert_eq!(tick.claimed, 0);
    assert_eq!(h.adapter.call_count(), 2);
    assert_eq!(h.index.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_tick_respects_batch_limit() {
    let ids: Vec<String> = (0..15).map(|i| format!("c{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("b")), &refs).await;

    let now = Timestamp::now();
    let message = h.message(Some(now.checked_add(minutes(1)).unwrap())).await;
    h.engine.fan_out(&message, &h.targets()).await.unwrap();

    let later = now.checked_add(minutes(2)).unwrap();
    assert_eq!(h.scheduler.tick_at(later).await.unwrap().claimed, 10);
    assert_eq!(h.scheduler.tick_at(later).await.unwrap().claimed, 5);
}

#[tokio::test]
async fn test_tick_skips_job_locked_elsewhere() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    let now = Timestamp::now();
    let message = h.message(Some(now.checked_add(minutes(1)).unwrap())).await;
    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    let delivery_id = report.deliveries[0].id;

    let other = LockToken::generate();
    assert!(
        h.locks
            .try_acquire(&job_lock_key(delivery_id), &other, Duration::from_secs(300))
            .await
            .unwrap()
    );

    let tick = h
        .scheduler
        .tick_at(now.checked_add(minutes(2)).unwrap())
        .await
        .unwrap();
    assert_eq!(tick.claimed, 1);
    assert_eq!(tick.locked, 1);
    assert_eq!(h.adapter.call_count(), 0);
    // The row stays SCHEDULED; the job left the index with the claim.
    assert_eq!(h.statuses(message.id).await, vec![DeliveryStatus::Scheduled]);
    assert_eq!(h.index.len().await.unwrap(), 0);

    // Once the holder lets go and the grace period passes, the tick sends it.
    h.locks
        .release(&job_lock_key(delivery_id), &other)
        .await
        .unwrap();
    let tick = h
        .scheduler
        .tick_at(now.checked_add(minutes(10)).unwrap())
        .await
        .unwrap();
    assert_eq!(tick.claimed, 0);
    assert_eq!(tick.overdue, 1);
    assert_eq!(tick.sent, 1);
    assert_eq!(h.statuses(message.id).await, vec![DeliveryStatus::Sent]);
}

#[tokio::test]
async fn test_unindexed_scheduled_delivery_sent_once_overdue() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("o")), &["c1", "c2"]).await;
    let index = Arc::new(FailingEnqueue::new(2));
    let (engine, scheduler) = build_instance(
        h.store.clone(),
        index.clone(),
        h.locks.clone(),
        scripted_registry(&h.adapter),
        ClaimStrategy::Atomic,
    );

    let due = Timestamp::now().checked_add(minutes(60)).unwrap();
    let message = h.message(Some(due)).await;
    let report = engine.fan_out(&message, &h.targets()).await.unwrap();
    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(report.unindexed, 1);
    assert_eq!(index.len().await.unwrap(), 1);
    assert_eq!(
        h.statuses(message.id).await,
        vec![DeliveryStatus::Scheduled, DeliveryStatus::Scheduled]
    );

    // At the due time only the indexed job runs.
    let tick = scheduler
        .tick_at(due.checked_add(SignedDuration::from_secs(1)).unwrap())
        .await
        .unwrap();
    assert_eq!((tick.claimed, tick.overdue, tick.sent), (1, 0, 1));

    // Past the grace period the other one is picked up from the store.
    let later = due.checked_add(minutes(6)).unwrap();
    let tick = scheduler.tick_at(later).await.unwrap();
    assert_eq!((tick.claimed, tick.overdue, tick.sent), (0, 1, 1));
    assert_eq!(
        h.statuses(message.id).await,
        vec![DeliveryStatus::Sent, DeliveryStatus::Sent]
    );

    assert_eq!(scheduler.tick_at(later).await.unwrap(), TickReport::default());
    assert_eq!(h.adapter.call_count(), 2);
}

#[tokio::test]
async fn test_tick_drops_malformed_jobs() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    h.index.enqueue("not json", 1).await.unwrap();

    let tick = h.scheduler.tick_at(Timestamp::now()).await.unwrap();
    assert_eq!(tick.claimed, 0);
    assert_eq!(h.index.len().await.unwrap(), 0);
}

// ============================================================================
// Scenario C: rate limited, retried after the cool-down
// ============================================================================

#[tokio::test]
async fn test_rate_limited_delivery_retried_after_cooldown() {
    let adapter = ScriptedAdapter::new(Step::Deliver("r-1"))
        .script("c1", vec![Step::Reject("Message send failed: 429 - Too Many Requests")]);
    let h = Harness::new(adapter, &["c1"]).await;
    let message = h.message(None).await;

    h.engine.fan_out(&message, &h.targets()).await.unwrap();
    let failed = &h.store.list_deliveries_for_message(message.id).await.unwrap()[0];
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert!(failed.last_retry_at.is_some());
    assert!(failed.error_message.as_deref().unwrap().contains("429"));
    assert!(h.store.get_message(message.id).await.unwrap().sent_at.is_none());

    let sweeper = h.scheduler.sweeper();
    let now = Timestamp::now();

    // Inside the five minute cool-down.
    let report = sweeper.run_at(now.checked_add(minutes(1)).unwrap()).await.unwrap();
    assert_eq!(report.selected, 0);

    let report = sweeper.run_at(now.checked_add(minutes(6)).unwrap()).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.sent, 1);

    let sent = h.store.get_delivery(failed.id).await.unwrap();
    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.retry_count, 0);
    assert!(sent.error_message.is_none());
    assert_eq!(sent.external_id.as_deref(), Some("r-1"));
    assert!(h.store.get_message(message.id).await.unwrap().sent_at.is_some());
}

#[tokio::test]
async fn test_sweeper_stops_at_max_retries() {
    let h = Harness::new(ScriptedAdapter::new(Step::Reject("down")), &["c1"]).await;
    let message = h.message(None).await;
    h.engine.fan_out(&message, &h.targets()).await.unwrap();

    let sweeper = h.scheduler.sweeper();
    let start = Timestamp::now();
    for round in 1..=5 {
        let at = start.checked_add(minutes(6 * round)).unwrap();
        let report = sweeper.run_at(at).await.unwrap();
        if round <= 2 {
            assert_eq!(report.selected, 1, "round {round}");
            assert_eq!(report.failed, 1);
        } else {
            assert_eq!(report.selected, 0, "round {round}");
        }
    }

    let delivery = &h.store.list_deliveries_for_message(message.id).await.unwrap()[0];
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.retry_count, 3);
    assert_eq!(h.adapter.call_count(), 3);
}

#[tokio::test]
async fn test_sweeper_retries_rows_without_last_retry_at() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("n")), &["c1"]).await;
    let message = h.message(None).await;

    // A FAILED row that never got a retry stamp.
    let created = h
        .store
        .create_deliveries(vec![NewDelivery {
            message_id: message.id,
            integration_id: h.integration.id,
            selected_conversation_id: h.conversations[0].id,
            status: DeliveryStatus::Pending,
        }])
        .await
        .unwrap();
    let id = created[0].id;
    h.store
        .update_delivery_if_status(id, &[DeliveryStatus::Pending], &DeliveryPatch::claim())
        .await
        .unwrap();
    let mut patch = DeliveryPatch::failed("legacy", Timestamp::now());
    patch.last_retry_at = None;
    h.store
        .update_delivery_if_status(id, &[DeliveryStatus::Processing], &patch)
        .await
        .unwrap();

    let report = h.scheduler.sweeper().run_at(Timestamp::now()).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_sweeper_continues_past_store_error() {
    let adapter = ScriptedAdapter::new(Step::Deliver("again"))
        .script("c1", vec![Step::Reject("down")])
        .script("c2", vec![Step::Reject("down")]);
    let h = Harness::new(adapter, &["c1", "c2"]).await;
    let message = h.message(None).await;
    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    assert_eq!(
        h.statuses(message.id).await,
        vec![DeliveryStatus::Failed, DeliveryStatus::Failed]
    );

    let broken = report.deliveries[0].id;
    let store = Arc::new(RearmFailsFor {
        inner: h.store.clone(),
        delivery_id: broken,
    });
    let (_, scheduler) = build_instance(
        store,
        h.index.clone(),
        h.locks.clone(),
        scripted_registry(&h.adapter),
        ClaimStrategy::Atomic,
    );

    let at = Timestamp::now().checked_add(minutes(6)).unwrap();
    let sweep = scheduler.sweeper().run_at(at).await.unwrap();
    assert_eq!(sweep.selected, 2);
    assert_eq!(sweep.sent, 1);
    assert_eq!(sweep.failed, 1);

    let untouched = h.store.get_delivery(broken).await.unwrap();
    assert_eq!(untouched.status, DeliveryStatus::Failed);
    assert_eq!(untouched.retry_count, 1);
    assert_eq!(h.store.get_delivery(report.deliveries[1].id).await.unwrap().status, DeliveryStatus::Sent);
}

// ============================================================================
// Scenario D: two instances claiming with the global lock
// ============================================================================

#[tokio::test]
async fn test_two_instances_never_double_send() {
    let ids: Vec<String> = (0..8).map(|i| format!("c{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let h = Harness::with_strategy(
        ScriptedAdapter::new(Step::Deliver("d")),
        &refs,
        ClaimStrategy::LockGuarded,
    )
    .await;

    let now = Timestamp::now();
    let message = h.message(Some(now.checked_add(minutes(1)).unwrap())).await;
    h.engine.fan_out(&message, &h.targets()).await.unwrap();

    let locks = Arc::new(ParkedGlobalLock::new());
    let first = h.instance(locks.clone(), ClaimStrategy::LockGuarded);
    let second = h.instance(locks.clone(), ClaimStrategy::LockGuarded);
    let at = now.checked_add(minutes(2)).unwrap();

    let holder = tokio::spawn({
        let first = first.clone();
        async move { first.tick_at(at).await }
    });
    locks.acquired.notified().await;

    // The first instance holds the global lock and has not claimed yet.
    let blocked = second.tick_at(at).await.unwrap();
    assert_eq!(blocked, TickReport::default());
    assert_eq!(h.index.len().await.unwrap(), 8);
    assert_eq!(h.adapter.call_count(), 0);

    locks.resume.notify_one();
    let report = holder.await.unwrap().unwrap();
    assert_eq!(report.claimed, 8);
    assert_eq!(report.sent, 8);

    assert_eq!(second.tick_at(at).await.unwrap().claimed, 0);
    assert_eq!(h.adapter.call_count(), 8);
    assert!(
        h.statuses(message.id)
            .await
            .iter()
            .all(|s| *s == DeliveryStatus::Sent)
    );
}

#[tokio::test]
async fn test_two_instances_racing_ticks_send_each_once() {
    let ids: Vec<String> = (0..8).map(|i| format!("c{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let adapter = ScriptedAdapter::new(Step::Deliver("d")).with_delay(Duration::from_millis(5));
    let h = Harness::with_strategy(adapter, &refs, ClaimStrategy::LockGuarded).await;

    let now = Timestamp::now();
    let message = h.message(Some(now.checked_add(minutes(1)).unwrap())).await;
    h.engine.fan_out(&message, &h.targets()).await.unwrap();

    let first = h.instance(h.locks.clone(), ClaimStrategy::LockGuarded);
    let second = h.instance(h.locks.clone(), ClaimStrategy::LockGuarded);
    let at = now.checked_add(minutes(2)).unwrap();

    let mut claimed = 0;
    for _ in 0..3 {
        let (a, b) = tokio::join!(first.tick_at(at), second.tick_at(at));
        claimed += a.unwrap().claimed + b.unwrap().claimed;
    }

    assert_eq!(claimed, 8);
    assert_eq!(h.adapter.call_count(), 8);
}

#[tokio::test]
async fn test_concurrent_send_one_has_single_winner() {
    let h = Harness::new(
        ScriptedAdapter::new(Step::Deliver("w")).with_delay(Duration::from_millis(5)),
        &["c1"],
    )
    .await;
    let message = h.message(Some(Timestamp::now().checked_add(minutes(30)).unwrap())).await;
    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    let id = report.deliveries[0].id;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.send_one(id).await.unwrap() })
        })
        .collect();

    let mut sent = 0;
    let mut skipped = 0;
    for handle in handles {
        match handle.await.unwrap() {
            SendDisposition::Sent { .. } => sent += 1,
            SendDisposition::Skipped => skipped += 1,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(sent, 1);
    assert_eq!(skipped, 9);
    assert_eq!(h.adapter.call_count(), 1);
}

// ============================================================================
// Scenario E: stale job for an already sent delivery
// ============================================================================

#[tokio::test]
async fn test_stale_send_one_on_sent_delivery_is_noop() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("e")), &["c1"]).await;
    let message = h.message(None).await;
    let report = h.engine.fan_out(&message, &h.targets()).await.unwrap();
    let delivery = h.store.get_delivery(report.deliveries[0].id).await.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Sent);

    let disposition = h.engine.send_one(delivery.id).await.unwrap();
    assert_eq!(disposition, SendDisposition::Skipped);
    assert_eq!(h.adapter.call_count(), 1);
    assert_eq!(h.store.get_delivery(delivery.id).await.unwrap(), delivery);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_and_stop() {
    let h = Harness::new(ScriptedAdapter::new(Step::Deliver("x")), &["c1"]).await;
    let message = h
        .message(Some(Timestamp::now().checked_add(SignedDuration::from_millis(1)).unwrap()))
        .await;
    h.engine.fan_out(&message, &h.targets()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    h.scheduler.start().await;
    assert!(h.scheduler.is_running().await);
    // A second start is ignored.
    h.scheduler.start().await;

    // The first tick fires immediately.
    for _ in 0..50 {
        if h.adapter.call_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.scheduler.stop().await;
    assert!(!h.scheduler.is_running().await);
    assert_eq!(h.statuses(message.id).await, vec![DeliveryStatus::Sent]);
}
