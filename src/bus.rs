//! In-process message bus
//!
//! Publish/subscribe broker connecting the agents. Delivery is synchronous
//! and in registration order: `publish` assigns the message id and timestamp,
//! appends to the bounded history, then pushes the message onto each
//! subscriber's unbounded channel. The channel is the subscriber's work
//! queue, so a slow consumer never stalls the publisher and a dropped
//! receiver never prevents delivery to the subscribers after it.
//!
//! `wait_for_message` registers a one-shot waiter that resolves with the
//! first matching message or fails with a timeout; the waiter is removed in
//! both cases.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, trace};

use crate::errors::SniperError;
use crate::types::{AgentId, AgentMessage, MessageKind, MessagePayload, Recipient};

/// Default number of messages retained in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

type Predicate = Box<dyn Fn(&AgentMessage) -> bool + Send + Sync>;

struct Waiter {
    id: u64,
    predicate: Predicate,
    tx: Option<oneshot::Sender<Arc<AgentMessage>>>,
}

#[derive(Default)]
struct BusInner {
    history: VecDeque<Arc<AgentMessage>>,
    any_subscribers: Vec<UnboundedSender<Arc<AgentMessage>>>,
    kind_subscribers: HashMap<MessageKind, Vec<UnboundedSender<Arc<AgentMessage>>>>,
    direct: HashMap<AgentId, UnboundedSender<Arc<AgentMessage>>>,
    waiters: HashMap<MessageKind, Vec<Waiter>>,
}

/// The shared broker. Cheap to clone behind an `Arc`; all methods take
/// `&self`.
pub struct MessageBus {
    inner: RwLock<BusInner>,
    next_id: AtomicU64,
    next_waiter_id: AtomicU64,
    history_capacity: usize,
}

impl MessageBus {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(BusInner::default()),
            next_id: AtomicU64::new(1),
            next_waiter_id: AtomicU64::new(1),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Publish a message. The bus assigns `id` and `timestamp`, records the
    /// message in history and delivers it to every matching subscriber.
    /// Returns the finished message.
    pub async fn publish(
        &self,
        from: AgentId,
        to: Recipient,
        payload: MessagePayload,
    ) -> Arc<AgentMessage> {
        let message = Arc::new(AgentMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            from,
            to,
            payload,
        });
        let kind = message.kind();
        trace!(id = message.id, from = %from, ?kind, "publishing message");

        let mut inner = self.inner.write().await;

        inner.history.push_back(message.clone());
        while inner.history.len() > self.history_capacity {
            inner.history.pop_front();
        }

        // Each delivery is an enqueue onto the subscriber's own queue; a
        // closed receiver is pruned and never blocks the ones after it.
        inner
            .any_subscribers
            .retain(|sub| sub.send(message.clone()).is_ok());

        if let Some(subs) = inner.kind_subscribers.get_mut(&kind) {
            subs.retain(|sub| sub.send(message.clone()).is_ok());
        }

        if let Recipient::Agent(target) = to {
            let delivered = match inner.direct.get(&target) {
                Some(sub) => sub.send(message.clone()).is_ok(),
                None => false,
            };
            if !delivered {
                inner.direct.remove(&target);
                debug!(target = %target, id = message.id, "no live direct channel for recipient");
            }
        }

        if let Some(waiters) = inner.waiters.get_mut(&kind) {
            waiters.retain_mut(|waiter| {
                if (waiter.predicate)(&message) {
                    if let Some(tx) = waiter.tx.take() {
                        let _ = tx.send(message.clone());
                    }
                    false
                } else {
                    true
                }
            });
        }

        message
    }

    /// Point-to-point convenience wrapper over [`publish`](Self::publish).
    pub async fn send_to(
        &self,
        from: AgentId,
        to: AgentId,
        payload: MessagePayload,
    ) -> Arc<AgentMessage> {
        self.publish(from, Recipient::Agent(to), payload).await
    }

    /// Broadcast convenience wrapper over [`publish`](Self::publish).
    pub async fn broadcast(&self, from: AgentId, payload: MessagePayload) -> Arc<AgentMessage> {
        self.publish(from, Recipient::Broadcast, payload).await
    }

    /// Subscribe to every message regardless of kind or recipient.
    pub async fn subscribe_all(&self) -> UnboundedReceiver<Arc<AgentMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.any_subscribers.push(tx);
        rx
    }

    /// Subscribe to one message kind.
    pub async fn subscribe_kind(&self, kind: MessageKind) -> UnboundedReceiver<Arc<AgentMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .await
            .kind_subscribers
            .entry(kind)
            .or_default()
            .push(tx);
        rx
    }

    /// Register (or replace) the direct-delivery channel for one agent.
    pub async fn register_agent(&self, agent: AgentId) -> UnboundedReceiver<Arc<AgentMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.direct.insert(agent, tx);
        rx
    }

    /// Wait for the next message of `kind` that satisfies `predicate`.
    /// Fails with [`SniperError::Timeout`] if nothing matches in time; the
    /// one-shot listener is removed on either outcome.
    pub async fn wait_for_message<F>(
        &self,
        kind: MessageKind,
        wait: Duration,
        predicate: F,
    ) -> Result<Arc<AgentMessage>, SniperError>
    where
        F: Fn(&AgentMessage) -> bool + Send + Sync + 'static,
    {
        let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.write().await;
            inner.waiters.entry(kind).or_default().push(Waiter {
                id: waiter_id,
                predicate: Box::new(predicate),
                tx: Some(tx),
            });
        }

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => {
                self.remove_waiter(kind, waiter_id).await;
                Err(SniperError::BusClosed)
            }
            Err(_) => {
                self.remove_waiter(kind, waiter_id).await;
                Err(SniperError::Timeout {
                    what: format!("{kind:?} message"),
                    waited_ms: wait.as_millis() as u64,
                })
            }
        }
    }

    /// Wait for the next message of `kind` with no extra filtering.
    pub async fn wait_for(
        &self,
        kind: MessageKind,
        wait: Duration,
    ) -> Result<Arc<AgentMessage>, SniperError> {
        self.wait_for_message(kind, wait, |_| true).await
    }

    async fn remove_waiter(&self, kind: MessageKind, waiter_id: u64) {
        let mut inner = self.inner.write().await;
        if let Some(waiters) = inner.waiters.get_mut(&kind) {
            waiters.retain(|w| w.id != waiter_id);
        }
    }

    /// Most recent messages, oldest first. `limit` of `None` returns the
    /// whole retained history.
    pub async fn recent_messages(&self, limit: Option<usize>) -> Vec<Arc<AgentMessage>> {
        let inner = self.inner.read().await;
        let take = limit.unwrap_or(inner.history.len()).min(inner.history.len());
        inner
            .history
            .iter()
            .skip(inner.history.len() - take)
            .cloned()
            .collect()
    }

    /// All retained messages of one kind, oldest first.
    pub async fn messages_by_kind(&self, kind: MessageKind) -> Vec<Arc<AgentMessage>> {
        self.inner
            .read()
            .await
            .history
            .iter()
            .filter(|m| m.kind() == kind)
            .cloned()
            .collect()
    }

    /// Drop the retained history. Subscriptions are unaffected.
    pub async fn clear_history(&self) {
        self.inner.write().await.history.clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperatorCommand, RunStatus, SnipeFailed};
    use tokio_test::assert_err;

    fn failed(pool: &str) -> MessagePayload {
        MessagePayload::SnipeFailed(SnipeFailed {
            pool_address: pool.to_string(),
            reason: "test".to_string(),
            tx_hash: None,
        })
    }

    #[tokio::test]
    async fn publish_assigns_unique_monotonic_ids_and_timestamps() {
        let bus = MessageBus::default();
        let first = bus
            .broadcast(AgentId::Coordinator, failed("0xa"))
            .await;
        let second = bus
            .broadcast(AgentId::Coordinator, failed("0xb"))
            .await;
        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn kind_subscribers_receive_in_publish_order() {
        let bus = MessageBus::default();
        let mut rx = bus.subscribe_kind(MessageKind::SnipeFailed).await;

        bus.broadcast(AgentId::Sniper, failed("0x1")).await;
        bus.broadcast(
            AgentId::Coordinator,
            MessagePayload::RunStateChanged(RunStatus::Paused),
        )
        .await;
        bus.broadcast(AgentId::Sniper, failed("0x2")).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            &first.payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0x1"
        ));
        assert!(matches!(
            &second.payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0x2"
        ));
    }

    #[tokio::test]
    async fn direct_messages_reach_only_the_registered_agent() {
        let bus = MessageBus::default();
        let mut sniper_rx = bus.register_agent(AgentId::Sniper).await;
        let mut safety_rx = bus.register_agent(AgentId::Safety).await;

        bus.send_to(
            AgentId::Coordinator,
            AgentId::Sniper,
            MessagePayload::OperatorCommand(OperatorCommand::SellAll),
        )
        .await;

        let delivered = sniper_rx.recv().await.unwrap();
        assert_eq!(delivered.to, Recipient::Agent(AgentId::Sniper));
        assert!(safety_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_later_subscribers() {
        let bus = MessageBus::default();
        let dead = bus.subscribe_kind(MessageKind::SnipeFailed).await;
        drop(dead);
        let mut live = bus.subscribe_kind(MessageKind::SnipeFailed).await;

        bus.broadcast(AgentId::Sniper, failed("0x1")).await;
        assert!(live.recv().await.is_some());
    }

    #[tokio::test]
    async fn wait_for_message_times_out_without_a_match() {
        let bus = MessageBus::default();
        let result = bus
            .wait_for(MessageKind::SnipeExecuted, Duration::from_millis(100))
            .await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, SniperError::Timeout { .. }));
    }

    #[tokio::test]
    async fn wait_for_message_resolves_before_the_deadline() {
        let bus = Arc::new(MessageBus::default());

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            publisher.broadcast(AgentId::Sniper, failed("0xabc")).await;
        });

        let message = bus
            .wait_for(MessageKind::SnipeFailed, Duration::from_millis(100))
            .await
            .expect("should resolve before the 100ms deadline");
        assert!(matches!(
            &message.payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0xabc"
        ));
    }

    #[tokio::test]
    async fn wait_for_message_predicate_skips_non_matching_messages() {
        let bus = Arc::new(MessageBus::default());

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.broadcast(AgentId::Sniper, failed("0xother")).await;
            publisher.broadcast(AgentId::Sniper, failed("0xwanted")).await;
        });

        let message = bus
            .wait_for_message(MessageKind::SnipeFailed, Duration::from_millis(500), |m| {
                matches!(
                    &m.payload,
                    MessagePayload::SnipeFailed(f) if f.pool_address == "0xwanted"
                )
            })
            .await
            .unwrap();
        assert!(matches!(
            &message.payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0xwanted"
        ));
    }

    #[tokio::test]
    async fn history_is_bounded_and_queryable() {
        let bus = MessageBus::new(3);
        for i in 0..5u8 {
            bus.broadcast(AgentId::Sniper, failed(&format!("0x{i}"))).await;
        }

        let recent = bus.recent_messages(None).await;
        assert_eq!(recent.len(), 3);
        // oldest two were evicted; the newest is last
        assert!(matches!(
            &recent[0].payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0x2"
        ));
        assert!(matches!(
            &recent[2].payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0x4"
        ));

        let limited = bus.recent_messages(Some(1)).await;
        assert_eq!(limited.len(), 1);
        assert!(matches!(
            &limited[0].payload,
            MessagePayload::SnipeFailed(f) if f.pool_address == "0x4"
        ));

        assert_eq!(
            bus.messages_by_kind(MessageKind::SnipeFailed).await.len(),
            3
        );
        bus.clear_history().await;
        assert!(bus.recent_messages(None).await.is_empty());
    }
}
