use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::RealtimeEvent;
use crate::error::PlanError;

/// A push-based subscription source keyed by user id.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Opens a fresh delivery stream for one user's changes.
    async fn subscribe(
        &self,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, PlanError>;
}

struct Pump {
    user_id: String,
    task: JoinHandle<()>,
}

/// Owns the single event pump for the current subscription.
///
/// Re-subscribing (after a reconnect, or for another user) aborts the
/// previous pump before installing the new one, so there is never more
/// than one live delivery stream.
pub struct RealtimeListener {
    channel: Arc<dyn RealtimeChannel>,
    pump: Mutex<Option<Pump>>,
}

impl RealtimeListener {
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        Self {
            channel,
            pump: Mutex::new(None),
        }
    }

    /// Subscribes for `user_id` and forwards every event to `on_event`.
    /// Idempotent: calling again replaces the previous stream.
    pub async fn subscribe<F>(&self, user_id: &str, on_event: F) -> Result<(), PlanError>
    where
        F: Fn(RealtimeEvent) + Send + Sync + 'static,
    {
        let mut rx = self.channel.subscribe(user_id).await?;

        let pump_user = user_id.to_string();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::debug!(event = %event, "realtime event received");
                on_event(event);
            }
            tracing::debug!(user_id = %pump_user, "realtime stream ended");
        });

        let mut pump = self.pump.lock().unwrap();
        if let Some(previous) = pump.take() {
            previous.task.abort();
        }
        *pump = Some(Pump {
            user_id: user_id.to_string(),
            task,
        });
        Ok(())
    }

    pub fn unsubscribe(&self) {
        if let Some(pump) = self.pump.lock().unwrap().take() {
            pump.task.abort();
        }
    }

    pub fn subscribed_user(&self) -> Option<String> {
        self.pump
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.user_id.clone())
    }
}

impl Drop for RealtimeListener {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// In-process channel for tests: events published here fan out to the
/// live subscriptions for that user.
#[derive(Default)]
pub struct MemoryChannel {
    senders: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<RealtimeEvent>>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an event to every live subscription for `user_id`.
    /// Returns how many streams received it.
    pub fn publish(&self, user_id: &str, event: RealtimeEvent) -> usize {
        let mut senders = self.senders.lock().unwrap();
        let Some(list) = senders.get_mut(user_id) else {
            return 0;
        };
        list.retain(|tx| !tx.is_closed());
        for tx in list.iter() {
            let _ = tx.send(event.clone());
        }
        list.len()
    }
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    async fn subscribe(
        &self,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RealtimeEvent>, PlanError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
