//! Publisher Fabric (C1): subscriber registry, per-execution topics, and
//! fan-out. Implements `ExecutionNotifier` so producers (Process Supervisor,
//! Terminal Manager) never see the subscriber set directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use shelld_core::ids::{ExecutionId, SubscriberId};
use shelld_core::notify::ExecutionNotifier;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::RwLock;
use tracing::warn;

use crate::subscriber::Subscriber;

enum TopicEvent {
    Start,
    Data { bytes: Vec<u8>, is_stderr: bool },
    End { exit_code: Option<i32> },
    Error { message: String },
}

struct Topic {
    sender: UnboundedSender<TopicEvent>,
    subscriber_ids: Arc<StdRwLock<HashSet<SubscriberId>>>,
}

pub struct PublisherFabric {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    topics: RwLock<HashMap<ExecutionId, Topic>>,
}

impl PublisherFabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
        })
    }

    pub async fn subscribe(&self, id: SubscriberId, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().await.insert(id, subscriber);
    }

    pub async fn unsubscribe(&self, id: &SubscriberId) {
        self.subscribers.write().await.remove(id);
    }

    /// Attach a subscriber to an execution's topic, creating the topic (and
    /// its fan-out worker) on first attach.
    pub async fn attach(self: &Arc<Self>, execution_id: ExecutionId, subscriber_id: SubscriberId) {
        let mut topics = self.topics.write().await;
        let topic = topics.entry(execution_id.clone()).or_insert_with(|| {
            let (sender, receiver) = unbounded_channel();
            let subscriber_ids = Arc::new(StdRwLock::new(HashSet::new()));
            let fabric = self.clone();
            let exec_id = execution_id.clone();
            let ids_for_worker = subscriber_ids.clone();
            tokio::spawn(async move {
                run_topic_worker(fabric, exec_id, receiver, ids_for_worker).await;
            });
            Topic {
                sender,
                subscriber_ids,
            }
        });
        topic.subscriber_ids.write().unwrap().insert(subscriber_id);
    }

    fn send(&self, execution_id: &ExecutionId, event: TopicEvent) {
        let Ok(topics) = self.topics.try_read() else {
            warn!(execution_id = %execution_id, "dropping fabric event: topics map busy");
            return;
        };
        if let Some(topic) = topics.get(execution_id) {
            let _ = topic.sender.send(event);
        }
    }
}

async fn run_topic_worker(
    fabric: Arc<PublisherFabric>,
    execution_id: ExecutionId,
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<TopicEvent>,
    subscriber_ids: Arc<StdRwLock<HashSet<SubscriberId>>>,
) {
    while let Some(event) = receiver.recv().await {
        let ids: Vec<SubscriberId> = subscriber_ids.read().unwrap().iter().cloned().collect();
        let subscribers = fabric.subscribers.read().await;
        let targets: Vec<Arc<dyn Subscriber>> = ids
            .iter()
            .filter_map(|id| subscribers.get(id).cloned())
            .collect();
        drop(subscribers);

        let is_end = matches!(event, TopicEvent::End { .. });
        dispatch(&execution_id, &event, &targets).await;

        if is_end {
            fabric.topics.write().await.remove(&execution_id);
            break;
        }
    }
}

async fn dispatch(execution_id: &ExecutionId, event: &TopicEvent, targets: &[Arc<dyn Subscriber>]) {
    let futures = targets.iter().map(|sub| {
        let sub = sub.clone();
        async move {
            match event {
                TopicEvent::Start => sub.on_start(execution_id).await,
                TopicEvent::Data { bytes, is_stderr } => {
                    sub.on_data(execution_id, bytes, *is_stderr).await
                }
                TopicEvent::End { exit_code } => sub.on_end(execution_id, *exit_code).await,
                TopicEvent::Error { message } => sub.on_error(execution_id, message).await,
            }
        }
    });
    futures_util::future::join_all(futures).await;
}

impl ExecutionNotifier for PublisherFabric {
    fn notify_process_start(&self, execution_id: &ExecutionId) {
        self.send(execution_id, TopicEvent::Start);
    }

    fn notify_output_data(&self, execution_id: &ExecutionId, bytes: &[u8], is_stderr: bool) {
        self.send(
            execution_id,
            TopicEvent::Data {
                bytes: bytes.to_vec(),
                is_stderr,
            },
        );
    }

    fn notify_process_end(&self, execution_id: &ExecutionId, exit_code: Option<i32>) {
        self.send(execution_id, TopicEvent::End { exit_code });
    }

    fn notify_error(&self, execution_id: &ExecutionId, message: &str) {
        self.send(
            execution_id,
            TopicEvent::Error {
                message: message.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSubscriber {
        starts: Arc<AtomicUsize>,
        ends: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Subscriber for CountingSubscriber {
        async fn on_start(&self, _execution_id: &ExecutionId) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_end(&self, _execution_id: &ExecutionId, _exit_code: Option<i32>) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_attached_subscriber() {
        let fabric = PublisherFabric::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let ends = Arc::new(AtomicUsize::new(0));
        let sub = Arc::new(CountingSubscriber {
            starts: starts.clone(),
            ends: ends.clone(),
        });

        let sub_id = SubscriberId::generate();
        fabric.subscribe(sub_id.clone(), sub).await;
        let exec_id = ExecutionId::generate();
        fabric.attach(exec_id.clone(), sub_id).await;

        fabric.notify_process_start(&exec_id);
        fabric.notify_process_end(&exec_id, Some(0));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn topic_is_removed_after_end() {
        let fabric = PublisherFabric::new();
        let exec_id = ExecutionId::generate();
        let sub_id = SubscriberId::generate();
        fabric.attach(exec_id.clone(), sub_id).await;
        fabric.notify_process_end(&exec_id, Some(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fabric.topics.read().await.contains_key(&exec_id));
    }

    #[tokio::test]
    async fn notify_without_attach_is_a_noop() {
        let fabric = PublisherFabric::new();
        let exec_id = ExecutionId::generate();
        fabric.notify_process_start(&exec_id);
        fabric.notify_process_end(&exec_id, None);
    }
}
