//! Background embedding worker.
//!
//! Message persistence is synchronous; embedding generation is not. The
//! worker owns a channel receiver and a spawned task that embeds queued
//! message content and upserts the vectors. A failed job is logged and
//! dropped; it never affects other jobs or the request that enqueued it.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::embedding::EmbeddingProvider;
use crate::store::MessageStore;

/// One unit of embedding work.
#[derive(Clone, Debug)]
pub struct EmbeddingJob {
    pub message_id: String,
    pub content: String,
}

/// Handle to the spawned embedding loop.
pub struct EmbeddingWorker {
    tx: flume::Sender<EmbeddingJob>,
    handle: JoinHandle<()>,
}

impl EmbeddingWorker {
    /// Spawn the worker loop. It runs until every sender is dropped.
    pub fn spawn(embedder: Arc<dyn EmbeddingProvider>, store: MessageStore) -> Self {
        let (tx, rx) = flume::unbounded::<EmbeddingJob>();
        let handle = tokio::spawn(async move {
            while let Ok(job) = rx.recv_async().await {
                match embedder.embed(&job.content).await {
                    Ok(vector) => {
                        if let Err(err) = store.upsert_embedding(&job.message_id, &vector).await {
                            tracing::error!(
                                message_id = %job.message_id,
                                error = %err,
                                "failed to persist embedding"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            message_id = %job.message_id,
                            error = %err,
                            "failed to embed message"
                        );
                    }
                }
            }
            tracing::debug!("embedding worker drained");
        });
        Self { tx, handle }
    }

    /// Queue a job without blocking. A closed channel is logged and the job
    /// dropped; retrieval quality degrades, requests do not.
    pub fn enqueue(&self, job: EmbeddingJob) {
        if let Err(err) = self.tx.send(job) {
            tracing::error!(error = %err, "embedding queue closed; dropping job");
        }
    }

    /// Drop the sender and wait for queued jobs to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "embedding worker task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;

    #[tokio::test]
    async fn queued_messages_get_embedded() {
        let store = MessageStore::open_in_memory().await.unwrap();
        let conv = store.create_conversation("owner-1", "t").await.unwrap();
        let msg = store
            .insert_message(&conv.id, "user", "lunar regolith")
            .await
            .unwrap();

        let worker = EmbeddingWorker::spawn(Arc::new(MockEmbeddingProvider::new()), store.clone());
        worker.enqueue(EmbeddingJob {
            message_id: msg.id.clone(),
            content: msg.content.clone(),
        });
        worker.shutdown().await;

        assert_eq!(store.embedding_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_job_does_not_stop_the_loop() {
        let store = MessageStore::open_in_memory().await.unwrap();
        let conv = store.create_conversation("owner-1", "t").await.unwrap();
        let msg = store.insert_message(&conv.id, "user", "ok").await.unwrap();

        let worker = EmbeddingWorker::spawn(Arc::new(MockEmbeddingProvider::new()), store.clone());
        // Empty content makes the provider reject the job.
        worker.enqueue(EmbeddingJob {
            message_id: "ignored".into(),
            content: String::new(),
        });
        worker.enqueue(EmbeddingJob {
            message_id: msg.id.clone(),
            content: msg.content.clone(),
        });
        worker.shutdown().await;

        assert_eq!(store.embedding_count().await.unwrap(), 1);
    }
}
