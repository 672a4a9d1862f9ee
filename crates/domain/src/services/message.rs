//! Message service adapter.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, MessageId, UserId, now_millis};
use store::{Message, RetryPolicy, Table, create_with_retry};

use super::faults::{Fault, Faults};
use crate::error::AppError;

/// RPC surface of the message service, which owns the `messages` table.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn send_dialog_message(
        &self,
        dialog_id: DialogId,
        sender_id: UserId,
        content: String,
        deadline: Deadline,
    ) -> Result<Message, AppError>;

    /// Deletes every message of a dialog and returns how many were removed.
    ///
    /// There is no revert: once purged, messages are not restored.
    async fn delete_dialog_messages(&self, dialog_id: DialogId) -> Result<usize, AppError>;

    async fn count_dialog_messages(&self, dialog_id: DialogId) -> Result<usize, AppError>;
}

/// Message service running in-process over its own table.
#[derive(Clone)]
pub struct LocalMessageService {
    messages: Arc<dyn Table<Message>>,
    retry: RetryPolicy,
    faults: Faults,
}

impl LocalMessageService {
    pub fn new(messages: impl Table<Message> + 'static, retry: RetryPolicy) -> Self {
        Self {
            messages: Arc::new(messages),
            retry,
            faults: Faults::new("message"),
        }
    }

    pub fn set_fail_on(&self, method: &'static str, fault: Option<Fault>) {
        self.faults.set(method, fault);
    }
}

impl std::fmt::Debug for LocalMessageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMessageService").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageService for LocalMessageService {
    #[tracing::instrument(skip(self, content, deadline))]
    async fn send_dialog_message(
        &self,
        dialog_id: DialogId,
        sender_id: UserId,
        content: String,
        deadline: Deadline,
    ) -> Result<Message, AppError> {
        self.faults.check("send_dialog_message")?;
        let now = now_millis();
        let message = Message {
            id: MessageId::default(),
            dialog_id,
            sender_id,
            content,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        };
        Ok(create_with_retry(self.messages.as_ref(), message, deadline, self.retry).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_dialog_messages(&self, dialog_id: DialogId) -> Result<usize, AppError> {
        self.faults.check("delete_dialog_messages")?;
        let ids: Vec<MessageId> = self
            .messages
            .scan(&|m: &Message| m.dialog_id == dialog_id)
            .await?
            .iter()
            .map(|m| m.id)
            .collect();
        let purged = self.messages.soft_delete(&ids).await?;
        tracing::debug!(count = purged.len(), "dialog messages purged");
        Ok(purged.len())
    }

    async fn count_dialog_messages(&self, dialog_id: DialogId) -> Result<usize, AppError> {
        self.faults.check("count_dialog_messages")?;
        Ok(self
            .messages
            .scan(&|m: &Message| m.dialog_id == dialog_id)
            .await?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryTable;

    #[tokio::test]
    async fn test_purge_only_touches_one_dialog() {
        let service = LocalMessageService::new(InMemoryTable::new(), RetryPolicy::default());
        let sender = UserId::new();
        let (a, b) = (DialogId::new(1), DialogId::new(2));
        for content in ["hi", "there"] {
            service
                .send_dialog_message(a, sender, content.into(), Deadline::none())
                .await
                .unwrap();
        }
        service
            .send_dialog_message(b, sender, "other".into(), Deadline::none())
            .await
            .unwrap();

        assert_eq!(service.delete_dialog_messages(a).await.unwrap(), 2);
        assert_eq!(service.count_dialog_messages(a).await.unwrap(), 0);
        assert_eq!(service.count_dialog_messages(b).await.unwrap(), 1);
        assert_eq!(service.delete_dialog_messages(a).await.unwrap(), 0);
    }
}
