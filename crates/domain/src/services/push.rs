//! Push service adapter.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{GroupId, RequestId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    InvitedToGroup { group_id: GroupId, inviter_id: UserId },
    GroupDissolved { group_id: GroupId },
    RemovedFromGroup { group_id: GroupId, operator_id: UserId },
    FriendRequestReceived { request_id: RequestId, sender_id: UserId },
    FriendRequestAccepted { request_id: RequestId, receiver_id: UserId },
    FriendRemoved { user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub event: PushEvent,
}

/// Delivers notifications to online clients.
///
/// Delivery is best-effort. Callers log failures and move on.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn push(&self, notification: Notification) -> Result<(), AppError>;
}

#[derive(Debug, Default)]
struct InMemoryPushState {
    delivered: Vec<Notification>,
    fail_on_push: bool,
}

/// Push service that records what it delivers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPushService {
    state: Arc<RwLock<InMemoryPushState>>,
}

impl InMemoryPushService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_push(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_push = fail;
    }

    /// Notifications delivered so far, oldest first.
    pub fn delivered(&self) -> Vec<Notification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .delivered
            .clone()
    }

    pub fn delivered_to(&self, recipient_id: UserId) -> Vec<PushEvent> {
        self.delivered()
            .into_iter()
            .filter(|n| n.recipient_id == recipient_id)
            .map(|n| n.event)
            .collect()
    }
}

#[async_trait]
impl PushService for InMemoryPushService {
    async fn push(&self, notification: Notification) -> Result<(), AppError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_push {
            return Err(AppError::Unavailable {
                service: "push",
                reason: "no connection".into(),
            });
        }
        state.delivered.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_deliveries() {
        let service = InMemoryPushService::new();
        let user = UserId::new();
        service
            .push(Notification {
                recipient_id: user,
                event: PushEvent::GroupDissolved {
                    group_id: GroupId::new(3),
                },
            })
            .await
            .unwrap();

        assert_eq!(
            service.delivered_to(user),
            vec![PushEvent::GroupDissolved {
                group_id: GroupId::new(3)
            }]
        );
        assert!(service.delivered_to(UserId::new()).is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_push() {
        let service = InMemoryPushService::new();
        service.set_fail_on_push(true);
        let result = service
            .push(Notification {
                recipient_id: UserId::new(),
                event: PushEvent::FriendRemoved {
                    user_id: UserId::new(),
                },
            })
            .await;
        assert!(result.is_err());
        assert!(service.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_push_survives_poisoned_lock() {
        let service = InMemoryPushService::new();
        let poisoner = service.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.write().unwrap();
            panic!("writer crashed");
        })
        .join();

        let user = UserId::new();
        service
            .push(Notification {
                recipient_id: user,
                event: PushEvent::FriendRemoved { user_id: user },
            })
            .await
            .unwrap();
        assert_eq!(service.delivered().len(), 1);
    }

    #[test]
    fn test_event_wire_format() {
        let event = PushEvent::GroupDissolved {
            group_id: GroupId::new(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "group_dissolved");
        assert_eq!(json["group_id"], 5);
    }
}
