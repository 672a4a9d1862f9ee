//! Peer-service RPC adapters.
//!
//! Each service owns its tables; handlers only reach them through these
//! traits. The `Local*` adapters run a service's logic in-process over its
//! own participant tables, and the `InMemory*` ones are stand-ins for
//! services whose storage is out of scope.

pub mod faults;
pub mod group;
pub mod message;
pub mod push;
pub mod relation;
pub mod user;

use std::sync::Arc;

pub use faults::{Fault, Faults};
pub use group::{GroupService, LocalGroupService};
pub use message::{LocalMessageService, MessageService};
pub use push::{InMemoryPushService, Notification, PushEvent, PushService};
pub use relation::{
    FriendRemoval, Friendship, GroupInvitation, GroupMembership, LocalRelationService,
    RelationService, RelationTables,
};
pub use user::{InMemoryUserService, User, UserService, UserStatus};

/// Handles to every peer service a handler may call.
#[derive(Clone)]
pub struct Participants {
    pub groups: Arc<dyn GroupService>,
    pub relations: Arc<dyn RelationService>,
    pub messages: Arc<dyn MessageService>,
    pub push: Arc<dyn PushService>,
    pub users: Arc<dyn UserService>,
}

impl Participants {
    /// Sends a notification, logging instead of failing.
    pub(crate) async fn notify(&self, notification: Notification) {
        let recipient_id = notification.recipient_id;
        if let Err(e) = self.push.push(notification).await {
            metrics::counter!("push_failures_total").increment(1);
            tracing::warn!(%recipient_id, error = %e, "push failed");
        }
    }
}

impl std::fmt::Debug for Participants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participants").finish_non_exhaustive()
    }
}
