//! Use-case handlers for commands that change state.
//!
//! A handler checks pre-conditions with reads, then drives every write that
//! spans more than one participant through a registered saga. Notifications
//! are sent after the saga commits and never fail the command.

pub mod create_group;
pub mod delete_friend;
pub mod delete_group;
pub mod manage_friend_request;
pub mod remove_group_member;
pub mod send_friend_request;

use common::UserId;
use store::RelationStatus;

pub use create_group::{CreateGroup, CreateGroupHandler, CreateGroupWorkflow, GroupCreated};
pub use delete_friend::{DeleteFriend, DeleteFriendHandler, DeleteFriendWorkflow, FriendDeleted};
pub use delete_group::{DeleteGroup, DeleteGroupHandler, DeleteGroupWorkflow, GroupDeleted};
pub use manage_friend_request::{
    AcceptFriendRequestWorkflow, FriendRequestAction, FriendRequestHandled, ManageFriendRequest,
    ManageFriendRequestHandler,
};
pub use remove_group_member::{
    MembersRemoved, RemoveGroupMember, RemoveGroupMemberHandler, RemoveGroupMemberWorkflow,
};
pub use send_friend_request::{SendFriendRequest, SendFriendRequestHandler};

use crate::error::AppError;
use crate::services::RelationService;

/// Fails unless `a` and `b` list each other as unblocked friends.
pub(crate) async fn ensure_mutual_friends(
    relations: &dyn RelationService,
    a: UserId,
    b: UserId,
) -> Result<(), AppError> {
    for (from, to) in [(a, b), (b, a)] {
        match relations.get_user_relation(from, to).await {
            Ok(relation) if relation.status == RelationStatus::Blocked => {
                return Err(AppError::forbidden(format!("user {from} has blocked user {to}")));
            }
            Ok(_) => {}
            Err(AppError::NotFound(_)) => {
                return Err(AppError::forbidden(format!(
                    "users {a} and {b} are not friends"
                )));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Rejects lists that repeat an id.
pub(crate) fn ensure_distinct(ids: &[UserId], what: &str) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(AppError::validation(format!("{what} lists user {id} twice"))),
        None => Ok(()),
    }
}
