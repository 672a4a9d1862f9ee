//! All handlers, built once per process.

use crate::commands::{
    CreateGroupHandler, DeleteFriendHandler, DeleteGroupHandler, ManageFriendRequestHandler,
    RemoveGroupMemberHandler, SendFriendRequestHandler,
};
use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::queries::QueryHandler;
use crate::services::Participants;

pub struct Handlers {
    pub create_group: CreateGroupHandler,
    pub delete_group: DeleteGroupHandler,
    pub delete_friend: DeleteFriendHandler,
    pub manage_friend_request: ManageFriendRequestHandler,
    pub send_friend_request: SendFriendRequestHandler,
    pub remove_group_member: RemoveGroupMemberHandler,
    pub queries: QueryHandler,
}

impl Handlers {
    /// Registers every workflow. Fails only on a malformed workflow definition.
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        Ok(Self {
            create_group: CreateGroupHandler::new(participants.clone(), config)?,
            delete_group: DeleteGroupHandler::new(participants.clone(), config)?,
            delete_friend: DeleteFriendHandler::new(participants.clone(), config)?,
            manage_friend_request: ManageFriendRequestHandler::new(participants.clone(), config)?,
            send_friend_request: SendFriendRequestHandler::new(participants.clone(), config),
            remove_group_member: RemoveGroupMemberHandler::new(participants.clone(), config)?,
            queries: QueryHandler::new(participants),
        })
    }
}
