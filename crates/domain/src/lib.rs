//! Use-case layer of the social backend.
//!
//! This crate provides:
//! - RPC adapters for the peer services that own each table
//! - Command handlers that run multi-service writes as sagas
//! - Query handlers that compose reads across services

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod queries;
pub mod services;

pub use backend::InMemoryBackend;
pub use commands::{
    CreateGroup, DeleteFriend, DeleteGroup, FriendDeleted, FriendRequestAction,
    FriendRequestHandled, GroupCreated, GroupDeleted, ManageFriendRequest, MembersRemoved,
    RemoveGroupMember, SendFriendRequest,
};
pub use config::HandlerConfig;
pub use error::{AppError, ErrorKind};
pub use handlers::Handlers;
pub use queries::{
    Friend, GetGroup, GroupMember, ListFriendRequests, ListFriends, ListGroupMembers,
    QueryHandler,
};
pub use services::{Fault, Participants, PushEvent};
