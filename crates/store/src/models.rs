//! Rows owned by the participant stores.
//!
//! Each type is owned by exactly one service: groups by the group service;
//! group relations, dialogs, dialog users, user relations and friend
//! requests by the relation service; messages by the message service.

use common::{DialogId, GroupId, MessageId, RequestId, RowId, UserId};
use serde::{Deserialize, Serialize};

use crate::table::Entity;

macro_rules! soft_deletable {
    ($ty:ty, $id:ty, $kind:literal) => {
        soft_deletable!($ty, $id, $kind, |_row: &$ty| None);
    };
    ($ty:ty, $id:ty, $kind:literal, $unique:expr) => {
        impl Entity for $ty {
            type Id = $id;
            const KIND: &'static str = $kind;

            fn id(&self) -> Self::Id {
                self.id
            }

            fn set_id(&mut self, id: Self::Id) {
                self.id = id;
            }

            fn deleted_at(&self) -> i64 {
                self.deleted_at
            }

            fn set_deleted_at(&mut self, at: i64) {
                self.deleted_at = at;
            }

            fn unique_key(&self) -> Option<String> {
                let unique: fn(&$ty) -> Option<String> = $unique;
                unique(self)
            }

            fn touch(&mut self, at: i64) {
                self.updated_at = at;
            }
        }
    };
}

/// Visibility of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Private,
    Public,
}

impl GroupKind {
    /// Default member cap for this kind of group.
    pub fn default_max_members(&self) -> i32 {
        match self {
            GroupKind::Private => 500,
            GroupKind::Public => 1000,
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            GroupKind::Private => 0,
            GroupKind::Public => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => GroupKind::Public,
            _ => GroupKind::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    #[default]
    Normal,
    Locked,
}

impl GroupStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            GroupStatus::Normal => 0,
            GroupStatus::Locked => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => GroupStatus::Locked,
            _ => GroupStatus::Normal,
        }
    }
}

/// A chat group. Owned by the group service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub kind: GroupKind,
    pub status: GroupStatus,
    pub max_members: i32,
    pub creator_id: UserId,
    pub name: String,
    pub avatar: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

impl Group {
    /// A new, not yet inserted group.
    pub fn new(creator_id: UserId, name: impl Into<String>, kind: GroupKind) -> Self {
        let now = common::now_millis();
        Self {
            id: GroupId::default(),
            kind,
            status: GroupStatus::Normal,
            max_members: kind.default_max_members(),
            creator_id,
            name: name.into(),
            avatar: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        }
    }
}

soft_deletable!(Group, GroupId, "group");

/// A member's role in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupIdentity {
    Owner,
    Admin,
    Member,
}

impl GroupIdentity {
    /// Owners and admins may manage membership.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, GroupIdentity::Owner | GroupIdentity::Admin)
    }
}

/// How a member entered a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    Invitation,
    Search,
    QrCode,
}

/// Membership of one user in one group. Owned by the relation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRelation {
    pub id: RowId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub identity: GroupIdentity,
    pub entry_method: EntryMethod,
    pub inviter_id: Option<UserId>,
    pub joined_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(GroupRelation, RowId, "group_relation", |row: &GroupRelation| {
    Some(format!("{}/{}", row.group_id, row.user_id))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    User,
    Group,
}

/// A conversation. Group dialogs carry their group's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,
    pub kind: DialogKind,
    pub owner_id: UserId,
    pub group_id: Option<GroupId>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(Dialog, DialogId, "dialog");

/// Membership of one user in one dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogUser {
    pub id: RowId,
    pub dialog_id: DialogId,
    pub user_id: UserId,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(DialogUser, RowId, "dialog_user", |row: &DialogUser| {
    Some(format!("{}/{}", row.dialog_id, row.user_id))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    Normal,
    Blocked,
}

/// One direction of a friendship: `user_id` lists `friend_id` as a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRelation {
    pub id: RowId,
    pub user_id: UserId,
    pub friend_id: UserId,
    pub status: RelationStatus,
    pub dialog_id: DialogId,
    pub remark: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(UserRelation, RowId, "user_relation", |row: &UserRelation| {
    Some(format!("{}/{}", row.user_id, row.friend_id))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A pending or resolved friend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub remark: String,
    pub status: RequestStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(FriendRequest, RequestId, "friend_request");

/// A chat message. Owned by the message service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub dialog_id: DialogId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,
}

soft_deletable!(Message, MessageId, "message");
