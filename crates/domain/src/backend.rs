//! In-process wiring of every participant.

use std::sync::Arc;

use store::{CacheConfig, CachedTable, Group, InMemoryCache, InMemoryTable, Message};

use crate::config::HandlerConfig;
use crate::services::{
    InMemoryPushService, InMemoryUserService, LocalGroupService, LocalMessageService,
    LocalRelationService, Participants, RelationTables,
};

/// All participants over in-memory tables sharing one cache.
///
/// The raw tables stay reachable for fault injection and for inspecting
/// soft-deleted rows.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    pub cache: InMemoryCache,
    pub group_table: InMemoryTable<Group>,
    pub relation_tables: RelationTables,
    pub message_table: InMemoryTable<Message>,
    pub groups: LocalGroupService,
    pub relations: LocalRelationService,
    pub messages: LocalMessageService,
    pub push: InMemoryPushService,
    pub users: InMemoryUserService,
}

impl InMemoryBackend {
    pub fn new(config: &HandlerConfig, cache_config: CacheConfig) -> Self {
        let cache = InMemoryCache::new();
        let group_table = InMemoryTable::new();
        let relation_tables = RelationTables::new();
        let message_table = InMemoryTable::new();

        let groups = LocalGroupService::new(
            CachedTable::new(group_table.clone(), cache.clone(), cache_config),
            config.retry,
        );
        let relations = LocalRelationService::new(
            relation_tables.clone(),
            cache.clone(),
            cache_config,
            config.retry,
        );
        let messages = LocalMessageService::new(message_table.clone(), config.retry);

        Self {
            cache,
            group_table,
            relation_tables,
            message_table,
            groups,
            relations,
            messages,
            push: InMemoryPushService::new(),
            users: InMemoryUserService::new(),
        }
    }

    pub fn participants(&self) -> Participants {
        Participants {
            groups: Arc::new(self.groups.clone()),
            relations: Arc::new(self.relations.clone()),
            messages: Arc::new(self.messages.clone()),
            push: Arc::new(self.push.clone()),
            users: Arc::new(self.users.clone()),
        }
    }
}
