use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// Evidence Attachments
// ============================================================================
//
// Files hang off either an order or one of its history entries. The target
// is a tagged reference rather than a free-form type string, and each kind
// is backed by its own repository.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachableKind {
    Order,
    OrderHistory,
}

impl AttachableKind {
    pub const ALL: [AttachableKind; 2] = [AttachableKind::Order, AttachableKind::OrderHistory];
}

impl fmt::Display for AttachableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachableKind::Order => f.write_str("order"),
            AttachableKind::OrderHistory => f.write_str("order history entry"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachableRef {
    pub kind: AttachableKind,
    pub id: Uuid,
}

impl AttachableRef {
    pub fn order(id: Uuid) -> Self {
        Self {
            kind: AttachableKind::Order,
            id,
        }
    }

    pub fn history_entry(id: Uuid) -> Self {
        Self {
            kind: AttachableKind::OrderHistory,
            id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRef {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub target: AttachableRef,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn attach(
        &self,
        file: NewAttachment,
        target: AttachableRef,
        uploader: Uuid,
    ) -> anyhow::Result<AttachmentRef>;

    /// Returns whether anything was removed.
    async fn detach(&self, attachment_id: Uuid) -> anyhow::Result<bool>;
}

type Repository = RwLock<HashMap<Uuid, (AttachmentRef, Vec<u8>)>>;

/// Keeps files in memory, one repository per attachable kind.
pub struct InMemoryAttachmentStore {
    repositories: HashMap<AttachableKind, Repository>,
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self {
            repositories: AttachableKind::ALL
                .into_iter()
                .map(|kind| (kind, RwLock::new(HashMap::new())))
                .collect(),
        }
    }

    fn repository(&self, kind: AttachableKind) -> anyhow::Result<&Repository> {
        self.repositories
            .get(&kind)
            .ok_or_else(|| anyhow::anyhow!("no attachment repository for {kind}"))
    }

    pub async fn attachments_for(&self, target: AttachableRef) -> Vec<AttachmentRef> {
        let Ok(repository) = self.repository(target.kind) else {
            return Vec::new();
        };
        let files = repository.read().await;
        let mut found: Vec<_> = files
            .values()
            .filter(|(meta, _)| meta.target == target)
            .map(|(meta, _)| meta.clone())
            .collect();
        found.sort_by_key(|meta| meta.id);
        found
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn attach(
        &self,
        file: NewAttachment,
        target: AttachableRef,
        uploader: Uuid,
    ) -> anyhow::Result<AttachmentRef> {
        if file.file_name.trim().is_empty() {
            anyhow::bail!("attachment file name cannot be empty");
        }

        let meta = AttachmentRef {
            id: Uuid::now_v7(),
            file_name: file.file_name,
            content_type: file.content_type,
            size: file.bytes.len() as u64,
            target,
            uploaded_by: uploader,
            created_at: Utc::now(),
        };

        let mut files = self.repository(target.kind)?.write().await;
        files.insert(meta.id, (meta.clone(), file.bytes));
        Ok(meta)
    }

    async fn detach(&self, attachment_id: Uuid) -> anyhow::Result<bool> {
        for repository in self.repositories.values() {
            if repository.write().await.remove(&attachment_id).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> NewAttachment {
        NewAttachment {
            file_name: "cracked-head.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    #[tokio::test]
    async fn test_attach_routes_by_kind() {
        let store = InMemoryAttachmentStore::new();
        let uploader = Uuid::new_v4();
        let order = AttachableRef::order(Uuid::new_v4());
        let entry = AttachableRef::history_entry(Uuid::new_v4());

        let a = store.attach(photo(), order, uploader).await.unwrap();
        store.attach(photo(), entry, uploader).await.unwrap();

        assert_eq!(a.size, 3);
        assert_eq!(a.uploaded_by, uploader);
        assert_eq!(store.attachments_for(order).await, vec![a]);
        assert_eq!(store.attachments_for(entry).await.len(), 1);
    }

    #[tokio::test]
    async fn test_detach() {
        let store = InMemoryAttachmentStore::new();
        let target = AttachableRef::order(Uuid::new_v4());
        let a = store.attach(photo(), target, Uuid::new_v4()).await.unwrap();

        assert!(store.detach(a.id).await.unwrap());
        assert!(!store.detach(a.id).await.unwrap());
        assert!(store.attachments_for(target).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_name_is_rejected() {
        let store = InMemoryAttachmentStore::new();
        let file = NewAttachment {
            file_name: " ".to_string(),
            ..photo()
        };
        assert!(store
            .attach(file, AttachableRef::order(Uuid::new_v4()), Uuid::new_v4())
            .await
            .is_err());
    }
}
