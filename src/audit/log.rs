use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::CodecError;
use super::entry::AuditEntry;
use super::field::TrackedField;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Paging and filtering for `GET /orders/{id}/history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl HistoryQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> usize {
        ((self.page() - 1) as usize) * self.per_page() as usize
    }

    /// The requested field filter. Unknown field names are rejected.
    pub fn field_filter(&self) -> Result<Option<TrackedField>, CodecError> {
        self.field.as_deref().map(str::parse).transpose()
    }
}

/// A history entry as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub id: Uuid,
    pub field_changed: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryView>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

pub struct AuditLog;

impl AuditLog {
    /// Filter, sort newest first, and slice one page out of an order's full
    /// history. Returns the page and the filtered total.
    pub fn select(
        entries: &[AuditEntry],
        field: Option<TrackedField>,
        query: &HistoryQuery,
    ) -> (Vec<AuditEntry>, u64) {
        let mut matching: Vec<&AuditEntry> = entries
            .iter()
            .filter(|e| field.map_or(true, |f| e.field_changed == f.as_str()))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset())
            .take(query.per_page() as usize)
            .cloned()
            .collect();
        (page, total)
    }

    pub fn render_page(
        entries: Vec<AuditEntry>,
        total: u64,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, CodecError> {
        let entries = entries
            .into_iter()
            .map(Self::render)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryPage {
            entries,
            total,
            page: query.page(),
            per_page: query.per_page(),
        })
    }

    pub fn render(entry: AuditEntry) -> Result<HistoryView, CodecError> {
        let description = entry.describe().inspect_err(|e| {
            tracing::error!(entry_id = %entry.id, order_id = %entry.order_id, error = %e, "Undecodable audit entry");
        })?;

        Ok(HistoryView {
            id: entry.id,
            field_changed: entry.field_changed,
            old_value: entry.old_value,
            new_value: entry.new_value,
            comment: entry.comment,
            description,
            created_by: entry.created_by,
            created_at: entry.created_at,
        })
    }
}
