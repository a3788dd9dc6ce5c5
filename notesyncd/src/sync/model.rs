use time::OffsetDateTime;

use super::store::StoreError;

/// What still has to be reconciled with the remote side for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    None,
    Create,
    Change,
    Delete,
    Conflict,
    Duplicate,
}

impl PendingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingAction::None => "none",
            PendingAction::Create => "create",
            PendingAction::Change => "change",
            PendingAction::Delete => "delete",
            PendingAction::Conflict => "conflict",
            PendingAction::Duplicate => "duplicate",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "none" => Ok(PendingAction::None),
            "create" => Ok(PendingAction::Create),
            "change" => Ok(PendingAction::Change),
            "delete" => Ok(PendingAction::Delete),
            "conflict" => Ok(PendingAction::Conflict),
            "duplicate" => Ok(PendingAction::Duplicate),
            other => Err(StoreError::InvalidAction(other.to_string())),
        }
    }

    /// Action a local edit leaves behind.
    pub fn after_local_edit(self) -> Self {
        match self {
            PendingAction::Create | PendingAction::Conflict => self,
            _ => PendingAction::Change,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    None,
    NeedShare,
    Shared,
    NeedStop,
}

impl ShareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareStatus::None => "none",
            ShareStatus::NeedShare => "need_share",
            ShareStatus::Shared => "shared",
            ShareStatus::NeedStop => "need_stop",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "none" => Ok(ShareStatus::None),
            "need_share" => Ok(ShareStatus::NeedShare),
            "shared" => Ok(ShareStatus::Shared),
            "need_stop" => Ok(ShareStatus::NeedStop),
            other => Err(StoreError::InvalidShareStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub name: String,
    pub stack: Option<String>,
    pub is_default: bool,
    pub usn: Option<i64>,
    pub service_created: Option<i64>,
    pub service_updated: Option<i64>,
    pub action: PendingAction,
}

#[derive(Debug, Clone)]
pub struct NotebookInput {
    pub guid: Option<String>,
    pub name: String,
    pub stack: Option<String>,
    pub usn: Option<i64>,
    pub service_created: Option<i64>,
    pub service_updated: Option<i64>,
    pub action: PendingAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub name: String,
    pub parent_guid: Option<String>,
    pub usn: Option<i64>,
    pub action: PendingAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub title: String,
    pub content: String,
    pub created: i64,
    pub updated: i64,
    pub updated_local: Option<i64>,
    pub notebook_id: Option<i64>,
    pub usn: Option<i64>,
    pub action: PendingAction,
    pub conflict_parent_id: Option<i64>,
    pub share_date: Option<i64>,
    pub share_status: ShareStatus,
    pub share_url: Option<String>,
    pub place: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NoteInput {
    pub guid: Option<String>,
    pub title: String,
    pub content: String,
    pub created: i64,
    pub updated: i64,
    pub updated_local: Option<i64>,
    pub notebook_id: Option<i64>,
    pub usn: Option<i64>,
    pub action: PendingAction,
    pub conflict_parent_id: Option<i64>,
    pub share_date: Option<i64>,
    pub place: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub note_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub mime: String,
    pub hash: String,
    pub action: PendingAction,
}

#[derive(Debug, Clone)]
pub struct ResourceInput {
    pub guid: Option<String>,
    pub note_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub mime: String,
    pub hash: String,
    pub action: PendingAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSearchRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub name: String,
    pub query: String,
    pub usn: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedNotebookRecord {
    pub id: i64,
    pub guid: Option<String>,
    pub share_name: String,
    pub username: Option<String>,
    pub shard_id: Option<String>,
    pub share_key: Option<String>,
    pub uri: Option<String>,
    pub usn: Option<i64>,
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
