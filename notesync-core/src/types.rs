use serde::{Deserialize, Serialize};

/// Update sequence number assigned by the remote service to every change.
pub type Usn = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Notebook,
    Tag,
    Note,
    LinkedNotebook,
    SavedSearch,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Notebook => "notebook",
            EntityKind::Tag => "tag",
            EntityKind::Note => "note",
            EntityKind::LinkedNotebook => "linked_notebook",
            EntityKind::SavedSearch => "saved_search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncSummary {
    pub current_time: i64,
    pub update_count: Usn,
    #[serde(default)]
    pub uploaded_bytes: i64,
    #[serde(default)]
    pub full_sync_before: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub after_usn: Usn,
    pub max_usn: Usn,
    pub max_entries: u32,
    pub kind: EntityKind,
}

/// One batch of the change feed, filtered to a single entity kind.
///
/// `chunk_high_usn` is absent when the server had nothing to report after
/// `after_usn`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SyncChunk {
    #[serde(default)]
    pub current_time: i64,
    #[serde(default)]
    pub chunk_high_usn: Option<Usn>,
    pub update_count: Usn,
    #[serde(default)]
    pub notebooks: Vec<RemoteNotebook>,
    #[serde(default)]
    pub tags: Vec<RemoteTag>,
    #[serde(default)]
    pub notes: Vec<RemoteNote>,
    #[serde(default)]
    pub searches: Vec<RemoteSavedSearch>,
    #[serde(default)]
    pub linked_notebooks: Vec<RemoteLinkedNotebook>,
    #[serde(default)]
    pub expunged: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteNotebook {
    #[serde(default)]
    pub guid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub default_notebook: bool,
    #[serde(default)]
    pub usn: Usn,
    #[serde(default)]
    pub service_created: Option<i64>,
    #[serde(default)]
    pub service_updated: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteTag {
    #[serde(default)]
    pub guid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub parent_guid: Option<String>,
    #[serde(default)]
    pub usn: Usn,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NoteAttributes {
    #[serde(default)]
    pub share_date: Option<i64>,
    #[serde(default)]
    pub place_name: Option<String>,
}

/// A note as reported by the server.
///
/// Change-feed records carry metadata only: `content` and `resources` are
/// `None` there and the full record has to be fetched separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteNote {
    #[serde(default)]
    pub guid: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created: i64,
    pub updated: i64,
    #[serde(default)]
    pub deleted: Option<i64>,
    #[serde(default)]
    pub notebook_guid: Option<String>,
    #[serde(default)]
    pub tag_guids: Vec<String>,
    #[serde(default)]
    pub resources: Option<Vec<RemoteResource>>,
    #[serde(default)]
    pub attributes: NoteAttributes,
    #[serde(default)]
    pub usn: Usn,
}

impl RemoteNote {
    pub fn is_partial(&self) -> bool {
        self.content.is_none() || self.resources.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteResource {
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub note_guid: Option<String>,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Hex md5 of the resource body.
    pub body_hash: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub usn: Usn,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteSavedSearch {
    #[serde(default)]
    pub guid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub usn: Usn,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteLinkedNotebook {
    #[serde(default)]
    pub guid: Option<String>,
    pub share_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub shard_id: Option<String>,
    #[serde(default)]
    pub share_key: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub usn: Usn,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotebookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub default_notebook: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TagPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_guid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_guid: Option<String>,
    pub tag_guids: Vec<String>,
    pub resources: Vec<ResourcePayload>,
    pub created: i64,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourcePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub mime: String,
    pub file_name: String,
    pub body_hash: String,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

/// Result of publishing a note.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SharedNote {
    pub share_key: String,
    pub share_url: String,
}

mod base64_body {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
