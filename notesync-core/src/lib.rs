mod client;
mod gateway;
mod types;

pub use client::{ApiErrorClass, NoteStoreClient, NoteStoreError, ShareResponse};
pub use gateway::{GatewayError, RemoteGateway};
pub use types::{
    ChunkRequest, EntityKind, NoteAttributes, NotePayload, NotebookPayload, RemoteLinkedNotebook,
    RemoteNote, RemoteNotebook, RemoteResource, RemoteSavedSearch, RemoteTag, ResourcePayload,
    SharedNote, SyncChunk, SyncSummary, TagPayload, Usn,
};
