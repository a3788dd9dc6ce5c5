use notesync_core::{ChunkRequest, EntityKind, GatewayError, RemoteGateway, SyncChunk, Usn};

/// One page of the change feed and the USN it reaches.
#[derive(Debug)]
pub struct ChangeBatch {
    pub chunk: SyncChunk,
    pub high_usn: Usn,
}

/// Walks the change feed of one entity kind from `after_usn` up to `upto`.
///
/// The cursor is finite and cannot be rewound; once it reports the end it
/// keeps returning `None`.
pub struct ChangeCursor<'g, G> {
    gateway: &'g G,
    kind: EntityKind,
    after_usn: Usn,
    upto: Usn,
    batch_size: u32,
    done: bool,
}

impl<'g, G: RemoteGateway> ChangeCursor<'g, G> {
    pub fn new(gateway: &'g G, kind: EntityKind, after_usn: Usn, upto: Usn, batch_size: u32) -> Self {
        Self {
            gateway,
            kind,
            after_usn,
            upto,
            batch_size: batch_size.max(1),
            done: after_usn >= upto,
        }
    }

    pub async fn next_batch(&mut self) -> Result<Option<ChangeBatch>, GatewayError> {
        if self.done {
            return Ok(None);
        }
        let chunk = self
            .gateway
            .fetch_changes(ChunkRequest {
                after_usn: self.after_usn,
                max_usn: self.upto,
                max_entries: self.batch_size,
                kind: self.kind,
            })
            .await?;

        let Some(high_usn) = chunk.chunk_high_usn else {
            self.done = true;
            return Ok(None);
        };
        if high_usn <= self.after_usn {
            self.done = true;
            return Ok(None);
        }
        self.after_usn = high_usn;
        if high_usn >= self.upto || high_usn >= chunk.update_count {
            self.done = true;
        }
        Ok(Some(ChangeBatch { chunk, high_usn }))
    }
}
