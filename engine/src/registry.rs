///
/// Handle registries.
///
/// Three maps from i64 handle to live resource:
/// - ConnRegistry: open SQLite connections
/// - BufferRegistry: materialized result buffers (refcounted)
/// - BlobRegistry: binary payloads
///
/// Handles are sequential starting at 1; 0 is never issued.
///

use std::collections::HashMap;

use rusqlite::Connection;

use crate::buffer::Buffer;

pub(crate) struct ConnRegistry {
    pub(crate) connections: HashMap<i64, Connection>,
    next_id: i64,
}

impl ConnRegistry {
    pub(crate) fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn insert(&mut self, conn: Connection) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, conn);
        id
    }
}

pub(crate) struct BufferRegistry {
    pub(crate) buffers: HashMap<i64, Buffer>,
    next_id: i64,
}

impl BufferRegistry {
    pub(crate) fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn insert(&mut self, buffer: Buffer) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.insert(id, buffer);
        id
    }
}

pub(crate) struct BlobRegistry {
    pub(crate) blobs: HashMap<i64, Vec<u8>>,
    next_id: i64,
}

impl BlobRegistry {
    pub(crate) fn new() -> Self {
        Self {
            blobs: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn insert(&mut self, bytes: Vec<u8>) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.blobs.insert(id, bytes);
        id
    }
}
