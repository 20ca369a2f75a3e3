/*!
# Otter Governance Storage

Durable storage for rafts, members and rules across restarts.

Three relations are persisted:

- `rafts(raft_id, created_at, updated_at)`
- `members(raft_id, member_id, state, joined_at, last_seen_at,
  public_key, signature, inducted_by, expires_at)` keyed by
  `(raft_id, member_id)`
- `rules(rule_id, raft_id, scope, version, timestamp, body,
  base_rule_id, signature, proposed_by, adopted_at)`

Saving a raft upserts its row and every member and rule row in one
atomic write; a failing row rolls back the whole call. Backends:
in-memory (tests, development) and RocksDB (feature `rocksdb`, on by
default), where key prefixes double as the secondary indices on
`members.raft_id`, `rules.raft_id` and `rules.scope`.
*/

pub mod backend;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod store;

pub use backend::{StorageBackend, StorageError, StorageStats};
pub use memory::MemoryBackend;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksBackend;
pub use store::{BackendType, PersistenceStore, StorageConfig};
