//! Storage layer
//!
//! # Key layout
//!
//! Every key is scoped under the configured namespace (default `autosplit:`):
//!
//! - `counter:<name>` - monotonic id generators (`team`, `payment`, `proposal`)
//! - `team:<id>`, `payment:<id>`, `proposal:<id>` - canonical entity records
//! - `owner-teams:<owner>`, `member-teams:<wallet>` - id indexes by wallet
//! - `team-payments:<teamId>`, `team-proposals:<teamId>` - id indexes by team
//! - `owner` - contract owner, written once at initialization
//!
//! # Atomicity
//!
//! All access goes through a [`Transaction`]. Writes and notification events
//! are buffered in the transaction and reach the store in a single atomic
//! batch on [`Transaction::commit`]. A transaction dropped on an error path
//! leaves no trace.

use crate::{
    codec::{ArgsReader, ArgsWriter, Decode, Encode},
    error::{Error, Result},
    host::Host,
    types::{Address, Payment, Proposal, Team},
    Config,
};
use parking_lot::RwLock;
use rocksdb::{DBCompactionStyle, Options, WriteBatch, DB};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Counter name for team ids
pub const TEAM_COUNTER: &str = "team";

/// Counter name for payment ids
pub const PAYMENT_COUNTER: &str = "payment";

/// Counter name for proposal ids
pub const PROPOSAL_COUNTER: &str = "proposal";

/// Logical keys, before namespacing
pub mod keys {
    use crate::types::Address;

    /// Contract owner singleton
    pub const OWNER: &str = "owner";

    /// Counter key
    pub fn counter(name: &str) -> String {
        format!("counter:{}", name)
    }

    /// Team record
    pub fn team(team_id: u64) -> String {
        format!("team:{}", team_id)
    }

    /// Teams created by an owner
    pub fn owner_teams(owner: &Address) -> String {
        format!("owner-teams:{}", owner)
    }

    /// Teams a wallet was ever allocated a share in
    pub fn member_teams(member: &Address) -> String {
        format!("member-teams:{}", member)
    }

    /// Payment record
    pub fn payment(payment_id: u64) -> String {
        format!("payment:{}", payment_id)
    }

    /// Payments of a team, in creation order
    pub fn team_payments(team_id: u64) -> String {
        format!("team-payments:{}", team_id)
    }

    /// Proposal record
    pub fn proposal(proposal_id: u64) -> String {
        format!("proposal:{}", proposal_id)
    }

    /// Proposals of a team, in creation order
    pub fn team_proposals(team_id: u64) -> String {
        format!("team-proposals:{}", team_id)
    }
}

/// Byte-level key-value backend
pub trait KvStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply all entries atomically
    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;
}

/// RocksDB-backed store
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Point lookups dominate: entity loads and index reads by exact key
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let db = DB::open(&db_opts, path)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self { db })
    }
}

impl fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in &entries {
            batch.put(key, value);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

/// In-process store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut guard = self.entries.write();
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }
}

/// Insertion-ordered set of ids
///
/// Order of first insertion is the only ordering guarantee.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdIndex {
    ids: Vec<u64>,
    present: HashSet<u64>,
}

impl IdIndex {
    /// Build from stored order, dropping repeats
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut index = Self::default();
        for id in ids {
            index.insert(id);
        }
        index
    }

    /// Append unless present; returns whether the id was added
    pub fn insert(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.present.insert(id);
        self.ids.push(id);
        true
    }

    /// Membership check
    pub fn contains(&self, id: u64) -> bool {
        self.present.contains(&id)
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Number of ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Namespaced persistence over a [`KvStore`]
pub struct Storage<S> {
    store: S,
    namespace: String,
}

impl<S> Storage<S> {
    /// Namespace prefix
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl<S: KvStore> Storage<S> {
    /// Wrap a store under `namespace`
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a transaction; read-only callers simply never commit it
    pub fn transaction(&self) -> Transaction<'_, S> {
        Transaction {
            storage: self,
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    fn physical_key(&self, key: &str) -> Vec<u8> {
        let mut physical = Vec::with_capacity(self.namespace.len() + key.len());
        physical.extend_from_slice(self.namespace.as_bytes());
        physical.extend_from_slice(key.as_bytes());
        physical
    }
}

impl<S> fmt::Debug for Storage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Buffered unit of work against [`Storage`]
pub struct Transaction<'a, S> {
    storage: &'a Storage<S>,
    writes: BTreeMap<String, Vec<u8>>,
    events: Vec<String>,
}

impl<S> fmt::Debug for Transaction<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("writes", &self.writes.len())
            .field("events", &self.events)
            .finish()
    }
}

impl<'a, S: KvStore> Transaction<'a, S> {
    // Raw access

    /// Read a value, seeing this transaction's own writes
    pub fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        self.storage.store.get(&self.storage.physical_key(key))
    }

    /// Read a value that must exist
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.try_get(key)?
            .ok_or_else(|| Error::NotFound(format!("storage key {}", key)))
    }

    /// Presence check
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.try_get(key)?.is_some())
    }

    /// Buffer a write
    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), value);
    }

    /// Decode a record
    pub fn load<T: Decode>(&self, key: &str) -> Result<T> {
        T::decode(&self.get(key)?)
    }

    /// Encode and buffer a record
    pub fn save<T: Encode>(&mut self, key: impl Into<String>, value: &T) {
        self.set(key, value.encode());
    }

    // Counters

    /// Current counter value (0 if never incremented)
    pub fn counter(&self, name: &str) -> Result<u64> {
        match self.try_get(&keys::counter(name))? {
            None => Ok(0),
            Some(raw) => {
                let mut reader = ArgsReader::new(&raw);
                let value = reader.u64()?;
                reader.finish()?;
                Ok(value)
            }
        }
    }

    /// Increment and return the new value
    pub fn increment(&mut self, name: &str) -> Result<u64> {
        let next = self
            .counter(name)?
            .checked_add(1)
            .ok_or_else(|| Error::InvariantViolation(format!("counter {} exhausted", name)))?;
        let mut writer = ArgsWriter::new();
        writer.u64(next);
        self.set(keys::counter(name), writer.into_bytes());
        Ok(next)
    }

    // Id indexes

    /// Read an index (empty if absent)
    pub fn id_index(&self, key: &str) -> Result<IdIndex> {
        match self.try_get(key)? {
            None => Ok(IdIndex::default()),
            Some(raw) => {
                let mut reader = ArgsReader::new(&raw);
                let ids = reader.u64_array()?;
                reader.finish()?;
                Ok(IdIndex::from_ids(ids))
            }
        }
    }

    /// Append `id` to an index unless already present
    pub fn append_unique(&mut self, key: &str, id: u64) -> Result<bool> {
        let mut index = self.id_index(key)?;
        if !index.insert(id) {
            return Ok(false);
        }
        let mut writer = ArgsWriter::new();
        writer.u64_array(index.ids());
        self.set(key, writer.into_bytes());
        Ok(true)
    }

    // Teams

    /// Team existence
    pub fn team_exists(&self, team_id: u64) -> Result<bool> {
        self.has(&keys::team(team_id))
    }

    /// Load a team
    pub fn load_team(&self, team_id: u64) -> Result<Team> {
        match self.try_get(&keys::team(team_id))? {
            Some(raw) => Team::decode(&raw),
            None => Err(Error::NotFound(format!("team {}", team_id))),
        }
    }

    /// Save a team
    pub fn save_team(&mut self, team: &Team) {
        self.save(keys::team(team.id), team);
    }

    /// Record that `owner` created `team_id`
    pub fn track_owner_team(&mut self, owner: &Address, team_id: u64) -> Result<()> {
        self.append_unique(&keys::owner_teams(owner), team_id)?;
        Ok(())
    }

    /// Teams created by `owner`
    pub fn owner_team_ids(&self, owner: &Address) -> Result<Vec<u64>> {
        Ok(self.id_index(&keys::owner_teams(owner))?.ids().to_vec())
    }

    /// Record that `member` holds (or held) a share in `team_id`
    pub fn track_member_team(&mut self, member: &Address, team_id: u64) -> Result<()> {
        self.append_unique(&keys::member_teams(member), team_id)?;
        Ok(())
    }

    /// Teams `member` was added to
    pub fn member_team_ids(&self, member: &Address) -> Result<Vec<u64>> {
        Ok(self.id_index(&keys::member_teams(member))?.ids().to_vec())
    }

    // Payments

    /// Save a payment and register it with its team
    pub fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        self.save(keys::payment(payment.id), payment);
        self.append_unique(&keys::team_payments(payment.team_id), payment.id)?;
        Ok(())
    }

    /// Load a payment
    pub fn load_payment(&self, payment_id: u64) -> Result<Payment> {
        match self.try_get(&keys::payment(payment_id))? {
            Some(raw) => Payment::decode(&raw),
            None => Err(Error::NotFound(format!("payment {}", payment_id))),
        }
    }

    /// Payment ids of a team, oldest first
    pub fn team_payment_ids(&self, team_id: u64) -> Result<Vec<u64>> {
        Ok(self.id_index(&keys::team_payments(team_id))?.ids().to_vec())
    }

    // Proposals

    /// Save a proposal and register it with its team
    pub fn save_proposal(&mut self, proposal: &Proposal) -> Result<()> {
        self.save(keys::proposal(proposal.id), proposal);
        self.append_unique(&keys::team_proposals(proposal.team_id), proposal.id)?;
        Ok(())
    }

    /// Load a proposal
    pub fn load_proposal(&self, proposal_id: u64) -> Result<Proposal> {
        match self.try_get(&keys::proposal(proposal_id))? {
            Some(raw) => Proposal::decode(&raw),
            None => Err(Error::NotFound(format!("proposal {}", proposal_id))),
        }
    }

    /// Proposal ids of a team, oldest first
    pub fn team_proposal_ids(&self, team_id: u64) -> Result<Vec<u64>> {
        Ok(self.id_index(&keys::team_proposals(team_id))?.ids().to_vec())
    }

    // Contract owner

    /// Stored contract owner, if initialized
    pub fn contract_owner(&self) -> Result<Option<Address>> {
        match self.try_get(keys::OWNER)? {
            None => Ok(None),
            Some(raw) => String::from_utf8(raw)
                .map(|owner| Some(Address::new(owner)))
                .map_err(|e| Error::Codec(format!("owner record: {}", e))),
        }
    }

    /// Write the contract owner
    pub fn set_contract_owner(&mut self, owner: &Address) {
        self.set(keys::OWNER, owner.as_str().as_bytes().to_vec());
    }

    // Events and commit

    /// Queue a notification for emission after commit
    pub fn emit(&mut self, event: impl Into<String>) {
        let event = event.into();
        self.events
            .push(format!("{}{}", self.storage.namespace, event));
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Apply every buffered write atomically, then emit queued events
    pub fn commit(self, host: &mut dyn Host) -> Result<()> {
        let write_count = self.pending_writes();
        let Transaction {
            storage,
            writes,
            events,
        } = self;

        let entries = writes
            .into_iter()
            .map(|(key, value)| (storage.physical_key(&key), value))
            .collect();
        storage.store.write_batch(entries)?;

        tracing::debug!(writes = write_count, events = events.len(), "Transaction committed");

        for event in events {
            host.emit(event);
        }
        Ok(())
    }
}
