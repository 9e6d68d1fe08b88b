//! RocksDB-backed persistent distributor state.
//!
//! Implements [`DistributorStore`] using column families for the per-week
//! tables, account cursors, relock delegations and metadata. Every
//! [`DistributorStore::apply`] is a single [`WriteBatch`], so a delta is
//! either fully on disk or not at all.
//!
//! On first open, writes the genesis globals for the given start time.

use std::collections::BTreeMap;
use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{info, warn};

use sluice_core::error::SluiceError;
use sluice_core::store::{AccountCursor, DistributorStore, Globals, StateDelta, WeekRecord};
use sluice_core::types::AccountId;

// --- Column family names ---

const CF_TOKENS_PER_WEEK: &str = "tokens_per_week";
const CF_VE_SUPPLY: &str = "ve_supply";
const CF_ACCOUNTS: &str = "accounts";
const CF_RELOCK: &str = "relock";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[CF_TOKENS_PER_WEEK, CF_VE_SUPPLY, CF_ACCOUNTS, CF_RELOCK, CF_METADATA];

// --- Metadata keys ---

const META_GLOBALS: &[u8] = b"globals";

fn storage_err(e: impl std::fmt::Display) -> SluiceError {
    SluiceError::Storage(e.to_string())
}

/// RocksDB-backed [`DistributorStore`].
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at `path`.
    ///
    /// An empty database is initialized with [`Globals::genesis`] for
    /// `start_time`. An existing one keeps its own start time.
    pub fn open(path: impl AsRef<Path>, start_time: u64) -> Result<Self, SluiceError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(storage_err)?;
        let store = Self { db };

        match store.read_globals()? {
            None => {
                let genesis = Globals::genesis(start_time);
                let cf = store.cf_handle(CF_METADATA)?;
                store
                    .db
                    .put_cf(cf, META_GLOBALS, Self::encode(&genesis)?)
                    .map_err(storage_err)?;
                info!(start_time = genesis.start_time, "initialized distributor state");
            }
            Some(existing) if existing.start_time != Globals::genesis(start_time).start_time => {
                warn!(
                    stored = existing.start_time,
                    requested = start_time,
                    "existing state keeps its start time"
                );
            }
            Some(_) => {}
        }
        Ok(store)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), SluiceError> {
        self.db.flush().map_err(storage_err)
    }

    /// Every per-week row, in week order.
    pub fn weeks(&self) -> Result<Vec<WeekRecord>, SluiceError> {
        self.week_table(0, u64::MAX)
    }

    /// Every stored account cursor, in account order.
    pub fn accounts(&self) -> Result<Vec<(AccountId, AccountCursor)>, SluiceError> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let bytes: [u8; 20] = key
                .as_ref()
                .try_into()
                .map_err(|_| SluiceError::Storage("invalid account key length".into()))?;
            out.push((AccountId(bytes), Self::decode(&value)?));
        }
        Ok(out)
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, SluiceError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SluiceError::Storage(format!("missing column family: {name}")))
    }

    fn read_globals(&self) -> Result<Option<Globals>, SluiceError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, META_GLOBALS).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_u64(&self, cf_name: &str, key: &[u8]) -> Result<Option<u64>, SluiceError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| SluiceError::Storage(format!("invalid {cf_name} value length")))?;
                Ok(Some(u64::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Scan `[from, to)` of a week-keyed column family.
    fn scan_weeks(&self, cf_name: &str, from: u64, to: u64) -> Result<Vec<(u64, u64)>, SluiceError> {
        let cf = self.cf_handle(cf_name)?;
        let start = Self::week_key(from);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, value) = item.map_err(storage_err)?;
            let week = u64::from_be_bytes(
                key.as_ref()
                    .try_into()
                    .map_err(|_| SluiceError::Storage("invalid week key length".into()))?,
            );
            if week >= to {
                break;
            }
            let amount = u64::from_le_bytes(
                value
                    .as_ref()
                    .try_into()
                    .map_err(|_| SluiceError::Storage(format!("invalid {cf_name} value length")))?,
            );
            out.push((week, amount));
        }
        Ok(out)
    }

    /// Encode a week as big-endian bytes for ordered iteration.
    fn week_key(week: u64) -> [u8; 8] {
        week.to_be_bytes()
    }

    fn relock_key(account: &AccountId, delegate: &AccountId) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..20].copy_from_slice(account.as_bytes());
        key[20..].copy_from_slice(delegate.as_bytes());
        key
    }

    fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, SluiceError> {
        bincode::encode_to_vec(value, bincode::config::standard()).map_err(storage_err)
    }

    fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, SluiceError> {
        let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
        Ok(value)
    }
}

impl DistributorStore for RocksStore {
    fn globals(&self) -> Result<Globals, SluiceError> {
        self.read_globals()?
            .ok_or_else(|| SluiceError::Storage("missing globals".into()))
    }

    fn tokens_per_week(&self, week: u64) -> Result<u64, SluiceError> {
        Ok(self.get_u64(CF_TOKENS_PER_WEEK, &Self::week_key(week))?.unwrap_or(0))
    }

    fn ve_supply(&self, week: u64) -> Result<Option<u64>, SluiceError> {
        self.get_u64(CF_VE_SUPPLY, &Self::week_key(week))
    }

    fn account_cursor(&self, account: &AccountId) -> Result<Option<AccountCursor>, SluiceError> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, account.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn relock_allowed(&self, account: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError> {
        let cf = self.cf_handle(CF_RELOCK)?;
        Ok(self
            .db
            .get_cf(cf, Self::relock_key(account, delegate))
            .map_err(storage_err)?
            .is_some())
    }

    fn apply(&mut self, delta: StateDelta) -> Result<(), SluiceError> {
        let mut batch = WriteBatch::default();

        if let Some(globals) = &delta.globals {
            batch.put_cf(self.cf_handle(CF_METADATA)?, META_GLOBALS, Self::encode(globals)?);
        }
        let cf = self.cf_handle(CF_TOKENS_PER_WEEK)?;
        for (week, amount) in &delta.tokens_per_week {
            batch.put_cf(cf, Self::week_key(*week), amount.to_le_bytes());
        }
        let cf = self.cf_handle(CF_VE_SUPPLY)?;
        for (week, supply) in &delta.ve_supply {
            batch.put_cf(cf, Self::week_key(*week), supply.to_le_bytes());
        }
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        for (account, cursor) in &delta.accounts {
            batch.put_cf(cf, account.as_bytes(), Self::encode(cursor)?);
        }
        let cf = self.cf_handle(CF_RELOCK)?;
        for ((account, delegate), allowed) in &delta.relock {
            let key = Self::relock_key(account, delegate);
            if *allowed {
                batch.put_cf(cf, key, [1u8]);
            } else {
                batch.delete_cf(cf, key);
            }
        }

        self.db.write(batch).map_err(storage_err)
    }

    fn week_table(&self, from: u64, to: u64) -> Result<Vec<WeekRecord>, SluiceError> {
        let mut rows: BTreeMap<u64, WeekRecord> = BTreeMap::new();
        for (week, tokens) in self.scan_weeks(CF_TOKENS_PER_WEEK, from, to)? {
            rows.entry(week)
                .or_insert(WeekRecord { week, tokens: 0, ve_supply: None })
                .tokens = tokens;
        }
        for (week, supply) in self.scan_weeks(CF_VE_SUPPLY, from, to)? {
            rows.entry(week)
                .or_insert(WeekRecord { week, tokens: 0, ve_supply: None })
                .ve_supply = Some(supply);
        }
        Ok(rows.into_values().collect())
    }
}
