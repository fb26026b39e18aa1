//! The guarded accessor.

use crate::codec;
use crate::config::AccessorConfig;
use crate::error::{GuardError, GuardResult};
use crate::opener::BoxOpener;
use crate::retry::open_with_retry;
use crate::signal::{Claim, ReadySignal};
use crate::sleeper::{Sleeper, TokioSleeper};
use boxguard_engine::{BoxEngine, BoxHandle};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Typed access to one box under a single-owner or multi-owner policy.
///
/// **Single owner** (the default): the box is opened once, on first use,
/// and stays open. Concurrent first callers share that one open; everyone
/// arriving while it is in progress waits for it. The `*_sync` methods are
/// available once it is open.
///
/// **Multi owner**: every operation opens the box, does its work and
/// closes it again, so other processes can take the box in between. While
/// another process holds it, the open is retried every
/// [`AccessorConfig::retry_delay`] until it succeeds or
/// [`AccessorConfig::max_tries`] attempts have failed. Failures while
/// closing after an operation are ignored.
///
/// Values are stored as CBOR.
///
/// Engine calls are synchronous file I/O: opening and replaying the log,
/// and the `sync_all` after every write, run on the calling task's worker
/// thread and block it until they finish. Only waiting for the ready signal
/// and the delay between open attempts yield to the runtime.
///
/// # Example
///
/// ```rust,no_run
/// use boxguard::{AccessorConfig, GuardedBox};
/// use boxguard_engine::BoxEngine;
///
/// # async fn run() -> boxguard::GuardResult<()> {
/// let engine = BoxEngine::new("./boxes");
/// let settings: GuardedBox<String> =
///     GuardedBox::new(engine, AccessorConfig::new("settings").multi_owner(true));
///
/// settings.put("theme", &"dark".to_string()).await?;
/// assert_eq!(settings.get("theme").await?.as_deref(), Some("dark"));
/// # Ok(())
/// # }
/// ```
pub struct GuardedBox<V> {
    config: AccessorConfig,
    opener: Arc<dyn BoxOpener>,
    sleeper: Arc<dyn Sleeper>,
    signal: ReadySignal,
    // never held across an await
    slot: Mutex<Option<BoxHandle>>,
    _values: PhantomData<fn() -> V>,
}

impl<V> std::fmt::Debug for GuardedBox<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedBox")
            .field("config", &self.config)
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

impl<V> GuardedBox<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Creates an accessor over `engine` that sleeps on the tokio timer.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(engine: BoxEngine, config: AccessorConfig) -> Self {
        Self::with_opener(Arc::new(engine), Arc::new(TokioSleeper), config)
    }

    /// Creates an accessor with a custom opener and sleeper.
    pub fn with_opener(
        opener: Arc<dyn BoxOpener>,
        sleeper: Arc<dyn Sleeper>,
        config: AccessorConfig,
    ) -> Self {
        Self {
            config,
            opener,
            sleeper,
            signal: ReadySignal::new(),
            slot: Mutex::new(None),
            _values: PhantomData,
        }
    }

    /// Returns the configured box name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the accessor configuration.
    #[must_use]
    pub fn config(&self) -> &AccessorConfig {
        &self.config
    }

    /// Returns true if a single-owner accessor currently holds its box.
    ///
    /// Always false for multi-owner accessors between operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }

    // ---- plumbing ----

    async fn ensure_open(&self) -> GuardResult<()> {
        match self.signal.claim().await {
            Claim::Ready => Ok(()),
            Claim::Opener(claim) => {
                // An error drops the claim, which lets the next caller try.
                let handle = self.opener.open(&self.config.name, self.config.lazy)?;
                debug!(box_name = %self.config.name, lazy = self.config.lazy, "opened single-owner box");
                *self.slot.lock() = Some(handle);
                claim.complete();
                Ok(())
            }
        }
    }

    /// Runs `f` against an open handle according to the ownership policy.
    async fn acquire<T, F>(&self, f: F) -> GuardResult<T>
    where
        F: FnOnce(&mut BoxHandle) -> GuardResult<T>,
    {
        if self.config.multi_owner {
            let mut handle =
                open_with_retry(self.opener.as_ref(), self.sleeper.as_ref(), &self.config).await?;
            let result = f(&mut handle);
            self.release(handle);
            return result;
        }

        loop {
            self.ensure_open().await?;
            {
                let mut slot = self.slot.lock();
                if let Some(handle) = slot.as_mut() {
                    return f(handle);
                }
            }
            // closed or deleted between the open and now
        }
    }

    fn release(&self, handle: BoxHandle) {
        if let Err(e) = handle.close() {
            debug!(box_name = %self.config.name, error = %e, "ignoring close failure");
        }
    }

    /// Runs `f` against the already open handle of a single-owner accessor.
    fn sync_access<T, F>(&self, operation: &'static str, f: F) -> GuardResult<T>
    where
        F: FnOnce(&mut BoxHandle) -> GuardResult<T>,
    {
        if self.config.multi_owner {
            return Err(GuardError::MultiOwnerUnsupported { operation });
        }
        if !self.signal.is_ready() {
            return Err(GuardError::not_opened(&self.config.name));
        }
        let mut slot = self.slot.lock();
        let handle = slot
            .as_mut()
            .ok_or_else(|| GuardError::not_opened(&self.config.name))?;
        f(handle)
    }

    fn require_regular(&self, operation: &'static str) -> GuardResult<()> {
        if self.config.lazy {
            return Err(GuardError::regular_box_required(operation, &self.config.name));
        }
        Ok(())
    }

    fn encode_entries<I, K>(entries: I) -> GuardResult<Vec<(String, Vec<u8>)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        entries
            .into_iter()
            .map(|(k, v)| Ok((k.into(), codec::encode(&v)?)))
            .collect()
    }

    fn decode_entries(raw: BTreeMap<String, Vec<u8>>) -> GuardResult<BTreeMap<String, V>> {
        raw.into_iter()
            .map(|(k, bytes)| Ok((k, codec::decode(&bytes)?)))
            .collect()
    }

    fn delete_held(&self) -> GuardResult<()> {
        let mut slot = self.slot.lock();
        let handle = slot
            .take()
            .ok_or_else(|| GuardError::not_opened(&self.config.name))?;
        let result = handle.delete_from_disk();
        self.signal.reset();
        result?;
        debug!(box_name = %self.config.name, "deleted box from disk");
        Ok(())
    }

    // ---- async operations ----

    /// Opens the box.
    ///
    /// Single owner: opens once and keeps it open; later calls return at
    /// once. Multi owner: opens and closes again, waiting out other owners.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::OpenExhausted`] if a multi-owner accessor runs
    /// out of attempts, or the engine error of a failed open.
    pub async fn open(&self) -> GuardResult<()> {
        self.acquire(|_| Ok(())).await
    }

    /// Returns the record log path of the box.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened.
    pub async fn path(&self) -> GuardResult<Option<PathBuf>> {
        self.acquire(|h| Ok(h.path())).await
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded, the box cannot be
    /// opened or the write fails.
    pub async fn put(&self, key: impl Into<String>, value: &V) -> GuardResult<()> {
        let key = key.into();
        let bytes = codec::encode(value)?;
        self.acquire(|h| Ok(h.put(key, bytes)?)).await
    }

    /// Stores every entry with one write.
    ///
    /// # Errors
    ///
    /// Same as [`GuardedBox::put`]; on failure no entry is stored.
    pub async fn put_all<I, K>(&self, entries: I) -> GuardResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let encoded = Self::encode_entries(entries)?;
        self.acquire(|h| Ok(h.put_all(encoded)?)).await
    }

    /// Returns the value stored under `key`.
    ///
    /// Works for lazy boxes too.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened, a lazy read fails or
    /// the stored value does not decode as `V`.
    pub async fn get(&self, key: &str) -> GuardResult<Option<V>> {
        let raw = self.acquire(|h| Ok(h.get(key)?)).await?;
        raw.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Returns every entry.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegularBoxRequired`] for lazy accessors, and
    /// otherwise the errors of [`GuardedBox::get`].
    pub async fn get_all(&self) -> GuardResult<BTreeMap<String, V>> {
        self.require_regular("get_all")?;
        let raw = self.acquire(|h| Ok(h.entries()?)).await?;
        Self::decode_entries(raw)
    }

    /// Returns every key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened.
    pub async fn keys(&self) -> GuardResult<Vec<String>> {
        self.acquire(|h| Ok(h.keys())).await
    }

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened.
    pub async fn exists(&self, key: &str) -> GuardResult<bool> {
        self.acquire(|h| Ok(h.contains_key(key))).await
    }

    /// Removes `key`. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened or the write fails.
    pub async fn delete(&self, key: &str) -> GuardResult<bool> {
        self.acquire(|h| Ok(h.delete(key)?)).await
    }

    /// Removes every entry and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened or the log cannot be
    /// truncated.
    pub async fn clear(&self) -> GuardResult<usize> {
        self.acquire(|h| Ok(h.clear()?)).await
    }

    /// Stores `value` under `key` if the key is absent and returns true, or
    /// removes the key if it is present and returns false.
    ///
    /// Both the check and the write happen under one open.
    ///
    /// # Errors
    ///
    /// Same as [`GuardedBox::put`].
    pub async fn toggle(&self, key: impl Into<String>, value: &V) -> GuardResult<bool> {
        let key = key.into();
        let bytes = codec::encode(value)?;
        self.acquire(|h| toggle_entry(h, key, bytes)).await
    }

    /// Returns the number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened.
    pub async fn count(&self) -> GuardResult<usize> {
        self.acquire(|h| Ok(h.len())).await
    }

    /// Closes the box and removes its files.
    ///
    /// A single-owner accessor is then closed; the next operation opens a
    /// fresh, empty box.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened or a file cannot be
    /// removed.
    pub async fn delete_from_disk(&self) -> GuardResult<()> {
        if self.config.multi_owner {
            let handle =
                open_with_retry(self.opener.as_ref(), self.sleeper.as_ref(), &self.config).await?;
            handle.delete_from_disk()?;
            debug!(box_name = %self.config.name, "deleted box from disk");
            return Ok(());
        }

        loop {
            self.ensure_open().await?;
            match self.delete_held() {
                Err(GuardError::NotOpened { .. }) => continue,
                other => return other,
            }
        }
    }

    /// Closes the box held by a single-owner accessor.
    ///
    /// Does nothing for multi-owner accessors or when the box is not open.
    /// The next operation opens it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails. The box is closed either
    /// way.
    pub async fn close(&self) -> GuardResult<()> {
        if self.config.multi_owner {
            return Ok(());
        }
        let mut slot = self.slot.lock();
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        self.signal.reset();
        handle.close()?;
        debug!(box_name = %self.config.name, "closed single-owner box");
        Ok(())
    }

    /// Rewrites the record log with only the live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened or the rewrite fails.
    pub async fn compact(&self) -> GuardResult<()> {
        self.acquire(|h| Ok(h.compact()?)).await
    }

    /// Flushes and syncs the record log.
    ///
    /// # Errors
    ///
    /// Returns an error if the box cannot be opened or the sync fails.
    pub async fn flush(&self) -> GuardResult<()> {
        self.acquire(|h| Ok(h.flush()?)).await
    }

    // ---- synchronous operations, single owner only ----

    /// Synchronous [`GuardedBox::path`].
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::MultiOwnerUnsupported`] for multi-owner
    /// accessors and [`GuardError::NotOpened`] before the box is open. The
    /// other `*_sync` methods fail the same way.
    pub fn path_sync(&self) -> GuardResult<Option<PathBuf>> {
        self.sync_access("path_sync", |h| Ok(h.path()))
    }

    /// Synchronous [`GuardedBox::put`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`] and [`GuardedBox::put`].
    pub fn put_sync(&self, key: impl Into<String>, value: &V) -> GuardResult<()> {
        let key = key.into();
        let bytes = codec::encode(value)?;
        self.sync_access("put_sync", |h| Ok(h.put(key, bytes)?))
    }

    /// Synchronous [`GuardedBox::put_all`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`] and [`GuardedBox::put`].
    pub fn put_all_sync<I, K>(&self, entries: I) -> GuardResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let encoded = Self::encode_entries(entries)?;
        self.sync_access("put_all_sync", |h| Ok(h.put_all(encoded)?))
    }

    /// Synchronous [`GuardedBox::get`]. Regular boxes only.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegularBoxRequired`] for lazy accessors; see
    /// also [`GuardedBox::path_sync`].
    pub fn get_sync(&self, key: &str) -> GuardResult<Option<V>> {
        self.require_regular("get_sync")?;
        let raw = self.sync_access("get_sync", |h| Ok(h.get(key)?))?;
        raw.map(|bytes| codec::decode(&bytes)).transpose()
    }

    /// Synchronous [`GuardedBox::get_all`]. Regular boxes only.
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::get_sync`].
    pub fn get_all_sync(&self) -> GuardResult<BTreeMap<String, V>> {
        self.require_regular("get_all_sync")?;
        let raw = self.sync_access("get_all_sync", |h| Ok(h.entries()?))?;
        Self::decode_entries(raw)
    }

    /// Synchronous [`GuardedBox::keys`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn keys_sync(&self) -> GuardResult<Vec<String>> {
        self.sync_access("keys_sync", |h| Ok(h.keys()))
    }

    /// Synchronous [`GuardedBox::exists`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn exists_sync(&self, key: &str) -> GuardResult<bool> {
        self.sync_access("exists_sync", |h| Ok(h.contains_key(key)))
    }

    /// Synchronous [`GuardedBox::delete`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn delete_sync(&self, key: &str) -> GuardResult<bool> {
        self.sync_access("delete_sync", |h| Ok(h.delete(key)?))
    }

    /// Synchronous [`GuardedBox::clear`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn clear_sync(&self) -> GuardResult<usize> {
        self.sync_access("clear_sync", |h| Ok(h.clear()?))
    }

    /// Synchronous [`GuardedBox::toggle`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`] and [`GuardedBox::put`].
    pub fn toggle_sync(&self, key: impl Into<String>, value: &V) -> GuardResult<bool> {
        let key = key.into();
        let bytes = codec::encode(value)?;
        self.sync_access("toggle_sync", |h| toggle_entry(h, key, bytes))
    }

    /// Synchronous [`GuardedBox::count`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn count_sync(&self) -> GuardResult<usize> {
        self.sync_access("count_sync", |h| Ok(h.len()))
    }

    /// Synchronous [`GuardedBox::delete_from_disk`].
    ///
    /// # Errors
    ///
    /// See [`GuardedBox::path_sync`].
    pub fn delete_from_disk_sync(&self) -> GuardResult<()> {
        if self.config.multi_owner {
            return Err(GuardError::MultiOwnerUnsupported {
                operation: "delete_from_disk_sync",
            });
        }
        self.delete_held()
    }
}

fn toggle_entry(handle: &mut BoxHandle, key: String, value: Vec<u8>) -> GuardResult<bool> {
    if handle.contains_key(&key) {
        handle.delete(&key)?;
        Ok(false)
    } else {
        handle.put(key, value)?;
        Ok(true)
    }
}
