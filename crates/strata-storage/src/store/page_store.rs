//! File-backed page store.
//!
//! Pages live in one file at `page_id * page_size`. Three layers of state sit
//! above the file:
//!
//! - the committed buffer: pages written since the last flush, shared by
//!   every reader and tagged with the LSN that produced them;
//! - the staged buffer: per-transaction versions of pages, visible only to
//!   the owning transaction until it publishes them on commit;
//! - the allocation map: page count plus the free list, rebuilt from page
//!   tags when the file is opened.
//!
//! Lock order is staged, then allocation, then committed, then file.

use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use strata_common::constants::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use strata_common::types::{Lsn, PageId, TxnId};

use super::error::{StorageError, StorageResult};
use super::options::PageStoreOptions;
use crate::page::meta::{CHECKPOINT_LEN, CHECKPOINT_OFFSET, META_HEADER_END};
use crate::page::{CheckpointMarker, MetaPage, PageType};

/// A page version in the committed buffer.
#[derive(Debug, Clone)]
struct DirtyPage {
    data: Bytes,
    lsn: Lsn,
    version: u64,
}

/// A page version private to one transaction.
#[derive(Debug, Clone)]
struct StagedPage {
    owner: TxnId,
    data: Bytes,
    lsn: Lsn,
    modified: bool,
}

#[derive(Debug)]
struct Allocation {
    page_count: u64,
    free: BTreeSet<PageId>,
}

impl Allocation {
    fn is_allocated(&self, page_id: PageId) -> bool {
        page_id.as_u64() < self.page_count && !self.free.contains(&page_id)
    }
}

/// Point-in-time page store statistics.
#[derive(Debug, Clone, Default)]
pub struct PageStoreStats {
    /// Pages in the file, including free ones.
    pub page_count: u64,
    /// Pages on the free list.
    pub free_pages: usize,
    /// Committed pages waiting for a flush.
    pub dirty_pages: usize,
    /// Pages staged by active transactions.
    pub staged_pages: usize,
    /// Pages read from the file.
    pub file_reads: u64,
    /// Completed flushes.
    pub flushes: u64,
    /// Pages written by flushes.
    pub pages_flushed: u64,
}

/// Fixed-size page storage over a single file.
pub struct PageStore {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
    tree_order: usize,
    alloc: Mutex<Allocation>,
    staged: RwLock<HashMap<PageId, StagedPage>>,
    committed: RwLock<HashMap<PageId, DirtyPage>>,
    next_version: AtomicU64,
    flush_lock: Mutex<()>,
    file_reads: AtomicU64,
    flushes: AtomicU64,
    pages_flushed: AtomicU64,
}

impl PageStore {
    /// Opens the page file at `path`, creating it if it does not exist.
    ///
    /// A new file takes its page size and tree order from `options`. An
    /// existing file keeps the values it was created with.
    pub fn open(path: impl AsRef<Path>, options: PageStoreOptions) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let len = file.metadata()?.len();

        let meta = if len == 0 {
            Self::initialize(&mut file, &options)?;
            info!(
                path = %path.display(),
                page_size = options.page_size,
                tree_order = options.tree_order,
                "created page file"
            );
            MetaPage::new(options.page_size, options.tree_order)
        } else {
            let meta = Self::read_meta(&mut file)?;
            if meta.page_size != options.page_size || meta.tree_order != options.tree_order {
                warn!(
                    path = %path.display(),
                    page_size = meta.page_size,
                    tree_order = meta.tree_order,
                    requested_page_size = options.page_size,
                    requested_tree_order = options.tree_order,
                    "existing store keeps its on-disk page size and tree order"
                );
            }
            meta
        };

        let page_size = meta.page_size;
        let page_count = len.div_ceil(page_size as u64).max(1);
        let free = Self::scan_free_pages(&mut file, page_size, page_count)?;

        debug!(
            path = %path.display(),
            page_count,
            free_pages = free.len(),
            "opened page file"
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_size,
            tree_order: meta.tree_order,
            alloc: Mutex::new(Allocation { page_count, free }),
            staged: RwLock::new(HashMap::new()),
            committed: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            flush_lock: Mutex::new(()),
            file_reads: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            pages_flushed: AtomicU64::new(0),
        })
    }

    /// Writes the metadata page and initial checkpoint marker of a new file.
    fn initialize(file: &mut File, options: &PageStoreOptions) -> StorageResult<()> {
        let mut page = MetaPage::new(options.page_size, options.tree_order).encode();
        page[CHECKPOINT_OFFSET..CHECKPOINT_OFFSET + CHECKPOINT_LEN]
            .copy_from_slice(&CheckpointMarker::INITIAL.encode());
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&page)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_meta(file: &mut File) -> StorageResult<MetaPage> {
        let mut header = [0u8; META_HEADER_END];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => StorageError::invalid_meta("metadata page truncated"),
            _ => StorageError::from(e),
        })?;

        let meta = MetaPage::decode(&header)?;
        if !meta.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&meta.page_size)
        {
            return Err(StorageError::invalid_meta(format!(
                "unusable page size {}",
                meta.page_size
            )));
        }
        Ok(meta)
    }

    /// Rebuilds the free list from page tags.
    fn scan_free_pages(
        file: &mut File,
        page_size: usize,
        page_count: u64,
    ) -> StorageResult<BTreeSet<PageId>> {
        let mut free = BTreeSet::new();
        let mut tag = [0u8; 1];
        for id in 1..page_count {
            let page_id = PageId::new(id);
            file.seek(SeekFrom::Start(page_id.file_offset(page_size)))?;
            match file.read(&mut tag)? {
                0 => {
                    free.insert(page_id);
                }
                _ if PageType::from_u8(tag[0]) == Some(PageType::Free) => {
                    free.insert(page_id);
                }
                _ => {}
            }
        }
        Ok(free)
    }

    /// Returns the path of the page file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the tree order recorded in the metadata page.
    pub fn tree_order(&self) -> usize {
        self.tree_order
    }

    /// Returns the number of pages, including free ones.
    pub fn page_count(&self) -> u64 {
        self.alloc.lock().page_count
    }

    /// Returns true if the page is allocated.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.alloc.lock().is_allocated(page_id)
    }

    /// Allocates a page, reusing the lowest free page before growing the file.
    pub fn allocate(&self) -> PageId {
        let mut alloc = self.alloc.lock();
        if let Some(page_id) = alloc.free.pop_first() {
            return page_id;
        }
        let page_id = PageId::new(alloc.page_count);
        alloc.page_count += 1;
        page_id
    }

    /// Returns an allocation that was never published to the free list.
    ///
    /// Used when the transaction that allocated the page aborts. The page's
    /// committed contents are untouched; they were free before allocation.
    pub fn release(&self, page_id: PageId) {
        if page_id.is_meta() {
            return;
        }
        self.alloc.lock().free.insert(page_id);
    }

    /// Frees a page: its contents are zeroed and it becomes reusable.
    pub fn free(&self, page_id: PageId) -> StorageResult<()> {
        if page_id.is_meta() {
            return Err(StorageError::MetaPageFree);
        }

        let mut alloc = self.alloc.lock();
        if !alloc.is_allocated(page_id) {
            return Err(StorageError::PageNotFound { page_id });
        }
        alloc.free.insert(page_id);

        let zeroed = Bytes::from(vec![0u8; self.page_size]);
        self.buffer(page_id, zeroed, Lsn::ZERO);
        Ok(())
    }

    /// Reads the committed version of a page.
    pub fn read(&self, page_id: PageId) -> StorageResult<Bytes> {
        if !self.is_allocated(page_id) {
            return Err(StorageError::PageNotFound { page_id });
        }
        self.read_unchecked(page_id)
    }

    /// Reads a page as seen by `txn`: its staged version if it owns one,
    /// otherwise the committed version.
    pub fn read_for(&self, txn: TxnId, page_id: PageId) -> StorageResult<Bytes> {
        {
            let staged = self.staged.read();
            if let Some(page) = staged.get(&page_id) {
                if page.owner == txn {
                    return Ok(page.data.clone());
                }
            }
        }
        self.read(page_id)
    }

    /// Buffers a whole-page write. Nothing reaches the file until [`flush`].
    ///
    /// [`flush`]: PageStore::flush
    pub fn write(&self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        self.check_size(data.len())?;
        if !self.is_allocated(page_id) {
            return Err(StorageError::PageNotFound { page_id });
        }
        self.buffer(page_id, Bytes::copy_from_slice(data), Lsn::ZERO);
        Ok(())
    }

    /// Takes write ownership of a page for `txn` and returns its current
    /// version as seen by that transaction.
    ///
    /// Ownership lasts until [`publish`] or [`discard`]. Claiming a page
    /// owned by another transaction fails with [`StorageError::PageOwned`].
    ///
    /// [`publish`]: PageStore::publish
    /// [`discard`]: PageStore::discard
    pub fn claim(&self, txn: TxnId, page_id: PageId) -> StorageResult<Bytes> {
        let mut staged = self.staged.write();
        if let Some(page) = staged.get(&page_id) {
            if page.owner != txn {
                return Err(StorageError::PageOwned {
                    page_id,
                    owner: page.owner,
                    requester: txn,
                });
            }
            return Ok(page.data.clone());
        }

        let data = self.read(page_id)?;
        staged.insert(
            page_id,
            StagedPage {
                owner: txn,
                data: data.clone(),
                lsn: Lsn::ZERO,
                modified: false,
            },
        );
        Ok(data)
    }

    /// Replaces the staged version of a page claimed by `txn`.
    pub fn stage(&self, txn: TxnId, page_id: PageId, data: Bytes, lsn: Lsn) -> StorageResult<()> {
        self.check_size(data.len())?;
        let mut staged = self.staged.write();
        match staged.get_mut(&page_id) {
            Some(page) if page.owner == txn => {
                page.data = data;
                page.lsn = lsn;
                page.modified = true;
                Ok(())
            }
            Some(page) => Err(StorageError::PageOwned {
                page_id,
                owner: page.owner,
                requester: txn,
            }),
            None => Err(StorageError::NotClaimed {
                txn_id: txn,
                page_id,
            }),
        }
    }

    /// Returns the transaction that owns a page, if any.
    pub fn owner_of(&self, page_id: PageId) -> Option<TxnId> {
        self.staged.read().get(&page_id).map(|page| page.owner)
    }

    /// Moves every page staged by `txn` into the committed buffer and drops
    /// its ownership. Returns the number of pages published.
    pub fn publish(&self, txn: TxnId) -> usize {
        let mut staged = self.staged.write();
        let owned: Vec<PageId> = staged
            .iter()
            .filter(|(_, page)| page.owner == txn)
            .map(|(&page_id, _)| page_id)
            .collect();

        let mut committed = self.committed.write();
        let mut published = 0;
        for page_id in owned {
            let Some(page) = staged.remove(&page_id) else {
                continue;
            };
            if page.modified {
                let version = self.next_version.fetch_add(1, Ordering::Relaxed);
                committed.insert(
                    page_id,
                    DirtyPage {
                        data: page.data,
                        lsn: page.lsn,
                        version,
                    },
                );
                published += 1;
            }
        }
        published
    }

    /// Drops every page staged by `txn`. Returns the number discarded.
    pub fn discard(&self, txn: TxnId) -> usize {
        let mut staged = self.staged.write();
        let before = staged.len();
        staged.retain(|_, page| page.owner != txn);
        before - staged.len()
    }

    /// Writes `image` at `offset` into the committed version of a page.
    ///
    /// Used by recovery to re-apply after-images and restore before-images.
    /// The page is created if it lies beyond the current end of the store,
    /// and its allocation state follows the page tag that results.
    pub fn apply_image(
        &self,
        page_id: PageId,
        offset: usize,
        image: &[u8],
        lsn: Lsn,
    ) -> StorageResult<()> {
        let end = offset
            .checked_add(image.len())
            .filter(|&end| end <= self.page_size)
            .ok_or(StorageError::OutOfBounds {
                page_id,
                offset,
                len: image.len(),
                page_size: self.page_size,
            })?;

        let mut alloc = self.alloc.lock();
        while alloc.page_count <= page_id.as_u64() {
            let grown = PageId::new(alloc.page_count);
            alloc.free.insert(grown);
            alloc.page_count += 1;
        }

        let mut data = self.read_unchecked(page_id)?.to_vec();
        data[offset..end].copy_from_slice(image);

        if !page_id.is_meta() {
            if PageType::of(&data) == Some(PageType::Free) {
                alloc.free.insert(page_id);
            } else {
                alloc.free.remove(&page_id);
            }
        }

        self.buffer(page_id, Bytes::from(data), lsn);
        Ok(())
    }

    /// Writes every committed dirty page to the file and syncs it.
    ///
    /// The caller must make sure the log is durable up to
    /// [`max_dirty_lsn`](PageStore::max_dirty_lsn) first. Returns the number
    /// of pages written.
    pub fn flush(&self) -> StorageResult<usize> {
        let _flushing = self.flush_lock.lock();

        let mut snapshot: Vec<(PageId, Bytes, u64)> = self
            .committed
            .read()
            .iter()
            .map(|(&page_id, page)| (page_id, page.data.clone(), page.version))
            .collect();
        if snapshot.is_empty() {
            return Ok(0);
        }
        snapshot.sort_by_key(|(page_id, _, _)| *page_id);

        {
            let mut file = self.file.lock();
            for (page_id, data, _) in &snapshot {
                // The checkpoint marker in page 0 is owned by write_checkpoint.
                let bytes = if page_id.is_meta() {
                    &data[..META_HEADER_END]
                } else {
                    &data[..]
                };
                file.seek(SeekFrom::Start(page_id.file_offset(self.page_size)))?;
                file.write_all(bytes)?;
            }
            file.sync_all()?;
        }

        let mut committed = self.committed.write();
        for (page_id, _, version) in &snapshot {
            if committed.get(page_id).map(|page| page.version) == Some(*version) {
                committed.remove(page_id);
            }
        }

        let count = snapshot.len();
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.pages_flushed.fetch_add(count as u64, Ordering::Relaxed);
        debug!(pages = count, "flushed page store");
        Ok(count)
    }

    /// Returns the number of committed pages waiting for a flush.
    pub fn dirty_count(&self) -> usize {
        self.committed.read().len()
    }

    /// Returns the highest LSN among committed dirty pages.
    pub fn max_dirty_lsn(&self) -> Lsn {
        self.committed
            .read()
            .values()
            .map(|page| page.lsn)
            .max()
            .unwrap_or(Lsn::ZERO)
    }

    /// Returns the committed root pointer from the metadata page.
    pub fn root(&self) -> StorageResult<PageId> {
        let meta = self.read(PageId::META)?;
        MetaPage::read_root(&meta)
    }

    /// Reads the durable checkpoint marker straight from the file.
    pub fn read_checkpoint(&self) -> StorageResult<CheckpointMarker> {
        let mut bytes = [0u8; CHECKPOINT_LEN];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(CHECKPOINT_OFFSET as u64))?;
        file.read_exact(&mut bytes)?;
        CheckpointMarker::decode(&bytes)
    }

    /// Durably replaces the checkpoint marker.
    pub fn write_checkpoint(&self, marker: CheckpointMarker) -> StorageResult<()> {
        let bytes = marker.encode();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(CHECKPOINT_OFFSET as u64))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        debug!(floor = %marker.floor, next_txn_id = %marker.next_txn_id, "wrote checkpoint marker");
        Ok(())
    }

    /// Returns current statistics.
    pub fn stats(&self) -> PageStoreStats {
        let (page_count, free_pages) = {
            let alloc = self.alloc.lock();
            (alloc.page_count, alloc.free.len())
        };
        PageStoreStats {
            page_count,
            free_pages,
            dirty_pages: self.dirty_count(),
            staged_pages: self.staged.read().len(),
            file_reads: self.file_reads.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            pages_flushed: self.pages_flushed.load(Ordering::Relaxed),
        }
    }

    fn check_size(&self, len: usize) -> StorageResult<()> {
        if len != self.page_size {
            return Err(StorageError::SizeMismatch {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }

    fn buffer(&self, page_id: PageId, data: Bytes, lsn: Lsn) {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.committed
            .write()
            .insert(page_id, DirtyPage { data, lsn, version });
    }

    /// Reads the committed version without checking allocation.
    fn read_unchecked(&self, page_id: PageId) -> StorageResult<Bytes> {
        if let Some(page) = self.committed.read().get(&page_id) {
            return Ok(page.data.clone());
        }
        self.read_from_file(page_id)
    }

    /// Reads a page from the file. Bytes past the end of the file read as zero.
    fn read_from_file(&self, page_id: PageId) -> StorageResult<Bytes> {
        let mut data = vec![0u8; self.page_size];
        let offset = page_id.file_offset(self.page_size);

        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        if offset < len {
            let available = ((len - offset) as usize).min(self.page_size);
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data[..available])?;
        }
        self.file_reads.fetch_add(1, Ordering::Relaxed);
        Ok(Bytes::from(data))
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("tree_order", &self.tree_order)
            .field("page_count", &self.page_count())
            .field("dirty_pages", &self.dirty_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> PageStore {
        PageStore::open(dir.path().join("pages.db"), PageStoreOptions::new(512, 4)).unwrap()
    }

    fn page_of(byte: u8) -> Vec<u8> {
        let mut page = vec![byte; 512];
        page[0] = PageType::Leaf.as_u8();
        page
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.page_size(), 512);
        assert_eq!(store.tree_order(), 4);
        assert_eq!(store.page_count(), 1);
        assert_eq!(store.root().unwrap(), PageId::INVALID);
        assert_eq!(store.read_checkpoint().unwrap(), CheckpointMarker::INITIAL);
        drop(store);

        let store = PageStore::open(
            dir.path().join("pages.db"),
            PageStoreOptions::new(4096, 32),
        )
        .unwrap();
        assert_eq!(store.page_size(), 512);
        assert_eq!(store.tree_order(), 4);
    }

    #[test]
    fn test_allocate_write_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let page_id = store.allocate();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(store.read(page_id).unwrap().as_ref(), &[0u8; 512][..]);

        store.write(page_id, &page_of(0xAA)).unwrap();
        assert_eq!(store.read(page_id).unwrap()[5], 0xAA);
    }

    #[test]
    fn test_read_unallocated_fails() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(matches!(
            store.read(PageId::new(5)),
            Err(StorageError::PageNotFound { .. })
        ));
        assert!(matches!(
            store.write(PageId::new(5), &page_of(1)),
            Err(StorageError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_write_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let page_id = store.allocate();

        let err = store.write(page_id, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::SizeMismatch {
                expected: 512,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_writes_are_buffered_until_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.db");
        {
            let store = open_store(&dir);
            let page_id = store.allocate();
            store.write(page_id, &page_of(0xAA)).unwrap();
            assert_eq!(store.dirty_count(), 1);
        }

        // Dropped without flush: the write never reached the file.
        let store = PageStore::open(&path, PageStoreOptions::new(512, 4)).unwrap();
        assert_eq!(store.page_count(), 1);

        let page_id = store.allocate();
        store.write(page_id, &page_of(0xBB)).unwrap();
        assert_eq!(store.flush().unwrap(), 1);
        assert_eq!(store.dirty_count(), 0);
        drop(store);

        let store = PageStore::open(&path, PageStoreOptions::new(512, 4)).unwrap();
        assert_eq!(store.read(page_id).unwrap()[9], 0xBB);
    }

    #[test]
    fn test_free_and_reuse() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let a = store.allocate();
        let b = store.allocate();
        store.write(a, &page_of(1)).unwrap();
        store.write(b, &page_of(2)).unwrap();

        store.free(a).unwrap();
        assert!(!store.is_allocated(a));
        assert!(store.read(a).is_err());
        assert!(store.free(a).is_err());
        assert!(matches!(store.free(PageId::META), Err(StorageError::MetaPageFree)));

        assert_eq!(store.allocate(), a);
    }

    #[test]
    fn test_free_list_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.db");
        let (a, b) = {
            let store = open_store(&dir);
            let a = store.allocate();
            let b = store.allocate();
            store.write(a, &page_of(1)).unwrap();
            store.write(b, &page_of(2)).unwrap();
            store.flush().unwrap();
            store.free(a).unwrap();
            store.flush().unwrap();
            (a, b)
        };

        let store = PageStore::open(&path, PageStoreOptions::new(512, 4)).unwrap();
        assert!(!store.is_allocated(a));
        assert!(store.is_allocated(b));
        assert_eq!(store.allocate(), a);
    }

    #[test]
    fn test_staging_is_private_until_publish() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let page_id = store.allocate();
        store.write(page_id, &page_of(0xAA)).unwrap();

        let t1 = TxnId::new(1);
        let current = store.claim(t1, page_id).unwrap();
        assert_eq!(current[3], 0xAA);
        store
            .stage(t1, page_id, Bytes::from(page_of(0xBB)), Lsn::new(0, 16))
            .unwrap();

        assert_eq!(store.read(page_id).unwrap()[3], 0xAA);
        assert_eq!(store.read_for(t1, page_id).unwrap()[3], 0xBB);
        assert_eq!(store.read_for(TxnId::new(2), page_id).unwrap()[3], 0xAA);

        assert_eq!(store.publish(t1), 1);
        assert_eq!(store.read(page_id).unwrap()[3], 0xBB);
        assert_eq!(store.owner_of(page_id), None);
        assert_eq!(store.max_dirty_lsn(), Lsn::new(0, 16));
    }

    #[test]
    fn test_claim_conflict() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let page_id = store.allocate();

        store.claim(TxnId::new(1), page_id).unwrap();
        let err = store.claim(TxnId::new(2), page_id).unwrap_err();
        assert!(matches!(err, StorageError::PageOwned { owner, .. } if owner == TxnId::new(1)));

        let err = store
            .stage(TxnId::new(2), page_id, Bytes::from(page_of(1)), Lsn::ZERO)
            .unwrap_err();
        assert!(matches!(err, StorageError::PageOwned { .. }));

        assert_eq!(store.discard(TxnId::new(1)), 1);
        assert!(store.claim(TxnId::new(2), page_id).is_ok());
    }

    #[test]
    fn test_stage_without_claim() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let page_id = store.allocate();
        let err = store
            .stage(TxnId::new(1), page_id, Bytes::from(page_of(1)), Lsn::ZERO)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotClaimed { .. }));
    }

    #[test]
    fn test_discard_leaves_committed_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let page_id = store.allocate();
        store.write(page_id, &page_of(0xAA)).unwrap();

        let t1 = TxnId::new(1);
        store.claim(t1, page_id).unwrap();
        store
            .stage(t1, page_id, Bytes::from(page_of(0xBB)), Lsn::new(0, 40))
            .unwrap();
        store.discard(t1);

        assert_eq!(store.read(page_id).unwrap()[3], 0xAA);
        assert_eq!(store.publish(t1), 0);
    }

    #[test]
    fn test_apply_image_is_idempotent_and_grows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let page_id = PageId::new(3);
        store
            .apply_image(page_id, 0, &[PageType::Leaf.as_u8(), 0xBB], Lsn::new(0, 16))
            .unwrap();
        let once = store.read(page_id).unwrap();
        store
            .apply_image(page_id, 0, &[PageType::Leaf.as_u8(), 0xBB], Lsn::new(0, 16))
            .unwrap();
        assert_eq!(store.read(page_id).unwrap(), once);

        assert_eq!(store.page_count(), 4);
        assert!(store.is_allocated(page_id));
        assert!(!store.is_allocated(PageId::new(2)));

        // Restoring a zero tag frees the page again.
        store.apply_image(page_id, 0, &[0, 0], Lsn::new(0, 64)).unwrap();
        assert!(!store.is_allocated(page_id));

        assert!(matches!(
            store.apply_image(page_id, 510, &[0; 4], Lsn::ZERO),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_flush_preserves_checkpoint_marker() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let marker = CheckpointMarker {
            floor: Lsn::new(1, 32),
            next_txn_id: TxnId::new(9),
        };
        store.write_checkpoint(marker).unwrap();

        // A buffered page-0 write made from a stale copy must not clobber it.
        let mut meta = store.read(PageId::META).unwrap().to_vec();
        meta[CHECKPOINT_OFFSET..CHECKPOINT_OFFSET + CHECKPOINT_LEN].fill(0);
        store.write(PageId::META, &meta).unwrap();
        store.flush().unwrap();

        assert_eq!(store.read_checkpoint().unwrap(), marker);
    }

    #[test]
    fn test_corrupt_meta_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.db");
        std::fs::write(&path, vec![7u8; 512]).unwrap();

        let err = PageStore::open(&path, PageStoreOptions::new(512, 4)).unwrap_err();
        assert!(err.is_corruption());
    }
}
