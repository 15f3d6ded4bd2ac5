use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use strata_engine::{Store, Transaction};
use strata_storage::page::meta::CHECKPOINT_OFFSET;

/// Abandons a store as if the process died: no checkpoint, no log close,
/// nothing flushed.
pub fn crash(store: Store) {
    std::mem::forget(store);
}

/// Abandons a transaction without aborting it, as a crash would.
pub fn abandon(txn: Transaction<'_>) {
    std::mem::forget(txn);
}

/// Flips one bit of a file in place.
pub fn flip_bit(path: &Path, offset: u64, bit: u8) -> std::io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut byte)?;
    byte[0] ^= 1 << (bit % 8);
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Cuts `bytes` off the end of a file, as a torn write would.
pub fn chop(path: &Path, bytes: u64) -> std::io::Result<u64> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len().saturating_sub(bytes);
    file.set_len(len)?;
    file.sync_all()?;
    Ok(len)
}

/// Appends junk to a file.
pub fn append_garbage(path: &Path, garbage: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(garbage)?;
    file.sync_all()
}

/// Damages the checkpoint marker in a page file.
pub fn corrupt_checkpoint_marker(page_file: &Path) -> std::io::Result<()> {
    flip_bit(page_file, CHECKPOINT_OFFSET as u64, 3)
}
