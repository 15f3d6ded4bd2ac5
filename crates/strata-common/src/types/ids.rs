//! Core identifier types for Strata.
//!
//! Pages, transactions and log positions each get their own newtype so a
//! page number can never be passed where a transaction id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page identifier - the page number within the page file.
///
/// Page 0 always holds store metadata; tree nodes live on pages 1 and up.
///
/// # Example
///
/// ```rust
/// use strata_common::types::PageId;
///
/// let page = PageId::new(42);
/// assert_eq!(page.as_u64(), 42);
/// assert!(!page.is_meta());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageId(u64);

impl PageId {
    /// No page. Marks an empty tree's root and records without a page.
    pub const INVALID: Self = Self(u64::MAX);

    /// The metadata page.
    pub const META: Self = Self(0);

    /// Wraps a page number.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The page number.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The following page number.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// False for [`PageId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns true for the metadata page.
    #[inline]
    #[must_use]
    pub const fn is_meta(self) -> bool {
        self.0 == Self::META.0
    }

    /// Byte offset of this page in a file of `page_size` pages.
    #[inline]
    #[must_use]
    pub const fn file_offset(self, page_size: usize) -> u64 {
        self.0 * page_size as u64
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PageId(INVALID)")
        } else {
            write!(f, "PageId({})", self.0)
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<PageId> for u64 {
    #[inline]
    fn from(id: PageId) -> Self {
        id.0
    }
}

/// Transaction identifier.
///
/// Transaction IDs are handed out in increasing order and are never reused
/// across restarts: recovery seeds the counter past every ID it has seen.
///
/// # Example
///
/// ```rust
/// use strata_common::types::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// assert_eq!(txn.next(), TxnId::new(2));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction ID. Used for records that belong to no transaction.
    pub const INVALID: Self = Self(0);

    /// First id handed out by a fresh store.
    pub const MIN: Self = Self(1);

    /// Wraps a transaction number.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The transaction number.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// False for [`TxnId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// The id after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TxnId> for u64 {
    #[inline]
    fn from(id: TxnId) -> Self {
        id.0
    }
}

/// Log Sequence Number - the position of a record in the write-ahead log.
///
/// An LSN is the pair (segment file number, byte offset within that file),
/// packed into a u64 with the file number in the high 32 bits. Comparing the
/// packed values therefore orders LSNs first by file, then by offset.
///
/// # Example
///
/// ```rust
/// use strata_common::types::Lsn;
///
/// let a = Lsn::new(0, 4096);
/// let b = Lsn::new(1, 16);
/// assert!(a < b);
/// assert_eq!(b.segment(), 1);
/// assert_eq!(b.offset(), 16);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Lsn(u64);

impl Lsn {
    /// The start of the log. No record is ever written at this position.
    pub const ZERO: Self = Self(0);

    /// Maximum LSN.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an LSN from a segment number and byte offset.
    #[inline]
    #[must_use]
    pub const fn new(segment: u32, offset: u32) -> Self {
        Self(((segment as u64) << 32) | offset as u64)
    }

    /// Creates an LSN from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Segment (file) number.
    #[inline]
    #[must_use]
    pub const fn segment(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Byte offset within the segment file.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// Returns true for [`Lsn::ZERO`].
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The LSN `len` bytes further into the same segment.
    #[inline]
    #[must_use]
    pub const fn advance(self, len: u32) -> Self {
        Self::new(self.segment(), self.offset().saturating_add(len))
    }
}

impl fmt::Debug for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lsn({}/{})", self.segment(), self.offset())
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:08X}", self.segment(), self.offset())
    }
}

impl Default for Lsn {
    fn default() -> Self {
        Self::ZERO
    }
}
