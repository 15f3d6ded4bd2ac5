//! Page types.

use std::fmt;

/// Types of pages in a Strata page file.
///
/// The type is the first byte of every page. A page of all zeros is free,
/// which is what lets the allocator rebuild its free list by scanning tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PageType {
    /// Free page (available for allocation).
    #[default]
    Free = 0,
    /// Store metadata (page 0 only).
    Meta = 1,
    /// Internal B+tree node (separator keys and child pointers).
    Internal = 2,
    /// Leaf B+tree node (key-value entries).
    Leaf = 3,
}

impl PageType {
    /// Creates a PageType from a raw byte value.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Free),
            1 => Some(Self::Meta),
            2 => Some(Self::Internal),
            3 => Some(Self::Leaf),
            _ => None,
        }
    }

    /// Returns the tag byte.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a B+tree page (internal or leaf).
    #[inline]
    pub const fn is_btree_page(self) -> bool {
        matches!(self, Self::Internal | Self::Leaf)
    }

    /// Returns true if this is a free page.
    #[inline]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }

    /// Reads the type tag of a page buffer. Empty buffers count as free.
    #[inline]
    pub fn of(page: &[u8]) -> Option<Self> {
        page.first().map_or(Some(Self::Free), |&tag| Self::from_u8(tag))
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "Free"),
            Self::Meta => write!(f, "Meta"),
            Self::Internal => write!(f, "Internal"),
            Self::Leaf => write!(f, "Leaf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_roundtrip() {
        for ty in [PageType::Free, PageType::Meta, PageType::Internal, PageType::Leaf] {
            assert_eq!(PageType::from_u8(ty.as_u8()), Some(ty));
        }
        assert_eq!(PageType::from_u8(200), None);
    }

    #[test]
    fn test_page_type_of() {
        assert_eq!(PageType::of(&[0u8; 16]), Some(PageType::Free));
        assert_eq!(PageType::of(&[3, 0, 0]), Some(PageType::Leaf));
        assert_eq!(PageType::of(&[]), Some(PageType::Free));
        assert!(PageType::Leaf.is_btree_page());
        assert!(!PageType::Meta.is_btree_page());
    }
}
