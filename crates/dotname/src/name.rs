//! Packed metric-name containers: the copyable view, owning storage, the
//! scoped auto-releasing variant, and the joiner.
//!
//! A packed name is a two-byte little-endian payload size followed by the
//! varint payload (see [`encoding`](crate::encoding)). Views and owning
//! containers share that layout, so packed bytes can also be embedded
//! inline in a larger metric block and wrapped in a [`StatName`] on the
//! way back out.

use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHashSet};
use xxhash_rust::xxh3::xxh3_64;

use crate::encoding::{length_prefix, SymbolEncoding, NAME_SIZE_ENCODING_BYTES};
use crate::table::SymbolTable;

static EMPTY_NAME: [u8; NAME_SIZE_ENCODING_BYTES] = [0, 0];

/// Read-only view of a packed metric name.
///
/// Cheap to copy; owns neither its bytes nor any table references, so the
/// backing storage must outlive the view. Equality and hashing are
/// byte-wise over the payload: within one process, payload-equal names
/// encode the same token sequence, and no table lock is needed for either
/// operation. With a large number of metrics there are a huge number of
/// these, which is why the view carries nothing beyond the slice itself.
#[derive(Clone, Copy, Debug)]
pub struct StatName<'a> {
    size_and_data: &'a [u8],
}

impl<'a> StatName<'a> {
    /// Wrap a length-prefixed byte buffer. The buffer must start with the
    /// two-byte payload size and contain at least that many payload bytes;
    /// trailing bytes beyond the packed name are ignored.
    pub fn new(size_and_data: &'a [u8]) -> Self {
        assert!(
            size_and_data.len() >= NAME_SIZE_ENCODING_BYTES,
            "packed name shorter than its size prefix"
        );
        let name = Self { size_and_data };
        assert!(
            size_and_data.len() >= name.size(),
            "packed name truncated: prefix says {} payload bytes, buffer holds {}",
            name.data_size(),
            size_and_data.len() - NAME_SIZE_ENCODING_BYTES
        );
        name
    }

    /// The empty name: zero payload bytes.
    pub fn empty() -> StatName<'static> {
        StatName {
            size_and_data: &EMPTY_NAME,
        }
    }

    /// Payload length in bytes, excluding the size prefix.
    #[inline]
    pub fn data_size(&self) -> usize {
        usize::from(self.size_and_data[0]) | usize::from(self.size_and_data[1]) << 8
    }

    /// Total length in bytes, size prefix included.
    #[inline]
    pub fn size(&self) -> usize {
        self.data_size() + NAME_SIZE_ENCODING_BYTES
    }

    /// The varint payload.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        &self.size_and_data[NAME_SIZE_ENCODING_BYTES..self.size()]
    }

    /// The full packed bytes, prefix included.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.size_and_data[..self.size()]
    }

    /// 64-bit hash of the payload bytes.
    ///
    /// Not the hash of the rendered string, and stable only within one
    /// process, since token ids are not stable across tables.
    pub fn hash(&self) -> u64 {
        xxh3_64(self.data())
    }

    /// Render through `table` into the dotted string form.
    pub fn render(&self, table: &SymbolTable) -> String {
        table.decode(*self)
    }

    /// Copy the packed bytes (prefix included) into `dst`, for embedding
    /// into a larger allocation. Returns the number of bytes written.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let bytes = self.as_bytes();
        dst[..bytes.len()].copy_from_slice(bytes);
        bytes.len()
    }

    /// Byte-level description of the packed form. Debugging aid only.
    pub fn debug_dump(&self) -> String {
        let mut out = format!("data_size={}:", self.data_size());
        for b in self.data() {
            let _ = write!(out, " {b}");
        }
        match SymbolEncoding::decode_symbols(self.data()) {
            Ok(symbols) => {
                let _ = write!(out, ", num_symbols={}:", symbols.len());
                for symbol in symbols {
                    let _ = write!(out, " {symbol}");
                }
            }
            Err(err) => {
                let _ = write!(out, ", <{err}>");
            }
        }
        out
    }
}

impl PartialEq for StatName<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for StatName<'_> {}

impl Hash for StatName<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data().hash(state);
    }
}

impl Default for StatName<'_> {
    fn default() -> Self {
        StatName {
            size_and_data: &EMPTY_NAME,
        }
    }
}

/// Hash map keyed by packed names: payload-byte equality, no table needed.
pub type StatNameHashMap<'a, V> = FxHashMap<StatName<'a>, V>;

/// Hash set of packed names.
pub type StatNameHashSet<'a> = FxHashSet<StatName<'a>>;

/// Owning backing storage for a packed name.
///
/// Deliberately not RAII with respect to the table: call
/// [`release`](Self::release) before dropping; dropping unreleased storage
/// is fatal, since the per-token references would leak. Holding a table
/// reference here instead would cost a pointer per name, which dominates
/// once packed names are stored by the million; [`ScopedStatName`] makes
/// that trade for short-lived uses.
#[derive(Debug)]
pub struct StatNameStorage {
    bytes: Option<Box<[u8]>>,
}

impl StatNameStorage {
    /// Encode `name` into fresh storage, interning its tokens.
    pub fn new(name: &str, table: &SymbolTable) -> Self {
        Self {
            bytes: Some(table.encode(name).into_storage()),
        }
    }

    /// Copy an existing packed name into new storage, bumping the table's
    /// reference counts for its tokens.
    pub fn from_stat_name(src: StatName<'_>, table: &SymbolTable) -> Self {
        let storage = Self {
            bytes: Some(src.as_bytes().into()),
        };
        table.retain(storage.stat_name());
        storage
    }

    /// View of the owned packed name. Released storage reads as empty.
    pub fn stat_name(&self) -> StatName<'_> {
        match &self.bytes {
            Some(bytes) => StatName::new(bytes),
            None => StatName::empty(),
        }
    }

    /// Hand the per-token references back to `table` and drop the bytes.
    /// Calling this twice is a no-op.
    pub fn release(&mut self, table: &SymbolTable) {
        if let Some(bytes) = self.bytes.take() {
            table.release(StatName::new(&bytes));
        }
    }
}

impl Drop for StatNameStorage {
    fn drop(&mut self) {
        // Guards the lifetime contract; release() clears the bytes.
        assert!(
            self.bytes.is_none(),
            "StatNameStorage dropped without release()"
        );
    }
}

/// Packed-name storage that releases itself against its table on drop.
///
/// Costs one table reference per instance; meant for tests and short-lived
/// locals rather than bulk storage.
pub struct ScopedStatName<'t> {
    storage: StatNameStorage,
    table: &'t SymbolTable,
}

impl<'t> ScopedStatName<'t> {
    /// Encode `name` into storage scoped to `table`.
    pub fn new(name: &str, table: &'t SymbolTable) -> Self {
        Self {
            storage: StatNameStorage::new(name, table),
            table,
        }
    }

    /// Copy an existing packed name into storage scoped to `table`.
    pub fn from_stat_name(src: StatName<'_>, table: &'t SymbolTable) -> Self {
        Self {
            storage: StatNameStorage::from_stat_name(src, table),
            table,
        }
    }

    pub fn stat_name(&self) -> StatName<'_> {
        self.storage.stat_name()
    }
}

impl Drop for ScopedStatName<'_> {
    fn drop(&mut self) {
        self.storage.release(self.table);
    }
}

/// Byte concatenation of packed names under a fresh size prefix.
///
/// Every token varint is self-delimiting, so concatenating payloads yields
/// exactly the concatenated token sequence without touching the table or
/// its lock. The joined name holds no token references of its own: it is
/// valid only while every input name stays live. Intended for
/// scope-prefixed name lookups where the prefix and the leaf are already
/// packed.
#[derive(Debug)]
pub struct StatNameJoiner {
    bytes: Box<[u8]>,
}

impl StatNameJoiner {
    /// Join two packed names.
    pub fn new(a: StatName<'_>, b: StatName<'_>) -> Self {
        Self::from_slice(&[a, b])
    }

    /// Join any number of packed names, in order.
    pub fn from_slice(names: &[StatName<'_>]) -> Self {
        let payload: usize = names.iter().map(|n| n.data_size()).sum();
        let mut bytes = Vec::with_capacity(payload + NAME_SIZE_ENCODING_BYTES);
        bytes.extend_from_slice(&length_prefix(payload));
        for name in names {
            bytes.extend_from_slice(name.data());
        }
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// View of the joined name.
    pub fn stat_name(&self) -> StatName<'_> {
        StatName::new(&self.bytes)
    }
}
