//! The interning symbol table.
//!
//! Maps each dot-separated token of a metric name to a [`Symbol`] and back,
//! reference-counting ids so that the vocabulary of deleted metrics can be
//! reclaimed. The table is contended by every metric creation on every
//! worker thread, so each operation keeps string splitting, allocation and
//! varint work outside the lock; under the lock there are only map lookups,
//! counter arithmetic and free-pool push/pop.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::num::NonZeroU32;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::encoding::SymbolEncoding;
use crate::name::StatName;

/// Identifier for one dot-separated token of a metric name.
///
/// Ids are handed out starting at 1; zero means "unassigned" and is
/// unrepresentable here. Released ids are reused, so a token re-interned
/// after a full release may come back under a different id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol(NonZeroU32);

impl Symbol {
    /// Raw id, for encoding and debugging.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub(crate) fn from_raw(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }
}

/// Table entry for one interned token: its id plus the number of live
/// packed names referencing it.
struct SharedSymbol {
    symbol: Symbol,
    ref_count: u32,
}

#[derive(Default)]
struct TableInner {
    /// Source of fresh ids when the pool is empty. Never decreases.
    monotonic_counter: u32,
    /// token -> (id, refcount). The key is the same heap allocation that
    /// `decode_map` holds, so each token string is stored once.
    encode_map: FxHashMap<Arc<str>, SharedSymbol>,
    /// id -> token.
    decode_map: FxHashMap<Symbol, Arc<str>>,
    /// Released ids available for reuse, most recently freed last.
    pool: Vec<Symbol>,
}

impl TableInner {
    /// Intern one token, bumping its refcount if it already exists.
    fn to_symbol(&mut self, token: &str) -> Symbol {
        if let Some(shared) = self.encode_map.get_mut(token) {
            shared.ref_count += 1;
            return shared.symbol;
        }
        let symbol = self.alloc_symbol();
        let token: Arc<str> = Arc::from(token);
        self.encode_map.insert(
            Arc::clone(&token),
            SharedSymbol {
                symbol,
                ref_count: 1,
            },
        );
        self.decode_map.insert(symbol, token);
        symbol
    }

    /// Resolve an id back to its token. An unknown id means a packed name
    /// outlived its references or the store is corrupt; there is nothing
    /// sane to continue with.
    fn from_symbol(&self, symbol: Symbol) -> Arc<str> {
        match self.decode_map.get(&symbol) {
            Some(token) => Arc::clone(token),
            None => panic!("symbol table: no token for id {}", symbol.as_u32()),
        }
    }

    /// Top of the free pool if any, else the next monotonic id.
    fn alloc_symbol(&mut self) -> Symbol {
        if let Some(symbol) = self.pool.pop() {
            return symbol;
        }
        self.monotonic_counter = self
            .monotonic_counter
            .checked_add(1)
            .expect("symbol table: 32-bit id space exhausted");
        Symbol(NonZeroU32::new(self.monotonic_counter).unwrap())
    }

    fn bump_ref(&mut self, symbol: Symbol) {
        let token = self.from_symbol(symbol);
        let shared = self
            .encode_map
            .get_mut(token.as_ref())
            .unwrap_or_else(|| panic!("symbol table: maps disagree on token '{token}'"));
        shared.ref_count += 1;
    }

    /// Drop one reference; the last one erases both map entries and sends
    /// the id back to the pool.
    fn drop_ref(&mut self, symbol: Symbol) {
        let token = self.from_symbol(symbol);
        let shared = self
            .encode_map
            .get_mut(token.as_ref())
            .unwrap_or_else(|| panic!("symbol table: maps disagree on token '{token}'"));
        shared.ref_count -= 1;
        if shared.ref_count == 0 {
            self.encode_map.remove(token.as_ref());
            self.decode_map.remove(&symbol);
            self.pool.push(symbol);
        }
    }
}

/// Interning table for dotted metric names.
///
/// All methods take `&self`; a single mutex guards both maps, the free pool
/// and the id counter, so the table can be shared across threads behind an
/// `Arc`. A packed name returned from [`encode`](Self::encode) is freely
/// shareable without further synchronization; holders come back to the
/// table only to decode, compare, retain or release.
///
/// Every encode bumps per-token reference counts that the caller must hand
/// back via [`release`](Self::release) exactly once, otherwise released
/// vocabulary is never reclaimed.
#[derive(Default)]
pub struct SymbolTable {
    inner: Mutex<TableInner>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern every token of `name` and return the transient encoding.
    ///
    /// Bumps the reference count of each token; the caller owns those
    /// references and must eventually return them via
    /// [`release`](Self::release).
    pub fn encode(&self, name: &str) -> SymbolEncoding {
        let mut encoding = SymbolEncoding::new();
        if name.is_empty() {
            return encoding;
        }

        // Split first so the lock covers only the map operations.
        let tokens: Vec<&str> = name.split('.').collect();
        let mut symbols = Vec::with_capacity(tokens.len());
        {
            let mut inner = self.inner.lock();
            for token in &tokens {
                symbols.push(inner.to_symbol(token));
            }
        }

        for symbol in symbols {
            encoding.add_symbol(symbol.as_u32());
        }
        encoding
    }

    /// Render a packed name back into its dotted string form.
    pub fn decode(&self, name: StatName<'_>) -> String {
        let symbols = decode_symbols_or_die(name.data());
        let tokens: Vec<Arc<str>> = {
            let inner = self.inner.lock();
            symbols.iter().map(|&s| inner.from_symbol(s)).collect()
        };
        tokens.join(".")
    }

    /// Give back the per-token references held by `name`.
    ///
    /// When a token's count reaches zero its map entries are erased and the
    /// id joins the free pool.
    pub fn release(&self, name: StatName<'_>) {
        let symbols = decode_symbols_or_die(name.data());
        let mut inner = self.inner.lock();
        for symbol in symbols {
            inner.drop_ref(symbol);
        }
    }

    /// Add one reference per token of `name`.
    ///
    /// For callers that duplicate packed bytes into structures of their
    /// own; every retain obligates a matching [`release`](Self::release).
    pub fn retain(&self, name: StatName<'_>) {
        let symbols = decode_symbols_or_die(name.data());
        let mut inner = self.inner.lock();
        for symbol in symbols {
            inner.bump_ref(symbol);
        }
    }

    /// Whether `a` orders before `b`. See [`compare`](Self::compare).
    pub fn less_than(&self, a: StatName<'_>, b: StatName<'_>) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Token-wise ordering of two packed names, for use with `sort_by`.
    ///
    /// Names are compared by resolving the first differing token pair to
    /// strings; equal prefixes put the shorter name first. This can diverge
    /// from string-wise order when a `.` boundary would sort between token
    /// characters (`-.-` vs `---`), which does not matter for metric names.
    /// The lock is taken only for the one resolve step, if any.
    pub fn compare(&self, a: StatName<'_>, b: StatName<'_>) -> Ordering {
        let av = decode_symbols_or_die(a.data());
        let bv = decode_symbols_or_die(b.data());
        for (&sa, &sb) in av.iter().zip(&bv) {
            if sa != sb {
                let inner = self.inner.lock();
                return inner.from_symbol(sa).cmp(&inner.from_symbol(sb));
            }
        }
        av.len().cmp(&bv.len())
    }

    /// Number of live interned tokens.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        debug_assert_eq!(inner.encode_map.len(), inner.decode_map.len());
        inner.encode_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the table contents as `id: 'token' (refs)` lines sorted by
    /// id. Debugging aid only.
    pub fn dump(&self) -> String {
        let inner = self.inner.lock();
        let mut entries: Vec<(Symbol, &Arc<str>)> =
            inner.decode_map.iter().map(|(s, t)| (*s, t)).collect();
        entries.sort_by_key(|(symbol, _)| *symbol);
        let mut out = String::new();
        for (symbol, token) in entries {
            let shared = &inner.encode_map[token.as_ref()];
            let _ = writeln!(out, "{}: '{}' ({})", symbol.as_u32(), token, shared.ref_count);
        }
        out
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        // Every packed name must have been released; a non-empty table at
        // destruction means leaked token references.
        let inner = self.inner.get_mut();
        assert!(
            inner.encode_map.is_empty(),
            "symbol table dropped with {} live tokens",
            inner.encode_map.len()
        );
    }
}

/// Decode payload bytes into symbols, treating malformed input as fatal:
/// a live packed name that no longer decodes means the stats store is
/// corrupt.
fn decode_symbols_or_die(payload: &[u8]) -> Vec<Symbol> {
    let raw = SymbolEncoding::decode_symbols(payload)
        .unwrap_or_else(|err| panic!("symbol table: corrupt packed name: {err}"));
    raw.into_iter()
        .map(|id| {
            Symbol::from_raw(id)
                .unwrap_or_else(|| panic!("symbol table: corrupt packed name: id 0 in payload"))
        })
        .collect()
}
