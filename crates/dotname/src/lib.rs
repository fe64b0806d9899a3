//! Reference-counted symbol table and packed byte storage for dotted
//! metric names.
//!
//! Metric names like `cluster.service_a.upstream.rq_2xx` draw from a small
//! vocabulary of repeated tokens. Storing every name as a full string
//! inflates memory by an order of magnitude, so each dot-separated token is
//! interned to a small integer [`Symbol`] and a name is kept as a
//! length-prefixed array of base-128 varints. A token from the hot
//! vocabulary costs a single byte.
//!
//! Three layers:
//! - [`encoding`]: the stateless varint codec and the transient
//!   [`SymbolEncoding`] it produces
//! - [`table`]: the [`SymbolTable`] interner, which reference-counts tokens
//!   so the vocabulary of deleted metrics is reclaimed
//! - [`name`]: packed-name containers: the copyable [`StatName`] view,
//!   owning [`StatNameStorage`], and the lock-free [`StatNameJoiner`]
//!
//! Callers participate in a lifetime contract: every [`StatNameStorage`]
//! must be released against its table before it is dropped. The scoped
//! variant [`ScopedStatName`] does this automatically at the cost of one
//! table reference per name.

pub mod encoding;
pub mod name;
pub mod table;

#[cfg(test)]
mod table_tests;

pub use encoding::{CodecError, SymbolEncoding, MAX_NAME_SIZE, NAME_SIZE_ENCODING_BYTES};
pub use name::{
    ScopedStatName, StatName, StatNameHashMap, StatNameHashSet, StatNameJoiner, StatNameStorage,
};
pub use table::{Symbol, SymbolTable};
