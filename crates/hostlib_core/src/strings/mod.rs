//! String runtime: pool-owned strings behind negative handles, plus
//! read-only access to C strings in linear memory.

pub mod numeric;
mod ops;
mod pool;

pub use ops::symbol_from_codepoint;
pub use pool::{PoolEntry, StrRef, StringPool, MAX_LIVE_STRINGS};
