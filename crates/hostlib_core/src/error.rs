use thiserror::Error;

pub type HostResult<T> = Result<T, HostError>;

/// Fatal failures raised from inside a host call. Any of these aborts the
/// running program; recoverable conditions are signalled through sentinel
/// return values instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host function called before linear memory was bound")]
    Unbound,

    #[error("memory access out of bounds: {len} byte(s) at {addr} (memory size {size})")]
    OutOfBounds { addr: u32, len: u32, size: usize },

    #[error("stale or unknown string handle {0}")]
    StaleHandle(i32),

    #[error("string pool exhausted ({0} live entries)")]
    PoolExhausted(usize),

    #[error("out of memory while allocating {requested} byte(s)")]
    OutOfMemory { requested: u32 },

    #[error("array block {0:#x} is not allocated")]
    InvalidFree(u32),

    #[error("file handle {0} is not open")]
    BadFileHandle(i32),

    #[error("file handle {handle} is not open for {expected}")]
    FileMode {
        handle: i32,
        expected: &'static str,
    },
}

impl HostError {
    pub fn code(&self) -> &'static str {
        match self {
            HostError::Unbound => "E0500",
            HostError::OutOfBounds { .. } => "E0501",
            HostError::StaleHandle(_) => "E0502",
            HostError::PoolExhausted(_) => "E0503",
            HostError::OutOfMemory { .. } => "E0504",
            HostError::InvalidFree(_) => "E0505",
            HostError::BadFileHandle(_) => "E0506",
            HostError::FileMode { .. } => "E0507",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            HostError::Unbound,
            HostError::OutOfBounds {
                addr: 0,
                len: 1,
                size: 0,
            },
            HostError::StaleHandle(-1),
            HostError::PoolExhausted(1),
            HostError::OutOfMemory { requested: 1 },
            HostError::InvalidFree(8),
            HostError::BadFileHandle(3),
            HostError::FileMode {
                handle: 1,
                expected: "writing",
            },
        ];
        let mut codes = errors.iter().map(HostError::code).collect::<Vec<_>>();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn messages_carry_context() {
        let err = HostError::FileMode {
            handle: 4,
            expected: "reading",
        };
        assert_eq!(err.to_string(), "file handle 4 is not open for reading");
        assert_eq!(
            HostError::InvalidFree(0x10000).to_string(),
            "array block 0x10000 is not allocated"
        );
    }
}
