pub mod crl;

// Re-export commonly used types
pub use crl::{CrlChecker, CrlError, ShardStore};
