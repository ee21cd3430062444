pub mod crypto;
pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::MemoryError;
pub use manager::MemoryManager;
pub use types::{HistoryEntry, ProviderCredential, ProviderSummary, Speaker};
