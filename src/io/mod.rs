// Process-level I/O: single-instance arbitration and signals
pub mod instance; // Instance records and eviction
pub mod lock; // Cross-process gate lock
pub mod signals; // Unix signal handling
