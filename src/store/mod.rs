// ============================================================================
// Order Store
// ============================================================================
//
// `OrderStore` is the only persistence seam. Two backends:
// - memory: per-order locks, used by tests and the demo
// - scylla: lightweight transactions on ScyllaDB
//
// ============================================================================

mod memory;
mod order_store;
mod scylla_store;

pub use memory::InMemoryOrderStore;
pub use order_store::{OrderFilter, OrderStore, StoreError};
pub use scylla_store::ScyllaOrderStore;
