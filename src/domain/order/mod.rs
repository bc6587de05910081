// ============================================================================
// Order Domain
// ============================================================================
//
// - value_objects: statuses, roles, actors, claims, line items
// - commands / events: what callers ask for, what a commit did
// - aggregate: lifecycle rules (handle_command / apply_event)
// - claims: the shared claim guard and the Claim Manager
// - engine: versioned compare-and-write around the aggregate
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod claims;
pub mod engine;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use claims::*;
pub use engine::*;
