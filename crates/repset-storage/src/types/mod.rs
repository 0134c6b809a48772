//! Type definitions for repset storage.

mod billing;
mod ids;
mod members;
mod memberships;
mod organizations;
mod plans;
mod subscriptions;
mod users;

// Re-export all types from submodules
pub use billing::*;
pub use ids::*;
pub use members::*;
pub use memberships::*;
pub use organizations::*;
pub use plans::*;
pub use subscriptions::*;
pub use users::*;
