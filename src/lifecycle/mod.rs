//! Lifecycle module: bootstrap, context, and drain coordination.
//!
//! # Lifecycle phases
//!
//! ```text
//! 1. String / secure pools
//!    ↓
//! 2. Resource mapper
//!    ↓
//! 3. Log pipeline (consumer thread starts)
//!    ↓
//! 4. Configuration (load → redirect → extract)
//!    ↓
//! 5. Worker pool (service thread starts)
//!    ↓
//! 6. Network I/O → web server → text renderer
//!    ↓
//! [Running — AppContext in hand]
//!    ↓
//! 7. dismiss(): teardown hook → web → network → pool drain+join
//!    → log drain+join → file close → pools → mapper → config image
//! ```
//!
//! Shutdown is the reverse of the startup dependency order; the pool drains
//! before the log pipeline because draining workers may still be logging,
//! and the web server stops before the pool because its handlers dispatch
//! into it. `dismiss` is idempotent and also runs from the context
//! destructor.

mod bootstrap;
mod capability;
mod context;
mod coordinator;
mod registry;

pub use bootstrap::Bootstrap;
pub use capability::{Capability, CapabilitySet, SecureCaps};
pub use context::AppContext;
pub use coordinator::{DismissState, DrainCoordinator, TeardownHook};
pub use registry::{SUBSYSTEM_ORDER, ServiceState, SubsystemId, SubsystemRegistry};
