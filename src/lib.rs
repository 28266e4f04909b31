//! # Chassis
//!
//! An application bootstrap and lifecycle framework.
//!
//! Chassis brings up a set of optional subsystems in dependency-correct
//! order, loads and decrypts XML configuration (with one level of
//! redirection), hands the application a ready [`AppContext`], and tears
//! everything down safely and idempotently at shutdown.
//!
//! ## Features
//!
//! - **Ordered bootstrap**: string pool → secure pool → resource mapper →
//!   log pipeline → worker pool → network → web UI → text renderer
//! - **Capability configuration**: optional subsystems are runtime
//!   `{Disabled, Enabled(config)}` values, not compile-time flags
//! - **Charmed configuration**: encrypted resources decode transparently
//!   through one charm context, redirects included
//! - **Asynchronous logging**: fire-and-forget producers, one consumer
//!   thread, FIFO delivery with a lossless drain boundary
//! - **Idempotent shutdown**: one `dismiss()` walks every subsystem in the
//!   reverse dependency order without losing queued work
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chassis::prelude::*;
//!
//! fn main() {
//!     let mut context = Bootstrap::new("MyApp")
//!         .args(std::env::args().collect::<Vec<_>>())
//!         .capabilities(CapabilitySet::minimal().with_workers().with_web_ui())
//!         .on_teardown(|log| {
//!             log.info("application resources released");
//!             Ok(())
//!         })
//!         .start();
//!
//!     if !context.is_log_open() {
//!         eprintln!("ERROR: the application logger was unable to start.");
//!         return;
//!     }
//!     if !context.is_valid() {
//!         context.log.error("ERROR: the configuration is not valid.");
//!         return;
//!     }
//!
//!     context.submit(|| {
//!         // work on the pool
//!     });
//!     context.wait_until_pool_empty();
//!
//!     context.dismiss();
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logpipe;
pub mod net;
pub mod pool;
pub mod render;
pub mod secure;
pub mod strings;
pub mod vres;
pub mod web;
pub mod xml;

// Re-export core types
pub use error::{ChassisError, Result};
pub use lifecycle::{AppContext, Bootstrap, Capability, CapabilitySet};
pub use logpipe::{LogSink, Severity};

/// Prelude module for convenient imports
///
/// ```
/// use chassis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigImage, Settings};
    pub use crate::error::{ChassisError, Result};
    pub use crate::lifecycle::{
        AppContext, Bootstrap, Capability, CapabilitySet, DismissState, SecureCaps, ServiceState,
        SubsystemId,
    };
    pub use crate::logpipe::{LogSink, Severity};
    pub use crate::pool::{Dispatcher, PoolStats};
    pub use crate::render::TextRenderer;
    pub use crate::xml::Document;
}
