//! refbase - Reference manager single-instance coordination
//!
//! The remote subsystem of a desktop reference manager: when the application
//! is launched while another instance is already running, the new process
//! detects the running instance over a loopback TCP port, forwards its
//! command-line arguments (files to open) to it, asks it to raise its window,
//! and exits instead of opening a second conflicting window.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration for the remote port and timeouts
//! - [`remote`] - Wire protocol, client, listener, and instance coordinator
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use refbase::config::RemoteConfig;
//! use refbase::remote::{InstanceCoordinator, RemoteEvent, Role};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RemoteConfig::from_env()?;
//!     let (events, mut gui) = mpsc::unbounded_channel::<RemoteEvent>();
//!
//!     let coordinator = InstanceCoordinator::new(config, events);
//!     match coordinator.on_startup(&["paper1.bib".to_string()]).await? {
//!         Role::Secondary => return Ok(()), // forwarded to the running instance
//!         Role::Primary(_) | Role::Standalone => {
//!             // run the application; `gui` receives OpenFiles/FocusMainWindow
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod remote;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RemoteConfig;
    pub use crate::error::{Error, Result};
    pub use crate::remote::{
        Envelope, InstanceCoordinator, ListenerHandle, RemoteClient, RemoteCommandHandler,
        RemoteEvent, RemoteListener, Role,
    };
}

// Direct re-export for convenience
pub use remote::Role;
