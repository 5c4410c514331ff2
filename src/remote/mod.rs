//! Single-instance remote coordination
//!
//! This module lets exactly one application instance own the main window.
//! A starting process probes a loopback TCP port for a running instance;
//! if one answers, the new process forwards its command-line arguments and
//! a focus request and exits, otherwise it binds the port and becomes the
//! primary instance.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │        Instance Coordinator          │
//! │                                      │
//! │  probe ──► PONG?  ──yes──► forward   │
//! │    │                       args +    │
//! │    no                      focus,    │
//! │    ▼                       Secondary │
//! │  bind listener ──► Primary           │
//! └──────────────────────────────────────┘
//!
//!  ┌────────────┐   one request/response   ┌────────────────┐
//!  │RemoteClient│ ───────────────────────► │ RemoteListener │
//!  │ (per call) │ ◄─────────────────────── │ (accept loop)  │
//!  └────────────┘                          └───────┬────────┘
//!                                                  │ open_files /
//!                                                  ▼ focus_main_window
//!                                          RemoteCommandHandler (GUI)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use refbase::config::RemoteConfig;
//! use refbase::remote::{InstanceCoordinator, Role};
//!
//! let coordinator = InstanceCoordinator::new(RemoteConfig::default(), handler);
//! match coordinator.on_startup(&args).await? {
//!     Role::Secondary => std::process::exit(0),
//!     Role::Primary(listener) => { /* run GUI, stop() on exit */ }
//!     Role::Standalone => { /* remote messaging disabled */ }
//! }
//! ```

pub mod client;
pub mod coordinator;
pub mod listener;
pub mod protocol;

// Re-export main types
pub use client::{RemoteClient, Unreachable};
pub use coordinator::{CoordinatorError, InstanceCoordinator, Role};
pub use listener::{
    ListenerError, ListenerHandle, RemoteCommandHandler, RemoteEvent, RemoteListener,
};
pub use protocol::{Envelope, ProtocolError};
