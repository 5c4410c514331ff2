//! Instance role selection at process startup
//!
//! Decides whether this process becomes the primary instance (binds the
//! listener port) or a secondary one (forwards its arguments to the running
//! primary and exits). The probe-then-bind sequence is racy against other
//! processes on the same machine; a failed bind is answered with one more
//! probe, because loopback TCP bind failure is itself the authoritative
//! exclusion signal.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::Result;

use super::client::RemoteClient;
use super::listener::{ListenerError, ListenerHandle, RemoteCommandHandler, RemoteListener};

/// Outcome of startup coordination
#[derive(Debug)]
pub enum Role {
    /// This process bound the listener port and owns the main window.
    /// The handle must be stopped on process exit.
    Primary(ListenerHandle),

    /// A running primary received our arguments; this process should exit
    /// without opening a window.
    Secondary,

    /// Remote messaging is disabled; run without a listener and without
    /// probing for other instances.
    Standalone,
}

impl Role {
    /// Whether this process should continue running the application
    pub fn is_running_instance(&self) -> bool {
        !matches!(self, Self::Secondary)
    }
}

/// Startup failures that leave the process without a safe role
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The port neither answered a probe nor could be bound, twice over.
    /// The process cannot safely decide between Primary and Secondary.
    #[error("cannot determine instance role: port {port} neither answers probes nor can be bound")]
    RoleUndecided {
        port: u16,
        #[source]
        source: ListenerError,
    },
}

/// Startup policy over the remote client and listener
pub struct InstanceCoordinator {
    config: RemoteConfig,
    handler: Arc<dyn RemoteCommandHandler>,
}

impl InstanceCoordinator {
    /// Create a coordinator forwarding remote commands to `handler`
    pub fn new(config: RemoteConfig, handler: impl RemoteCommandHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Decide this process's role.
    ///
    /// Probes the configured port for a running primary. If one answers,
    /// forwards `args` and a focus request and returns [`Role::Secondary`];
    /// otherwise binds the listener and returns [`Role::Primary`]. A bind
    /// failure right after a failed probe means another process won the
    /// port in between, so the probe is retried once before giving up with
    /// [`CoordinatorError::RoleUndecided`].
    pub async fn on_startup(&self, args: &[String]) -> Result<Role> {
        if !self.config.enabled {
            info!("remote messaging disabled, running standalone");
            return Ok(Role::Standalone);
        }

        let client =
            RemoteClient::new(self.config.port).with_timeout(self.config.probe_timeout());

        if self.try_forward(&client, args).await {
            return Ok(Role::Secondary);
        }

        match self.bind_listener().await {
            Ok(handle) => Ok(Role::Primary(handle)),
            Err(bind_err) => {
                // Lost the probe/bind race to another starting process
                warn!(
                    port = self.config.port,
                    error = %bind_err,
                    "bind failed after unanswered probe, re-probing"
                );
                if self.try_forward(&client, args).await {
                    Ok(Role::Secondary)
                } else {
                    Err(CoordinatorError::RoleUndecided {
                        port: self.config.port,
                        source: bind_err,
                    }
                    .into())
                }
            }
        }
    }

    /// Probe for a primary and forward our invocation to it. Returns true
    /// when the arguments were delivered and this process may exit.
    async fn try_forward(&self, client: &RemoteClient, args: &[String]) -> bool {
        let id = match client.probe().await {
            Ok(id) => id,
            Err(e) => {
                debug!(port = client.port(), reason = %e, "no primary instance answered");
                return false;
            }
        };

        info!(instance = %id, "primary instance detected, forwarding arguments");

        if let Err(e) = client.send_arguments(args).await {
            // The primary vanished between probe and send; fall back to
            // claiming the port ourselves rather than losing the files.
            warn!(error = %e, "argument forwarding failed after successful probe");
            return false;
        }

        if let Err(e) = client.request_focus().await {
            // The files are already delivered, so this is not worth keeping
            // the process alive for.
            warn!(error = %e, "focus request failed, arguments already delivered");
        }

        true
    }

    async fn bind_listener(&self) -> std::result::Result<ListenerHandle, ListenerError> {
        RemoteListener::new(self.config.instance_id.clone(), Arc::clone(&self.handler))
            .with_read_timeout(self.config.read_timeout())
            .start(self.config.port)
            .await
    }
}
