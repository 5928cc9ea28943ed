//! Plugin process manager
//!
//! Starts at most one process per plugin identity, verifies it with a
//! heartbeat and hands out shared connections. The registry is filled
//! during the single-threaded setup of a run and only read afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PluginConfig;

use super::connection::{PluginConnection, PluginError};
use super::transport::{PluginTransport, ProcessTransport, TransportError, DEFAULT_CLOSE_TIMEOUT};

/// Starts plugin transports
pub trait PluginLauncher: Send + Sync {
    fn launch(&self, plugin: &PluginConfig) -> Result<Box<dyn PluginTransport>, TransportError>;
}

impl<L: PluginLauncher + ?Sized> PluginLauncher for Arc<L> {
    fn launch(&self, plugin: &PluginConfig) -> Result<Box<dyn PluginTransport>, TransportError> {
        (**self).launch(plugin)
    }
}

/// Launches plugins as child processes relative to the project directory
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    project_dir: PathBuf,
    close_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Grace period a plugin gets to exit before it is killed at teardown
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

impl PluginLauncher for ProcessLauncher {
    fn launch(&self, plugin: &PluginConfig) -> Result<Box<dyn PluginTransport>, TransportError> {
        let transport = ProcessTransport::spawn(plugin, &self.project_dir)?.with_close_timeout(self.close_timeout);
        tracing::debug!(plugin = %plugin.id, pid = transport.pid(), "Spawned plugin process");
        Ok(Box::new(transport))
    }
}

/// A plugin could not be brought up
#[derive(Debug, thiserror::Error)]
pub enum PluginStartError {
    #[error("failed to start plugin {id:?}: {source}")]
    Launch { id: String, source: TransportError },

    #[error("plugin {id:?} failed the startup heartbeat: {source}")]
    Handshake { id: String, source: PluginError },
}

/// Close failures of one or more plugins
#[derive(Debug)]
pub struct TeardownError {
    pub failures: Vec<(String, TransportError)>,
}

impl std::fmt::Display for TeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<String> = self
            .failures
            .iter()
            .map(|(id, err)| format!("plugin {:?}: {}", id, err))
            .collect();
        write!(f, "failed to close plugins: {}", joined.join("; "))
    }
}

impl std::error::Error for TeardownError {}

/// Live plugin connections keyed by identity
pub struct PluginRegistry {
    launcher: Box<dyn PluginLauncher>,
    connections: Vec<Arc<PluginConnection>>,
}

impl PluginRegistry {
    pub fn new(launcher: Box<dyn PluginLauncher>) -> Self {
        Self {
            launcher,
            connections: Vec::new(),
        }
    }

    /// Start the plugin unless a connection with its id already exists.
    ///
    /// A fresh process must echo a heartbeat nonce before it is registered;
    /// on any failure the transport is closed and nothing is kept.
    pub fn start(&mut self, plugin: &PluginConfig) -> Result<Arc<PluginConnection>, PluginStartError> {
        if let Some(existing) = self.get(&plugin.id) {
            return Ok(existing);
        }

        let transport = self
            .launcher
            .launch(plugin)
            .map_err(|source| PluginStartError::Launch {
                id: plugin.id.clone(),
                source,
            })?;
        let connection = PluginConnection::new(plugin.id.clone(), transport);

        let nonce = format!("heartbeat-{}", chrono::Utc::now().to_rfc3339());
        if let Err(source) = connection.heartbeat(&nonce) {
            if let Err(err) = connection.close() {
                tracing::warn!(plugin = %plugin.id, error = %err, "Failed to close plugin after failed startup");
            }
            return Err(PluginStartError::Handshake {
                id: plugin.id.clone(),
                source,
            });
        }

        tracing::info!(plugin = %plugin.id, command = %plugin.command, "Started plugin");
        let connection = Arc::new(connection);
        self.connections.push(Arc::clone(&connection));
        Ok(connection)
    }

    /// Connection for a plugin id
    pub fn get(&self, id: &str) -> Option<Arc<PluginConnection>> {
        self.connections.iter().find(|c| c.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every connection. All are attempted; failures are joined.
    pub fn close(&self) -> Result<(), TeardownError> {
        let mut failures = Vec::new();
        for connection in &self.connections {
            if let Err(err) = connection.close() {
                failures.push((connection.id().to_string(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "Plugin teardown failed");
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("connections", &self.connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::mock::{MockFault, MockLauncher};

    fn plugin(id: &str) -> PluginConfig {
        PluginConfig {
            id: id.to_string(),
            command: format!("{}-plugin", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_process_per_identity() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = PluginRegistry::new(Box::new(Arc::clone(&launcher)));

        let first = registry.start(&plugin("deb")).unwrap();
        let second = registry.start(&plugin("deb")).unwrap();
        registry.start(&plugin("rpm")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("rpm").is_some());
        assert!(registry.get("msi").is_none());
    }

    #[test]
    fn test_heartbeat_mismatch_is_not_registered() {
        let mut registry = PluginRegistry::new(Box::new(MockLauncher::with_fault(MockFault::WrongNonce)));
        let err = registry.start(&plugin("deb")).unwrap_err();
        assert!(matches!(err, PluginStartError::Handshake { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_launch_failure() {
        let mut registry = PluginRegistry::new(Box::new(MockLauncher::refusing()));
        let err = registry.start(&plugin("deb")).unwrap_err();
        assert!(matches!(err, PluginStartError::Launch { ref id, .. } if id == "deb"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = PluginRegistry::new(Box::new(Arc::clone(&launcher)));
        let conn = registry.start(&plugin("deb")).unwrap();
        registry.close().unwrap();
        assert!(conn.is_closed());
        registry.close().unwrap();
        drop(registry);
        assert_eq!(launcher.closes(), 1);
    }

    #[test]
    fn test_failed_handshake_closes_transport() {
        let launcher = Arc::new(MockLauncher::with_fault(MockFault::WrongNonce));
        let mut registry = PluginRegistry::new(Box::new(Arc::clone(&launcher)));
        assert!(registry.start(&plugin("deb")).is_err());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
    }

    #[test]
    fn test_drop_closes_connections() {
        let mut registry = PluginRegistry::new(Box::new(MockLauncher::new()));
        let conn = registry.start(&plugin("deb")).unwrap();
        drop(registry);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_teardown_error_joins_failures() {
        let err = TeardownError {
            failures: vec![
                ("deb".to_string(), TransportError::Closed),
                ("rpm".to_string(), TransportError::Exited("exit status: 2".to_string())),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("\"deb\""));
        assert!(message.contains("exit status: 2"));
    }
}
