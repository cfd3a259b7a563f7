//! Capability checks
//!
//! The bridge never decides policy itself. Before reading a script file
//! ([`crate::execute`]) it asks the context's [`CapabilityCheck`]; consumers
//! such as an environment projection do the same. [`SecurityContext`] is the
//! stock implementation: deny-all with explicit grants.

use flusspferd_config::PermissionsConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Security errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SecurityError {
    #[error("Permission denied: filesystem read access to {path}")]
    FilesystemReadDenied { path: PathBuf },

    #[error("Permission denied: filesystem write access to {path}")]
    FilesystemWriteDenied { path: PathBuf },

    #[error("Permission denied: network access to {host}")]
    NetworkDenied { host: String },

    #[error("Permission denied: process execution of {command}")]
    ProcessDenied { command: String },

    #[error("Permission denied: environment variable {var}")]
    EnvironmentDenied { var: String },
}

/// Operation a caller wants to perform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    FileRead(PathBuf),
    FileWrite(PathBuf),
    Network(String),
    Process(String),
    Environment(String),
}

impl Capability {
    fn denied(&self) -> SecurityError {
        match self {
            Capability::FileRead(path) => SecurityError::FilesystemReadDenied { path: path.clone() },
            Capability::FileWrite(path) => {
                SecurityError::FilesystemWriteDenied { path: path.clone() }
            }
            Capability::Network(host) => SecurityError::NetworkDenied { host: host.clone() },
            Capability::Process(command) => SecurityError::ProcessDenied {
                command: command.clone(),
            },
            Capability::Environment(var) => SecurityError::EnvironmentDenied { var: var.clone() },
        }
    }
}

/// Policy interface consulted before privileged operations
pub trait CapabilityCheck {
    fn check(&self, capability: &Capability) -> Result<(), SecurityError>;
}

/// A granted permission
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    FilesystemRead { path: PathBuf, recursive: bool },
    FilesystemWrite { path: PathBuf, recursive: bool },
    /// Exact host, `*.domain` or `*`
    Network { host: String },
    /// Exact command or `*`
    Process { command: String },
    /// Exact variable name or `*`
    Environment { var: String },
}

impl Permission {
    /// Check if this permission allows the requested operation
    pub fn allows(&self, requested: &Capability) -> bool {
        match (self, requested) {
            (Permission::FilesystemRead { path, recursive }, Capability::FileRead(wanted))
            | (Permission::FilesystemWrite { path, recursive }, Capability::FileWrite(wanted)) => {
                let wanted = canonicalize_path_safe(wanted);
                wanted == *path || (*recursive && wanted.starts_with(path))
            }
            (Permission::Network { host: allowed }, Capability::Network(host)) => {
                if allowed == "*" || allowed == host {
                    return true;
                }
                match allowed.strip_prefix("*.") {
                    Some(domain) => {
                        host == domain
                            || host
                                .strip_suffix(domain)
                                .is_some_and(|prefix| prefix.ends_with('.'))
                    }
                    None => false,
                }
            }
            (Permission::Process { command: allowed }, Capability::Process(command)) => {
                allowed == "*" || allowed == command
            }
            (Permission::Environment { var: allowed }, Capability::Environment(var)) => {
                allowed == "*" || allowed == var
            }
            _ => false,
        }
    }
}

/// Set of permissions
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    permissions: HashSet<Permission>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    pub fn is_granted(&self, requested: &Capability) -> bool {
        self.permissions.iter().any(|p| p.allows(requested))
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Merge permissions from another set
    pub fn merge(&mut self, other: &PermissionSet) {
        self.permissions.extend(other.permissions.iter().cloned());
    }
}

/// Deny-by-default policy with explicit grants
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    granted: PermissionSet,
}

impl SecurityContext {
    /// Deny everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit everything; for trusted hosts only
    pub fn allow_all() -> Self {
        let mut ctx = Self::new();
        ctx.granted.grant(Permission::FilesystemRead {
            path: PathBuf::from("/"),
            recursive: true,
        });
        ctx.granted.grant(Permission::FilesystemWrite {
            path: PathBuf::from("/"),
            recursive: true,
        });
        ctx.granted.grant(Permission::Network {
            host: "*".to_string(),
        });
        ctx.granted.grant(Permission::Process {
            command: "*".to_string(),
        });
        ctx.granted.grant(Permission::Environment {
            var: "*".to_string(),
        });
        ctx
    }

    /// Grants from the `[permissions]` configuration table
    pub fn from_config(config: &PermissionsConfig) -> Self {
        if config.allow_all {
            return Self::allow_all();
        }
        let mut ctx = Self::new();
        for var in &config.env {
            ctx.grant_environment(var.clone());
        }
        for path in &config.read {
            ctx.grant_filesystem_read(path, true);
        }
        ctx
    }

    pub fn grant_filesystem_read(&mut self, path: &Path, recursive: bool) {
        let path = canonicalize_path_safe(path);
        self.granted
            .grant(Permission::FilesystemRead { path, recursive });
    }

    pub fn grant_filesystem_write(&mut self, path: &Path, recursive: bool) {
        let path = canonicalize_path_safe(path);
        self.granted
            .grant(Permission::FilesystemWrite { path, recursive });
    }

    pub fn grant_network(&mut self, host: impl Into<String>) {
        self.granted.grant(Permission::Network { host: host.into() });
    }

    pub fn grant_process(&mut self, command: impl Into<String>) {
        self.granted.grant(Permission::Process {
            command: command.into(),
        });
    }

    pub fn grant_environment(&mut self, var: impl Into<String>) {
        self.granted
            .grant(Permission::Environment { var: var.into() });
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.granted
    }
}

impl CapabilityCheck for SecurityContext {
    fn check(&self, capability: &Capability) -> Result<(), SecurityError> {
        let granted = self.granted.is_granted(capability);
        debug!(?capability, granted, "capability check");
        if granted {
            Ok(())
        } else {
            Err(capability.denied())
        }
    }
}

/// Canonicalize when the path exists, otherwise make it absolute
fn canonicalize_path_safe(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
