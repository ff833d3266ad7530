//! Permission gate consulted before scanning

use async_trait::async_trait;

/// Decides whether the process may use the wireless transport
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Ask for access; `false` means scanning must not start
    async fn request_access(&self) -> bool;
}

/// Gate with a fixed answer, for platforms without a permission model
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(true)
    }

    pub fn denied() -> Self {
        Self(false)
    }
}

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn request_access(&self) -> bool {
        self.0
    }
}
