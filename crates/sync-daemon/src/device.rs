//! Restricts syncing to a single configured device.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGuard {
    /// Configured primary device; empty means any device may sync
    primary: String,
    /// This device's name
    current: String,
}

impl DeviceGuard {
    pub fn new(primary: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            primary: primary.into().trim().to_string(),
            current: current.into().trim().to_string(),
        }
    }

    /// Whether this device may run a sync.
    pub fn allows(&self) -> bool {
        self.primary.is_empty() || self.primary == self.current
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn current(&self) -> &str {
        &self.current
    }
}
