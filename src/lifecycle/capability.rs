//! Capability configuration.
//!
//! Optional subsystems are selected by runtime capability values rather than
//! compile-time feature flags: each subsystem is either `Disabled` or
//! `Enabled` with its construction configuration, resolved once when the
//! bootstrapper runs.

use crate::secure::SCHEME_ROTOR;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Capability<C> {
    #[default]
    Disabled,
    Enabled(C),
}

impl<C> Capability<C> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Capability::Enabled(_))
    }

    pub fn config(&self) -> Option<&C> {
        match self {
            Capability::Disabled => None,
            Capability::Enabled(config) => Some(config),
        }
    }
}

/// Construction configuration for the secure object pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureCaps {
    pub scheme: u8,
    /// Charm key; `None` uses the built-in configuration key.
    pub key: Option<Vec<u8>>,
}

impl Default for SecureCaps {
    fn default() -> Self {
        Self {
            scheme: SCHEME_ROTOR,
            key: None,
        }
    }
}

/// The full capability shape of an application, resolved at construction
/// time.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub secure: Capability<SecureCaps>,
    pub workers: Capability<()>,
    pub network: Capability<()>,
    pub web_ui: Capability<()>,
    pub text: Capability<()>,
}

impl CapabilitySet {
    /// Everything disabled; the core (string pool, resource mapper, log
    /// pipeline) always runs.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn with_secure(mut self, caps: SecureCaps) -> Self {
        self.secure = Capability::Enabled(caps);
        self
    }

    pub fn with_default_secure(self) -> Self {
        self.with_secure(SecureCaps::default())
    }

    pub fn with_workers(mut self) -> Self {
        self.workers = Capability::Enabled(());
        self
    }

    pub fn with_network(mut self) -> Self {
        self.network = Capability::Enabled(());
        self
    }

    /// The web UI implies workers and network, which it depends on.
    pub fn with_web_ui(mut self) -> Self {
        self.web_ui = Capability::Enabled(());
        self.with_workers().with_network()
    }

    pub fn with_text(mut self) -> Self {
        self.text = Capability::Enabled(());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_ui_pulls_in_its_dependencies() {
        let caps = CapabilitySet::minimal().with_web_ui();
        assert!(caps.web_ui.is_enabled());
        assert!(caps.workers.is_enabled());
        assert!(caps.network.is_enabled());
        assert!(!caps.secure.is_enabled());
    }

    #[test]
    fn default_secure_caps_use_the_builtin_key() {
        let caps = CapabilitySet::minimal().with_default_secure();
        let secure = caps.secure.config().unwrap();
        assert_eq!(secure.scheme, SCHEME_ROTOR);
        assert!(secure.key.is_none());
    }
}
