//! Reserved inter-container network shared by an operator and its services.

use std::fmt;

/// A network created for the current operator.
///
/// The handle only names the network; removal goes through the
/// lifecycle manager's teardown so that it is attempted on every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    name: String,
}

impl NetworkHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Network name as known to the runtime.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
