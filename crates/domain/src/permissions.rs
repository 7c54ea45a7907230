//! Role capabilities.
//!
//! Each role maps to a fixed set of (module, action) pairs. Callers are
//! authenticated upstream; this module only answers whether a role may act.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Area of the system an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Operations,
    Stock,
    Alerts,
}

/// What is done to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Close,
    Void,
    Delete,
}

impl Module {
    const ALL: [Module; 3] = [Module::Operations, Module::Stock, Module::Alerts];
}

impl Action {
    const ALL: [Action; 6] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Close,
        Action::Void,
        Action::Delete,
    ];
}

fn bit(module: Module, action: Action) -> u32 {
    1 << (module as u32 * Action::ALL.len() as u32 + action as u32)
}

/// A set of granted (module, action) pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    /// A set granting nothing.
    pub fn empty() -> Self {
        Self(0)
    }

    /// A set granting everything.
    pub fn all() -> Self {
        Module::ALL
            .iter()
            .fold(Self::empty(), |set, module| set.with_module(*module, &Action::ALL))
    }

    /// Adds one capability.
    pub fn with(mut self, module: Module, action: Action) -> Self {
        self.0 |= bit(module, action);
        self
    }

    /// Adds several actions on one module.
    pub fn with_module(self, module: Module, actions: &[Action]) -> Self {
        actions
            .iter()
            .fold(self, |set, action| set.with(module, *action))
    }

    /// Returns true if the pair is granted.
    pub fn allows(&self, module: Module, action: Action) -> bool {
        self.0 & bit(module, action) != 0
    }
}

/// Role of the calling actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access.
    Admin,
    /// Runs the warehouse floor, including voids and stock corrections.
    Supervisor,
    /// Works operations but cannot void, delete or adjust stock.
    Operator,
    /// Owner-side read access.
    Client,
}

impl Role {
    /// Capabilities granted to the role.
    pub fn capabilities(&self) -> CapabilitySet {
        use Action::*;
        match self {
            Role::Admin => CapabilitySet::all(),
            Role::Supervisor => CapabilitySet::empty()
                .with_module(Module::Operations, &[Read, Create, Update, Close, Void])
                .with_module(Module::Stock, &[Read, Create, Update])
                .with(Module::Alerts, Read),
            Role::Operator => CapabilitySet::empty()
                .with_module(Module::Operations, &[Read, Create, Update, Close])
                .with(Module::Stock, Read)
                .with(Module::Alerts, Read),
            Role::Client => CapabilitySet::empty()
                .with(Module::Operations, Read)
                .with(Module::Stock, Read)
                .with(Module::Alerts, Read),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::Operator => "operator",
            Role::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "operator" => Ok(Role::Operator),
            "client" => Ok(Role::Client),
            other => Err(DomainError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_everything() {
        let caps = Role::Admin.capabilities();
        for module in Module::ALL {
            for action in Action::ALL {
                assert!(caps.allows(module, action), "{module:?} {action:?}");
            }
        }
    }

    #[test]
    fn operator_cannot_void_or_adjust() {
        let caps = Role::Operator.capabilities();
        assert!(caps.allows(Module::Operations, Action::Close));
        assert!(!caps.allows(Module::Operations, Action::Void));
        assert!(!caps.allows(Module::Stock, Action::Update));
    }

    #[test]
    fn client_is_read_only() {
        let caps = Role::Client.capabilities();
        assert!(caps.allows(Module::Stock, Action::Read));
        assert!(!caps.allows(Module::Operations, Action::Create));
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Supervisor".parse::<Role>().unwrap(), Role::Supervisor);
        assert!("guest".parse::<Role>().is_err());
    }
}
