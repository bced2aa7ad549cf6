use std::collections::HashSet;
use std::fmt;

use crate::registry::ServiceRegistry;

/// Role name that selects every registered service.
pub const ALL_ROLES: &str = "all";

/// Which services the process should run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoleSelection {
    #[default]
    All,
    /// Ordered, without duplicates.
    Named(Vec<String>),
}

impl RoleSelection {
    /// Parse a role list such as `"chat;login"` or `"chat,login"`.
    ///
    /// `all` selects everything only as the first entry. Blank entries are
    /// skipped and repeated names are kept once.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::from_names(
            raw.split([';', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
    }

    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for (idx, name) in names.into_iter().enumerate() {
            let name = name.as_ref();
            if idx == 0 && name == ALL_ROLES {
                return Self::All;
            }
            if seen.insert(name.to_owned()) {
                ordered.push(name.to_owned());
            } else {
                tracing::warn!(role = name, "Role listed more than once; launching it once");
            }
        }
        Self::Named(ordered)
    }

    /// Split into registered services to launch (in selection order) and
    /// unknown role names.
    #[must_use]
    pub fn resolve(&self, registry: &ServiceRegistry) -> (Vec<String>, Vec<String>) {
        match self {
            Self::All => (
                registry.names().into_iter().map(str::to_owned).collect(),
                Vec::new(),
            ),
            Self::Named(names) => names
                .iter()
                .cloned()
                .partition(|name| registry.contains(name)),
        }
    }
}

impl fmt::Display for RoleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_ROLES),
            Self::Named(names) => f.write_str(&names.join(";")),
        }
    }
}
