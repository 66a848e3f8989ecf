//! The canonical inventory record.
//!
//! Every source adapter maps its raw records into [`Instance`] values. An
//! instance is a plain immutable value: equality covers every field, so two
//! sources that report the same host under different labels produce two
//! distinct instances.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether an instance is a host or something scheduled onto a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Vm,
    Container,
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm => write!(f, "vm"),
            Self::Container => write!(f, "container"),
        }
    }
}

/// A single reachable endpoint discovered by an inventory source.
///
/// Field order matters: the derived [`Ord`] compares `name` first, then
/// `address`, which is the stable display order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    /// Primary display and match key.
    pub name: String,
    /// Network destination (IP or DNS name). Containers share their host's.
    pub address: String,
    /// Secondary match keys, in source-defined order.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Label of the source that produced this record, e.g. `"prod (aws)"`.
    pub source: String,
    pub kind: InstanceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Instance {
    /// Build a VM instance, or `None` when the name or address is blank.
    ///
    /// Adapters use the `None` case to skip records they cannot resolve
    /// rather than failing the whole read.
    pub fn new(
        name: impl AsRef<str>,
        address: impl AsRef<str>,
        source: impl Into<String>,
    ) -> Option<Self> {
        let name = name.as_ref().trim();
        let address = address.as_ref().trim();
        if name.is_empty() || address.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            address: address.to_string(),
            aliases: Vec::new(),
            source: source.into(),
            kind: InstanceKind::Vm,
            container_id: None,
            task_id: None,
        })
    }

    /// Attach aliases, dropping blanks, repeats, and the name itself.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            let alias = alias.as_ref().trim();
            if alias.is_empty() || alias == self.name || self.aliases.iter().any(|a| a == alias) {
                continue;
            }
            self.aliases.push(alias.to_string());
        }
        self
    }

    /// Mark this instance as a container scheduled onto a host.
    pub fn into_container(mut self, container_id: Option<String>, task_id: Option<String>) -> Self {
        self.kind = InstanceKind::Container;
        self.container_id = container_id.filter(|id| !id.trim().is_empty());
        self.task_id = task_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Every string this instance can be matched by: the name, then aliases.
    pub fn match_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<55} ({})", self.name, self.address)
    }
}
