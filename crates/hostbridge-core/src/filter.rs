//! Include/exclude pattern policy over instances.
//!
//! The candidate strings for an instance are its name, its address, and
//! every alias. An include pattern keeps instances where any candidate
//! matches; an exclude pattern drops them. When both are present the
//! include pattern wins and the exclude pattern is ignored.

use regex::Regex;

use crate::models::Instance;

/// Returns `true` if `instance` survives the configured patterns.
pub fn instance_filter(instance: &Instance, include: Option<&Regex>, exclude: Option<&Regex>) -> bool {
    let mut candidates = [instance.name.as_str(), instance.address.as_str()]
        .into_iter()
        .chain(instance.aliases.iter().map(String::as_str));

    if let Some(re) = include {
        return candidates.any(|c| re.is_match(c));
    }
    if let Some(re) = exclude {
        return !candidates.any(|c| re.is_match(c));
    }
    true
}

/// Compiled include/exclude patterns, built once per invocation and shared
/// by the listing and search paths.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl InstanceFilter {
    /// A filter that keeps everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include.map(Regex::new).transpose()?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.include.is_some() || self.exclude.is_some()
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        instance_filter(instance, self.include.as_ref(), self.exclude.as_ref())
    }

    /// Keep the instances that pass, preserving order.
    pub fn apply(&self, instances: Vec<Instance>) -> Vec<Instance> {
        if !self.is_active() {
            return instances;
        }
        instances.into_iter().filter(|i| self.matches(i)).collect()
    }
}
