use crate::constants::tools::INTERNAL_DENIED;
use std::collections::HashSet;

/// Which operation ids are exposed as tools.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    allowed: Option<HashSet<String>>,
    denied: Option<HashSet<String>>,
}

impl ToolFilter {
    pub fn new(allowed: Option<HashSet<String>>, denied: Option<HashSet<String>>) -> Self {
        Self { allowed, denied }
    }

    /// Empty lists count as unset.
    pub fn from_lists(allowed: &[String], denied: &[String]) -> Self {
        let to_set = |items: &[String]| -> Option<HashSet<String>> {
            let set: HashSet<String> = items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            (!set.is_empty()).then_some(set)
        };
        Self::new(to_set(allowed), to_set(denied))
    }

    pub fn is_allowed(&self, tool_id: &str) -> bool {
        if INTERNAL_DENIED.contains(&tool_id) {
            return false;
        }
        if let Some(denied) = &self.denied {
            if denied.contains(tool_id) {
                return false;
            }
        }
        match &self.allowed {
            Some(allowed) => allowed.contains(tool_id),
            None => true,
        }
    }
}
