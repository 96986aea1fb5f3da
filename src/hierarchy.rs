//! Survey hierarchy: goal, main criteria and per-criterion sub-criteria.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;

/// Separator used by the answer wire format; item names must not contain it.
pub const PAIR_SEPARATOR: &str = " vs ";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HierarchyError {
    #[error("survey goal is empty")]
    EmptyGoal,
    #[error("survey has no main criteria")]
    NoMainCriteria,
    #[error("group '{group}' contains an empty item name")]
    EmptyItemName { group: String },
    #[error("group '{group}' lists '{name}' more than once")]
    DuplicateItem { group: String, name: String },
    #[error("item name '{name}' contains a reserved sequence (' vs ', '[' or ']')")]
    ReservedCharacters { name: String },
    #[error("sub-criteria declared for unknown main criterion '{parent}'")]
    UnknownParent { parent: String },
}

/// Frozen survey structure shared by every respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub goal: String,
    pub main_criteria: Vec<String>,
    #[serde(default)]
    pub sub_criteria: BTreeMap<String, Vec<String>>,
}

/// How comparison groups are labelled in answer keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupLabels {
    pub main_group_label: String,
    pub sub_group_suffix: String,
}

impl Default for GroupLabels {
    fn default() -> Self {
        Self {
            main_group_label: "Main criteria".to_string(),
            sub_group_suffix: "sub-criteria".to_string(),
        }
    }
}

impl GroupLabels {
    pub fn sub_group_label(&self, parent: &str) -> String {
        format!("{parent} {}", self.sub_group_suffix)
    }
}

/// One sibling group that needs pairwise comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonGroup {
    pub label: String,
    /// Parent main criterion; `None` for the main group.
    pub parent: Option<String>,
    pub items: Vec<String>,
}

impl ComparisonGroup {
    pub fn new(
        label: impl Into<String>,
        parent: Option<String>,
        items: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let label = label.into();
        if items.len() <= 1 {
            return Err(ValidationError::InsufficientItems {
                group: label,
                count: items.len(),
            });
        }
        Ok(Self {
            label,
            parent,
            items,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_main(&self) -> bool {
        self.parent.is_none()
    }
}

fn check_names(group: &str, names: &[String]) -> Result<(), HierarchyError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(HierarchyError::EmptyItemName {
                group: group.to_string(),
            });
        }
        if name.contains(PAIR_SEPARATOR) || name.contains('[') || name.contains(']') {
            return Err(HierarchyError::ReservedCharacters { name: name.clone() });
        }
        if !seen.insert(name.trim()) {
            return Err(HierarchyError::DuplicateItem {
                group: group.to_string(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

impl Hierarchy {
    pub fn validate(&self) -> Result<(), HierarchyError> {
        if self.goal.trim().is_empty() {
            return Err(HierarchyError::EmptyGoal);
        }
        if self.main_criteria.is_empty() {
            return Err(HierarchyError::NoMainCriteria);
        }
        check_names(&self.goal, &self.main_criteria)?;
        for (parent, children) in &self.sub_criteria {
            if !self.main_criteria.contains(parent) {
                return Err(HierarchyError::UnknownParent {
                    parent: parent.clone(),
                });
            }
            check_names(parent, children)?;
        }
        Ok(())
    }

    pub fn children_of(&self, parent: &str) -> &[String] {
        self.sub_criteria
            .get(parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Groups to survey: main group first, then sub-groups in main-criteria
    /// order. Groups with fewer than two items need no comparison and are skipped.
    pub fn comparison_groups(&self, labels: &GroupLabels) -> Vec<ComparisonGroup> {
        let mut groups = Vec::new();
        if let Ok(main) = ComparisonGroup::new(
            labels.main_group_label.clone(),
            None,
            self.main_criteria.clone(),
        ) {
            groups.push(main);
        }
        for parent in &self.main_criteria {
            let children = self.children_of(parent).to_vec();
            if let Ok(group) = ComparisonGroup::new(
                labels.sub_group_label(parent),
                Some(parent.clone()),
                children,
            ) {
                groups.push(group);
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hierarchy {
        let mut sub = BTreeMap::new();
        sub.insert(
            "Cost".to_string(),
            vec!["Purchase".to_string(), "Maintenance".to_string()],
        );
        sub.insert("Safety".to_string(), vec!["Crash rating".to_string()]);
        Hierarchy {
            goal: "Choose a car".to_string(),
            main_criteria: vec!["Safety".to_string(), "Cost".to_string(), "Comfort".to_string()],
            sub_criteria: sub,
        }
    }

    #[test]
    fn groups_follow_main_order_and_skip_singletons() {
        let h = sample();
        h.validate().unwrap();
        let groups = h.comparison_groups(&GroupLabels::default());
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Main criteria", "Cost sub-criteria"]);
        assert!(groups[0].is_main());
        assert_eq!(groups[1].parent.as_deref(), Some("Cost"));
    }

    #[test]
    fn structural_errors_are_fatal() {
        let mut h = sample();
        h.goal = "  ".to_string();
        assert_eq!(h.validate(), Err(HierarchyError::EmptyGoal));

        let mut h = sample();
        h.main_criteria.clear();
        h.sub_criteria.clear();
        assert_eq!(h.validate(), Err(HierarchyError::NoMainCriteria));

        let mut h = sample();
        h.main_criteria.push("Cost".to_string());
        assert!(matches!(h.validate(), Err(HierarchyError::DuplicateItem { .. })));

        let mut h = sample();
        h.main_criteria.push("Speed vs Power".to_string());
        assert!(matches!(
            h.validate(),
            Err(HierarchyError::ReservedCharacters { .. })
        ));

        let mut h = sample();
        h.sub_criteria.insert("Looks".to_string(), vec!["Paint".to_string()]);
        assert!(matches!(h.validate(), Err(HierarchyError::UnknownParent { .. })));
    }

    #[test]
    fn single_item_group_is_insufficient() {
        let err = ComparisonGroup::new("solo", None, vec!["a".to_string()]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientItems {
                group: "solo".to_string(),
                count: 1
            }
        );
    }
}
