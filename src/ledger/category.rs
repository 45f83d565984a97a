use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::period::BudgetPeriod;
use crate::currency::Money;
use crate::errors::{LedgerError, Result};

/// Spending limit attached to a category for each period of `period`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetRule {
    pub limit: Money,
    pub period: BudgetPeriod,
}

impl BudgetRule {
    pub fn new(limit: Money, period: BudgetPeriod) -> Self {
        Self { limit, period }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetRule>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>, parent_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_id,
            budget: None,
            version: 1,
            created_at: Utc::now(),
        }
    }
}

/// Category forest keyed by id. Every mutation path checks for cycles and
/// leaves the tree untouched on failure.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: BTreeMap<Uuid, Category>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Categories ordered by name, case-insensitively.
    pub fn sorted(&self) -> Vec<&Category> {
        let mut categories: Vec<&Category> = self.nodes.values().collect();
        categories.sort_by_key(|category| (category.name.to_lowercase(), category.id));
        categories
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        let wanted = normalize(name);
        self.nodes.values().find(|category| normalize(&category.name) == wanted)
    }

    pub fn roots(&self) -> Vec<&Category> {
        self.sorted()
            .into_iter()
            .filter(|category| category.parent_id.is_none())
            .collect()
    }

    pub fn children(&self, id: Uuid) -> Vec<&Category> {
        self.sorted()
            .into_iter()
            .filter(|category| category.parent_id == Some(id))
            .collect()
    }

    /// Parent chain from the direct parent up to the root.
    pub fn ancestors(&self, id: Uuid) -> Vec<Uuid> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.nodes.get(&id).and_then(|category| category.parent_id);
        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            cursor = self.nodes.get(&parent).and_then(|category| category.parent_id);
        }
        chain
    }

    /// All categories below `id`, depth first.
    pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut found = Vec::new();
        let mut stack: Vec<Uuid> = self.children(id).iter().rev().map(|c| c.id).collect();
        while let Some(next) = stack.pop() {
            found.push(next);
            stack.extend(self.children(next).iter().rev().map(|c| c.id));
        }
        found
    }

    /// `Parent / Child` display path.
    pub fn path_name(&self, id: Uuid) -> Option<String> {
        let category = self.nodes.get(&id)?;
        let mut parts: Vec<&str> = self
            .ancestors(id)
            .iter()
            .rev()
            .filter_map(|ancestor| self.nodes.get(ancestor).map(|c| c.name.as_str()))
            .collect();
        parts.push(category.name.as_str());
        Some(parts.join(" / "))
    }

    /// Checks that `category` may be stored: unique name, existing parent, no
    /// cycle through its parent chain.
    pub fn validate(&self, category: &Category) -> Result<()> {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidInput("category name cannot be empty".into()));
        }
        let wanted = normalize(name);
        if self
            .nodes
            .values()
            .any(|other| other.id != category.id && normalize(&other.name) == wanted)
        {
            return Err(LedgerError::DuplicateName(name.to_string()));
        }
        if let Some(parent) = category.parent_id {
            if parent == category.id {
                return Err(LedgerError::CategoryCycle {
                    category: category.id,
                    parent,
                });
            }
            if !self.nodes.contains_key(&parent) {
                return Err(LedgerError::CategoryNotFound(parent));
            }
            if self.ancestors(parent).contains(&category.id) {
                return Err(LedgerError::CategoryCycle {
                    category: category.id,
                    parent,
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, category: Category) -> Result<()> {
        self.validate(&category)?;
        self.nodes.insert(category.id, category);
        Ok(())
    }

    /// Stores without validation; callers validate first.
    pub(crate) fn put(&mut self, category: Category) {
        self.nodes.insert(category.id, category);
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (CategoryTree, Uuid, Uuid, Uuid) {
        let mut tree = CategoryTree::new();
        let food = Category::new("Food", None);
        let groceries = Category::new("Groceries", Some(food.id));
        let produce = Category::new("Produce", Some(groceries.id));
        let ids = (food.id, groceries.id, produce.id);
        tree.insert(food).unwrap();
        tree.insert(groceries).unwrap();
        tree.insert(produce).unwrap();
        (tree, ids.0, ids.1, ids.2)
    }

    #[test]
    fn walks_ancestors_and_descendants() {
        let (tree, food, groceries, produce) = chain();
        assert_eq!(tree.ancestors(produce), vec![groceries, food]);
        assert_eq!(tree.descendants(food), vec![groceries, produce]);
        assert_eq!(tree.path_name(produce).unwrap(), "Food / Groceries / Produce");
    }

    #[test]
    fn cycle_is_rejected_and_tree_unchanged() {
        let (mut tree, food, _, produce) = chain();
        let mut moved = tree.get(food).unwrap().clone();
        moved.parent_id = Some(produce);
        let err = tree.insert(moved).unwrap_err();
        assert!(matches!(err, LedgerError::CategoryCycle { .. }));
        assert_eq!(tree.get(food).unwrap().parent_id, None);
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn names_are_unique_case_insensitively() {
        let (mut tree, ..) = chain();
        let err = tree.insert(Category::new("  food ", None)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateName(_)));
        let err = tree.insert(Category::new("Rent", Some(Uuid::new_v4()))).unwrap_err();
        assert!(matches!(err, LedgerError::CategoryNotFound(_)));
    }
}
