//! Nested-interval index over the revision forest.
//!
//! Every revision carries `(tree_id, lft, rght, level)` so "has children",
//! subtree and ancestry questions are answered by interval comparisons
//! instead of parent-chain walks. Inserting or removing a node shifts the
//! boundaries of the rest of its tree; [`IntervalShift`] describes that shift
//! so the in-memory arena and SQL backends apply the same arithmetic.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::{NewRevision, Revision};
use crate::types::DbId;

/// Position of a revision in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePosition {
    pub tree_id: i32,
    pub lft: i32,
    pub rght: i32,
    pub level: i32,
}

impl TreePosition {
    /// Position of a new root in `tree_id`.
    pub fn root(tree_id: i32) -> Self {
        Self {
            tree_id,
            lft: 1,
            rght: 2,
            level: 0,
        }
    }

    /// Position of a new last child of `self`, plus the shift the rest of the
    /// tree needs *before* the child is inserted.
    pub fn child_slot(&self) -> (TreePosition, IntervalShift) {
        let child = TreePosition {
            tree_id: self.tree_id,
            lft: self.rght,
            rght: self.rght + 1,
            level: self.level + 1,
        };
        let shift = IntervalShift {
            tree_id: self.tree_id,
            from: self.rght,
            delta: 2,
        };
        (child, shift)
    }

    /// Shift that compacts the tree *after* this subtree is removed.
    pub fn removal_shift(&self) -> IntervalShift {
        IntervalShift {
            tree_id: self.tree_id,
            from: self.rght + 1,
            delta: -self.width(),
        }
    }

    pub fn width(&self) -> i32 {
        self.rght - self.lft + 1
    }

    pub fn has_children(&self) -> bool {
        self.rght - self.lft > 1
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children()
    }

    pub fn descendant_count(&self) -> i32 {
        (self.rght - self.lft - 1) / 2
    }

    /// `other` lies strictly inside this subtree.
    pub fn contains(&self, other: &TreePosition) -> bool {
        self.tree_id == other.tree_id && self.lft < other.lft && other.rght < self.rght
    }
}

/// Adds `delta` to every `lft`/`rght` value `>= from` in tree `tree_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalShift {
    pub tree_id: i32,
    pub from: i32,
    pub delta: i32,
}

impl IntervalShift {
    pub fn apply(&self, position: &mut TreePosition) {
        if position.tree_id != self.tree_id {
            return;
        }
        if position.lft >= self.from {
            position.lft += self.delta;
        }
        if position.rght >= self.from {
            position.rght += self.delta;
        }
    }
}

/// Check that stored intervals equal a pre-order numbering of the
/// parent/child graph, tree by tree. Siblings are visited in `lft` order.
pub fn validate_forest(revisions: &[Revision]) -> Result<(), CoreError> {
    let mut trees: BTreeMap<i32, Vec<&Revision>> = BTreeMap::new();
    for revision in revisions {
        trees.entry(revision.position.tree_id).or_default().push(revision);
    }

    for (tree_id, nodes) in trees {
        let by_id: HashMap<DbId, &Revision> = nodes.iter().map(|r| (r.id, *r)).collect();
        let mut children: HashMap<Option<DbId>, Vec<&Revision>> = HashMap::new();
        for node in &nodes {
            if let Some(parent_id) = node.parent_id {
                if !by_id.contains_key(&parent_id) {
                    return Err(inconsistent(tree_id, node.id, "parent outside tree"));
                }
            }
            children.entry(node.parent_id).or_default().push(*node);
        }
        for list in children.values_mut() {
            list.sort_by_key(|r| r.position.lft);
        }

        let roots = children.get(&None).cloned().unwrap_or_default();
        if roots.len() != 1 {
            return Err(CoreError::Internal(format!(
                "Revision tree {tree_id} has {} roots",
                roots.len()
            )));
        }

        // Iterative pre-order walk: (node, level, entering).
        let mut counter = 1;
        let mut visited = 0usize;
        let mut stack = vec![(roots[0], 0, true)];
        while let Some((node, level, entering)) = stack.pop() {
            if entering {
                visited += 1;
                if node.position.lft != counter || node.position.level != level {
                    return Err(inconsistent(tree_id, node.id, "left bound or level"));
                }
                counter += 1;
                stack.push((node, level, false));
                if let Some(kids) = children.get(&Some(node.id)) {
                    for kid in kids.iter().rev() {
                        stack.push((*kid, level + 1, true));
                    }
                }
            } else {
                if node.position.rght != counter {
                    return Err(inconsistent(tree_id, node.id, "right bound"));
                }
                counter += 1;
            }
        }
        if visited != nodes.len() {
            return Err(CoreError::Internal(format!(
                "Revision tree {tree_id} has nodes unreachable from its root"
            )));
        }
    }
    Ok(())
}

fn inconsistent(tree_id: i32, id: DbId, what: &str) -> CoreError {
    CoreError::Internal(format!(
        "Revision tree {tree_id} is inconsistent at revision {id} ({what})"
    ))
}

/// Arena of revisions keyed by id with parent back-references and
/// nested-interval bounds maintained on every insert and removal.
#[derive(Debug, Clone, Default)]
pub struct RevisionTree {
    nodes: BTreeMap<DbId, Revision>,
    last_id: DbId,
}

impl RevisionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: DbId) -> Option<&Revision> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: DbId) -> Option<&mut Revision> {
        self.nodes.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.nodes.values()
    }

    /// Insert a revision, numbering it as a new root or as the last child of
    /// its parent.
    pub fn insert(&mut self, new: NewRevision) -> Result<Revision, CoreError> {
        let position = match new.parent_id {
            None => {
                let tree_id = self
                    .nodes
                    .values()
                    .map(|r| r.position.tree_id)
                    .max()
                    .unwrap_or(0)
                    + 1;
                TreePosition::root(tree_id)
            }
            Some(parent_id) => {
                let parent = self.nodes.get(&parent_id).ok_or(CoreError::NotFound {
                    entity: "revision",
                    id: parent_id,
                })?;
                let (slot, shift) = parent.position.child_slot();
                for node in self.nodes.values_mut() {
                    shift.apply(&mut node.position);
                }
                slot
            }
        };

        self.last_id += 1;
        let revision = Revision {
            id: self.last_id,
            parent_id: new.parent_id,
            created_at: new.created_at,
            created_by: new.created_by,
            moderated_at: new.moderated_at,
            moderated_by: new.moderated_by,
            comment: new.comment,
            status: new.status,
            deleted: new.deleted,
            position,
        };
        self.nodes.insert(revision.id, revision.clone());
        Ok(revision)
    }

    /// Remove a revision with its whole subtree. Returns removed ids.
    pub fn remove_subtree(&mut self, id: DbId) -> Result<Vec<DbId>, CoreError> {
        let position = self
            .nodes
            .get(&id)
            .map(|r| r.position)
            .ok_or(CoreError::NotFound {
                entity: "revision",
                id,
            })?;

        let removed: Vec<DbId> = self
            .nodes
            .values()
            .filter(|r| r.id == id || position.contains(&r.position))
            .map(|r| r.id)
            .collect();
        for removed_id in &removed {
            self.nodes.remove(removed_id);
        }

        let shift = position.removal_shift();
        for node in self.nodes.values_mut() {
            shift.apply(&mut node.position);
        }
        Ok(removed)
    }

    /// Direct children ordered by position.
    pub fn children(&self, id: DbId) -> Vec<&Revision> {
        let mut kids: Vec<&Revision> = self
            .nodes
            .values()
            .filter(|r| r.parent_id == Some(id))
            .collect();
        kids.sort_by_key(|r| r.position.lft);
        kids
    }

    pub fn child_count(&self, id: DbId) -> usize {
        self.nodes.values().filter(|r| r.parent_id == Some(id)).count()
    }

    /// Other children of the same parent. Roots have no siblings.
    pub fn siblings(&self, id: DbId) -> Vec<&Revision> {
        match self.nodes.get(&id).and_then(|r| r.parent_id) {
            Some(parent_id) => self
                .children(parent_id)
                .into_iter()
                .filter(|r| r.id != id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// All revisions strictly below `id`, in pre-order.
    pub fn descendants(&self, id: DbId) -> Vec<&Revision> {
        let Some(position) = self.nodes.get(&id).map(|r| r.position) else {
            return Vec::new();
        };
        let mut below: Vec<&Revision> = self
            .nodes
            .values()
            .filter(|r| position.contains(&r.position))
            .collect();
        below.sort_by_key(|r| r.position.lft);
        below
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let all: Vec<Revision> = self.nodes.values().cloned().collect();
        validate_forest(&all)
    }
}
