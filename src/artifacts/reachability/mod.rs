//! Reachability analysis over the object graph.
//!
//! Two operations share the same traversal primitive (commit → parents,
//! commit → tree → every subtree and blob):
//!
//! - [`ReachabilityWalker::reachable_from_refs`]: the union of everything
//!   reachable from every branch tip, plus HEAD when it is detached. Decides
//!   which objects survive a garbage-collection pack.
//! - [`ReachabilityWalker::is_ancestor`]: parent-link search gating
//!   destructive branch deletion.
//!
//! Traversal is iterative with explicit worklists; the visited guards also
//! protect against corrupt, cyclic ref data even though the commit graph is
//! expected to be a DAG.

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::collections::HashSet;

#[derive(Debug)]
pub struct ReachabilityWalker<'d> {
    database: &'d Database,
}

impl<'d> ReachabilityWalker<'d> {
    pub fn new(database: &'d Database) -> Self {
        ReachabilityWalker { database }
    }

    /// Everything reachable from branch tips and from a detached HEAD.
    pub fn reachable_from_refs(&self, refs: &Refs) -> anyhow::Result<HashSet<ObjectId>> {
        let mut reachable = HashSet::new();

        for branch in refs.list_branches()? {
            if let Some(tip) = refs.read_branch(&branch)? {
                self.collect_from_commit(&tip, &mut reachable)?;
            }
        }

        if refs.is_detached()?
            && let Some(head) = refs.read_head()?
        {
            self.collect_from_commit(&head, &mut reachable)?;
        }

        Ok(reachable)
    }

    /// Collect a commit, its ancestry, and every tree and blob those
    /// commits reference.
    pub fn collect_from_commit(
        &self,
        start: &ObjectId,
        reachable: &mut HashSet<ObjectId>,
    ) -> anyhow::Result<()> {
        let mut commits = vec![start.clone()];

        while let Some(oid) = commits.pop() {
            if !reachable.insert(oid.clone()) {
                continue;
            }

            let commit = self
                .database
                .parse_object_as_commit(&oid)?
                .with_context(|| format!("{oid} is not a commit"))?;

            for parent in commit.parents() {
                if !reachable.contains(parent) {
                    commits.push(parent.clone());
                }
            }

            self.collect_from_tree(commit.tree_oid(), reachable)?;
        }

        Ok(())
    }

    fn collect_from_tree(
        &self,
        start: &ObjectId,
        reachable: &mut HashSet<ObjectId>,
    ) -> anyhow::Result<()> {
        let mut trees = vec![start.clone()];

        while let Some(oid) = trees.pop() {
            if !reachable.insert(oid.clone()) {
                continue;
            }

            let tree = self
                .database
                .parse_object_as_tree(&oid)?
                .with_context(|| format!("{oid} is not a tree"))?;

            for record in tree.records() {
                if record.is_tree() {
                    trees.push(record.oid.clone());
                } else {
                    reachable.insert(record.oid.clone());
                }
            }
        }

        Ok(())
    }

    /// Whether `candidate` is reachable from `tip` along parent links.
    /// Used to refuse deleting a branch whose tip has not been merged.
    pub fn is_ancestor(&self, tip: &ObjectId, candidate: &ObjectId) -> anyhow::Result<bool> {
        let mut visited = HashSet::new();
        let mut stack = vec![tip.clone()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if &current == candidate {
                return Ok(true);
            }

            let commit = self
                .database
                .parse_object_as_commit(&current)?
                .with_context(|| format!("{current} is not a commit"))?;

            for parent in commit.parents() {
                stack.push(parent.clone());
            }
        }

        Ok(false)
    }
}
