//! Merge-base selection.
//!
//! For each of the two commits being merged, a BFS over the parent DAG maps
//! every ancestor to its shortest distance. The chosen base is the ancestor
//! present in both maps with the smallest *sum* of the two distances, a
//! "best common ancestor" heuristic rather than a full generalized
//! merge-base set.
//! Ties are broken by object id so the choice is deterministic.
//!
//! The finder takes a parent-loader function rather than a storage handle,
//! so it works against any backend, including the in-memory commit graphs
//! the tests build.

use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{HashMap, VecDeque};

pub struct LcaFinder<ParentsFn>
where
    ParentsFn: Fn(&ObjectId) -> anyhow::Result<Vec<ObjectId>>,
{
    parents_of: ParentsFn,
}

impl<ParentsFn> LcaFinder<ParentsFn>
where
    ParentsFn: Fn(&ObjectId) -> anyhow::Result<Vec<ObjectId>>,
{
    /// `parents_of` must return an empty vector for root commits.
    pub fn new(parents_of: ParentsFn) -> Self {
        Self { parents_of }
    }

    /// Map every ancestor of `start` (including `start` itself, at
    /// distance 0) to its shortest parent-link distance.
    fn ancestor_distances(&self, start: &ObjectId) -> anyhow::Result<HashMap<ObjectId, u32>> {
        let mut distances = HashMap::new();
        let mut queue = VecDeque::new();

        distances.insert(start.clone(), 0);
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            let distance = distances[&current];

            for parent in (self.parents_of)(&current)? {
                if !distances.contains_key(&parent) {
                    distances.insert(parent.clone(), distance + 1);
                    queue.push_back(parent);
                }
            }
        }

        Ok(distances)
    }

    /// The common ancestor minimizing the summed distance to both commits,
    /// or `None` when the two histories share nothing.
    pub fn find_merge_base(
        &self,
        ours: &ObjectId,
        theirs: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        let our_distances = self.ancestor_distances(ours)?;
        let their_distances = self.ancestor_distances(theirs)?;

        let mut best: Option<(u32, ObjectId)> = None;
        for (candidate, their_distance) in &their_distances {
            let Some(our_distance) = our_distances.get(candidate) else {
                continue;
            };
            let score = our_distance + their_distance;

            let better = match &best {
                None => true,
                Some((best_score, best_oid)) => {
                    score < *best_score || (score == *best_score && candidate < best_oid)
                }
            };
            if better {
                best = Some((score, candidate.clone()));
            }
        }

        Ok(best.map(|(_, oid)| oid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    /// In-memory commit graph for exercising the finder without storage.
    #[derive(Debug, Default)]
    struct InMemoryGraph {
        parents: HashMap<ObjectId, Vec<ObjectId>>,
    }

    impl InMemoryGraph {
        fn add_commit(&mut self, commit: ObjectId, parents: Vec<ObjectId>) {
            self.parents.insert(commit, parents);
        }

        fn parents_of(&self, commit: &ObjectId) -> anyhow::Result<Vec<ObjectId>> {
            self.parents
                .get(commit)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("commit {commit} not in test graph"))
        }
    }

    fn oid(name: &str) -> ObjectId {
        ObjectId::digest(name.as_bytes())
    }

    #[fixture]
    fn linear_history() -> InMemoryGraph {
        // A <- B <- C <- D
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("c"), vec![oid("b")]);
        graph.add_commit(oid("d"), vec![oid("c")]);
        graph
    }

    #[fixture]
    fn simple_divergence() -> InMemoryGraph {
        //     A
        //    / \
        //   B   C
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("c"), vec![oid("a")]);
        graph
    }

    #[rstest]
    fn same_commit_is_its_own_base(linear_history: InMemoryGraph) {
        let finder = LcaFinder::new(|c: &ObjectId| linear_history.parents_of(c));

        assert_eq!(
            finder.find_merge_base(&oid("c"), &oid("c")).unwrap(),
            Some(oid("c"))
        );
    }

    #[rstest]
    fn ancestor_is_base_of_descendant(linear_history: InMemoryGraph) {
        let finder = LcaFinder::new(|c: &ObjectId| linear_history.parents_of(c));

        assert_eq!(
            finder.find_merge_base(&oid("b"), &oid("d")).unwrap(),
            Some(oid("b"))
        );
        assert_eq!(
            finder.find_merge_base(&oid("d"), &oid("b")).unwrap(),
            Some(oid("b"))
        );
    }

    #[rstest]
    fn fork_point_is_base_of_divergent_tips(simple_divergence: InMemoryGraph) {
        let finder = LcaFinder::new(|c: &ObjectId| simple_divergence.parents_of(c));

        assert_eq!(
            finder.find_merge_base(&oid("b"), &oid("c")).unwrap(),
            Some(oid("a"))
        );
    }

    #[rstest]
    fn merge_commit_reaches_base_through_both_parents() {
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D (merge), then E on top of C
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("c"), vec![oid("a")]);
        graph.add_commit(oid("d"), vec![oid("b"), oid("c")]);
        graph.add_commit(oid("e"), vec![oid("c")]);

        let finder = LcaFinder::new(|c: &ObjectId| graph.parents_of(c));

        // C is one step from D (second parent) and one from E
        assert_eq!(
            finder.find_merge_base(&oid("d"), &oid("e")).unwrap(),
            Some(oid("c"))
        );
    }

    #[rstest]
    fn distance_sum_prefers_the_nearer_common_ancestor() {
        // A <- B <- C <- D (long branch)
        //       \
        //        E (short branch from B)
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("c"), vec![oid("b")]);
        graph.add_commit(oid("d"), vec![oid("c")]);
        graph.add_commit(oid("e"), vec![oid("b")]);

        let finder = LcaFinder::new(|c: &ObjectId| graph.parents_of(c));

        // B scores 2+1 against A's 3+2
        assert_eq!(
            finder.find_merge_base(&oid("d"), &oid("e")).unwrap(),
            Some(oid("b"))
        );
    }

    #[rstest]
    fn unrelated_histories_have_no_base() {
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("x"), vec![]);
        graph.add_commit(oid("y"), vec![oid("x")]);

        let finder = LcaFinder::new(|c: &ObjectId| graph.parents_of(c));

        assert_eq!(finder.find_merge_base(&oid("b"), &oid("y")).unwrap(), None);
    }

    #[rstest]
    fn criss_cross_tie_breaks_deterministically() {
        //     A
        //    / \
        //   B   C
        //   |\ /|
        //   | X |
        //   |/ \|
        //   D   E   (D merges B,C; E merges C,B)
        let mut graph = InMemoryGraph::default();
        graph.add_commit(oid("a"), vec![]);
        graph.add_commit(oid("b"), vec![oid("a")]);
        graph.add_commit(oid("c"), vec![oid("a")]);
        graph.add_commit(oid("d"), vec![oid("b"), oid("c")]);
        graph.add_commit(oid("e"), vec![oid("c"), oid("b")]);

        let finder = LcaFinder::new(|c: &ObjectId| graph.parents_of(c));

        // B and C both score 1+1; the smaller object id must win, every run
        let expected = std::cmp::min(oid("b"), oid("c"));
        for _ in 0..10 {
            assert_eq!(
                finder.find_merge_base(&oid("d"), &oid("e")).unwrap(),
                Some(expected.clone())
            );
        }
    }
}
