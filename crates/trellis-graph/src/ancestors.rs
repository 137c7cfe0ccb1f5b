//! Ancestor resolution over `IS_A` edges.
//!
//! BFS from an entry, one query per hop. The first visit of an ancestor is at
//! its minimum distance, so cycles and diamonds are reported once. The walk is
//! bounded by a maximum depth regardless of graph shape.

use std::collections::HashSet;

use neo4rs::query;
use serde::Serialize;

use trellis_core::{EntryId, EntrySummary, SiteId};

use crate::client::{field, id_field, GraphClient, GraphError};

/// An entry reachable by following `IS_A` outward.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Ancestor {
    pub distance: u32,
    #[serde(flatten)]
    pub entry: EntrySummary,
}

/// Breadth-first ancestor walk, independent of where parents come from.
pub struct AncestorWalk {
    max_depth: u32,
    depth: u32,
    visited: HashSet<EntryId>,
    frontier: Vec<EntryId>,
    found: Vec<Ancestor>,
}

impl AncestorWalk {
    pub fn new(start: EntryId, max_depth: u32) -> Self {
        Self {
            max_depth,
            depth: 0,
            visited: HashSet::from([start]),
            frontier: vec![start],
            found: Vec::new(),
        }
    }

    /// Entries whose parents are needed next, or `None` when the walk is done.
    pub fn next_frontier(&self) -> Option<&[EntryId]> {
        if self.frontier.is_empty() || self.depth >= self.max_depth {
            None
        } else {
            Some(&self.frontier)
        }
    }

    /// Record the parents of the current frontier and advance one hop.
    pub fn absorb(&mut self, parents: impl IntoIterator<Item = EntrySummary>) {
        self.depth += 1;
        let mut next = Vec::new();
        for parent in parents {
            if self.visited.insert(parent.id) {
                next.push(parent.id);
                self.found.push(Ancestor {
                    distance: self.depth,
                    entry: parent,
                });
            }
        }
        self.frontier = next;
    }

    /// Ancestors ordered by distance, then name.
    pub fn finish(mut self) -> Vec<Ancestor> {
        self.found.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.entry.name.cmp(&b.entry.name))
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        self.found
    }
}

impl GraphClient {
    /// All ancestors of an entry, each at its minimum `IS_A` distance.
    ///
    /// An entry with no ancestors, or one that does not exist, yields an empty list.
    pub async fn get_ancestors(
        &self,
        site_id: &SiteId,
        entry_id: &EntryId,
        max_depth: u32,
    ) -> Result<Vec<Ancestor>, GraphError> {
        let mut walk = AncestorWalk::new(*entry_id, max_depth);

        while let Some(frontier) = walk.next_frontier() {
            let ids: Vec<String> = frontier.iter().map(ToString::to_string).collect();
            let q = query(
                "MATCH (child:Entry {site_id: $site_id})-[:IS_A]->(parent:Entry {site_id: $site_id})
                 WHERE child.id IN $ids
                 MATCH (parent)-[:IS_OF_TYPE]->(et:EntryType)
                 RETURN DISTINCT parent.id AS id, parent.name AS name,
                        parent.key AS key, et.id AS entry_type_id",
            )
            .param("site_id", site_id.to_string())
            .param("ids", ids);

            let rows = self.query_rows(q).await?;
            let parents = rows
                .iter()
                .map(|row| {
                    Ok(EntrySummary {
                        id: id_field(row, "id")?,
                        name: field::<Option<String>>(row, "name")?.unwrap_or_default(),
                        key: field::<Option<String>>(row, "key")?.unwrap_or_default(),
                        entry_type_id: id_field(row, "entry_type_id")?,
                    })
                })
                .collect::<Result<Vec<_>, GraphError>>()?;
            walk.absorb(parents);
        }

        let ancestors = walk.finish();
        tracing::debug!(%entry_id, count = ancestors.len(), "Resolved ancestors");
        Ok(ancestors)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;
    use trellis_core::EntryTypeId;

    /// An in-memory IS_A graph keyed by entry name.
    pub(crate) struct IsAGraph {
        ids: HashMap<&'static str, EntryId>,
        parents: HashMap<EntryId, Vec<EntryId>>,
        names: HashMap<EntryId, &'static str>,
    }

    impl IsAGraph {
        pub(crate) fn new(edges: &[(&'static str, &'static str)]) -> Self {
            let mut graph = Self {
                ids: HashMap::new(),
                parents: HashMap::new(),
                names: HashMap::new(),
            };
            for &(child, parent) in edges {
                let c = graph.id(child);
                let p = graph.id(parent);
                graph.parents.entry(c).or_default().push(p);
            }
            graph
        }

        pub(crate) fn id(&mut self, name: &'static str) -> EntryId {
            let id = *self.ids.entry(name).or_insert_with(EntryId::new);
            self.names.insert(id, name);
            id
        }

        fn summary(&self, id: EntryId) -> EntrySummary {
            let name = self.names[&id];
            EntrySummary {
                id,
                name: name.to_string(),
                key: name.to_lowercase(),
                entry_type_id: EntryTypeId(uuid::Uuid::nil()),
            }
        }

        /// Drive a walk the same way `get_ancestors` does, one hop per round.
        pub(crate) fn ancestors(&mut self, start: &'static str, max_depth: u32) -> Vec<Ancestor> {
            let mut walk = AncestorWalk::new(self.id(start), max_depth);
            while let Some(frontier) = walk.next_frontier() {
                let parents: Vec<EntrySummary> = frontier
                    .iter()
                    .flat_map(|id| self.parents.get(id).cloned().unwrap_or_default())
                    .map(|p| self.summary(p))
                    .collect();
                walk.absorb(parents);
            }
            walk.finish()
        }
    }

    fn by_distance(ancestors: &[Ancestor]) -> Vec<(u32, String)> {
        ancestors
            .iter()
            .map(|a| (a.distance, a.entry.name.clone()))
            .collect()
    }

    #[test]
    fn test_no_ancestors() {
        let mut graph = IsAGraph::new(&[("B", "A")]);
        assert!(graph.ancestors("A", 50).is_empty());
    }

    #[test]
    fn test_cycle_is_deduplicated_and_terminates() {
        // D -> B -> A -> D forms a cycle; D -> C -> A is a second route to A.
        let mut graph = IsAGraph::new(&[("A", "D"), ("D", "B"), ("B", "A"), ("D", "C"), ("C", "A")]);
        let ancestors = graph.ancestors("D", 50);
        assert_eq!(
            by_distance(&ancestors),
            vec![(1, "B".to_string()), (1, "C".to_string()), (2, "A".to_string())]
        );
    }

    #[test]
    fn test_multiple_inheritance_uses_minimum_distance() {
        let mut graph = IsAGraph::new(&[
            ("C", "A"),
            ("D", "A"),
            ("D", "B"),
            ("E", "B"),
            ("F", "C"),
            ("F", "D"),
            ("H", "F"),
            ("H", "E"),
        ]);
        let ancestors = graph.ancestors("H", 50);
        assert_eq!(
            by_distance(&ancestors),
            vec![
                (1, "E".to_string()),
                (1, "F".to_string()),
                (2, "B".to_string()),
                (2, "C".to_string()),
                (2, "D".to_string()),
                (3, "A".to_string()),
            ]
        );
    }

    #[test]
    fn test_depth_bound_stops_long_chains() {
        let mut graph = IsAGraph::new(&[("E", "D"), ("D", "C"), ("C", "B"), ("B", "A")]);
        let ancestors = graph.ancestors("E", 2);
        assert_eq!(
            by_distance(&ancestors),
            vec![(1, "D".to_string()), (2, "C".to_string())]
        );
    }

    #[test]
    fn test_serializes_flat() {
        let mut graph = IsAGraph::new(&[("B", "A")]);
        let ancestors = graph.ancestors("B", 50);
        let json = serde_json::to_value(&ancestors[0]).unwrap();
        assert_eq!(json["distance"], 1);
        assert_eq!(json["name"], "A");
        assert!(json.get("entry_type_id").is_some());
    }
}
