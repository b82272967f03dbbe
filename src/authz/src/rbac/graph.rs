//! Role graph with cycle-safe reachability queries
//!
//! A `RoleGraph` stores the directed "child has parent" relation for one
//! grouping rule type (`g`, `g2`, ...). Every edge lives in exactly one
//! domain; edges added without a domain use the empty domain.
//!
//! Traversals are breadth-first with an explicit visited set, so cyclic
//! graphs always terminate and never report a node twice.

use std::collections::{HashMap, HashSet, VecDeque};

/// Domain key used for links that carry no domain
const DEFAULT_DOMAIN: &str = "";

/// Forward and reverse adjacency for one domain
///
/// An edge is present in `parents` iff it is present in `children`.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    /// child -> direct parents
    parents: HashMap<String, HashSet<String>>,

    /// parent -> direct children
    children: HashMap<String, HashSet<String>>,
}

impl Adjacency {
    fn insert(&mut self, child: &str, parent: &str) -> bool {
        let inserted = self
            .parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());

        if inserted {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(child.to_string());
        }

        inserted
    }

    fn remove(&mut self, child: &str, parent: &str) -> bool {
        let removed = self
            .parents
            .get_mut(child)
            .map(|set| set.remove(parent))
            .unwrap_or(false);

        if !removed {
            return false;
        }

        prune(&mut self.parents, child);
        if let Some(set) = self.children.get_mut(parent) {
            set.remove(child);
        }
        prune(&mut self.children, parent);

        true
    }

    /// Remove a node and every edge touching it, returning the number of edges dropped
    fn remove_node(&mut self, name: &str) -> usize {
        let mut dropped = 0;

        if let Some(parents) = self.parents.remove(name) {
            for parent in &parents {
                if let Some(set) = self.children.get_mut(parent) {
                    set.remove(name);
                }
                prune(&mut self.children, parent);
            }
            dropped += parents.len();
        }

        if let Some(children) = self.children.remove(name) {
            for child in &children {
                if let Some(set) = self.parents.get_mut(child) {
                    set.remove(name);
                }
                prune(&mut self.parents, child);
            }
            // A self-loop was already counted through `parents`
            dropped += children.iter().filter(|c| c.as_str() != name).count();
        }

        dropped
    }

    fn edge_count(&self) -> usize {
        self.parents.values().map(HashSet::len).sum()
    }

    fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Walk `edges` breadth-first from `start`, honoring an optional depth limit.
    ///
    /// Returns every node reached, excluding `start`.
    fn closure<'a>(
        edges: &'a HashMap<String, HashSet<String>>,
        start: &str,
        max_depth: Option<usize>,
    ) -> HashSet<&'a str> {
        let mut visited: HashSet<&'a str> = HashSet::new();
        let mut queue: VecDeque<(&'a str, usize)> = VecDeque::new();

        if let Some((key, _)) = edges.get_key_value(start) {
            queue.push_back((key.as_str(), 0));
        }

        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|limit| depth >= limit) {
                continue;
            }

            let Some(next) = edges.get(node) else {
                continue;
            };

            for neighbor in next {
                if neighbor != start && visited.insert(neighbor.as_str()) {
                    queue.push_back((neighbor.as_str(), depth + 1));
                }
            }
        }

        visited
    }
}

fn prune(map: &mut HashMap<String, HashSet<String>>, key: &str) {
    if map.get(key).is_some_and(HashSet::is_empty) {
        map.remove(key);
    }
}

fn sorted(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut out: Vec<String> = names.into_iter().map(Into::into).collect();
    out.sort();
    out
}

/// Directed role graph for one grouping rule type
///
/// # Example
///
/// ```rust
/// use keystone_authz::rbac::RoleGraph;
///
/// let mut graph = RoleGraph::new("g");
/// graph.add_link("alice", "admin", None);
/// graph.add_link("admin", "staff", None);
///
/// assert!(graph.has_link("alice", "staff", None));
/// assert_eq!(graph.get_direct_parents("alice", None), vec!["admin".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct RoleGraph {
    /// Grouping rule type this graph mirrors (e.g. "g")
    name: String,

    /// Per-domain adjacency
    domains: HashMap<String, Adjacency>,

    /// Maximum number of edges a reachability query may follow
    max_hierarchy_level: Option<usize>,
}

impl RoleGraph {
    /// Create an empty, depth-unbounded graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domains: HashMap::new(),
            max_hierarchy_level: None,
        }
    }

    /// Limit how many edges reachability queries may follow
    pub fn with_max_hierarchy_level(mut self, level: Option<usize>) -> Self {
        self.max_hierarchy_level = level;
        self
    }

    /// Grouping rule type this graph mirrors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured depth limit
    pub fn max_hierarchy_level(&self) -> Option<usize> {
        self.max_hierarchy_level
    }

    /// Add the edge `child -> parent`.
    ///
    /// Returns `false` if the edge already existed.
    pub fn add_link(&mut self, child: &str, parent: &str, domain: Option<&str>) -> bool {
        self.domains
            .entry(domain_key(domain).to_string())
            .or_default()
            .insert(child, parent)
    }

    /// Remove the edge `child -> parent`.
    ///
    /// Returns `false` if the edge was absent.
    pub fn delete_link(&mut self, child: &str, parent: &str, domain: Option<&str>) -> bool {
        let key = domain_key(domain);
        let Some(adjacency) = self.domains.get_mut(key) else {
            return false;
        };

        let removed = adjacency.remove(child, parent);
        if adjacency.is_empty() {
            self.domains.remove(key);
        }
        removed
    }

    /// Whether `b` is reachable from `a` by following zero or more parent edges
    pub fn has_link(&self, a: &str, b: &str, domain: Option<&str>) -> bool {
        if a == b {
            return true;
        }

        let Some(adjacency) = self.domains.get(domain_key(domain)) else {
            return false;
        };

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        visited.insert(a);
        queue.push_back((a, 0));

        while let Some((node, depth)) = queue.pop_front() {
            if self.max_hierarchy_level.is_some_and(|limit| depth >= limit) {
                continue;
            }

            let Some(parents) = adjacency.parents.get(node) else {
                continue;
            };

            for parent in parents {
                if parent == b {
                    return true;
                }
                if visited.insert(parent.as_str()) {
                    queue.push_back((parent.as_str(), depth + 1));
                }
            }
        }

        false
    }

    /// Direct parents of `a` (one hop, no traversal)
    pub fn get_direct_parents(&self, a: &str, domain: Option<&str>) -> Vec<String> {
        self.domains
            .get(domain_key(domain))
            .and_then(|adj| adj.parents.get(a))
            .map(|set| sorted(set.iter().cloned()))
            .unwrap_or_default()
    }

    /// Direct children of `a` (one hop, no traversal)
    pub fn get_direct_children(&self, a: &str, domain: Option<&str>) -> Vec<String> {
        self.domains
            .get(domain_key(domain))
            .and_then(|adj| adj.children.get(a))
            .map(|set| sorted(set.iter().cloned()))
            .unwrap_or_default()
    }

    /// Every ancestor of `a`, never including `a` itself
    pub fn get_all_parents_transitive(&self, a: &str, domain: Option<&str>) -> Vec<String> {
        self.domains
            .get(domain_key(domain))
            .map(|adj| sorted(Adjacency::closure(&adj.parents, a, self.max_hierarchy_level)))
            .unwrap_or_default()
    }

    /// Every descendant of `a`, never including `a` itself
    pub fn get_all_children_transitive(&self, a: &str, domain: Option<&str>) -> Vec<String> {
        self.domains
            .get(domain_key(domain))
            .map(|adj| sorted(Adjacency::closure(&adj.children, a, self.max_hierarchy_level)))
            .unwrap_or_default()
    }

    /// Remove `a` and every edge touching it, in every domain.
    ///
    /// Returns `true` if any edge was dropped.
    pub fn delete_node(&mut self, a: &str) -> bool {
        let mut dropped = 0;
        for adjacency in self.domains.values_mut() {
            dropped += adjacency.remove_node(a);
        }
        self.domains.retain(|_, adj| !adj.is_empty());
        dropped > 0
    }

    /// Drop every edge
    pub fn clear(&mut self) {
        self.domains.clear();
    }

    /// Number of edges across all domains
    pub fn len(&self) -> usize {
        self.domains.values().map(Adjacency::edge_count).sum()
    }

    /// Whether the graph has no edges
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

fn domain_key(domain: Option<&str>) -> &str {
    domain.unwrap_or(DEFAULT_DOMAIN)
}
