//! Bounded multi-hop extraction of typed subgraphs from a snapshot.
//!
//! Extraction is a level-synchronous breadth-first search. Each level is
//! sorted by `(global index, node type position)` before the node cap is
//! applied, so the same query against the same snapshot always selects the
//! same nodes regardless of adjacency layout or thread scheduling.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    cache::{Adjacency, AdjacencyCache, Orientation},
    encoding::FeatureMatrix,
    errors::RelGraphError,
    graph::Graph,
    temporal::Timestamp,
};

/// Frontier nodes expanded between two cancellation checks.
const CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source to target only.
    Outgoing,
    /// Target to source only.
    Incoming,
    #[default]
    Both,
}

impl Direction {
    fn forward(self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }

    fn reverse(self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }
}

/// A seed identifier, optionally pinned to one node type.
///
/// An unqualified seed resolves in every node type that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedRef {
    #[serde(default)]
    pub node_type: Option<String>,
    pub identifier: String,
}

impl SeedRef {
    pub fn any(identifier: &str) -> Self {
        Self {
            node_type: None,
            identifier: identifier.to_string(),
        }
    }

    pub fn typed(node_type: &str, identifier: &str) -> Self {
        Self {
            node_type: Some(node_type.to_string()),
            identifier: identifier.to_string(),
        }
    }
}

impl From<&str> for SeedRef {
    fn from(identifier: &str) -> Self {
        SeedRef::any(identifier)
    }
}

impl From<String> for SeedRef {
    fn from(identifier: String) -> Self {
        Self {
            node_type: None,
            identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubgraphQuery {
    pub seeds: Vec<SeedRef>,
    pub hops: usize,
    pub cutoff: Option<Timestamp>,
    /// Edge type names or relation labels; `None` allows every edge type.
    pub edge_types: Option<Vec<String>>,
    pub max_nodes: Option<usize>,
    pub direction: Direction,
}

impl SubgraphQuery {
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SeedRef>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_hops(mut self, hops: usize) -> Self {
        self.hops = hops;
        self
    }

    pub fn with_cutoff(mut self, cutoff: Timestamp) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_edge_types(mut self, edge_types: &[&str]) -> Self {
        self.edge_types = Some(edge_types.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Shared flag that aborts in-flight extractions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub cancel: Option<CancelToken>,
    pub timeout: Option<Duration>,
}

impl ExtractOptions {
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Selected nodes of one type. Local index `i` is global index `global[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSlice {
    pub node_type: String,
    /// Ascending.
    pub global: Vec<usize>,
    pub identifiers: Vec<String>,
    /// Hops from the nearest seed.
    pub distances: Vec<usize>,
    pub features: FeatureMatrix,
}

impl NodeSlice {
    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    pub fn local(&self, global: usize) -> Option<usize> {
        self.global.binary_search(&global).ok()
    }
}

/// Selected edges of one type, endpoints in local node indices.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSlice {
    pub edge_type: String,
    pub relation: String,
    pub source_type: String,
    pub target_type: String,
    pub pairs: Vec<(usize, usize)>,
    /// Positions in the snapshot's edge index, ascending.
    pub global: Vec<usize>,
    pub features: FeatureMatrix,
}

impl EdgeSlice {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Self-contained result of one extraction; owns all of its data.
#[derive(Debug, Clone, PartialEq)]
pub struct Subgraph {
    pub snapshot_id: String,
    /// One slice per node type, in declaration order.
    pub nodes: Vec<NodeSlice>,
    /// One slice per edge type, in declaration order.
    pub edges: Vec<EdgeSlice>,
    pub truncated: bool,
    pub unresolved_seeds: Vec<SeedRef>,
}

impl Subgraph {
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(NodeSlice::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(EdgeSlice::len).sum()
    }

    pub fn node_slice(&self, node_type: &str) -> Option<&NodeSlice> {
        self.nodes.iter().find(|s| s.node_type == node_type)
    }

    pub fn edge_slice(&self, edge_type: &str) -> Option<&EdgeSlice> {
        self.edges.iter().find(|s| s.edge_type == edge_type)
    }

    pub fn contains(&self, node_type: &str, identifier: &str) -> bool {
        self.node_slice(node_type)
            .is_some_and(|s| s.identifiers.iter().any(|id| id == identifier))
    }
}

/// Extractor bound to one snapshot; reuses adjacency across queries.
#[derive(Debug)]
pub struct SubgraphExtractor {
    graph: Arc<Graph>,
    cache: AdjacencyCache,
}

impl SubgraphExtractor {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            cache: AdjacencyCache::new(),
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn cache(&self) -> &AdjacencyCache {
        &self.cache
    }

    pub fn extract(&self, query: &SubgraphQuery) -> Result<Subgraph, RelGraphError> {
        self.extract_with(query, &ExtractOptions::default())
    }

    pub fn extract_with(
        &self,
        query: &SubgraphQuery,
        options: &ExtractOptions,
    ) -> Result<Subgraph, RelGraphError> {
        run(&self.graph, &self.cache, query, options)
    }
}

/// One-off extraction without a persistent adjacency cache.
pub fn extract(graph: &Graph, query: &SubgraphQuery) -> Result<Subgraph, RelGraphError> {
    run(graph, &AdjacencyCache::new(), query, &ExtractOptions::default())
}

/// `N[type:id,...]|E[src->dst:type,...]` over raw identifiers. Pairs that
/// point outside their node slices are left out.
pub fn structural_signature(subgraph: &Subgraph) -> String {
    let node_str = subgraph
        .nodes
        .iter()
        .flat_map(|s| s.identifiers.iter().map(move |id| format!("{}:{id}", s.node_type)))
        .collect::<Vec<_>>()
        .join(",");
    let mut edges = Vec::new();
    for slice in &subgraph.edges {
        let (Some(src), Some(dst)) = (
            subgraph.node_slice(&slice.source_type),
            subgraph.node_slice(&slice.target_type),
        ) else {
            continue;
        };
        for &(s, t) in &slice.pairs {
            if let (Some(a), Some(b)) = (src.identifiers.get(s), dst.identifiers.get(t)) {
                edges.push(format!("{a}->{b}:{}", slice.edge_type));
            }
        }
    }
    format!("N[{node_str}]|E[{}]", edges.join(","))
}

struct Interrupt<'a> {
    cancel: Option<&'a CancelToken>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<'a> Interrupt<'a> {
    fn new(options: &'a ExtractOptions) -> Self {
        Self {
            cancel: options.cancel.as_ref(),
            timeout: options.timeout,
            deadline: options.timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    fn check(&self, hop: usize) -> Result<(), RelGraphError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            info!(hop, "subgraph extraction cancelled");
            return Err(RelGraphError::cancelled(format!(
                "extraction cancelled at hop {hop}"
            )));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            info!(hop, "subgraph extraction timed out");
            return Err(RelGraphError::timeout(format!(
                "extraction exceeded {:?} at hop {hop}",
                self.timeout.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Candidates are `(global index, node type position)`.
fn admit(
    level: &mut Vec<(usize, usize)>,
    selected: &mut [AHashMap<usize, usize>],
    count: &mut usize,
    distance: usize,
    cap: Option<usize>,
) -> bool {
    level.sort_unstable();
    level.dedup();
    let mut truncated = false;
    if let Some(cap) = cap {
        let room = cap.saturating_sub(*count);
        if level.len() > room {
            level.truncate(room);
            truncated = true;
        }
    }
    for &(n, t) in level.iter() {
        selected[t].insert(n, distance);
    }
    *count += level.len();
    truncated
}

fn adjacency(
    graph: &Graph,
    cache: &AdjacencyCache,
    edge_type: usize,
    orientation: Orientation,
    node_count: usize,
) -> Arc<Adjacency> {
    cache.get_or_build(edge_type, orientation, || {
        Adjacency::build(node_count, graph.edges[edge_type].index.pairs(), orientation)
    })
}

fn run(
    graph: &Graph,
    cache: &AdjacencyCache,
    query: &SubgraphQuery,
    options: &ExtractOptions,
) -> Result<Subgraph, RelGraphError> {
    if query.max_nodes == Some(0) {
        return Err(RelGraphError::invalid_input("max_nodes must be positive"));
    }
    let interrupt = Interrupt::new(options);
    interrupt.check(0)?;

    let schema = graph.schema();
    let node_types = schema.node_types();
    let edge_types = schema.edge_types();
    let cutoff = query.cutoff;
    let node_visible =
        |t: usize, n: usize| cutoff.is_none_or(|c| graph.nodes[t].temporal.is_visible(n, c));
    let edge_visible =
        |e: usize, pos: usize| cutoff.is_none_or(|c| graph.edges[e].temporal.is_visible(pos, c));

    // (edge type position, source type position, target type position)
    let allowed: Vec<(usize, usize, usize)> = edge_types
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            query
                .edge_types
                .as_ref()
                .is_none_or(|list| list.iter().any(|name| e.matches(name)))
        })
        .filter_map(|(pos, e)| {
            Some((
                pos,
                schema.node_position(&e.source_type)?,
                schema.node_position(&e.target_type)?,
            ))
        })
        .collect();

    let mut unresolved = Vec::new();
    let mut frontier = Vec::new();
    for seed in &query.seeds {
        let mut hit = false;
        for (t, node_type) in node_types.iter().enumerate() {
            if seed.node_type.as_deref().is_some_and(|want| want != node_type.name) {
                continue;
            }
            if let Some(n) = graph.nodes[t].index.get(&seed.identifier) {
                if node_visible(t, n) {
                    frontier.push((n, t));
                    hit = true;
                }
            }
        }
        if !hit {
            unresolved.push(seed.clone());
        }
    }
    if frontier.is_empty() {
        return Err(RelGraphError::empty_seed(format!(
            "none of {} seed(s) resolved to a visible node",
            query.seeds.len()
        )));
    }

    let forward: Vec<Option<Arc<Adjacency>>> = allowed
        .iter()
        .map(|&(e, src, _)| {
            (query.direction.forward() && query.hops > 0)
                .then(|| adjacency(graph, cache, e, Orientation::Forward, graph.nodes[src].len()))
        })
        .collect();
    let reverse: Vec<Option<Arc<Adjacency>>> = allowed
        .iter()
        .map(|&(e, _, dst)| {
            (query.direction.reverse() && query.hops > 0)
                .then(|| adjacency(graph, cache, e, Orientation::Reverse, graph.nodes[dst].len()))
        })
        .collect();

    let mut selected: Vec<AHashMap<usize, usize>> = vec![AHashMap::new(); node_types.len()];
    let mut count = 0usize;
    let mut truncated = admit(&mut frontier, &mut selected, &mut count, 0, query.max_nodes);

    let mut hop = 0;
    while hop < query.hops && !truncated && !frontier.is_empty() {
        hop += 1;
        let mut next = Vec::new();
        for (i, &(n, t)) in frontier.iter().enumerate() {
            if i % CHECK_INTERVAL == 0 {
                interrupt.check(hop)?;
            }
            for (k, &(e, src, dst)) in allowed.iter().enumerate() {
                if src == t {
                    if let Some(adj) = &forward[k] {
                        for &(m, pos) in adj.neighbors(n) {
                            if edge_visible(e, pos)
                                && node_visible(dst, m)
                                && !selected[dst].contains_key(&m)
                            {
                                next.push((m, dst));
                            }
                        }
                    }
                }
                if dst == t {
                    if let Some(adj) = &reverse[k] {
                        for &(m, pos) in adj.neighbors(n) {
                            if edge_visible(e, pos)
                                && node_visible(src, m)
                                && !selected[src].contains_key(&m)
                            {
                                next.push((m, src));
                            }
                        }
                    }
                }
            }
        }
        truncated = admit(&mut next, &mut selected, &mut count, hop, query.max_nodes);
        frontier = next;
    }
    if truncated {
        info!(hop, max_nodes = ?query.max_nodes, "subgraph truncated by node cap");
    }
    interrupt.check(hop)?;

    let nodes: Vec<NodeSlice> = node_types
        .iter()
        .enumerate()
        .map(|(t, node_type)| {
            let table = &graph.nodes[t];
            let mut global: Vec<usize> = selected[t].keys().copied().collect();
            global.sort_unstable();
            NodeSlice {
                node_type: node_type.name.clone(),
                identifiers: global
                    .iter()
                    .map(|&g| table.index.identifier(g).unwrap_or_default().to_string())
                    .collect(),
                distances: global
                    .iter()
                    .map(|g| selected[t].get(g).copied().unwrap_or_default())
                    .collect(),
                features: table.features.select_rows(&global),
                global,
            }
        })
        .collect();

    let mut edges = Vec::with_capacity(edge_types.len());
    for (e, edge_type) in edge_types.iter().enumerate() {
        let table = &graph.edges[e];
        let mut positions = Vec::new();
        let mut pairs = Vec::new();
        if let Some(&(_, src, dst)) = allowed.iter().find(|(pos, _, _)| *pos == e) {
            interrupt.check(hop)?;
            let adj = adjacency(graph, cache, e, Orientation::Forward, graph.nodes[src].len());
            for &s in &nodes[src].global {
                for &(t, pos) in adj.neighbors(s) {
                    if selected[dst].contains_key(&t) && edge_visible(e, pos) {
                        positions.push(pos);
                    }
                }
            }
            positions.sort_unstable();
            pairs = positions
                .iter()
                .filter_map(|&pos| {
                    let (s, t) = table.index.pair(pos)?;
                    Some((nodes[src].local(s)?, nodes[dst].local(t)?))
                })
                .collect();
        }
        edges.push(EdgeSlice {
            edge_type: edge_type.name.clone(),
            relation: edge_type.relation.clone(),
            source_type: edge_type.source_type.clone(),
            target_type: edge_type.target_type.clone(),
            pairs,
            features: table.features.select_rows(&positions),
            global: positions,
        });
    }

    let subgraph = Subgraph {
        snapshot_id: graph.snapshot_id().to_string(),
        nodes,
        edges,
        truncated,
        unresolved_seeds: unresolved,
    };
    debug!(
        nodes = subgraph.node_count(),
        edges = subgraph.edge_count(),
        hops = hop,
        truncated,
        "extracted subgraph"
    );
    Ok(subgraph)
}
