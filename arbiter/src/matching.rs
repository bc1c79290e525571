//! Maximum-cardinality matching on dense non-directed graphs (blossom
//! algorithm, <https://en.wikipedia.org/wiki/Blossom_algorithm>).
//!
//! The Swiss schedule uses this to check whether a round is pairable: given
//! the forbidden pairings, does a perfect matching of the unpaired players
//! still exist?

use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub type Vertex = i32;

/// An undirected edge, normalized so that `v0 < v1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub v0: Vertex,
    pub v1: Vertex,
}

impl Edge {
    pub fn new(v0: Vertex, v1: Vertex) -> Edge {
        Edge {
            v0: v0.min(v1),
            v1: v0.max(v1),
        }
    }
}

/// Adjacency-bitmap graph over a fixed vertex count.
#[derive(Clone)]
pub struct DenseGraph {
    connections: Vec<bool>,
    vertices: usize,
}

impl DenseGraph {
    pub fn new(num_vertices: usize) -> DenseGraph {
        DenseGraph {
            connections: vec![false; num_vertices * num_vertices],
            vertices: num_vertices,
        }
    }

    pub fn contains_edge(&self, v0: Vertex, v1: Vertex) -> bool {
        let (v0, v1) = (v0.min(v1) as usize, v0.max(v1) as usize);
        self.connections[v0 * self.vertices + v1]
    }

    pub fn insert_edge(&mut self, v0: Vertex, v1: Vertex) {
        let (v0, v1) = (v0.min(v1) as usize, v0.max(v1) as usize);
        self.connections[v0 * self.vertices + v1] = true;
    }

    pub fn remove_edge(&mut self, v0: Vertex, v1: Vertex) {
        let (v0, v1) = (v0.min(v1) as usize, v0.max(v1) as usize);
        self.connections[v0 * self.vertices + v1] = false;
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices
    }

    pub fn num_edges(&self) -> usize {
        let mut ret = 0;
        for i in 0..self.vertices {
            for j in (i + 1)..self.vertices {
                ret += usize::from(self.connections[i * self.vertices + j]);
            }
        }
        ret
    }
}

type Path = Vec<Vertex>;
// bidirectional: v0 -> v1 and v1 -> v0
type MatchEdgeMap = BTreeMap<Vertex, Vertex>;

#[derive(Clone, Copy)]
struct ForestNode {
    parent: Vertex,        // -1 for roots
    distance_to_root: i32, // -1 while not in the forest
}

impl Default for ForestNode {
    fn default() -> ForestNode {
        ForestNode {
            parent: -1,
            distance_to_root: -1,
        }
    }
}

/// Returns a maximum set of vertex-disjoint edges of `graph`.
pub fn maximum_matching(graph: &DenseGraph) -> Vec<Edge> {
    let mut matching = MatchEdgeMap::new();

    // initial matching: everything that can be added trivially
    for i in 0..graph.num_vertices() as Vertex {
        if matching.contains_key(&i) {
            continue;
        }
        for j in (i + 1)..graph.num_vertices() as Vertex {
            if matching.contains_key(&j) {
                continue;
            }
            if graph.contains_edge(i, j) {
                matching.insert(i, j);
                matching.insert(j, i);
                break;
            }
        }
    }

    loop {
        let p = find_augmenting_path(graph, &matching);
        if p.is_empty() {
            break;
        }

        debug_assert!(p.len() % 2 == 0);
        debug_assert!(!matching.contains_key(&p[0]));
        debug_assert!(!matching.contains_key(p.last().unwrap()));

        // flip matched/unmatched along the path
        let mut insert_mode = true;
        for i in 0..p.len() - 1 {
            if insert_mode {
                matching.insert(p[i], p[i + 1]);
                matching.insert(p[i + 1], p[i]);
            }
            insert_mode = !insert_mode;
        }
    }

    let mut ret = Vec::with_capacity(graph.num_vertices() / 2);
    for (&v0, &v1) in &matching {
        if v0 < v1 {
            ret.push(Edge::new(v0, v1));
        }
    }
    ret
}

fn add_exposed_vertices_as_forest_roots(
    graph: &DenseGraph,
    matching: &MatchEdgeMap,
    forest: &mut [ForestNode],
    unmarked: &mut VecDeque<Vertex>,
) {
    for v in 0..graph.num_vertices() as Vertex {
        if !matching.contains_key(&v) {
            forest[v as usize] = ForestNode {
                parent: -1,
                distance_to_root: 0,
            };
            unmarked.push_back(v);
        }
    }
}

fn forest_root(forest: &[ForestNode], mut x: Vertex) -> Vertex {
    loop {
        let fx = &forest[x as usize];
        if fx.parent == -1 {
            return x;
        }
        x = fx.parent;
    }
}

fn closest_shared_parent(forest: &[ForestNode], mut x: Vertex, mut y: Vertex) -> Vertex {
    loop {
        if x == y {
            return x;
        }
        let fx = &forest[x as usize];
        let fy = &forest[y as usize];
        if fx.distance_to_root >= fy.distance_to_root {
            x = fx.parent;
        } else {
            y = fy.parent;
        }
    }
}

// contract the blossom into its root vertex, in both the graph and the
// matching
fn contract_graph(
    g: &mut DenseGraph,
    m: &mut MatchEdgeMap,
    blossom_nodes: &BTreeSet<Vertex>,
    blossom_id: Vertex,
) {
    let n = g.num_vertices() as Vertex;
    for v0 in 0..n {
        let v0_in = blossom_nodes.contains(&v0);
        for v1 in (v0 + 1)..n {
            if !g.contains_edge(v0, v1) {
                continue;
            }
            let v1_in = blossom_nodes.contains(&v1);
            if v0_in || v1_in {
                g.remove_edge(v0, v1);
                if !v1_in {
                    g.insert_edge(blossom_id, v1);
                }
                if !v0_in {
                    g.insert_edge(v0, blossom_id);
                }
            }
        }
    }

    for &v in blossom_nodes {
        if v != blossom_id {
            m.remove(&v); // keep only the root's match
        }
    }
}

// lift an augmenting path of the contracted graph back into the original
// graph, choosing the parity-correct traversal around the blossom
fn lift_path(
    contracted_path: &Path,
    blossom_id: Vertex,
    v_id: Vertex,
    w_id: Vertex,
    graph: &DenseGraph,
    forest: &[ForestNode],
) -> Path {
    let mut lifted = Path::new();
    debug_assert!(contracted_path.len() % 2 == 0);

    for (i, &x_id) in contracted_path.iter().enumerate() {
        if x_id != blossom_id {
            lifted.push(x_id);
            continue;
        }

        // unroll the blossom: root first, then the v-branch, then the
        // w-branch reversed
        let b_dist = forest[blossom_id as usize].distance_to_root;
        let v_dist = forest[v_id as usize].distance_to_root;
        let w_dist = forest[w_id as usize].distance_to_root;

        let len = (v_dist + w_dist - 2 * b_dist + 1) as usize;
        let mut blossom_path = vec![0 as Vertex; len];
        blossom_path[0] = blossom_id;

        let mut d = (v_dist - b_dist) as usize;
        let mut y = v_id;
        while y != blossom_id {
            blossom_path[d] = y;
            d -= 1;
            y = forest[y as usize].parent;
        }

        let mut d = (v_dist - b_dist + 1) as usize;
        let mut y = w_id;
        while y != blossom_id {
            blossom_path[d] = y;
            d += 1;
            y = forest[y as usize].parent;
        }

        let prev: Vertex = if i > 0 { contracted_path[i - 1] } else { -1 };
        let next: Vertex = if i + 1 < contracted_path.len() {
            contracted_path[i + 1]
        } else {
            -1
        };

        let mut from_index = blossom_path.len();
        let mut to_index = blossom_path.len();
        let mut max_path_len = 0usize;

        // find the longest traversal through the blossom that keeps both
        // endpoints connected and enters/exits with the right parity
        for k in 0..blossom_path.len() {
            let path_len = 1 + if k % 2 == 0 { k } else { blossom_path.len() - k };
            debug_assert!(path_len % 2 == 1);
            if path_len <= max_path_len {
                continue;
            }

            if prev != -1 && next != -1 {
                if i % 2 == 0 {
                    // root must connect to the previous vertex
                    let prev_connected = graph.contains_edge(prev, blossom_path[0]);
                    let next_connected = graph.contains_edge(next, blossom_path[k]);
                    if !next_connected || !prev_connected {
                        continue;
                    }
                    from_index = 0;
                    to_index = k;
                } else {
                    if !graph.contains_edge(prev, blossom_path[k]) {
                        continue;
                    }
                    if !graph.contains_edge(next, blossom_path[0]) {
                        continue;
                    }
                    from_index = k;
                    to_index = 0;
                }
            } else if prev == -1 {
                if graph.contains_edge(blossom_path[k], next) {
                    from_index = 0;
                    to_index = k;
                } else {
                    continue;
                }
            } else {
                debug_assert!(next == -1);
                if graph.contains_edge(blossom_path[k], prev) {
                    from_index = k;
                    to_index = 0;
                } else {
                    continue;
                }
            }
            max_path_len = path_len;
        }

        // extract the chosen traversal; the root is always included
        if from_index == 0 {
            lifted.push(blossom_path[0]);
            if to_index % 2 == 0 {
                for j in 1..=to_index {
                    lifted.push(blossom_path[j]);
                }
            } else {
                let mut j = blossom_path.len() - 1;
                while j >= to_index {
                    lifted.push(blossom_path[j]);
                    if j == to_index {
                        break;
                    }
                    j -= 1;
                }
            }
        } else {
            debug_assert!(to_index == 0);
            if from_index % 2 == 0 {
                let mut j = from_index;
                while j > 0 {
                    lifted.push(blossom_path[j]);
                    j -= 1;
                }
            } else {
                for j in from_index..blossom_path.len() {
                    lifted.push(blossom_path[j]);
                }
            }
            lifted.push(blossom_path[0]);
        }
    }

    if !lifted.is_empty() {
        for i in 1..lifted.len() {
            debug_assert!(graph.contains_edge(lifted[i - 1], lifted[i]));
        }
    }

    lifted
}

fn find_augmenting_path(graph: &DenseGraph, matching: &MatchEdgeMap) -> Path {
    let mut forest = vec![ForestNode::default(); graph.num_vertices()];
    let mut unmarked = VecDeque::new(); // forest vertices at even distance
    let mut unmarked_edges = graph.clone();

    add_exposed_vertices_as_forest_roots(graph, matching, &mut forest, &mut unmarked);
    for (&v0, &v1) in matching {
        if v0 < v1 {
            unmarked_edges.remove_edge(v0, v1);
        }
    }

    while let Some(v_id) = unmarked.pop_front() {
        for w_id in 0..graph.num_vertices() as Vertex {
            if !unmarked_edges.contains_edge(v_id, w_id) {
                continue;
            }
            let v_dist = forest[v_id as usize].distance_to_root;
            let w_dist = forest[w_id as usize].distance_to_root;

            if w_dist < 0 {
                // w is matched but not yet in the forest; pull in w and its
                // partner
                let x_id = matching[&w_id];
                forest[w_id as usize] = ForestNode {
                    parent: v_id,
                    distance_to_root: v_dist + 1,
                };
                forest[x_id as usize] = ForestNode {
                    parent: w_id,
                    distance_to_root: v_dist + 2,
                };
                unmarked.push_back(x_id);
            } else if w_dist % 2 == 0 {
                let root_v = forest_root(&forest, v_id);
                let root_w = forest_root(&forest, w_id);

                if root_v != root_w {
                    // augmenting path root(v) -> v -> w -> root(w)
                    let mut p = vec![0 as Vertex; (v_dist + w_dist + 2) as usize];
                    let mut x_id = v_id;
                    for i in 0..=v_dist {
                        p[(v_dist - i) as usize] = x_id;
                        x_id = forest[x_id as usize].parent;
                    }
                    let mut x_id = w_id;
                    for i in 0..=w_dist {
                        p[(v_dist + 1 + i) as usize] = x_id;
                        x_id = forest[x_id as usize].parent;
                    }
                    return p;
                }

                // blossom detected: v -> p -> w -> v (v or w may equal p)
                let p_id = closest_shared_parent(&forest, v_id, w_id);
                let mut blossom_nodes = BTreeSet::new();
                blossom_nodes.insert(p_id);
                let mut x_id = v_id;
                while x_id != p_id {
                    blossom_nodes.insert(x_id);
                    x_id = forest[x_id as usize].parent;
                }
                let mut x_id = w_id;
                while x_id != p_id {
                    blossom_nodes.insert(x_id);
                    x_id = forest[x_id as usize].parent;
                }

                let mut contracted_graph = graph.clone();
                let mut contracted_matching = matching.clone();
                contract_graph(
                    &mut contracted_graph,
                    &mut contracted_matching,
                    &blossom_nodes,
                    p_id,
                );

                let path = find_augmenting_path(&contracted_graph, &contracted_matching);
                return lift_path(&path, p_id, v_id, w_id, graph, &forest);
            }

            unmarked_edges.remove_edge(v_id, w_id);
        }
    }

    Path::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn check_match(g: &DenseGraph, matching: &[Edge]) {
        // the match must be a subset of the graph
        for e in matching {
            assert!(g.contains_edge(e.v0, e.v1));
        }
        // and its edges must be vertex-disjoint
        let mut seen = vec![false; g.num_vertices()];
        for e in matching {
            assert!(!seen[e.v0 as usize]);
            seen[e.v0 as usize] = true;
            assert!(!seen[e.v1 as usize]);
            seen[e.v1 as usize] = true;
        }
    }

    // brute force over all subsets of the edge list
    fn true_maximum(g: &DenseGraph) -> usize {
        let mut edges = Vec::new();
        for i in 0..g.num_vertices() as Vertex {
            for j in (i + 1)..g.num_vertices() as Vertex {
                if g.contains_edge(i, j) {
                    edges.push((i, j));
                }
            }
        }
        let mut best = 0;
        let m = edges.len();
        assert!(m <= 15, "graph too large for brute force");
        for mask in 0u32..(1 << m) {
            let mut seen = 0u64;
            let mut count = 0;
            let mut ok = true;
            for (k, &(a, b)) in edges.iter().enumerate() {
                if mask & (1 << k) == 0 {
                    continue;
                }
                let bits = (1u64 << a) | (1u64 << b);
                if seen & bits != 0 {
                    ok = false;
                    break;
                }
                seen |= bits;
                count += 1;
            }
            if ok && count > best {
                best = count;
            }
        }
        best
    }

    #[test]
    fn trivial_pairing() {
        // disjoint vertex pairs must all be found, in any vertex order
        let mut rng = SmallRng::seed_from_u64(7);
        let num_vertices = 20;
        let mut perm: Vec<Vertex> = (0..num_vertices as Vertex).collect();

        for matches in 0..=(num_vertices / 2) {
            for _ in 0..10 {
                perm.shuffle(&mut rng);
                let mut g = DenseGraph::new(num_vertices);
                for i in 0..matches {
                    g.insert_edge(perm[i * 2], perm[i * 2 + 1]);
                }
                let found = maximum_matching(&g);
                assert_eq!(found.len(), matches);
                check_match(&g, &found);
                for i in 0..matches {
                    let expected = Edge::new(perm[i * 2], perm[i * 2 + 1]);
                    assert!(found.contains(&expected));
                }
            }
        }
    }

    #[test]
    fn pairing_stars() {
        // connect every otherwise-isolated vertex to all paired vertices;
        // this adds no new matches beyond min(V/2, 2k)
        let num_vertices = 12;
        for pairs in 1..=3usize {
            let mut g = DenseGraph::new(num_vertices);
            for i in 0..pairs {
                g.insert_edge((i * 2) as Vertex, (i * 2 + 1) as Vertex);
            }
            for v in (pairs * 2)..num_vertices {
                for p in 0..(pairs * 2) {
                    g.insert_edge(v as Vertex, p as Vertex);
                }
            }
            let found = maximum_matching(&g);
            check_match(&g, &found);
            assert_eq!(found.len(), (num_vertices / 2).min(2 * pairs));
        }
    }

    #[test]
    fn two_disjoint_five_cycles() {
        let mut g = DenseGraph::new(10);
        for &(a, b) in &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)] {
            g.insert_edge(a, b);
        }
        for &(a, b) in &[(5, 6), (6, 7), (7, 8), (8, 9), (9, 5)] {
            g.insert_edge(a, b);
        }
        let found = maximum_matching(&g);
        check_match(&g, &found);
        assert_eq!(found.len(), 4);

        // bridging the cycles allows a perfect matching
        g.insert_edge(1, 9);
        let found = maximum_matching(&g);
        check_match(&g, &found);
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn isolated_vertices_do_not_count() {
        let mut g = DenseGraph::new(9);
        g.insert_edge(0, 1);
        g.insert_edge(2, 3);
        g.insert_edge(4, 5);
        let found = maximum_matching(&g);
        check_match(&g, &found);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn triangle_with_tail() {
        // forces a blossom contraction
        let mut g = DenseGraph::new(4);
        g.insert_edge(0, 1);
        g.insert_edge(1, 2);
        g.insert_edge(2, 0);
        g.insert_edge(2, 3);
        let found = maximum_matching(&g);
        check_match(&g, &found);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn random_graphs_match_brute_force() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let n = rng.gen_range(2..7);
            let mut g = DenseGraph::new(n);
            let mut edges = 0;
            for i in 0..n as Vertex {
                for j in (i + 1)..n as Vertex {
                    if edges < 15 && rng.gen_bool(0.4) {
                        g.insert_edge(i, j);
                        edges += 1;
                    }
                }
            }
            let found = maximum_matching(&g);
            check_match(&g, &found);
            assert_eq!(found.len(), true_maximum(&g));
        }
    }
}
