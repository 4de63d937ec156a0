//! Static k-d tree for exact k-nearest-neighbour search.
//!
//! The tree owns its points and is immutable once built. Nodes live in a
//! flat arena in preorder, which is also the order they are written by
//! [`KdTree::write_to`], so a dump/load cycle reproduces the identical tree.
//!
//! # Dump Format
//!
//! ```text
//! kdtree <bucket_size>
//! points <dim> <n>
//! <x0> <x1> ...            (n lines)
//! nodes <count>
//! split <cut_dim> <cut_val>    (followed by left subtree, then right subtree)
//! leaf <m> <i0> <i1> ...
//! ```

use crate::embedding::PointCloud;
use crate::error::{Result, TdeError};
use crate::math::format::{format_float, format_row, Tokens};

/// Default number of points stored per leaf.
pub const DEFAULT_BUCKET_SIZE: usize = 1;

/// One result slot of a k-NN query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Row index of the point in the tree's cloud.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub dist_sq: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        indices: Vec<usize>,
    },
    Split {
        cut_dim: usize,
        cut_val: f64,
        left: usize,
        right: usize,
    },
}

/// Exact k-d tree over a [`PointCloud`].
#[derive(Debug, Clone, PartialEq)]
pub struct KdTree {
    points: PointCloud,
    nodes: Vec<Node>,
    bucket_size: usize,
}

impl KdTree {
    /// Build a tree with [`DEFAULT_BUCKET_SIZE`].
    #[must_use]
    pub fn build(points: PointCloud) -> Self {
        Self::with_bucket_size(points, DEFAULT_BUCKET_SIZE)
    }

    /// Build a tree holding at most `bucket_size` points per leaf.
    ///
    /// Each split cuts the dimension of largest spread at the median point,
    /// giving an `O(n log n)` build.
    #[must_use]
    pub fn with_bucket_size(points: PointCloud, bucket_size: usize) -> Self {
        let bucket_size = bucket_size.max(1);
        let mut indices: Vec<usize> = (0..points.rows()).collect();
        let mut nodes = Vec::with_capacity(2 * points.rows() / bucket_size + 1);
        build_node(&points, &mut indices, bucket_size, &mut nodes);
        Self {
            points,
            nodes,
            bucket_size,
        }
    }

    /// Number of stored points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.rows()
    }

    /// Whether the tree stores no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point width.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.points.cols()
    }

    /// Maximum points per leaf.
    #[must_use]
    pub const fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Stored points, in insertion order.
    #[must_use]
    pub const fn points(&self) -> &PointCloud {
        &self.points
    }

    /// The `k` nearest points to `query`, ascending by distance.
    ///
    /// Ties are broken by insertion index. When the tree holds fewer than
    /// `k` points the trailing slots are `None`; consumers must stop at the
    /// first `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` has the wrong width.
    pub fn query(&self, query: &[f64], k: usize) -> Result<Vec<Option<Neighbour>>> {
        let mut out = Vec::with_capacity(k);
        self.query_into(query, k, &mut out)?;
        Ok(out)
    }

    /// [`query`](Self::query) writing into a reusable buffer.
    ///
    /// `out` is cleared and left with exactly `k` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` has the wrong width.
    pub fn query_into(
        &self,
        query: &[f64],
        k: usize,
        out: &mut Vec<Option<Neighbour>>,
    ) -> Result<()> {
        if query.len() != self.dim() {
            return Err(TdeError::dimension_mismatch(self.dim(), query.len()));
        }
        let mut best: Vec<Neighbour> = Vec::with_capacity(k + 1);
        if k > 0 && !self.nodes.is_empty() {
            self.search(0, query, k, &mut best);
        }
        out.clear();
        out.extend(best.into_iter().map(Some));
        out.resize(k, None);
        Ok(())
    }

    fn search(&self, node: usize, query: &[f64], k: usize, best: &mut Vec<Neighbour>) {
        match &self.nodes[node] {
            Node::Leaf { indices } => {
                for &index in indices {
                    let dist_sq = squared_distance(query, self.points.row(index));
                    offer(best, k, Neighbour { index, dist_sq });
                }
            }
            Node::Split {
                cut_dim,
                cut_val,
                left,
                right,
            } => {
                let diff = query[*cut_dim] - cut_val;
                let (near, far) = if diff < 0.0 {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                self.search(near, query, k, best);
                // <= keeps equal-distance points with lower indices reachable
                let bound = diff * diff;
                if best.len() < k || best.last().is_some_and(|w| bound <= w.dist_sq) {
                    self.search(far, query, k, best);
                }
            }
        }
    }

    /// Write the tree in its text dump format.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn write_to<W: std::fmt::Write>(&self, out: &mut W) -> std::fmt::Result {
        writeln!(out, "kdtree {}", self.bucket_size)?;
        writeln!(out, "points {} {}", self.dim(), self.len())?;
        for row in self.points.iter_rows() {
            writeln!(out, "{}", format_row(row, ' '))?;
        }
        writeln!(out, "nodes {}", self.nodes.len())?;
        for node in &self.nodes {
            match node {
                Node::Leaf { indices } => {
                    write!(out, "leaf {}", indices.len())?;
                    for i in indices {
                        write!(out, " {i}")?;
                    }
                    writeln!(out)?;
                }
                Node::Split {
                    cut_dim, cut_val, ..
                } => {
                    writeln!(out, "split {cut_dim} {}", format_float(*cut_val))?;
                }
            }
        }
        Ok(())
    }

    /// Render the dump format into a new string.
    #[must_use]
    pub fn to_dump_string(&self) -> String {
        let mut out = String::new();
        let _ = self.write_to(&mut out);
        out
    }

    /// Read a tree from its dump format.
    ///
    /// # Errors
    ///
    /// Returns [`TdeError::CorruptModel`] on short input, malformed tokens,
    /// out-of-range indices, oversized counts, a tree deeper than any median
    /// split produces, or a node layout that does not cover every point
    /// exactly once.
    pub fn read_from(tokens: &mut Tokens<'_>) -> Result<Self> {
        tokens.expect("kdtree")?;
        let bucket_size = tokens.next_usize("bucket size")?;
        if bucket_size == 0 {
            return Err(TdeError::corrupt_model("bucket size must be positive"));
        }
        tokens.expect("points")?;
        let dim = tokens.next_usize("point dimension")?;
        if dim == 0 {
            return Err(TdeError::corrupt_model("point dimension must be positive"));
        }
        let n = tokens.next_usize("point count")?;
        let total = dim
            .checked_mul(n)
            .ok_or_else(|| TdeError::corrupt_model(format!("{n} points of width {dim} overflow")))?;
        let data = tokens.next_floats(total, "point coordinate")?;
        let points = PointCloud::new(n, dim, data)?;

        tokens.expect("nodes")?;
        let count = tokens.next_usize("node count")?;
        // Every leaf of a built tree holds at least one point
        if count > 2 * n.max(1) {
            return Err(TdeError::corrupt_model(format!(
                "{count} nodes declared for {n} points"
            )));
        }
        let mut seen = vec![false; n];
        let nodes = if count > 0 {
            read_nodes(tokens, count, dim, &mut seen)?
        } else {
            Vec::new()
        };
        if nodes.len() != count {
            return Err(TdeError::corrupt_model(format!(
                "declared {count} nodes, found {}",
                nodes.len()
            )));
        }
        if seen.iter().any(|s| !s) {
            return Err(TdeError::corrupt_model("tree does not reference every point"));
        }

        Ok(Self {
            points,
            nodes,
            bucket_size,
        })
    }
}

/// Squared Euclidean distance between two equally sized points.
#[must_use]
#[inline]
pub fn squared_distance(p: &[f64], q: &[f64]) -> f64 {
    p.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Insert a candidate into the sorted best list, keeping at most `k`.
fn offer(best: &mut Vec<Neighbour>, k: usize, cand: Neighbour) {
    let before = |n: &Neighbour| {
        n.dist_sq < cand.dist_sq || (n.dist_sq == cand.dist_sq && n.index < cand.index)
    };
    if best.len() == k && best.last().is_some_and(|w| !before(w)) {
        return;
    }
    let pos = best.iter().take_while(|&n| before(n)).count();
    best.insert(pos, cand);
    best.truncate(k);
}

fn build_node(
    points: &PointCloud,
    indices: &mut [usize],
    bucket_size: usize,
    nodes: &mut Vec<Node>,
) -> usize {
    let id = nodes.len();
    if indices.len() <= bucket_size || points.cols() == 0 {
        nodes.push(Node::Leaf {
            indices: indices.to_vec(),
        });
        return id;
    }

    let cut_dim = widest_dimension(points, indices);
    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        points.row(a)[cut_dim]
            .total_cmp(&points.row(b)[cut_dim])
            .then(a.cmp(&b))
    });
    let cut_val = points.row(indices[mid])[cut_dim];

    nodes.push(Node::Split {
        cut_dim,
        cut_val,
        left: 0,
        right: 0,
    });
    let (lo, hi) = indices.split_at_mut(mid);
    let left = build_node(points, lo, bucket_size, nodes);
    let right = build_node(points, hi, bucket_size, nodes);
    if let Node::Split {
        left: l, right: r, ..
    } = &mut nodes[id]
    {
        *l = left;
        *r = right;
    }
    id
}

fn widest_dimension(points: &PointCloud, indices: &[usize]) -> usize {
    let mut best_dim = 0;
    let mut best_spread = f64::NEG_INFINITY;
    for d in 0..points.cols() {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = points.row(i)[d];
            (lo.min(v), hi.max(v))
        });
        if hi - lo > best_spread {
            best_spread = hi - lo;
            best_dim = d;
        }
    }
    best_dim
}

/// Deepest tree accepted from a dump holding `n` points.
///
/// Median splits give a depth of at most `log2(n) + 1`.
fn max_depth(n: usize) -> usize {
    2 * (usize::BITS - n.leading_zeros()) as usize + 2
}

/// Read a preorder node sequence, linking children as they arrive.
fn read_nodes(
    tokens: &mut Tokens<'_>,
    count: usize,
    dim: usize,
    seen: &mut [bool],
) -> Result<Vec<Node>> {
    let limit = max_depth(seen.len());
    let mut nodes: Vec<Node> = Vec::with_capacity(count);
    // Splits still waiting for their right child, with their depth
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut prev_depth = 0;

    loop {
        let id = nodes.len();
        if id >= count {
            return Err(TdeError::corrupt_model("more nodes than declared"));
        }
        let depth = if id == 0 {
            0
        } else if matches!(nodes[id - 1], Node::Split { .. }) {
            link(&mut nodes, id - 1, id, false);
            open.push((id - 1, prev_depth));
            prev_depth + 1
        } else {
            let (parent, parent_depth) = open.pop().ok_or_else(|| {
                TdeError::corrupt_model(format!("node {id} lies outside the tree"))
            })?;
            link(&mut nodes, parent, id, true);
            parent_depth + 1
        };
        if depth > limit {
            return Err(TdeError::corrupt_model(format!(
                "tree depth exceeds {limit}"
            )));
        }

        let node = read_node(tokens, dim, seen)?;
        let complete = matches!(node, Node::Leaf { .. }) && open.is_empty();
        nodes.push(node);
        prev_depth = depth;
        if complete {
            return Ok(nodes);
        }
    }
}

fn link(nodes: &mut [Node], parent: usize, child: usize, right_child: bool) {
    if let Node::Split { left, right, .. } = &mut nodes[parent] {
        if right_child {
            *right = child;
        } else {
            *left = child;
        }
    }
}

fn read_node(tokens: &mut Tokens<'_>, dim: usize, seen: &mut [bool]) -> Result<Node> {
    match tokens.next_token("node kind")? {
        "leaf" => {
            let m = tokens.next_usize("leaf size")?;
            if m > seen.len() {
                return Err(TdeError::corrupt_model(format!(
                    "leaf of {m} points exceeds point count {}",
                    seen.len()
                )));
            }
            let mut indices = Vec::with_capacity(m);
            for _ in 0..m {
                let i = tokens.next_usize("leaf index")?;
                match seen.get_mut(i) {
                    Some(s) if !*s => *s = true,
                    Some(_) => {
                        return Err(TdeError::corrupt_model(format!(
                            "point {i} referenced twice"
                        )))
                    }
                    None => {
                        return Err(TdeError::corrupt_model(format!(
                            "leaf index {i} out of range"
                        )))
                    }
                }
                indices.push(i);
            }
            Ok(Node::Leaf { indices })
        }
        "split" => {
            let cut_dim = tokens.next_usize("cut dimension")?;
            if cut_dim >= dim {
                return Err(TdeError::corrupt_model(format!(
                    "cut dimension {cut_dim} exceeds point dimension {dim}"
                )));
            }
            let cut_val = tokens.next_f64("cut value")?;
            Ok(Node::Split {
                cut_dim,
                cut_val,
                left: 0,
                right: 0,
            })
        }
        other => Err(TdeError::corrupt_model(format!(
            "unknown node kind {other:?}"
        ))),
    }
}
