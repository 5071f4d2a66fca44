//! Reproducible random graph instances and their split between the two parties.
//!
//! An instance is generated in full by both parties from the same seed key and then shuffled, so
//! each party can take its half without any coordination: party 0 receives the first `⌊m/2⌋`
//! edges of the shuffled list, party 1 the remaining `⌈m/2⌉`.
use std::{
    collections::HashSet,
    fmt::{self, Write as _},
    io,
    path::{Path, PathBuf},
};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    seed::{deterministic_seed, shuffle, uniform_below},
    utils::{ensure_dir, write_atomic},
};

/// One of the two cooperating parties of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Party {
    /// The party with role `0`.
    Zero,
    /// The party with role `1`.
    One,
}

impl Party {
    /// Both parties, in role order.
    pub const BOTH: [Party; 2] = [Party::Zero, Party::One];

    /// The numeric role passed to the protocol executable.
    pub fn index(self) -> u8 {
        match self {
            Party::Zero => 0,
            Party::One => 1,
        }
    }
}

impl From<Party> for u8 {
    fn from(p: Party) -> Self {
        p.index()
    }
}

impl TryFrom<u8> for Party {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Party::Zero),
            1 => Ok(Party::One),
            other => Err(format!("party must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// A weighted edge between two distinct vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// First endpoint.
    pub u: u32,
    /// Second endpoint, never equal to `u`.
    pub v: u32,
    /// Non-negative integer weight.
    pub weight: u64,
}

/// How edge weights are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightMode {
    /// Edge `i` (in generation order) gets weight `i`, so all weights are distinct.
    Unique,
    /// Weights are drawn from `0..max(1, ⌊m·w⌋)` and only exact duplicate triples are rejected.
    Bounded(f64),
}

/// Parameters of a generated instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Number of vertices `n`.
    pub vertices: u32,
    /// Number of edges `m`.
    pub edges: usize,
    /// Weight assignment scheme.
    pub weights: WeightMode,
    /// Key the generator is seeded with, normally the canonical scenario name.
    pub seed_key: String,
}

impl GraphSpec {
    /// Generates the instance described by this spec.
    pub fn generate(&self) -> Result<PartySplit, GraphError> {
        match self.weights {
            WeightMode::Unique => generate_unique(self.vertices, self.edges, &self.seed_key),
            WeightMode::Bounded(w) => {
                generate_bounded(self.vertices, self.edges, w, &self.seed_key)
            }
        }
    }
}

/// Errors raised while generating, reading or writing graph instances.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Edges need two distinct endpoints.
    #[error("cannot place {edges} edges on {vertices} vertices, at least 2 vertices are required")]
    TooFewVertices {
        /// Requested vertex count.
        vertices: u32,
        /// Requested edge count.
        edges: usize,
    },
    /// The weight density must be a finite, non-negative number.
    #[error("invalid weight density {0}")]
    InvalidDensity(f64),
    /// Fewer distinct `(u, v, weight)` triples exist than edges were requested.
    #[error("only {available} distinct weighted edges exist, but {edges} were requested")]
    InsufficientTripleSpace {
        /// Requested edge count.
        edges: usize,
        /// Number of distinct triples that can be drawn.
        available: u128,
    },
    /// Sampling did not find enough distinct triples within the attempt budget.
    #[error("found only {found} of {edges} distinct edges after {attempts} sampling attempts")]
    SamplingBudgetExhausted {
        /// Number of triples drawn.
        attempts: u64,
        /// Number of distinct triples found.
        found: usize,
        /// Requested edge count.
        edges: usize,
    },
    /// A party input file does not follow the `<n> <m>` / `<u> <v> <w>` format.
    #[error("malformed input file at line {line}: {reason}")]
    MalformedInput {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },
    /// Reading or writing an input file failed.
    #[error("i/o error for {path:?}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

/// A shuffled edge list and the point at which it is divided between the parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartySplit {
    vertices: u32,
    edges: Vec<Edge>,
    split: usize,
}

impl PartySplit {
    /// Shuffles `edges` with `rng` and splits them `⌊m/2⌋` / `⌈m/2⌉`.
    pub fn shuffled<R: RngCore + ?Sized>(vertices: u32, mut edges: Vec<Edge>, rng: &mut R) -> Self {
        shuffle(rng, &mut edges);
        let split = edges.len() / 2;
        Self {
            vertices,
            edges,
            split,
        }
    }

    /// Number of vertices of the instance.
    pub fn vertices(&self) -> u32 {
        self.vertices
    }

    /// The whole shuffled edge list, party 0's edges first.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The edges held by `party`.
    pub fn party_edges(&self, party: Party) -> &[Edge] {
        match party {
            Party::Zero => &self.edges[..self.split],
            Party::One => &self.edges[self.split..],
        }
    }

    /// Serializes the edges of `party` as `"<n> <count>\n"` followed by `"<u> <v> <w>\n"` lines.
    pub fn render(&self, party: Party) -> String {
        let edges = self.party_edges(party);
        let mut out = String::with_capacity(16 + edges.len() * 24);
        // writing to a String never fails
        let _ = writeln!(out, "{} {}", self.vertices, edges.len());
        for e in edges {
            let _ = writeln!(out, "{} {} {}", e.u, e.v, e.weight);
        }
        out
    }

    /// Writes `p0.txt` and `p1.txt` into `dir`, leaving files that already exist untouched.
    ///
    /// Returns the number of files written.
    pub fn write_inputs(&self, dir: &Path) -> Result<usize, GraphError> {
        ensure_dir(dir).map_err(|source| GraphError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut written = 0;
        for party in Party::BOTH {
            let path = input_file(dir, party);
            if path.exists() {
                debug!(path = ?path, "input file already present");
                continue;
            }
            write_atomic(&path, self.render(party).as_bytes())
                .map_err(|source| GraphError::Io { path, source })?;
            written += 1;
        }
        Ok(written)
    }
}

/// Path of the input file of `party` inside a scenario input directory.
pub fn input_file(dir: &Path, party: Party) -> PathBuf {
    dir.join(format!("p{}.txt", party.index()))
}

fn sample_endpoints<R: RngCore + ?Sized>(rng: &mut R, vertices: u32) -> (u32, u32) {
    let n = u64::from(vertices);
    loop {
        let x = uniform_below(rng, n) as u32;
        let y = uniform_below(rng, n) as u32;
        if x != y {
            return (x, y);
        }
    }
}

fn check_vertices(vertices: u32, edges: usize) -> Result<(), GraphError> {
    if edges > 0 && vertices < 2 {
        return Err(GraphError::TooFewVertices { vertices, edges });
    }
    Ok(())
}

/// Generates `m` edges where edge `i` has weight `i`.
///
/// Endpoint pairs may repeat, only the weights are guaranteed to be distinct.
pub fn generate_unique(vertices: u32, edges: usize, key: &str) -> Result<PartySplit, GraphError> {
    check_vertices(vertices, edges)?;
    let mut rng = deterministic_seed(key);
    let mut list = Vec::with_capacity(edges);
    for i in 0..edges {
        let (u, v) = sample_endpoints(&mut rng, vertices);
        list.push(Edge {
            u,
            v,
            weight: i as u64,
        });
    }
    Ok(PartySplit::shuffled(vertices, list, &mut rng))
}

/// The exclusive upper bound of weights drawn by [`generate_bounded`].
pub fn max_weight(edges: usize, density: f64) -> u64 {
    ((edges as f64 * density).floor() as u64).max(1)
}

/// Generates `m` distinct `(u, v, weight)` triples with weights below [`max_weight`].
///
/// Fails instead of looping forever when the triple space is too small or too crowded to find
/// `m` distinct triples within a bounded number of draws.
pub fn generate_bounded(
    vertices: u32,
    edges: usize,
    density: f64,
    key: &str,
) -> Result<PartySplit, GraphError> {
    if !density.is_finite() || density < 0.0 {
        return Err(GraphError::InvalidDensity(density));
    }
    check_vertices(vertices, edges)?;
    let max_weight = max_weight(edges, density);
    let n = u128::from(vertices);
    let available = n * n.saturating_sub(1) * u128::from(max_weight);
    if (edges as u128) > available {
        return Err(GraphError::InsufficientTripleSpace { edges, available });
    }

    let budget = (edges as u64).saturating_mul(64).max(1 << 16);
    sample_bounded(vertices, edges, max_weight, key, budget)
}

fn sample_bounded(
    vertices: u32,
    edges: usize,
    max_weight: u64,
    key: &str,
    budget: u64,
) -> Result<PartySplit, GraphError> {
    let mut rng = deterministic_seed(key);
    let mut seen = HashSet::with_capacity(edges);
    let mut list = Vec::with_capacity(edges);
    let mut attempts = 0;
    while list.len() < edges {
        if attempts == budget {
            return Err(GraphError::SamplingBudgetExhausted {
                attempts,
                found: list.len(),
                edges,
            });
        }
        attempts += 1;
        let (u, v) = sample_endpoints(&mut rng, vertices);
        let weight = uniform_below(&mut rng, max_weight);
        let edge = Edge { u, v, weight };
        if seen.insert(edge) {
            list.push(edge);
        }
    }
    Ok(PartySplit::shuffled(vertices, list, &mut rng))
}

/// Parses a party input file back into its vertex count and edges.
pub fn parse_input(text: &str) -> Result<(u32, Vec<Edge>), GraphError> {
    let malformed = |line: usize, reason: String| GraphError::MalformedInput { line, reason };
    let mut lines = text.lines().enumerate();
    let (_, header) = lines
        .next()
        .ok_or_else(|| malformed(1, "missing header".into()))?;
    let header: Vec<&str> = header.split_whitespace().collect();
    let [n, m] = header[..] else {
        return Err(malformed(1, format!("expected 2 fields, got {}", header.len())));
    };
    let n: u32 = n.parse().map_err(|e| malformed(1, format!("{e}")))?;
    let m: usize = m.parse().map_err(|e| malformed(1, format!("{e}")))?;

    let mut edges = Vec::with_capacity(m);
    for (i, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [u, v, w] = fields[..] else {
            return Err(malformed(i + 1, format!("expected 3 fields, got {}", fields.len())));
        };
        let u: u32 = u.parse().map_err(|e| malformed(i + 1, format!("{e}")))?;
        let v: u32 = v.parse().map_err(|e| malformed(i + 1, format!("{e}")))?;
        let weight: u64 = w.parse().map_err(|e| malformed(i + 1, format!("{e}")))?;
        if u == v || u >= n || v >= n {
            return Err(malformed(i + 1, format!("invalid endpoints {u} {v} for n = {n}")));
        }
        edges.push(Edge { u, v, weight });
    }
    if edges.len() != m {
        return Err(malformed(1, format!("header announces {m} edges, found {}", edges.len())));
    }
    Ok((n, edges))
}
