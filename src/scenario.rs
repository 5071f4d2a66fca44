//! Benchmark scenarios, their canonical names and the predefined sweeps.
//!
//! The canonical name of a scenario is its identity: it names the input directory
//! (`inputs/<name>/`), the stats file (`stats/<name>-p<party>.txt`), the ledger entry and it is
//! the seed key of generated graphs.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    graph::{GraphSpec, Party, WeightMode},
    stats::StatsFormat,
};

/// Vertex counts of the MSF sweep.
pub const MSF_VERTICES: [u32; 14] = [
    10, 20, 50, 100, 200, 500, 1000, 2000, 5000, 10000, 20000, 50000, 100000, 200000,
];
/// Edge-to-vertex ratios of the MSF sweep.
pub const MSF_EDGE_FACTORS: [usize; 2] = [3, 6];
/// Weight densities of the bounded MSF sweep.
pub const MSF_DENSITIES: [f64; 6] = [1.0, 0.5, 0.2, 0.1, 0.05, 0.02];
/// Published TSPLIB instances benchmarked by the `tsp` sweep.
pub const TSP_INSTANCES: [&str; 5] = ["berlin52", "brg180", "gr666", "pcb1173", "nrw1379"];
/// Upper limit of multiplication triples generated in the MT sweep.
pub const MAX_MT_COUNT: u64 = 4_000_000_000;

/// Prefix written by older harness versions for connectivity stats files.
const LEGACY_CONNECTIVITY_PREFIX: &str = "connctivity";

/// The weight density `w` of bounded instances.
///
/// Rendered like a decimal literal that always has a fractional part (`1.0`, `0.5`, `0.05`),
/// which keeps names of existing input and stats directories stable.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Density(pub f64);

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Density {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let w: f64 = s.parse().map_err(|e| format!("invalid density {s:?}: {e}"))?;
        if !w.is_finite() || w < 0.0 {
            return Err(format!("density must be a non-negative number, got {s}"));
        }
        Ok(Density(w))
    }
}

/// One fully parameterized benchmark case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// MSF on a random graph with pairwise distinct weights.
    MsfUnique {
        /// Number of vertices.
        vertices: u32,
        /// Number of edges.
        edges: usize,
        /// Trial index, part of the seed.
        trial: u32,
    },
    /// MSF on a random graph with weights from a bounded range.
    MsfBounded {
        /// Number of vertices.
        vertices: u32,
        /// Number of edges.
        edges: usize,
        /// Weight density `w`.
        density: Density,
        /// Trial index, part of the seed.
        trial: u32,
    },
    /// Precomputation of multiplication triples via OT.
    GenerateMts {
        /// Number of triples to generate.
        count: u64,
    },
    /// The connectivity subprotocol.
    Connectivity {
        /// Number of vertices per instance.
        size: u32,
        /// Number of instances evaluated in parallel.
        count: u32,
    },
    /// The isolated subgraph MSF subprotocol.
    Subgraph {
        /// Number of vertices per instance.
        size: u32,
        /// Number of instances evaluated in parallel.
        count: u32,
    },
    /// MSF on a published TSPLIB instance.
    Tsp {
        /// Instance name, e.g. `berlin52`.
        instance: String,
    },
}

impl Scenario {
    /// The canonical name of this scenario.
    pub fn name(&self) -> String {
        match self {
            Scenario::MsfUnique {
                vertices,
                edges,
                trial,
            } => format!("unique-{vertices}-{edges}-{trial}"),
            Scenario::MsfBounded {
                vertices,
                edges,
                density,
                trial,
            } => format!("bounded-{vertices}-{edges}-{density}-{trial}"),
            Scenario::GenerateMts { count } => format!("genmt-{count}"),
            Scenario::Connectivity { size, count } => format!("connectivity-{size}-{count}"),
            Scenario::Subgraph { size, count } => format!("subgraph-{size}-{count}"),
            Scenario::Tsp { instance } => format!("{instance}-1"),
        }
    }

    /// Names under which stats of this scenario may have been written by older sweeps.
    pub fn legacy_names(&self) -> Vec<String> {
        match self {
            Scenario::Connectivity { size, count } => {
                vec![format!("{LEGACY_CONNECTIVITY_PREFIX}-{size}-{count}")]
            }
            _ => vec![],
        }
    }

    /// File name of the stats file `party` writes for this scenario.
    pub fn stats_file_name(&self, party: Party) -> String {
        stats_file_name(&self.name(), party)
    }

    /// Whether the executable reads a graph from standard input for this scenario.
    pub fn is_graph(&self) -> bool {
        matches!(
            self,
            Scenario::MsfUnique { .. } | Scenario::MsfBounded { .. } | Scenario::Tsp { .. }
        )
    }

    /// The generator parameters for random graph scenarios.
    pub fn graph_spec(&self) -> Option<GraphSpec> {
        match *self {
            Scenario::MsfUnique {
                vertices, edges, ..
            } => Some(GraphSpec {
                vertices,
                edges,
                weights: WeightMode::Unique,
                seed_key: self.name(),
            }),
            Scenario::MsfBounded {
                vertices,
                edges,
                density,
                ..
            } => Some(GraphSpec {
                vertices,
                edges,
                weights: WeightMode::Bounded(density.0),
                seed_key: self.name(),
            }),
            _ => None,
        }
    }

    /// Scenario specific flags for the protocol executable.
    pub fn protocol_args(&self) -> Vec<String> {
        match self {
            Scenario::MsfUnique { .. } | Scenario::MsfBounded { .. } | Scenario::Tsp { .. } => {
                vec![]
            }
            Scenario::GenerateMts { count } => {
                vec!["-t".into(), "genots".into(), "-n".into(), count.to_string()]
            }
            Scenario::Connectivity { size, count } => vec![
                "-t".into(),
                "connectivity".into(),
                "-k".into(),
                size.to_string(),
                "-n".into(),
                count.to_string(),
            ],
            Scenario::Subgraph { size, count } => vec![
                "-t".into(),
                "subgraph".into(),
                "-k".into(),
                size.to_string(),
                "-n".into(),
                count.to_string(),
            ],
        }
    }

    /// The layout of the stats file the executable writes for this scenario.
    pub fn stats_format(&self) -> StatsFormat {
        match self {
            Scenario::MsfUnique { .. } | Scenario::MsfBounded { .. } | Scenario::Tsp { .. } => {
                StatsFormat::Msf
            }
            Scenario::GenerateMts { .. } => StatsFormat::Ot,
            Scenario::Connectivity { .. } | Scenario::Subgraph { .. } => StatsFormat::Subprotocol,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// `<name>-p<party>.txt`
pub fn stats_file_name(name: &str, party: Party) -> String {
    format!("{name}-p{}.txt", party.index())
}

/// The MSF sweep: all unique scenarios, then all bounded ones for every density.
pub fn msf_sweep(trials: u32) -> Vec<Scenario> {
    let mut unique = vec![];
    for vertices in MSF_VERTICES {
        for factor in MSF_EDGE_FACTORS {
            for trial in 1..=trials {
                unique.push((vertices, factor * vertices as usize, trial));
            }
        }
    }
    let mut scenarios: Vec<Scenario> = unique
        .iter()
        .map(|&(vertices, edges, trial)| Scenario::MsfUnique {
            vertices,
            edges,
            trial,
        })
        .collect();
    for w in MSF_DENSITIES {
        for &(vertices, edges, trial) in &unique {
            scenarios.push(Scenario::MsfBounded {
                vertices,
                edges,
                density: Density(w),
                trial,
            });
        }
    }
    scenarios
}

/// Triple counts `i·k` for `i` in `10^2..=10^9` and `k` in `{1, 2, 5}`, up to [`MAX_MT_COUNT`].
pub fn mt_counts() -> Vec<u64> {
    let mut counts = vec![];
    for exp in 2..=9 {
        let i = 10u64.pow(exp);
        for k in [1, 2, 5] {
            if i * k <= MAX_MT_COUNT {
                counts.push(i * k);
            }
        }
    }
    counts
}

/// The MT generation sweep.
pub fn mt_sweep() -> Vec<Scenario> {
    mt_counts()
        .into_iter()
        .map(|count| Scenario::GenerateMts { count })
        .collect()
}

/// Instance counts of the connectivity sweep.
pub const CONNECTIVITY_COUNTS: [u32; 4] = [1, 10, 100, 1000];
/// Instance counts of the subgraph sweep.
pub const SUBGRAPH_COUNTS: [u32; 3] = [1, 100, 1000];

/// Sizes `5, 10, …, 150` for every count in [`CONNECTIVITY_COUNTS`].
pub fn connectivity_sweep() -> Vec<Scenario> {
    let mut scenarios = vec![];
    for size in (5..=150).step_by(5) {
        for count in CONNECTIVITY_COUNTS {
            scenarios.push(Scenario::Connectivity { size, count });
        }
    }
    scenarios
}

/// Sizes `5..=60` for every count in [`SUBGRAPH_COUNTS`].
pub fn subgraph_sweep() -> Vec<Scenario> {
    let mut scenarios = vec![];
    for size in 5..=60 {
        for count in SUBGRAPH_COUNTS {
            scenarios.push(Scenario::Subgraph { size, count });
        }
    }
    scenarios
}

/// The TSPLIB sweep.
pub fn tsp_sweep() -> Vec<Scenario> {
    TSP_INSTANCES
        .iter()
        .map(|name| Scenario::Tsp {
            instance: (*name).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        let unique = Scenario::MsfUnique {
            vertices: 10,
            edges: 30,
            trial: 1,
        };
        assert_eq!(unique.name(), "unique-10-30-1");
        let bounded = Scenario::MsfBounded {
            vertices: 10,
            edges: 30,
            density: Density(1.0),
            trial: 2,
        };
        assert_eq!(bounded.name(), "bounded-10-30-1.0-2");
        let bounded = Scenario::MsfBounded {
            vertices: 10,
            edges: 30,
            density: Density(0.05),
            trial: 3,
        };
        assert_eq!(bounded.name(), "bounded-10-30-0.05-3");
        assert_eq!(Scenario::GenerateMts { count: 500 }.name(), "genmt-500");
        assert_eq!(
            Scenario::Connectivity { size: 5, count: 10 }.name(),
            "connectivity-5-10"
        );
        assert_eq!(
            Scenario::Tsp {
                instance: "berlin52".into()
            }
            .stats_file_name(Party::One),
            "berlin52-1-p1.txt"
        );
    }

    #[test]
    fn connectivity_accepts_the_misspelled_prefix() {
        let s = Scenario::Connectivity { size: 5, count: 1 };
        assert_eq!(s.legacy_names(), vec!["connctivity-5-1".to_string()]);
        assert!(Scenario::Subgraph { size: 5, count: 1 }.legacy_names().is_empty());
    }

    #[test]
    fn graph_spec_is_seeded_by_name() {
        let s = Scenario::MsfBounded {
            vertices: 20,
            edges: 60,
            density: Density(0.5),
            trial: 1,
        };
        let spec = s.graph_spec().unwrap();
        assert_eq!(spec.seed_key, "bounded-20-60-0.5-1");
        assert_eq!(spec.weights, WeightMode::Bounded(0.5));
        assert!(Scenario::GenerateMts { count: 1 }.graph_spec().is_none());
    }

    #[test]
    fn protocol_flags() {
        assert!(
            Scenario::MsfUnique {
                vertices: 1,
                edges: 0,
                trial: 1
            }
            .protocol_args()
            .is_empty()
        );
        assert_eq!(
            Scenario::Subgraph { size: 7, count: 100 }.protocol_args(),
            ["-t", "subgraph", "-k", "7", "-n", "100"]
        );
        assert_eq!(
            Scenario::GenerateMts { count: 1000 }.protocol_args(),
            ["-t", "genots", "-n", "1000"]
        );
    }

    #[test]
    fn sweep_sizes() {
        let msf = msf_sweep(3);
        assert_eq!(msf.len(), 14 * 2 * 3 * 7);
        assert!(matches!(msf[0], Scenario::MsfUnique { .. }));
        assert_eq!(msf[0].name(), "unique-10-30-1");
        assert_eq!(msf[84].name(), "bounded-10-30-1.0-1");

        let counts = mt_counts();
        assert_eq!(counts.first(), Some(&100));
        assert_eq!(counts.last(), Some(&2_000_000_000));
        assert!(!counts.contains(&5_000_000_000));

        assert_eq!(connectivity_sweep().len(), 30 * 4);
        assert_eq!(subgraph_sweep().len(), 56 * 3);
        assert_eq!(tsp_sweep().len(), 5);
    }

    #[test]
    fn density_parsing() {
        assert_eq!("0.2".parse::<Density>().unwrap(), Density(0.2));
        assert!("-1".parse::<Density>().is_err());
        assert!("abc".parse::<Density>().is_err());
        assert_eq!(Density(0.02).to_string(), "0.02");
    }
}
