//! Lookup of finished stats files for reporting.
//!
//! A [`StatsStore`] maps scenario parameters to parsed stats. Every lookup distinguishes a
//! scenario that was never run ([`LookupError::Missing`]) from one whose stats file cannot be
//! parsed ([`LookupError::Corrupt`]), so a report can skip both and continue with the rest.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_TRIALS,
    graph::Party,
    scenario::{self, Density, Scenario, stats_file_name},
    stats::{self, AggregatedStats, OtStats, StatsError, StatsRecord, SubprotocolStats},
};

/// Errors of a single stats lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The scenario has not been run (yet).
    #[error("stats file {path:?} is missing")]
    Missing {
        /// The expected stats file.
        path: PathBuf,
    },
    /// The stats file exists but does not parse.
    #[error("stats file {path:?} is corrupt")]
    Corrupt {
        /// The stats file.
        path: PathBuf,
        /// The parse error.
        source: StatsError,
    },
    /// The stats file could not be read.
    #[error("failed to read stats file {path:?}")]
    Io {
        /// The stats file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

impl LookupError {
    /// Whether the scenario has simply not been run.
    pub fn is_missing(&self) -> bool {
        matches!(self, LookupError::Missing { .. })
    }
}

/// The network setting a stats directory was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    /// Local area network.
    Lan,
    /// Wide area network.
    Wan,
}

impl NetworkProfile {
    /// The directory suffix, `lan` or `wan`.
    pub fn name(self) -> &'static str {
        match self {
            NetworkProfile::Lan => "lan",
            NetworkProfile::Wan => "wan",
        }
    }

    /// Measured precomputation time per multiplication triple, in seconds.
    pub fn seconds_per_multiplication(self) -> f64 {
        match self {
            NetworkProfile::Lan => 5.31899e-8,
            NetworkProfile::Wan => 3.21851e-7,
        }
    }

    /// Online time plus the estimated precomputation time of `multiplications` triples.
    pub fn combined(self, online_seconds: f64, multiplications: f64) -> f64 {
        online_seconds + self.seconds_per_multiplication() * multiplications
    }
}

impl fmt::Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lan" => Ok(NetworkProfile::Lan),
            "wan" => Ok(NetworkProfile::Wan),
            other => Err(format!("unknown network {other:?}, expected lan or wan")),
        }
    }
}

/// Read-only access to the stats files of one party in one directory.
#[derive(Debug, Clone)]
pub struct StatsStore {
    dir: PathBuf,
    party: Party,
    trials: u32,
}

impl StatsStore {
    /// Reads party 0's stats from `dir`, averaging MSF scenarios over the default trial count.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            party: Party::Zero,
            trials: DEFAULT_TRIALS,
        }
    }

    /// `<root>/stats_<network>`, or `<root>/stats` without a network.
    pub fn for_network(root: &Path, network: Option<NetworkProfile>) -> Self {
        match network {
            Some(network) => Self::new(root.join(format!("stats_{network}"))),
            None => Self::new(root.join("stats")),
        }
    }

    /// Reads the stats files of `party` instead.
    pub fn with_party(mut self, party: Party) -> Self {
        self.party = party;
        self
    }

    /// Averages MSF scenarios over trials `1..=trials`.
    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// The directory the stats files are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T>(
        &self,
        names: &[String],
        parse: impl FnOnce(&str) -> Result<T, StatsError>,
    ) -> Result<T, LookupError> {
        let candidates: Vec<PathBuf> = names
            .iter()
            .map(|name| self.dir.join(stats_file_name(name, self.party)))
            .collect();
        let Some(path) = candidates.iter().find(|p| p.exists()) else {
            return Err(LookupError::Missing {
                path: candidates.into_iter().next().unwrap_or_default(),
            });
        };
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LookupError::Missing { path: path.clone() },
            _ => LookupError::Io {
                path: path.clone(),
                source,
            },
        })?;
        stats::decode(bytes)
            .and_then(|text| parse(&text))
            .map_err(|source| LookupError::Corrupt {
                path: path.clone(),
                source,
            })
    }

    fn scenario<T>(
        &self,
        scenario: &Scenario,
        parse: impl FnOnce(&str) -> Result<T, StatsError>,
    ) -> Result<T, LookupError> {
        let mut names = vec![scenario.name()];
        names.extend(scenario.legacy_names());
        self.read(&names, parse)
    }

    fn average(&self, trial: impl Fn(u32) -> Scenario) -> Result<AggregatedStats, LookupError> {
        let records = (1..=self.trials.max(1))
            .map(|t| self.scenario(&trial(t), StatsRecord::parse))
            .collect::<Result<Vec<_>, _>>()?;
        // at least one trial was read above
        AggregatedStats::mean(&records).ok_or_else(|| LookupError::Missing {
            path: self.dir.clone(),
        })
    }

    /// MSF on unique weights, averaged over all trials.
    pub fn msf_unique(&self, vertices: u32, edges: usize) -> Result<AggregatedStats, LookupError> {
        self.average(|trial| Scenario::MsfUnique {
            vertices,
            edges,
            trial,
        })
    }

    /// MSF on bounded weights, averaged over all trials.
    pub fn msf_bounded(
        &self,
        vertices: u32,
        edges: usize,
        density: Density,
    ) -> Result<AggregatedStats, LookupError> {
        self.average(|trial| Scenario::MsfBounded {
            vertices,
            edges,
            density,
            trial,
        })
    }

    /// MSF on a TSPLIB instance.
    pub fn tsp(&self, instance: &str) -> Result<StatsRecord, LookupError> {
        let scenario = Scenario::Tsp {
            instance: instance.to_string(),
        };
        self.scenario(&scenario, StatsRecord::parse)
    }

    /// Generation of `count` multiplication triples.
    pub fn ot(&self, count: u64) -> Result<OtStats, LookupError> {
        self.scenario(&Scenario::GenerateMts { count }, OtStats::parse)
    }

    /// The connectivity subprotocol; stats written under the legacy prefix are found too.
    pub fn connectivity(&self, size: u32, count: u32) -> Result<SubprotocolStats, LookupError> {
        self.scenario(&Scenario::Connectivity { size, count }, SubprotocolStats::parse)
    }

    /// The subgraph subprotocol.
    pub fn subgraph(&self, size: u32, count: u32) -> Result<SubprotocolStats, LookupError> {
        self.scenario(&Scenario::Subgraph { size, count }, SubprotocolStats::parse)
    }

    /// Looks up `query` and flattens it into a report row.
    pub fn row(&self, query: &Query, network: Option<NetworkProfile>) -> Result<Row, LookupError> {
        let msf_row = |stats: AggregatedStats| Row {
            name: query.to_string(),
            seconds: stats.total_timing[0],
            phase_seconds: Some([stats.phase1_timing[0], stats.phase2_timing[0]]),
            multiplications: Some(stats.multiplications),
            comm: Some(stats.total_comm),
            combined_seconds: network
                .map(|n| n.combined(stats.total_timing[0], stats.multiplications)),
        };
        match *query {
            Query::MsfUnique { vertices, edges } => self.msf_unique(vertices, edges).map(msf_row),
            Query::MsfBounded {
                vertices,
                edges,
                density,
            } => self.msf_bounded(vertices, edges, density).map(msf_row),
            Query::Tsp { instance } => self
                .tsp(instance)
                .map(|record| msf_row(AggregatedStats::from(&record))),
            Query::Ot { count } => self.ot(count).map(|stats| Row {
                name: query.to_string(),
                seconds: stats.seconds,
                phase_seconds: None,
                multiplications: None,
                comm: stats.comm.map(|c| c as f64),
                combined_seconds: None,
            }),
            Query::Connectivity { size, count } | Query::Subgraph { size, count } => {
                let stats = match query {
                    Query::Connectivity { .. } => self.connectivity(size, count),
                    _ => self.subgraph(size, count),
                }?;
                Ok(Row {
                    name: query.to_string(),
                    seconds: stats.seconds,
                    phase_seconds: None,
                    multiplications: Some(stats.multiplications as f64),
                    comm: stats.comm.map(|c| c as f64),
                    combined_seconds: network
                        .map(|n| n.combined(stats.seconds, stats.multiplications as f64)),
                })
            }
        }
    }
}

/// A reportable measurement: scenario parameters without the trial index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    /// Averaged MSF on unique weights.
    MsfUnique {
        /// Number of vertices.
        vertices: u32,
        /// Number of edges.
        edges: usize,
    },
    /// Averaged MSF on bounded weights.
    MsfBounded {
        /// Number of vertices.
        vertices: u32,
        /// Number of edges.
        edges: usize,
        /// Weight density.
        density: Density,
    },
    /// MSF on a TSPLIB instance.
    Tsp {
        /// Instance name.
        instance: &'static str,
    },
    /// Triple generation.
    Ot {
        /// Number of triples.
        count: u64,
    },
    /// Connectivity subprotocol.
    Connectivity {
        /// Vertices per instance.
        size: u32,
        /// Number of instances.
        count: u32,
    },
    /// Subgraph subprotocol.
    Subgraph {
        /// Vertices per instance.
        size: u32,
        /// Number of instances.
        count: u32,
    },
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MsfUnique { vertices, edges } => write!(f, "unique-{vertices}-{edges}"),
            Query::MsfBounded {
                vertices,
                edges,
                density,
            } => write!(f, "bounded-{vertices}-{edges}-{density}"),
            Query::Tsp { instance } => f.write_str(instance),
            Query::Ot { count } => write!(f, "genmt-{count}"),
            Query::Connectivity { size, count } => write!(f, "connectivity-{size}-{count}"),
            Query::Subgraph { size, count } => write!(f, "subgraph-{size}-{count}"),
        }
    }
}

/// The measurements behind the MSF sweep: unique first, then bounded per density.
pub fn msf_queries() -> Vec<Query> {
    let mut pairs = vec![];
    for vertices in scenario::MSF_VERTICES {
        for factor in scenario::MSF_EDGE_FACTORS {
            pairs.push((vertices, factor * vertices as usize));
        }
    }
    let mut queries: Vec<Query> = pairs
        .iter()
        .map(|&(vertices, edges)| Query::MsfUnique { vertices, edges })
        .collect();
    for w in scenario::MSF_DENSITIES {
        queries.extend(pairs.iter().map(|&(vertices, edges)| Query::MsfBounded {
            vertices,
            edges,
            density: Density(w),
        }));
    }
    queries
}

/// The TSPLIB measurements.
pub fn tsp_queries() -> Vec<Query> {
    scenario::TSP_INSTANCES
        .iter()
        .map(|&instance| Query::Tsp { instance })
        .collect()
}

/// The triple generation measurements.
pub fn ot_queries() -> Vec<Query> {
    scenario::mt_counts()
        .into_iter()
        .map(|count| Query::Ot { count })
        .collect()
}

/// The connectivity measurements.
pub fn connectivity_queries() -> Vec<Query> {
    scenario::connectivity_sweep()
        .into_iter()
        .filter_map(|s| match s {
            Scenario::Connectivity { size, count } => Some(Query::Connectivity { size, count }),
            _ => None,
        })
        .collect()
}

/// The subgraph measurements.
pub fn subgraph_queries() -> Vec<Query> {
    scenario::subgraph_sweep()
        .into_iter()
        .filter_map(|s| match s {
            Scenario::Subgraph { size, count } => Some(Query::Subgraph { size, count }),
            _ => None,
        })
        .collect()
}

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// The measurement, e.g. `bounded-100-300-0.5`.
    pub name: String,
    /// Total online time in seconds.
    pub seconds: f64,
    /// Online time of phase 1 and phase 2 (MSF only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_seconds: Option<[f64; 2]>,
    /// Number of multiplications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplications: Option<f64>,
    /// Bytes communicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comm: Option<f64>,
    /// Online time plus estimated precomputation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_seconds: Option<f64>,
}

/// Rows for all available measurements and the lookup errors of the others.
#[derive(Debug, Default)]
pub struct Report {
    /// One row per available measurement, in query order.
    pub rows: Vec<Row>,
    /// Measurements that could not be reported.
    pub problems: Vec<(Query, LookupError)>,
}

impl Report {
    /// Looks up every query, collecting failures instead of stopping at the first.
    pub fn collect(
        store: &StatsStore,
        network: Option<NetworkProfile>,
        queries: impl IntoIterator<Item = Query>,
    ) -> Self {
        let mut report = Report::default();
        for query in queries {
            match store.row(&query, network) {
                Ok(row) => report.rows.push(row),
                Err(e) => report.problems.push((query, e)),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn msf_stats(iterations: u64) -> String {
        format!(
            "iterations {iterations}\nphase1 1000 2 3 4\ncomm1 100 200\nphase2 500 6 7 8\n\
             comm2 300 400\nmults 10 20 30\nsubgraphs 3:2 4:1\n"
        )
    }

    #[test]
    fn averages_trials_and_reports_missing_ones() {
        let dir = TempDir::new().unwrap();
        for (t, iterations) in [(1, 3), (2, 6)] {
            fs::write(
                dir.path().join(format!("unique-10-30-{t}-p0.txt")),
                msf_stats(iterations),
            )
            .unwrap();
        }
        let store = StatsStore::new(dir.path());
        let err = store.msf_unique(10, 30).unwrap_err();
        assert!(err.is_missing());

        let stats = store.clone().with_trials(2).msf_unique(10, 30).unwrap();
        assert_eq!(stats.trials, 2);
        assert!((stats.iterations - 4.5).abs() < 1e-9);
        assert!((stats.total_timing[0] - 1.5).abs() < 1e-9);
        assert!((stats.multiplications - 60.0).abs() < 1e-9);
    }

    #[test]
    fn corrupt_file_is_distinguished_from_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("berlin52-1-p0.txt"), "iterations 3\nphase1 x\n").unwrap();
        let store = StatsStore::new(dir.path());
        assert!(matches!(
            store.tsp("berlin52"),
            Err(LookupError::Corrupt { .. })
        ));
        assert!(matches!(store.tsp("brg180"), Err(LookupError::Missing { .. })));
    }

    #[test]
    fn binary_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("berlin52-1-p0.txt"), [0xff, 0xfe]).unwrap();
        let err = StatsStore::new(dir.path()).tsp("berlin52").unwrap_err();
        assert!(matches!(
            err,
            LookupError::Corrupt {
                source: StatsError::InvalidUtf8 { valid_up_to: 0 },
                ..
            }
        ));
        assert!(!err.is_missing());
    }

    #[test]
    fn connectivity_falls_back_to_legacy_prefix() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("connctivity-5-10-p0.txt"),
            "connectivity(total) 2500\nands 1234\n",
        )
        .unwrap();
        let stats = StatsStore::new(dir.path()).connectivity(5, 10).unwrap();
        assert!((stats.seconds - 2.5).abs() < 1e-9);
        assert_eq!(stats.multiplications, 1234);
        assert_eq!(stats.comm, None);
    }

    #[test]
    fn party_and_network_select_files() {
        let root = TempDir::new().unwrap();
        let wan = root.path().join("stats_wan");
        fs::create_dir_all(&wan).unwrap();
        fs::write(wan.join("genmt-100-p1.txt"), "ots(total) 40\nots(recv/send) 5 6\n").unwrap();
        let store =
            StatsStore::for_network(root.path(), Some(NetworkProfile::Wan)).with_party(Party::One);
        assert_eq!(store.dir(), wan.as_path());
        let ot = store.ot(100).unwrap();
        assert_eq!(ot.comm, Some(11));
        assert!(StatsStore::for_network(root.path(), Some(NetworkProfile::Wan))
            .ot(100)
            .unwrap_err()
            .is_missing());
    }

    #[test]
    fn combined_time_adds_precomputation() {
        let lan = NetworkProfile::Lan;
        assert!((lan.combined(1.0, 1e8) - (1.0 + 5.31899)).abs() < 1e-9);
        assert_eq!("wan".parse::<NetworkProfile>(), Ok(NetworkProfile::Wan));
        assert!("dsl".parse::<NetworkProfile>().is_err());
    }

    #[test]
    fn report_collects_rows_and_problems() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("berlin52-1-p0.txt"), msf_stats(4)).unwrap();
        let store = StatsStore::new(dir.path());
        let report = Report::collect(&store, Some(NetworkProfile::Lan), tsp_queries());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.problems.len(), 4);
        let row = &report.rows[0];
        assert_eq!(row.name, "berlin52");
        assert!((row.seconds - 1.5).abs() < 1e-9);
        assert_eq!(row.phase_seconds, Some([1.0, 0.5]));
        assert_eq!(row.multiplications, Some(60.0));
        assert!(row.combined_seconds.unwrap() > row.seconds);
    }

    #[test]
    fn query_catalogue_matches_sweeps() {
        assert_eq!(msf_queries().len(), 14 * 2 * 7);
        assert_eq!(msf_queries()[28].to_string(), "bounded-10-30-1.0");
        assert_eq!(connectivity_queries().len(), 30 * 4);
        assert_eq!(subgraph_queries().len(), 56 * 3);
        assert_eq!(ot_queries()[0].to_string(), "genmt-100");
    }
}
