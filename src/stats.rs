//! Parsing of the stats files written by the protocol executable and averaging across trials.
//!
//! An MSF run writes seven lines, each starting with a label that is ignored:
//!
//! ```text
//! iterations 5
//! phase1(total/aby/setup/network) 1 2 3 4
//! phase1(recv/send) 100 200
//! phase2(total/aby/setup/network) 5 6 7 8
//! phase2(recv/send) 300 400
//! ands(computew,connectivity,subgraph) 1 2 3
//! subgraphs 3:2 4:1
//! ```
//!
//! Timings are in milliseconds and converted to seconds, the two communication counters of a
//! phase are summed, as are the three multiplication counters. A `size:count` histogram entry
//! contributes `count × (size − 1)` edges for `size`.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Timings of one phase in seconds: total, ABY, setup and network time.
pub type PhaseTiming = [f64; 4];

/// Errors raised for stats files that do not follow the expected layout.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    /// The file ended before the given line.
    #[error("missing line {line} ({what})")]
    MissingLine {
        /// 1-based line number.
        line: usize,
        /// What the line should contain.
        what: &'static str,
    },
    /// A line has the wrong number of values after its label.
    #[error("line {line}: expected {expected} values, found {found}")]
    FieldCount {
        /// 1-based line number.
        line: usize,
        /// Number of values expected after the label.
        expected: usize,
        /// Number of values found.
        found: usize,
    },
    /// A value is not a number of the expected type.
    #[error("line {line}: invalid number {token:?}")]
    InvalidNumber {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },
    /// A histogram entry is not of the form `size:count` with `size ≥ 1`.
    #[error("line {line}: invalid histogram entry {token:?}")]
    InvalidHistogramEntry {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },
    /// The file contains more lines than the format defines.
    #[error("unexpected content at line {line}")]
    TrailingData {
        /// 1-based line number of the first extra line.
        line: usize,
    },
    /// The file is not text.
    #[error("invalid UTF-8 after byte {valid_up_to}")]
    InvalidUtf8 {
        /// Length of the valid prefix.
        valid_up_to: usize,
    },
}

/// Decodes the raw contents of a stats file.
pub fn decode(bytes: Vec<u8>) -> Result<String, StatsError> {
    String::from_utf8(bytes).map_err(|e| StatsError::InvalidUtf8 {
        valid_up_to: e.utf8_error().valid_up_to(),
    })
}

/// The layouts of stats files written by the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsFormat {
    /// The seven line MSF layout.
    Msf,
    /// Multiplication triple generation: total time and communication.
    Ot,
    /// Connectivity or subgraph subprotocol: total time, AND count and communication.
    Subprotocol,
}

impl StatsFormat {
    /// Checks that `text` parses in this format.
    pub fn validate(self, text: &str) -> Result<(), StatsError> {
        match self {
            StatsFormat::Msf => StatsRecord::parse(text).map(drop),
            StatsFormat::Ot => OtStats::parse(text).map(drop),
            StatsFormat::Subprotocol => SubprotocolStats::parse(text).map(drop),
        }
    }
}

struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    consumed: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            consumed: 0,
        }
    }

    /// The values of the next non-empty line, without its label.
    fn next_values(&mut self, what: &'static str) -> Result<(usize, Vec<&'a str>), StatsError> {
        for (i, line) in self.inner.by_ref() {
            self.consumed = i + 1;
            let mut tokens = line.split_whitespace();
            if tokens.next().is_some() {
                return Ok((i + 1, tokens.collect()));
            }
        }
        Err(StatsError::MissingLine {
            line: self.consumed + 1,
            what,
        })
    }

    fn exact<const N: usize>(&mut self, what: &'static str) -> Result<(usize, [&'a str; N]), StatsError> {
        let (line, values) = self.next_values(what)?;
        let found = values.len();
        let values: [&str; N] = values.try_into().map_err(|_| StatsError::FieldCount {
            line,
            expected: N,
            found,
        })?;
        Ok((line, values))
    }

    fn optional_exact<const N: usize>(
        &mut self,
        what: &'static str,
    ) -> Result<Option<(usize, [&'a str; N])>, StatsError> {
        match self.exact(what) {
            Ok(v) => Ok(Some(v)),
            Err(StatsError::MissingLine { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn finish(mut self) -> Result<(), StatsError> {
        match self.inner.find(|(_, line)| !line.trim().is_empty()) {
            Some((i, _)) => Err(StatsError::TrailingData { line: i + 1 }),
            None => Ok(()),
        }
    }
}

fn number<T: std::str::FromStr>(line: usize, token: &str) -> Result<T, StatsError> {
    token.parse().map_err(|_| StatsError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}

fn millis_to_secs(line: usize, token: &str) -> Result<f64, StatsError> {
    let ms: f64 = number(line, token)?;
    if !ms.is_finite() {
        return Err(StatsError::InvalidNumber {
            line,
            token: token.to_string(),
        });
    }
    Ok(ms / 1000.0)
}

fn timing(line: usize, values: [&str; 4]) -> Result<PhaseTiming, StatsError> {
    let mut t = [0.0; 4];
    for (slot, token) in t.iter_mut().zip(values) {
        *slot = millis_to_secs(line, token)?;
    }
    Ok(t)
}

fn sum_counters<const N: usize>(line: usize, values: [&str; N]) -> Result<u64, StatsError> {
    let mut total: u64 = 0;
    for token in values {
        let v: u64 = number(line, token)?;
        total = total
            .checked_add(v)
            .ok_or_else(|| StatsError::InvalidNumber {
                line,
                token: token.to_string(),
            })?;
    }
    Ok(total)
}

fn histogram(line: usize, values: &[&str]) -> Result<BTreeMap<u32, u64>, StatsError> {
    let invalid = |token: &str| StatsError::InvalidHistogramEntry {
        line,
        token: token.to_string(),
    };
    let mut hist = BTreeMap::new();
    for &token in values {
        let (size, count) = token.split_once(':').ok_or_else(|| invalid(token))?;
        let size: u32 = size.parse().map_err(|_| invalid(token))?;
        let count: u64 = count.parse().map_err(|_| invalid(token))?;
        if size == 0 {
            return Err(invalid(token));
        }
        let edges = count
            .checked_mul(u64::from(size - 1))
            .ok_or_else(|| invalid(token))?;
        hist.insert(size, edges);
    }
    Ok(hist)
}

/// Lays the map out densely from its smallest to its largest key, with `zero` for gaps.
fn dense<T: Copy>(map: &BTreeMap<u32, T>, zero: T) -> Vec<T> {
    let (Some((&first, _)), Some((&last, _))) = (map.first_key_value(), map.last_key_value())
    else {
        return vec![];
    };
    (first..=last)
        .map(|size| map.get(&size).copied().unwrap_or(zero))
        .collect()
}

/// The parsed stats of a single MSF run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Number of iterations of the main loop.
    pub iterations: u64,
    /// Timings of phase 1 in seconds.
    pub phase1_timing: PhaseTiming,
    /// Bytes sent and received in phase 1.
    pub phase1_comm: u64,
    /// Timings of phase 2 in seconds.
    pub phase2_timing: PhaseTiming,
    /// Bytes sent and received in phase 2.
    pub phase2_comm: u64,
    /// Total number of multiplications (AND gates).
    pub multiplications: u64,
    /// Number of edges in isolated subgraphs, by subgraph size.
    pub subgraphs: BTreeMap<u32, u64>,
}

impl StatsRecord {
    /// Parses the seven line MSF stats layout.
    pub fn parse(text: &str) -> Result<Self, StatsError> {
        let mut lines = Lines::new(text);
        let (l, [iterations]) = lines.exact("iteration count")?;
        let iterations = number(l, iterations)?;
        let (l, values) = lines.exact("phase 1 timings")?;
        let phase1_timing = timing(l, values)?;
        let (l, values) = lines.exact::<2>("phase 1 communication")?;
        let phase1_comm = sum_counters(l, values)?;
        let (l, values) = lines.exact("phase 2 timings")?;
        let phase2_timing = timing(l, values)?;
        let (l, values) = lines.exact::<2>("phase 2 communication")?;
        let phase2_comm = sum_counters(l, values)?;
        let (l, values) = lines.exact::<3>("multiplication counters")?;
        let multiplications = sum_counters(l, values)?;
        let (l, values) = lines.next_values("subgraph histogram")?;
        let subgraphs = histogram(l, &values)?;
        lines.finish()?;
        Ok(Self {
            iterations,
            phase1_timing,
            phase1_comm,
            phase2_timing,
            phase2_comm,
            multiplications,
            subgraphs,
        })
    }

    /// Elementwise sum of the phase 1 and phase 2 timings.
    pub fn total_timing(&self) -> PhaseTiming {
        std::array::from_fn(|i| self.phase1_timing[i] + self.phase2_timing[i])
    }

    /// Communication of both phases, saturating at `u64::MAX`.
    pub fn total_comm(&self) -> u64 {
        self.phase1_comm.saturating_add(self.phase2_comm)
    }

    /// The histogram as a dense sequence from the smallest to the largest subgraph size.
    pub fn dense_subgraphs(&self) -> Vec<u64> {
        dense(&self.subgraphs, 0)
    }
}

/// Arithmetic mean of several [`StatsRecord`]s of the same scenario parameters.
///
/// The subgraph histogram is averaged like every other field; sizes missing from a trial count
/// as zero edges for that trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    /// Number of records averaged.
    pub trials: usize,
    /// Mean iteration count.
    pub iterations: f64,
    /// Mean phase 1 timings in seconds.
    pub phase1_timing: PhaseTiming,
    /// Mean phase 1 communication in bytes.
    pub phase1_comm: f64,
    /// Mean phase 2 timings in seconds.
    pub phase2_timing: PhaseTiming,
    /// Mean phase 2 communication in bytes.
    pub phase2_comm: f64,
    /// Mean of the summed timings in seconds.
    pub total_timing: PhaseTiming,
    /// Mean total communication in bytes.
    pub total_comm: f64,
    /// Mean number of multiplications.
    pub multiplications: f64,
    /// Mean number of edges in isolated subgraphs, by subgraph size.
    pub subgraphs: BTreeMap<u32, f64>,
}

impl AggregatedStats {
    /// Averages `records`, returns `None` if there are none.
    pub fn mean(records: &[StatsRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let k = records.len() as f64;
        let avg = |f: &dyn Fn(&StatsRecord) -> f64| records.iter().map(f).sum::<f64>() / k;
        let avg_timing = |f: &dyn Fn(&StatsRecord) -> PhaseTiming| -> PhaseTiming {
            std::array::from_fn(|i| records.iter().map(|r| f(r)[i]).sum::<f64>() / k)
        };

        let mut subgraphs = BTreeMap::new();
        for r in records {
            for (&size, &edges) in &r.subgraphs {
                *subgraphs.entry(size).or_insert(0.0) += edges as f64;
            }
        }
        subgraphs.values_mut().for_each(|v| *v /= k);

        Some(Self {
            trials: records.len(),
            iterations: avg(&|r| r.iterations as f64),
            phase1_timing: avg_timing(&|r| r.phase1_timing),
            phase1_comm: avg(&|r| r.phase1_comm as f64),
            phase2_timing: avg_timing(&|r| r.phase2_timing),
            phase2_comm: avg(&|r| r.phase2_comm as f64),
            total_timing: avg_timing(&|r| r.total_timing()),
            total_comm: avg(&|r| r.total_comm() as f64),
            multiplications: avg(&|r| r.multiplications as f64),
            subgraphs,
        })
    }

    /// The histogram as a dense sequence from the smallest to the largest subgraph size.
    pub fn dense_subgraphs(&self) -> Vec<f64> {
        dense(&self.subgraphs, 0.0)
    }
}

impl From<&StatsRecord> for AggregatedStats {
    fn from(record: &StatsRecord) -> Self {
        Self {
            trials: 1,
            iterations: record.iterations as f64,
            phase1_timing: record.phase1_timing,
            phase1_comm: record.phase1_comm as f64,
            phase2_timing: record.phase2_timing,
            phase2_comm: record.phase2_comm as f64,
            total_timing: record.total_timing(),
            total_comm: record.total_comm() as f64,
            multiplications: record.multiplications as f64,
            subgraphs: record
                .subgraphs
                .iter()
                .map(|(&size, &edges)| (size, edges as f64))
                .collect(),
        }
    }
}

/// Stats of a multiplication triple generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtStats {
    /// Total time in seconds.
    pub seconds: f64,
    /// Bytes received and sent, if recorded.
    pub comm: Option<u64>,
}

impl OtStats {
    /// Parses `ots(total) <ms>` followed by an optional `ots(recv/send) <r> <s>` line.
    pub fn parse(text: &str) -> Result<Self, StatsError> {
        let mut lines = Lines::new(text);
        let (l, [ms]) = lines.exact("total time")?;
        let seconds = millis_to_secs(l, ms)?;
        let comm = match lines.optional_exact::<2>("communication")? {
            Some((l, values)) => Some(sum_counters(l, values)?),
            None => None,
        };
        lines.finish()?;
        Ok(Self { seconds, comm })
    }
}

/// Stats of a connectivity or subgraph subprotocol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprotocolStats {
    /// Total time in seconds.
    pub seconds: f64,
    /// Number of AND gates evaluated.
    pub multiplications: u64,
    /// Bytes received and sent, if recorded.
    pub comm: Option<u64>,
}

impl SubprotocolStats {
    /// Parses `<kind>(total) <ms>`, `ands <count>` and an optional `<kind>(recv/send) <r> <s>`.
    pub fn parse(text: &str) -> Result<Self, StatsError> {
        let mut lines = Lines::new(text);
        let (l, [ms]) = lines.exact("total time")?;
        let seconds = millis_to_secs(l, ms)?;
        let (l, [ands]) = lines.exact("AND count")?;
        let multiplications = number(l, ands)?;
        let comm = match lines.optional_exact::<2>("communication")? {
            Some((l, values)) => Some(sum_counters(l, values)?),
            None => None,
        };
        lines.finish()?;
        Ok(Self {
            seconds,
            multiplications,
            comm,
        })
    }
}
