//! Conversion of symmetric TSPLIB instances into MSF inputs.
//!
//! A TSPLIB instance describes a complete graph; it becomes one edge per unordered vertex pair
//! `u < v`, weighted with the TSPLIB distance of the pair.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    graph::{Edge, PartySplit},
    seed::deterministic_seed,
};

/// Earth radius used by the `GEO` distance.
const GEO_RADIUS: f64 = 6378.388;
/// The value of pi prescribed for `GEO` coordinates.
const GEO_PI: f64 = 3.141592;

/// Errors raised for TSPLIB files that cannot be converted.
#[derive(Debug, thiserror::Error)]
pub enum TsplibError {
    /// The file could not be read.
    #[error("failed to read TSPLIB file {path:?}")]
    Io {
        /// The TSPLIB file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// A required header entry is missing.
    #[error("missing {0} entry")]
    MissingField(&'static str),
    /// A header entry or data token has an invalid value.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// The header key or section.
        key: &'static str,
        /// The offending value.
        value: String,
    },
    /// The instance uses a feature that is not supported.
    #[error("unsupported {0}")]
    Unsupported(String),
    /// A data section ended before all values were read.
    #[error("{section} ended after {found} of {expected} values")]
    Truncated {
        /// The section being read.
        section: &'static str,
        /// Number of values expected.
        expected: usize,
        /// Number of values found.
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordMetric {
    Euclidean,
    Ceiling,
    Pseudo,
    Geographic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixFormat {
    Full,
    UpperRow,
    LowerRow,
    UpperDiagRow,
    LowerDiagRow,
}

#[derive(Debug, Clone, PartialEq)]
enum Distances {
    Coords {
        metric: CoordMetric,
        coords: Vec<(f64, f64)>,
    },
    Matrix(Vec<u64>),
}

/// A parsed symmetric TSPLIB instance.
#[derive(Debug, Clone, PartialEq)]
pub struct TspInstance {
    name: String,
    dimension: usize,
    distances: Distances,
}

fn nint(x: f64) -> u64 {
    (x + 0.5).floor() as u64
}

fn geo_radians(x: f64) -> f64 {
    let deg = x.trunc();
    let min = x - deg;
    GEO_PI * (deg + 5.0 * min / 3.0) / 180.0
}

impl CoordMetric {
    fn distance(self, (xi, yi): (f64, f64), (xj, yj): (f64, f64)) -> u64 {
        let (dx, dy) = (xi - xj, yi - yj);
        match self {
            CoordMetric::Euclidean => nint((dx * dx + dy * dy).sqrt()),
            CoordMetric::Ceiling => (dx * dx + dy * dy).sqrt().ceil() as u64,
            CoordMetric::Pseudo => {
                let r = ((dx * dx + dy * dy) / 10.0).sqrt();
                let t = nint(r);
                if (t as f64) < r { t + 1 } else { t }
            }
            CoordMetric::Geographic => {
                let (lat_i, lon_i) = (geo_radians(xi), geo_radians(yi));
                let (lat_j, lon_j) = (geo_radians(xj), geo_radians(yj));
                let q1 = (lon_i - lon_j).cos();
                let q2 = (lat_i - lat_j).cos();
                let q3 = (lat_i + lat_j).cos();
                let arg = (0.5 * ((1.0 + q1) * q2 - (1.0 - q1) * q3)).clamp(-1.0, 1.0);
                (GEO_RADIUS * arg.acos() + 1.0) as u64
            }
        }
    }
}

fn is_section(line: &str) -> bool {
    line.ends_with("_SECTION") || line == "EOF"
}

fn parse_number(section: &'static str, token: &str) -> Result<f64, TsplibError> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TsplibError::InvalidValue {
            key: section,
            value: token.to_string(),
        }),
    }
}

impl TspInstance {
    /// Reads and parses the TSPLIB file at `path`.
    pub fn load(path: &Path) -> Result<Self, TsplibError> {
        let text = fs::read_to_string(path).map_err(|source| TsplibError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses a TSPLIB file.
    pub fn parse(text: &str) -> Result<Self, TsplibError> {
        let mut name = String::new();
        let mut dimension = None;
        let mut weight_type = None;
        let mut weight_format = None;
        let mut coords = None;
        let mut matrix_values = None;

        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        while let Some(line) = lines.next() {
            if line == "EOF" {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                match key.trim() {
                    "NAME" => name = value.to_string(),
                    "TYPE" if value != "TSP" => {
                        return Err(TsplibError::Unsupported(format!("TYPE {value}")));
                    }
                    "DIMENSION" => {
                        let n = value.parse::<usize>().map_err(|_| TsplibError::InvalidValue {
                            key: "DIMENSION",
                            value: value.to_string(),
                        })?;
                        dimension = Some(n);
                    }
                    "EDGE_WEIGHT_TYPE" => weight_type = Some(value.to_string()),
                    "EDGE_WEIGHT_FORMAT" => weight_format = Some(value.to_string()),
                    _ => {}
                }
                continue;
            }
            let n = dimension.ok_or(TsplibError::MissingField("DIMENSION"))?;
            match line {
                "NODE_COORD_SECTION" => {
                    let mut points = Vec::with_capacity(n);
                    while points.len() < n {
                        let Some(row) = lines.next_if(|l| !is_section(l)) else {
                            break;
                        };
                        let tokens: Vec<&str> = row.split_whitespace().collect();
                        let &[_, x, y] = tokens.as_slice() else {
                            return Err(TsplibError::InvalidValue {
                                key: "NODE_COORD_SECTION",
                                value: row.to_string(),
                            });
                        };
                        points.push((
                            parse_number("NODE_COORD_SECTION", x)?,
                            parse_number("NODE_COORD_SECTION", y)?,
                        ));
                    }
                    if points.len() < n {
                        return Err(TsplibError::Truncated {
                            section: "NODE_COORD_SECTION",
                            expected: n,
                            found: points.len(),
                        });
                    }
                    coords = Some(points);
                }
                "EDGE_WEIGHT_SECTION" => {
                    let mut values = vec![];
                    while let Some(row) = lines.next_if(|l| !is_section(l)) {
                        for token in row.split_whitespace() {
                            let v = parse_number("EDGE_WEIGHT_SECTION", token)?;
                            if v < 0.0 {
                                return Err(TsplibError::InvalidValue {
                                    key: "EDGE_WEIGHT_SECTION",
                                    value: token.to_string(),
                                });
                            }
                            values.push(v.round() as u64);
                        }
                    }
                    matrix_values = Some(values);
                }
                _ => {
                    // DISPLAY_DATA_SECTION and friends carry nothing we need
                    while lines.next_if(|l| !is_section(l)).is_some() {}
                }
            }
        }

        let dimension = dimension.ok_or(TsplibError::MissingField("DIMENSION"))?;
        let weight_type = weight_type.ok_or(TsplibError::MissingField("EDGE_WEIGHT_TYPE"))?;
        let metric = match weight_type.as_str() {
            "EUC_2D" => Some(CoordMetric::Euclidean),
            "CEIL_2D" => Some(CoordMetric::Ceiling),
            "ATT" => Some(CoordMetric::Pseudo),
            "GEO" => Some(CoordMetric::Geographic),
            "EXPLICIT" => None,
            other => return Err(TsplibError::Unsupported(format!("EDGE_WEIGHT_TYPE {other}"))),
        };
        let distances = match metric {
            Some(metric) => Distances::Coords {
                metric,
                coords: coords.ok_or(TsplibError::MissingField("NODE_COORD_SECTION"))?,
            },
            None => {
                let format = match weight_format
                    .as_deref()
                    .ok_or(TsplibError::MissingField("EDGE_WEIGHT_FORMAT"))?
                {
                    "FULL_MATRIX" => MatrixFormat::Full,
                    "UPPER_ROW" => MatrixFormat::UpperRow,
                    "LOWER_ROW" => MatrixFormat::LowerRow,
                    "UPPER_DIAG_ROW" => MatrixFormat::UpperDiagRow,
                    "LOWER_DIAG_ROW" => MatrixFormat::LowerDiagRow,
                    other => {
                        return Err(TsplibError::Unsupported(format!(
                            "EDGE_WEIGHT_FORMAT {other}"
                        )));
                    }
                };
                let values =
                    matrix_values.ok_or(TsplibError::MissingField("EDGE_WEIGHT_SECTION"))?;
                Distances::Matrix(expand_matrix(dimension, format, &values)?)
            }
        };
        Ok(Self {
            name,
            dimension,
            distances,
        })
    }

    /// The `NAME` entry of the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cities.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// TSPLIB distance between the 0-based cities `i` and `j`.
    pub fn distance(&self, i: usize, j: usize) -> u64 {
        match &self.distances {
            Distances::Coords { metric, coords } => metric.distance(coords[i], coords[j]),
            Distances::Matrix(m) => m[i * self.dimension + j],
        }
    }

    /// One edge per pair `u < v` of the complete graph.
    pub fn edges(&self) -> Vec<Edge> {
        let n = self.dimension;
        let mut edges = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for u in 0..n {
            for v in u + 1..n {
                edges.push(Edge {
                    u: u as u32,
                    v: v as u32,
                    weight: self.distance(u, v),
                });
            }
        }
        edges
    }

    /// Shuffles the complete graph with the generator for `key` and splits it between the parties.
    pub fn split(&self, key: &str) -> PartySplit {
        let mut rng = deterministic_seed(key);
        PartySplit::shuffled(self.dimension as u32, self.edges(), &mut rng)
    }
}

fn expand_matrix(n: usize, format: MatrixFormat, values: &[u64]) -> Result<Vec<u64>, TsplibError> {
    let mut cells: Vec<(usize, usize)> = vec![];
    for i in 0..n {
        let row: Box<dyn Iterator<Item = usize>> = match format {
            MatrixFormat::Full => Box::new(0..n),
            MatrixFormat::UpperRow => Box::new(i + 1..n),
            MatrixFormat::LowerRow => Box::new(0..i),
            MatrixFormat::UpperDiagRow => Box::new(i..n),
            MatrixFormat::LowerDiagRow => Box::new(0..=i),
        };
        cells.extend(row.map(|j| (i, j)));
    }
    if values.len() < cells.len() {
        return Err(TsplibError::Truncated {
            section: "EDGE_WEIGHT_SECTION",
            expected: cells.len(),
            found: values.len(),
        });
    }
    let mut matrix = vec![0; n * n];
    for (&(i, j), &w) in cells.iter().zip(values) {
        matrix[i * n + j] = w;
        if format != MatrixFormat::Full {
            matrix[j * n + i] = w;
        }
    }
    Ok(matrix)
}
