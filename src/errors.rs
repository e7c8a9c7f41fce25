use std::fmt;
use thiserror::Error;

use crate::network::graph::NodeId;

/// A single problem found while checking the tabular input. Issues are
/// collected across the whole input so a user sees every mistake at once
/// rather than fixing them one failed load at a time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationIssue {
    #[error("link #{link_id}: duplicate flow link from {from} to {to}")]
    DuplicateLink { link_id: i64, from: NodeId, to: NodeId },

    #[error("link #{link_id}: references unknown node #{node_id}")]
    UnknownNode { link_id: i64, node_id: i64 },

    #[error("{node}: expected {expected} {direction} flow link(s), found {found}")]
    NeighbourCount {
        node: NodeId,
        direction: &'static str,
        expected: String,
        found: usize,
    },

    #[error("{node}: profile level must be strictly increasing (row {row})")]
    ProfileNotMonotone { node: NodeId, row: usize },

    #[error("{node}: profile area must be positive and non-decreasing (row {row})")]
    ProfileBadArea { node: NodeId, row: usize },

    #[error("{node}: subnetwork id must be a positive integer")]
    BadSubnetworkId { node: NodeId },

    #[error("{node}: logic table state '{state}' contains characters other than T, F and *")]
    BadTruthState { node: NodeId, state: String },

    #[error("{node}: logic table maps truth state '{state}' twice after wildcard expansion")]
    AmbiguousTruthState { node: NodeId, state: String },

    #[error("{node}: logic table state '{state}' has {found} conditions, node declares {expected}")]
    TruthStateLength {
        node: NodeId,
        state: String,
        expected: usize,
        found: usize,
    },

    #[error("{node}: repeated timestamp {time} in a time table")]
    RepeatedTimestamp { node: NodeId, time: f64 },

    #[error("{node}: {message}")]
    Node { node: NodeId, message: String },

    #[error("link #{link_id}: {message}")]
    Link { link_id: i64, message: String },

    #[error("{0}")]
    Table(String),
}

/// Everything collected while loading a model. Rendered as one message,
/// one issue per line.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { issues: vec![] }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turn the collected issues into a load failure, or Ok when clean.
    pub fn into_result(self) -> Result<(), LoadError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(LoadError::Validation(self))
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} problem(s) found in the model input:", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  - {}", issue)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown solver algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("unsupported interpolation method '{0}'")]
    UnsupportedInterpolation(String),

    #[error("could not parse datetime '{0}', expected e.g. 2020-01-01 00:00:00")]
    BadDatetime(String),

    #[error("{0}")]
    Incompatible(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0}")]
    Validation(ValidationReport),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{table}': {message}")]
    Table { table: String, message: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("integrator diverged at t = {t}: {message}")]
    Diverged { t: f64, message: String },

    #[error("water balance error {error:.6e} exceeds tolerance at t = {t} for {node}")]
    WaterBalance { t: f64, node: NodeId, error: f64 },

    #[error("allocation failed for subnetwork {subnetwork} at t = {t}: {message}")]
    AllocationInfeasible {
        subnetwork: u32,
        t: f64,
        message: String,
    },

    #[error("allocation for subnetwork {subnetwork} exceeded the iteration limit twice at t = {t}")]
    AllocationTimeout { subnetwork: u32, t: f64 },

    #[error("forcing interpolation for {node} returned NaN at t = {t}")]
    ForcingNan { node: NodeId, t: f64 },

    #[error("simulation cancelled at t = {t}")]
    Cancelled { t: f64 },

    #[error("could not write output: {0}")]
    Output(String),
}

/// Umbrella error for everything a model run can fail with. The C facade
/// renders this through Display into its last-error slot.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Run(#[from] RunError),
}
