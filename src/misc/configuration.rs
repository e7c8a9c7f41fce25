use chrono::NaiveDateTime;
use serde_derive::Deserialize;

use crate::allocation::SourcePriorities;
use crate::errors::ConfigError;
use crate::numerical::interpolation::InterpolationMethod;
use crate::solver::integrator::{AlgorithmKind, IntegratorSettings};

/// The single TOML document driving a simulation. Times inside the run
/// are seconds since `starttime`.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub starttime: String,
    pub endtime: String,
    /// Path of the input database, relative to the TOML file.
    pub input_path: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    /// Output interval in seconds.
    #[serde(default = "default_saveat")]
    pub saveat: f64,

    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub allocation: AllocationSection,
    #[serde(default)]
    pub interpolation: InterpolationSection,
    #[serde(default)]
    pub numerics: NumericsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub algorithm: String,
    pub abstol: f64,
    pub reltol: f64,
    pub dt_initial: f64,
    pub dtmin: f64,
    pub dtmax: f64,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            algorithm: "rk23".to_string(),
            abstol: 1e-6,
            reltol: 1e-5,
            dt_initial: 60.0,
            dtmin: 1e-12,
            dtmax: 86400.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllocationSection {
    pub use_allocation: bool,
    /// Seconds between allocation solves.
    pub timestep: f64,
    pub source_priority_flow_boundary: u32,
    pub source_priority_main_inlet: u32,
    pub source_priority_basin: u32,
}

impl Default for AllocationSection {
    fn default() -> Self {
        Self {
            use_allocation: false,
            timestep: 86400.0,
            source_priority_flow_boundary: 1,
            source_priority_main_inlet: 2,
            source_priority_basin: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpolationSection {
    /// Method for basin forcings and boundary series.
    pub forcing: String,
    /// Method for controllable structure series (rates, brackets).
    pub flow_rate: String,
    /// Method for demand series.
    pub demand: String,
}

impl Default for InterpolationSection {
    fn default() -> Self {
        Self {
            forcing: "linear".to_string(),
            flow_rate: "linear".to_string(),
            demand: "linear".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NumericsSection {
    pub water_balance_abstol: f64,
    pub water_balance_reltol: f64,
    /// Warn when an outlet crest starts above its source level by more
    /// than this.
    pub level_difference_threshold: f64,
    /// Opt-in floor for the PID derivative denominator; 0 disables.
    pub pid_derivative_floor: f64,
}

impl Default for NumericsSection {
    fn default() -> Self {
        Self {
            water_balance_abstol: 1e-3,
            water_balance_reltol: 1e-2,
            level_difference_threshold: 0.1,
            pid_derivative_floor: 0.0,
        }
    }
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_saveat() -> f64 {
    86400.0
}

impl Configuration {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Configuration = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm()?;
        self.forcing_method()?;
        self.flow_rate_method()?;
        self.demand_method()?;
        if self.duration()? <= 0.0 {
            return Err(ConfigError::Incompatible(
                "endtime must be after starttime".to_string(),
            ));
        }
        if self.saveat <= 0.0 {
            return Err(ConfigError::Incompatible(
                "saveat must be positive".to_string(),
            ));
        }
        if self.allocation.use_allocation && self.allocation.timestep <= 0.0 {
            return Err(ConfigError::Incompatible(
                "allocation timestep must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn start(&self) -> Result<NaiveDateTime, ConfigError> {
        parse_datetime(&self.starttime)
    }

    pub fn end(&self) -> Result<NaiveDateTime, ConfigError> {
        parse_datetime(&self.endtime)
    }

    /// Simulated span in seconds.
    pub fn duration(&self) -> Result<f64, ConfigError> {
        let span = self.end()? - self.start()?;
        Ok(span.num_milliseconds() as f64 / 1000.0)
    }

    pub fn algorithm(&self) -> Result<AlgorithmKind, ConfigError> {
        AlgorithmKind::from_name(&self.solver.algorithm)
    }

    pub fn integrator_settings(&self) -> IntegratorSettings {
        IntegratorSettings {
            abstol: self.solver.abstol,
            reltol: self.solver.reltol,
            dt_initial: self.solver.dt_initial,
            dtmin: self.solver.dtmin,
            dtmax: self.solver.dtmax,
        }
    }

    pub fn source_priorities(&self) -> SourcePriorities {
        SourcePriorities {
            flow_boundary: self.allocation.source_priority_flow_boundary,
            main_inlet: self.allocation.source_priority_main_inlet,
            basin: self.allocation.source_priority_basin,
        }
    }

    pub fn forcing_method(&self) -> Result<InterpolationMethod, ConfigError> {
        parse_method(&self.interpolation.forcing)
    }

    pub fn flow_rate_method(&self) -> Result<InterpolationMethod, ConfigError> {
        parse_method(&self.interpolation.flow_rate)
    }

    pub fn demand_method(&self) -> Result<InterpolationMethod, ConfigError> {
        parse_method(&self.interpolation.demand)
    }

    pub fn pid_derivative_floor(&self) -> Option<f64> {
        if self.numerics.pid_derivative_floor > 0.0 {
            Some(self.numerics.pid_derivative_floor)
        } else {
            None
        }
    }
}

fn parse_method(name: &str) -> Result<InterpolationMethod, ConfigError> {
    Ok(match name {
        "linear" => InterpolationMethod::Linear,
        "block" => InterpolationMethod::Block,
        "pchip" => InterpolationMethod::Pchip,
        other => return Err(ConfigError::UnsupportedInterpolation(other.to_string())),
    })
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, ConfigError> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(ConfigError::BadDatetime(text.to_string()))
}
