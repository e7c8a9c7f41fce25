//! Typed rows for every input table. The SQLite reader produces a
//! `ModelData`; tests build one directly, so the loader never cares
//! where rows came from. Time columns are seconds since the configured
//! start time.

#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: i64,
    pub kind: String,
    /// 0 = not part of any allocation subnetwork.
    pub subnetwork: i64,
    /// Periodic extrapolation for this node's time series.
    pub cyclic: bool,
}

#[derive(Debug, Clone)]
pub struct LinkRow {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub kind: String,
    pub subnetwork: i64,
}

#[derive(Debug, Clone)]
pub struct BasinProfileRow {
    pub node_id: i64,
    pub level: f64,
    pub area: f64,
}

#[derive(Debug, Clone)]
pub struct BasinStateRow {
    pub node_id: i64,
    pub storage: Option<f64>,
    pub level: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct BasinStaticRow {
    pub node_id: i64,
    pub precipitation: Option<f64>,
    pub surface_runoff: Option<f64>,
    pub drainage: Option<f64>,
    pub potential_evaporation: Option<f64>,
    pub infiltration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct BasinTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub precipitation: Option<f64>,
    pub surface_runoff: Option<f64>,
    pub drainage: Option<f64>,
    pub potential_evaporation: Option<f64>,
    pub infiltration: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ConcentrationRow {
    pub node_id: i64,
    pub substance: String,
    pub concentration: f64,
}

#[derive(Debug, Clone)]
pub struct FlowBoundaryRow {
    pub node_id: i64,
    pub flow_rate: f64,
}

#[derive(Debug, Clone)]
pub struct FlowBoundaryTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub flow_rate: f64,
}

#[derive(Debug, Clone)]
pub struct LevelBoundaryRow {
    pub node_id: i64,
    pub level: f64,
}

#[derive(Debug, Clone)]
pub struct LevelBoundaryTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub level: f64,
}

#[derive(Debug, Clone)]
pub struct LinearResistanceRow {
    pub node_id: i64,
    pub resistance: f64,
    pub max_flow_rate: Option<f64>,
    pub control_state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ManningResistanceRow {
    pub node_id: i64,
    pub length: f64,
    pub manning_n: f64,
    pub profile_width: f64,
    pub profile_slope: f64,
}

/// One (level, flow) point of a rating curve variant. Points with the
/// same (node, control_state) form one table.
#[derive(Debug, Clone)]
pub struct RatingCurveRow {
    pub node_id: i64,
    pub level: f64,
    pub flow_rate: f64,
    pub control_state: Option<String>,
}

/// Time-switched rating curves: points with the same (node, time) form
/// one variant, activated from that time on.
#[derive(Debug, Clone)]
pub struct RatingCurveTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub level: f64,
    pub flow_rate: f64,
}

/// Shared by pumps and outlets. For outlets `min_upstream_level` is the
/// crest level.
#[derive(Debug, Clone, Default)]
pub struct StructureRow {
    pub node_id: i64,
    pub flow_rate: f64,
    pub min_flow_rate: Option<f64>,
    pub max_flow_rate: Option<f64>,
    pub min_upstream_level: Option<f64>,
    pub max_downstream_level: Option<f64>,
    pub control_state: Option<String>,
    pub allocation_controlled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StructureTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub flow_rate: f64,
    pub min_flow_rate: Option<f64>,
    pub max_flow_rate: Option<f64>,
    pub min_upstream_level: Option<f64>,
    pub max_downstream_level: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct UserDemandRow {
    pub node_id: i64,
    pub priority: i64,
    pub demand: f64,
    pub return_factor: f64,
    pub min_level: f64,
}

#[derive(Debug, Clone)]
pub struct UserDemandTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub priority: i64,
    pub demand: f64,
}

#[derive(Debug, Clone)]
pub struct LevelDemandRow {
    pub node_id: i64,
    pub priority: i64,
    pub min_level: f64,
    pub max_level: f64,
}

#[derive(Debug, Clone)]
pub struct FlowDemandRow {
    pub node_id: i64,
    pub priority: i64,
    pub demand: f64,
}

/// One term of a compound variable; shared by discrete and continuous
/// control.
#[derive(Debug, Clone)]
pub struct ControlVariableRow {
    pub node_id: i64,
    pub compound_id: i64,
    pub listen_id: i64,
    pub variable: String,
    pub weight: f64,
    pub look_ahead: f64,
}

#[derive(Debug, Clone)]
pub struct ControlConditionRow {
    pub node_id: i64,
    pub compound_id: i64,
    pub threshold_high: f64,
    pub threshold_low: f64,
}

#[derive(Debug, Clone)]
pub struct ControlLogicRow {
    pub node_id: i64,
    pub truth_state: String,
    pub control_state: String,
}

#[derive(Debug, Clone)]
pub struct ControlFunctionRow {
    pub node_id: i64,
    pub input: f64,
    pub output: f64,
    pub controlled_parameter: String,
}

#[derive(Debug, Clone)]
pub struct PidControlRow {
    pub node_id: i64,
    pub listen_id: i64,
    pub target: f64,
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
}

#[derive(Debug, Clone)]
pub struct PidControlTimeRow {
    pub node_id: i64,
    pub time: f64,
    pub target: f64,
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
}

/// Everything a model is built from.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub nodes: Vec<NodeRow>,
    pub links: Vec<LinkRow>,

    pub basin_profile: Vec<BasinProfileRow>,
    pub basin_state: Vec<BasinStateRow>,
    pub basin_static: Vec<BasinStaticRow>,
    pub basin_time: Vec<BasinTimeRow>,
    pub basin_concentration: Vec<ConcentrationRow>,

    pub flow_boundary_static: Vec<FlowBoundaryRow>,
    pub flow_boundary_time: Vec<FlowBoundaryTimeRow>,
    pub flow_boundary_concentration: Vec<ConcentrationRow>,
    pub level_boundary_static: Vec<LevelBoundaryRow>,
    pub level_boundary_time: Vec<LevelBoundaryTimeRow>,
    pub level_boundary_concentration: Vec<ConcentrationRow>,

    pub linear_resistance: Vec<LinearResistanceRow>,
    pub manning_resistance: Vec<ManningResistanceRow>,
    pub rating_curve: Vec<RatingCurveRow>,
    pub rating_curve_time: Vec<RatingCurveTimeRow>,

    pub pump_static: Vec<StructureRow>,
    pub pump_time: Vec<StructureTimeRow>,
    pub outlet_static: Vec<StructureRow>,
    pub outlet_time: Vec<StructureTimeRow>,

    pub user_demand_static: Vec<UserDemandRow>,
    pub user_demand_time: Vec<UserDemandTimeRow>,
    pub level_demand: Vec<LevelDemandRow>,
    pub flow_demand: Vec<FlowDemandRow>,

    pub discrete_control_variable: Vec<ControlVariableRow>,
    pub discrete_control_condition: Vec<ControlConditionRow>,
    pub discrete_control_logic: Vec<ControlLogicRow>,
    pub continuous_control_variable: Vec<ControlVariableRow>,
    pub continuous_control_function: Vec<ControlFunctionRow>,

    pub pid_control_static: Vec<PidControlRow>,
    pub pid_control_time: Vec<PidControlTimeRow>,
}
