//! Columnar CSV output: periodic saves plus the event logs.

use std::path::Path;

use crate::allocation::{DemandRecord, FlowRecord};
use crate::control::ControlTransition;
use crate::errors::RunError;

#[derive(Debug, Clone)]
pub struct BasinSaveRow {
    pub t: f64,
    pub node_id: i64,
    pub storage: f64,
    pub level: f64,
    pub balance_error: f64,
}

#[derive(Debug, Clone)]
pub struct FlowSaveRow {
    pub t: f64,
    pub link_id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub flow: f64,
}

#[derive(Debug, Clone)]
pub struct ConcentrationSaveRow {
    pub t: f64,
    pub node_id: i64,
    pub substance: String,
    pub concentration: f64,
}

/// Everything a run accumulates for the periodic save files.
#[derive(Debug, Clone, Default)]
pub struct SavedResults {
    pub basin: Vec<BasinSaveRow>,
    pub flow: Vec<FlowSaveRow>,
    pub concentration: Vec<ConcentrationSaveRow>,
}

pub fn write_outputs(
    dir: &str,
    saved: &SavedResults,
    transitions: &[ControlTransition],
    demand_records: &[DemandRecord],
    flow_records: &[FlowRecord],
) -> Result<(), RunError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| RunError::Output(format!("could not create '{}': {}", dir, e)))?;

    write_basin(dir, saved)?;
    write_flow(dir, saved)?;
    if !saved.concentration.is_empty() {
        write_concentration(dir, saved)?;
    }
    write_control(dir, transitions)?;
    if !demand_records.is_empty() || !flow_records.is_empty() {
        write_allocation(dir, demand_records, flow_records)?;
    }
    Ok(())
}

fn writer(dir: &str, name: &str) -> Result<csv::Writer<std::fs::File>, RunError> {
    let path = Path::new(dir).join(name);
    csv::Writer::from_path(&path)
        .map_err(|e| RunError::Output(format!("could not open '{}': {}", path.display(), e)))
}

fn fail(name: &str, e: csv::Error) -> RunError {
    RunError::Output(format!("could not write {}: {}", name, e))
}

fn write_basin(dir: &str, saved: &SavedResults) -> Result<(), RunError> {
    let mut w = writer(dir, "basin.csv")?;
    w.write_record(["time", "node_id", "storage", "level", "balance_error"])
        .map_err(|e| fail("basin.csv", e))?;
    for row in &saved.basin {
        w.write_record(&[
            row.t.to_string(),
            row.node_id.to_string(),
            row.storage.to_string(),
            row.level.to_string(),
            row.balance_error.to_string(),
        ])
        .map_err(|e| fail("basin.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush basin.csv: {}", e)))?;
    Ok(())
}

fn write_flow(dir: &str, saved: &SavedResults) -> Result<(), RunError> {
    let mut w = writer(dir, "flow.csv")?;
    w.write_record(["time", "link_id", "from_node_id", "to_node_id", "flow_rate"])
        .map_err(|e| fail("flow.csv", e))?;
    for row in &saved.flow {
        w.write_record(&[
            row.t.to_string(),
            row.link_id.to_string(),
            row.from_id.to_string(),
            row.to_id.to_string(),
            row.flow.to_string(),
        ])
        .map_err(|e| fail("flow.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush flow.csv: {}", e)))?;
    Ok(())
}

fn write_concentration(dir: &str, saved: &SavedResults) -> Result<(), RunError> {
    let mut w = writer(dir, "concentration.csv")?;
    w.write_record(["time", "node_id", "substance", "concentration"])
        .map_err(|e| fail("concentration.csv", e))?;
    for row in &saved.concentration {
        w.write_record(&[
            row.t.to_string(),
            row.node_id.to_string(),
            row.substance.clone(),
            row.concentration.to_string(),
        ])
        .map_err(|e| fail("concentration.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush concentration.csv: {}", e)))?;
    Ok(())
}

fn write_control(dir: &str, transitions: &[ControlTransition]) -> Result<(), RunError> {
    let mut w = writer(dir, "control.csv")?;
    w.write_record(["time", "node_id", "truth_state", "control_state"])
        .map_err(|e| fail("control.csv", e))?;
    for row in transitions {
        w.write_record(&[
            row.t.to_string(),
            row.node.id.to_string(),
            row.truth_state.clone(),
            row.control_state.clone(),
        ])
        .map_err(|e| fail("control.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush control.csv: {}", e)))?;
    Ok(())
}

fn write_allocation(
    dir: &str,
    demand_records: &[DemandRecord],
    flow_records: &[FlowRecord],
) -> Result<(), RunError> {
    let mut w = writer(dir, "allocation.csv")?;
    w.write_record([
        "time",
        "subnetwork_id",
        "node_id",
        "priority",
        "demand",
        "allocated",
        "realized",
    ])
    .map_err(|e| fail("allocation.csv", e))?;
    for row in demand_records {
        w.write_record(&[
            row.t.to_string(),
            row.subnetwork.to_string(),
            row.node_id.to_string(),
            row.priority.to_string(),
            row.demand.to_string(),
            row.allocated.to_string(),
            row.realized.to_string(),
        ])
        .map_err(|e| fail("allocation.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush allocation.csv: {}", e)))?;

    let mut w = writer(dir, "allocation_flow.csv")?;
    w.write_record(["time", "subnetwork_id", "from_node_id", "to_node_id", "flow_rate"])
        .map_err(|e| fail("allocation_flow.csv", e))?;
    for row in flow_records {
        w.write_record(&[
            row.t.to_string(),
            row.subnetwork.to_string(),
            row.from_id.to_string(),
            row.to_id.to_string(),
            row.flow.to_string(),
        ])
        .map_err(|e| fail("allocation_flow.csv", e))?;
    }
    w.flush()
        .map_err(|e| RunError::Output(format!("could not flush allocation_flow.csv: {}", e)))?;
    Ok(())
}
