//! SQLite input reader.
//!
//! The database carries a `Node` and a `Link` table plus static / time
//! tables per node kind; any table may be absent when the model has no
//! nodes of that kind. Time columns hold seconds since the configured
//! start time.

use rusqlite::Connection;

use crate::errors::LoadError;
use crate::io::tables::*;

pub fn read_model(path: &str) -> Result<ModelData, LoadError> {
    let conn = Connection::open(path)?;
    read_from_connection(&conn)
}

pub fn read_from_connection(conn: &Connection) -> Result<ModelData, LoadError> {
    let mut data = ModelData::default();

    data.nodes = read_table(conn, "Node", |row| {
        Ok(NodeRow {
            id: row.get("node_id")?,
            kind: row.get("node_type")?,
            subnetwork: row.get::<_, Option<i64>>("subnetwork_id")?.unwrap_or(0),
            cyclic: row.get::<_, Option<bool>>("cyclic_time")?.unwrap_or(false),
        })
    })?;
    data.links = read_table(conn, "Link", |row| {
        Ok(LinkRow {
            id: row.get("link_id")?,
            from_id: row.get("from_node_id")?,
            to_id: row.get("to_node_id")?,
            kind: row.get("link_type")?,
            subnetwork: row.get::<_, Option<i64>>("subnetwork_id")?.unwrap_or(0),
        })
    })?;

    data.basin_profile = read_table(conn, "basin_profile", |row| {
        Ok(BasinProfileRow {
            node_id: row.get("node_id")?,
            level: row.get("level")?,
            area: row.get("area")?,
        })
    })?;
    data.basin_state = read_table(conn, "basin_state", |row| {
        Ok(BasinStateRow {
            node_id: row.get("node_id")?,
            storage: row.get("storage")?,
            level: row.get("level")?,
        })
    })?;
    data.basin_static = read_table(conn, "basin_static", |row| {
        Ok(BasinStaticRow {
            node_id: row.get("node_id")?,
            precipitation: row.get("precipitation")?,
            surface_runoff: row.get("surface_runoff")?,
            drainage: row.get("drainage")?,
            potential_evaporation: row.get("potential_evaporation")?,
            infiltration: row.get("infiltration")?,
        })
    })?;
    data.basin_time = read_table(conn, "basin_time", |row| {
        Ok(BasinTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            precipitation: row.get("precipitation")?,
            surface_runoff: row.get("surface_runoff")?,
            drainage: row.get("drainage")?,
            potential_evaporation: row.get("potential_evaporation")?,
            infiltration: row.get("infiltration")?,
        })
    })?;
    data.basin_concentration = read_concentration(conn, "basin_concentration")?;

    data.flow_boundary_static = read_table(conn, "flow_boundary_static", |row| {
        Ok(FlowBoundaryRow {
            node_id: row.get("node_id")?,
            flow_rate: row.get("flow_rate")?,
        })
    })?;
    data.flow_boundary_time = read_table(conn, "flow_boundary_time", |row| {
        Ok(FlowBoundaryTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            flow_rate: row.get("flow_rate")?,
        })
    })?;
    data.flow_boundary_concentration = read_concentration(conn, "flow_boundary_concentration")?;
    data.level_boundary_static = read_table(conn, "level_boundary_static", |row| {
        Ok(LevelBoundaryRow {
            node_id: row.get("node_id")?,
            level: row.get("level")?,
        })
    })?;
    data.level_boundary_time = read_table(conn, "level_boundary_time", |row| {
        Ok(LevelBoundaryTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            level: row.get("level")?,
        })
    })?;
    data.level_boundary_concentration = read_concentration(conn, "level_boundary_concentration")?;

    data.linear_resistance = read_table(conn, "linear_resistance_static", |row| {
        Ok(LinearResistanceRow {
            node_id: row.get("node_id")?,
            resistance: row.get("resistance")?,
            max_flow_rate: row.get("max_flow_rate")?,
            control_state: row.get("control_state")?,
        })
    })?;
    data.manning_resistance = read_table(conn, "manning_resistance_static", |row| {
        Ok(ManningResistanceRow {
            node_id: row.get("node_id")?,
            length: row.get("length")?,
            manning_n: row.get("manning_n")?,
            profile_width: row.get("profile_width")?,
            profile_slope: row.get("profile_slope")?,
        })
    })?;
    data.rating_curve = read_table(conn, "tabulated_rating_curve_static", |row| {
        Ok(RatingCurveRow {
            node_id: row.get("node_id")?,
            level: row.get("level")?,
            flow_rate: row.get("flow_rate")?,
            control_state: row.get("control_state")?,
        })
    })?;
    data.rating_curve_time = read_table(conn, "tabulated_rating_curve_time", |row| {
        Ok(RatingCurveTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            level: row.get("level")?,
            flow_rate: row.get("flow_rate")?,
        })
    })?;

    data.pump_static = read_structures(conn, "pump_static")?;
    data.pump_time = read_structure_times(conn, "pump_time")?;
    data.outlet_static = read_structures(conn, "outlet_static")?;
    data.outlet_time = read_structure_times(conn, "outlet_time")?;

    data.user_demand_static = read_table(conn, "user_demand_static", |row| {
        Ok(UserDemandRow {
            node_id: row.get("node_id")?,
            priority: row.get("priority")?,
            demand: row.get("demand")?,
            return_factor: row.get::<_, Option<f64>>("return_factor")?.unwrap_or(0.0),
            min_level: row.get::<_, Option<f64>>("min_level")?.unwrap_or(f64::NEG_INFINITY),
        })
    })?;
    data.user_demand_time = read_table(conn, "user_demand_time", |row| {
        Ok(UserDemandTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            priority: row.get("priority")?,
            demand: row.get("demand")?,
        })
    })?;
    data.level_demand = read_table(conn, "level_demand_static", |row| {
        Ok(LevelDemandRow {
            node_id: row.get("node_id")?,
            priority: row.get("priority")?,
            min_level: row.get("min_level")?,
            max_level: row.get::<_, Option<f64>>("max_level")?.unwrap_or(f64::INFINITY),
        })
    })?;
    data.flow_demand = read_table(conn, "flow_demand_static", |row| {
        Ok(FlowDemandRow {
            node_id: row.get("node_id")?,
            priority: row.get("priority")?,
            demand: row.get("demand")?,
        })
    })?;

    data.discrete_control_variable = read_variables(conn, "discrete_control_variable")?;
    data.discrete_control_condition = read_table(conn, "discrete_control_condition", |row| {
        Ok(ControlConditionRow {
            node_id: row.get("node_id")?,
            compound_id: row.get("compound_variable_id")?,
            threshold_high: row.get("threshold_high")?,
            threshold_low: row.get::<_, Option<f64>>("threshold_low")?.unwrap_or(f64::NAN),
        })
    })?;
    data.discrete_control_logic = read_table(conn, "discrete_control_logic", |row| {
        Ok(ControlLogicRow {
            node_id: row.get("node_id")?,
            truth_state: row.get("truth_state")?,
            control_state: row.get("control_state")?,
        })
    })?;
    data.continuous_control_variable = read_variables(conn, "continuous_control_variable")?;
    data.continuous_control_function = read_table(conn, "continuous_control_function", |row| {
        Ok(ControlFunctionRow {
            node_id: row.get("node_id")?,
            input: row.get("input")?,
            output: row.get("output")?,
            controlled_parameter: row.get("controlled_parameter")?,
        })
    })?;

    data.pid_control_static = read_table(conn, "pid_control_static", |row| {
        Ok(PidControlRow {
            node_id: row.get("node_id")?,
            listen_id: row.get("listen_node_id")?,
            target: row.get("target")?,
            proportional: row.get("proportional")?,
            integral: row.get("integral")?,
            derivative: row.get("derivative")?,
        })
    })?;
    data.pid_control_time = read_table(conn, "pid_control_time", |row| {
        Ok(PidControlTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            target: row.get("target")?,
            proportional: row.get("proportional")?,
            integral: row.get("integral")?,
            derivative: row.get("derivative")?,
        })
    })?;

    Ok(data)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let count: i64 = stmt.query_row([name], |row| row.get(0))?;
    Ok(count > 0)
}

fn read_table<T>(
    conn: &Connection,
    name: &str,
    map: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, LoadError> {
    if !table_exists(conn, name)? {
        return Ok(vec![]);
    }
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", name))
        .map_err(LoadError::Database)?;
    let rows = stmt
        .query_map([], |row| map(row))
        .map_err(LoadError::Database)?;
    let mut out = vec![];
    for row in rows {
        out.push(row.map_err(|e| LoadError::Table {
            table: name.to_string(),
            message: e.to_string(),
        })?);
    }
    Ok(out)
}

fn read_concentration(conn: &Connection, name: &str) -> Result<Vec<ConcentrationRow>, LoadError> {
    read_table(conn, name, |row| {
        Ok(ConcentrationRow {
            node_id: row.get("node_id")?,
            substance: row.get("substance")?,
            concentration: row.get("concentration")?,
        })
    })
}

fn read_structures(conn: &Connection, name: &str) -> Result<Vec<StructureRow>, LoadError> {
    read_table(conn, name, |row| {
        Ok(StructureRow {
            node_id: row.get("node_id")?,
            flow_rate: row.get("flow_rate")?,
            min_flow_rate: row.get("min_flow_rate")?,
            max_flow_rate: row.get("max_flow_rate")?,
            min_upstream_level: row.get("min_upstream_level")?,
            max_downstream_level: row.get("max_downstream_level")?,
            control_state: row.get("control_state")?,
            allocation_controlled: row
                .get::<_, Option<bool>>("allocation_controlled")?
                .unwrap_or(false),
        })
    })
}

fn read_structure_times(conn: &Connection, name: &str) -> Result<Vec<StructureTimeRow>, LoadError> {
    read_table(conn, name, |row| {
        Ok(StructureTimeRow {
            node_id: row.get("node_id")?,
            time: row.get("time")?,
            flow_rate: row.get("flow_rate")?,
            min_flow_rate: row.get("min_flow_rate")?,
            max_flow_rate: row.get("max_flow_rate")?,
            min_upstream_level: row.get("min_upstream_level")?,
            max_downstream_level: row.get("max_downstream_level")?,
        })
    })
}

fn read_variables(conn: &Connection, name: &str) -> Result<Vec<ControlVariableRow>, LoadError> {
    read_table(conn, name, |row| {
        Ok(ControlVariableRow {
            node_id: row.get("node_id")?,
            compound_id: row.get::<_, Option<i64>>("compound_variable_id")?.unwrap_or(0),
            listen_id: row.get("listen_node_id")?,
            variable: row.get("variable")?,
            weight: row.get::<_, Option<f64>>("weight")?.unwrap_or(1.0),
            look_ahead: row.get::<_, Option<f64>>("look_ahead")?.unwrap_or(0.0),
        })
    })
}
