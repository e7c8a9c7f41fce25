//! Shared helpers for building small in-memory models.

use chrono::{Duration, NaiveDate};

use crate::io::tables::{LinkRow, NodeRow};
use crate::misc::configuration::Configuration;

/// A configuration spanning the given number of seconds from a fixed
/// start date, with extra TOML sections appended verbatim.
pub fn configuration(seconds: i64, saveat: f64, extra: &str) -> Configuration {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let end = start + Duration::seconds(seconds);
    let toml = format!(
        "starttime = \"{}\"\nendtime = \"{}\"\ninput_path = \"model.db\"\nsaveat = {}\n{}",
        start.format("%Y-%m-%d %H:%M:%S"),
        end.format("%Y-%m-%d %H:%M:%S"),
        saveat,
        extra
    );
    Configuration::from_toml(&toml).unwrap()
}

pub fn node(id: i64, kind: &str) -> NodeRow {
    NodeRow {
        id,
        kind: kind.to_string(),
        subnetwork: 0,
        cyclic: false,
    }
}

pub fn subnetwork_node(id: i64, kind: &str, subnetwork: i64) -> NodeRow {
    NodeRow {
        id,
        kind: kind.to_string(),
        subnetwork,
        cyclic: false,
    }
}

pub fn flow_link(id: i64, from_id: i64, to_id: i64) -> LinkRow {
    LinkRow {
        id,
        from_id,
        to_id,
        kind: "flow".to_string(),
        subnetwork: 0,
    }
}

pub fn subnetwork_flow_link(id: i64, from_id: i64, to_id: i64, subnetwork: i64) -> LinkRow {
    LinkRow {
        id,
        from_id,
        to_id,
        kind: "flow".to_string(),
        subnetwork,
    }
}

pub fn control_link(id: i64, from_id: i64, to_id: i64) -> LinkRow {
    LinkRow {
        id,
        from_id,
        to_id,
        kind: "control".to_string(),
        subnetwork: 0,
    }
}
