use float_cmp::assert_approx_eq;
use rusqlite::Connection;

use crate::io::loader::build_model;
use crate::io::sqlite_io::read_from_connection;
use crate::tests::support::configuration;

/// The two-basin equalisation model as a database.
pub fn create_two_basin_db(conn: &Connection) {
    conn.execute_batch(
        "
        CREATE TABLE Node (node_id INTEGER, node_type TEXT, subnetwork_id INTEGER, cyclic_time BOOLEAN);
        CREATE TABLE Link (link_id INTEGER, from_node_id INTEGER, to_node_id INTEGER, link_type TEXT, subnetwork_id INTEGER);
        CREATE TABLE basin_profile (node_id INTEGER, level REAL, area REAL);
        CREATE TABLE basin_state (node_id INTEGER, storage REAL, level REAL);
        CREATE TABLE linear_resistance_static (node_id INTEGER, resistance REAL, max_flow_rate REAL, control_state TEXT);

        INSERT INTO Node VALUES (1, 'Basin', NULL, NULL);
        INSERT INTO Node VALUES (2, 'LinearResistance', NULL, NULL);
        INSERT INTO Node VALUES (3, 'Basin', NULL, NULL);
        INSERT INTO Link VALUES (1, 1, 2, 'flow', NULL);
        INSERT INTO Link VALUES (2, 2, 3, 'flow', NULL);
        INSERT INTO basin_profile VALUES (1, 0.0, 1.0);
        INSERT INTO basin_profile VALUES (1, 1000.0, 1.0);
        INSERT INTO basin_profile VALUES (3, 0.0, 1.0);
        INSERT INTO basin_profile VALUES (3, 1000.0, 1.0);
        INSERT INTO basin_state VALUES (1, 100.0, NULL);
        INSERT INTO basin_state VALUES (3, 0.0, NULL);
        INSERT INTO linear_resistance_static VALUES (2, 1.0, NULL, NULL);
        ",
    )
    .unwrap();
}

#[test]
fn test_read_model_tables() {
    let conn = Connection::open_in_memory().unwrap();
    create_two_basin_db(&conn);
    let data = read_from_connection(&conn).unwrap();

    assert_eq!(data.nodes.len(), 3);
    assert_eq!(data.nodes[0].kind, "Basin");
    assert_eq!(data.nodes[0].subnetwork, 0);
    assert!(!data.nodes[0].cyclic);
    assert_eq!(data.links.len(), 2);
    assert_eq!(data.links[1].from_id, 2);
    assert_eq!(data.basin_profile.len(), 4);
    assert_eq!(data.basin_state.len(), 2);
    assert_eq!(data.basin_state[0].storage, Some(100.0));
    assert_eq!(data.linear_resistance.len(), 1);
    assert!(data.linear_resistance[0].max_flow_rate.is_none());
    // Absent tables read as empty
    assert!(data.pump_static.is_empty());
    assert!(data.rating_curve.is_empty());
}

#[test]
fn test_database_model_runs_end_to_end() {
    let conn = Connection::open_in_memory().unwrap();
    create_two_basin_db(&conn);
    let data = read_from_connection(&conn).unwrap();

    let solver = "
[solver]
algorithm = \"rk23\"
abstol = 1e-9
reltol = 1e-9
dt_initial = 0.01
dtmax = 1.0
";
    let mut model = build_model(configuration(10, 10.0, solver), data).unwrap();
    model.run().unwrap();
    assert_approx_eq!(f64, model.storage(0), 50.0, epsilon = 1e-3);
    assert_approx_eq!(f64, model.storage(1), 50.0, epsilon = 1e-3);
}

#[test]
fn test_time_tables_round_trip() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "
        CREATE TABLE Node (node_id INTEGER, node_type TEXT, subnetwork_id INTEGER, cyclic_time BOOLEAN);
        CREATE TABLE flow_boundary_time (node_id INTEGER, time REAL, flow_rate REAL);
        INSERT INTO Node VALUES (1, 'FlowBoundary', 0, 1);
        INSERT INTO flow_boundary_time VALUES (1, 0.0, 1.5);
        INSERT INTO flow_boundary_time VALUES (1, 3600.0, 2.5);
        ",
    )
    .unwrap();
    let data = read_from_connection(&conn).unwrap();
    assert!(data.nodes[0].cyclic);
    assert_eq!(data.flow_boundary_time.len(), 2);
    assert_approx_eq!(f64, data.flow_boundary_time[1].flow_rate, 2.5);
}
