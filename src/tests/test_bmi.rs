use std::ffi::CString;

use float_cmp::assert_approx_eq;
use rusqlite::Connection;

use crate::apis::bmi::*;
use crate::tests::test_sqlite_io::create_two_basin_db;

/// Drive the shared-library surface through one whole lifecycle. A
/// single test owns the global model slot, so the stages run in
/// sequence here rather than as separate tests.
#[test]
fn test_bmi_lifecycle() {
    let dir = tempfile::tempdir().unwrap();

    let db_path = dir.path().join("model.db");
    let conn = Connection::open(&db_path).unwrap();
    create_two_basin_db(&conn);
    drop(conn);

    let toml_path = dir.path().join("config.toml");
    let results_dir = dir.path().join("results");
    std::fs::write(
        &toml_path,
        format!(
            "starttime = \"2020-01-01 00:00:00\"
endtime = \"2020-01-01 00:00:10\"
input_path = \"model.db\"
results_dir = \"{}\"
saveat = 10.0

[solver]
algorithm = \"rk23\"
abstol = 1e-9
reltol = 1e-9
dt_initial = 0.01
dtmax = 1.0
",
            results_dir.display()
        ),
    )
    .unwrap();

    // A bad path fails and leaves a readable error behind
    let bogus = CString::new("/definitely/not/there.toml").unwrap();
    assert_ne!(unsafe { initialize(bogus.as_ptr()) }, 0);
    let mut buffer = vec![0i8; 256];
    assert_eq!(unsafe { get_last_error(buffer.as_mut_ptr(), 256) }, 0);
    assert_ne!(buffer[0], 0, "error message must not be empty");

    // The real model loads
    let path = CString::new(toml_path.to_str().unwrap()).unwrap();
    assert_eq!(unsafe { initialize(path.as_ptr()) }, 0);
    // Double initialisation is refused
    assert_ne!(unsafe { initialize(path.as_ptr()) }, 0);

    let mut time = f64::NAN;
    assert_eq!(unsafe { get_start_time(&mut time) }, 0);
    assert_approx_eq!(f64, time, 0.0);
    assert_eq!(unsafe { get_end_time(&mut time) }, 0);
    assert_approx_eq!(f64, time, 10.0);

    // Variable metadata
    let name = CString::new("basin.storage").unwrap();
    let mut rank = -1;
    assert_eq!(unsafe { get_var_rank(name.as_ptr(), &mut rank) }, 0);
    assert_eq!(rank, 1);
    let mut shape = -1;
    assert_eq!(unsafe { get_var_shape(name.as_ptr(), &mut shape) }, 0);
    assert_eq!(shape, 2);
    let mut type_buffer = vec![0i8; 16];
    assert_eq!(unsafe { get_var_type(name.as_ptr(), type_buffer.as_mut_ptr()) }, 0);
    let unknown = CString::new("basin.colour").unwrap();
    assert_ne!(unsafe { get_var_rank(unknown.as_ptr(), &mut rank) }, 0);

    // Run to the end and read the equalised storages through the
    // aliasing pointer
    assert_eq!(update_until(10.0), 0);
    assert_eq!(unsafe { get_current_time(&mut time) }, 0);
    assert_approx_eq!(f64, time, 10.0);
    assert_ne!(update_until(5.0), 0, "going backwards must fail");

    let pointer = unsafe { get_value_ptr(name.as_ptr()) };
    assert!(!pointer.is_null());
    let storages = unsafe { std::slice::from_raw_parts(pointer, shape as usize) };
    assert_approx_eq!(f64, storages[0], 50.0, epsilon = 1e-3);
    assert_approx_eq!(f64, storages[1], 50.0, epsilon = 1e-3);

    // Finalize writes the results and frees the slot
    assert_eq!(finalize(), 0);
    assert!(results_dir.join("basin.csv").exists());
    assert!(results_dir.join("flow.csv").exists());
    assert_ne!(finalize(), 0, "no model left to finalize");

    // execute() is the one-call variant
    assert_eq!(unsafe { execute(path.as_ptr()) }, 0);
}
