use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn seed(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (
             id bigint,
             customer varchar(40),
             total decimal(10,2),
             placed_at datetime,
             note blob
         );
         INSERT INTO orders VALUES
             (1, 'ada', '19.99', '2021-03-04 05:06:07', 'first'),
             (2, 'brendan', '0.50', '2021-03-05 00:00:00', NULL),
             (3, NULL, NULL, NULL, 'third');",
    )
    .unwrap();
}

fn cmd() -> Command {
    Command::cargo_bin("sqlite2bq").unwrap()
}

#[test]
fn dumps_json_lines_to_stdout() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);

    let output = cmd().arg(&db).arg("orders").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["customer"], "ada");
    assert_eq!(lines[0]["total"], "19.99");
    assert_eq!(lines[0]["placed_at"], 1614834367);
    assert_eq!(lines[0]["note"], "first");
    assert!(lines[1]["note"].is_null());
    assert!(lines[2]["customer"].is_null());
}

#[test]
fn epoch_false_renders_calendar_strings() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);

    let output = cmd()
        .arg(&db)
        .arg("orders")
        .args(["--epoch", "false"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let first: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(first["placed_at"], "2021-03-04T05:06:07Z");
}

#[test]
fn dumps_csv_with_header_and_null_token() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);

    let output = cmd()
        .arg(&db)
        .arg("orders")
        .args(["--format", "csv"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "id\tcustomer\ttotal\tplaced_at\tnote");
    assert_eq!(lines[1], "1\tada\t19.99\t1614834367\tfirst");
    // NUMERIC affinity turns '0.50' into the real 0.5 at the storage layer;
    // the dump reflects what sqlite actually stored.
    assert_eq!(lines[2], "2\tbrendan\t0.5\t1614902400\t\\N");
    assert_eq!(lines[3], "3\t\\N\t\\N\t\\N\tthird");
}

#[test]
fn stdin_query_drives_the_dump() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);

    let output = cmd()
        .arg(&db)
        .arg("-")
        .write_stdin("SELECT id, customer FROM orders WHERE id = 2")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let row: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(row["customer"], "brendan");
}

#[test]
fn splits_avro_output_across_part_files() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);
    let out_dir = dir.path().join("parts");

    let output = cmd()
        .arg(&db)
        .arg("orders")
        .args(["--format", "avro", "--output-file-row-limit", "2"])
        .arg("--output-dir")
        .arg(&out_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let mut names: Vec<_> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["part-000000.avro", "part-000001.avro"]);

    let mut total = 0;
    for name in &names {
        let bytes = std::fs::read(out_dir.join(name)).unwrap();
        let reader = apache_avro::Reader::new(&bytes[..]).unwrap();
        total += reader.count();
    }
    assert_eq!(total, 3);
}

#[test]
fn row_limit_without_output_dir_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);

    cmd()
        .arg(&db)
        .arg("orders")
        .args(["--format", "avro", "--output-file-row-limit", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output-dir"));
}

#[test]
fn row_limit_with_non_avro_format_is_a_usage_error() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("orders.db");
    seed(&db);
    let out_dir = dir.path().join("parts");

    cmd()
        .arg(&db)
        .arg("orders")
        .args(["--format", "json", "--output-file-row-limit", "2"])
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("only avro"));
}

#[test]
fn unknown_column_type_fails_before_emitting_rows() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("odd.db");
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute_batch(
        "CREATE TABLE shapes (id bigint, outline geometry);
         INSERT INTO shapes VALUES (1, 'POINT(0 0)');",
    )
    .unwrap();
    drop(conn);

    let output = cmd().arg(&db).arg("shapes").output().unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("geometry"));
}
