//! Smoke tests for the compiled `ancillary` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("ancillary").unwrap()
}

#[test]
fn no_args_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("evaluate"));
}

#[test]
fn run_without_data_fails() {
    cmd().arg("run").assert().failure();
}

#[test]
fn run_rejects_non_numeric_epochs() {
    cmd()
        .args(["run", "--epochs", "many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("epochs"));
}

#[test]
fn evaluate_missing_directory_fails() {
    cmd()
        .args(["evaluate", "/nonexistent/ancillary_output"])
        .assert()
        .failure();
}

#[test]
fn run_and_evaluate_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bookings.csv");
    let mut rows = String::from(
        "num_passengers,sales_channel,trip_type,purchase_lead,length_of_stay,flight_hour,\
         flight_day,route,booking_origin,departure,arrival,flight_duration,wants_extra_baggage,\
         wants_preferred_seat,wants_in_flight_meals,booking_complete\n",
    );
    for i in 0..120 {
        let baggage = i % 2;
        let seat = (i / 2) % 2;
        rows.push_str(&format!(
            "{},Internet,RoundTrip,{},{},{},Mon,AKLDEL,New Zealand,AKL,DEL,{}.5,{},{},{},0\n",
            1 + i % 3,
            10 + (i * 7) % 90 + baggage * 50,
            3 + i % 20,
            i % 24,
            5 + seat * 3,
            baggage,
            seat,
            (i / 4) % 2
        ));
    }
    std::fs::write(&data, rows).unwrap();
    let out = dir.path().join("out");

    cmd()
        .args([
            "run",
            "--data",
            data.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--epochs",
            "3",
            "--no-plots",
            "--no-report",
        ])
        .assert()
        .success();
    assert!(out.join("nn_model.json").exists());
    assert!(out.join("nn_results.csv").exists());

    cmd()
        .args(["evaluate", out.to_str().unwrap()])
        .assert()
        .success();
}
