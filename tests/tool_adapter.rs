/// End-to-end tests of the JSON tool boundary over the gold day.
///
/// Parameters go in as `serde_json::Value` exactly as an orchestrator would
/// send them, and assertions are made on the serialized response.
///
/// Run with: cargo test --test tool_adapter

mod common;

use aqmon_service::tools::{execute_tool, tool_definitions};
use common::gold_store;
use serde_json::{Value, json};

fn run(tool: &str, params: Value) -> Value {
    let response = execute_tool(&gold_store(), tool, &params);
    serde_json::to_value(&response).expect("responses always serialize")
}

#[test]
fn test_full_query_workflow() {
    let resp = run(
        "get_metric_summary",
        json!({
            "metric": "pm25_corr",
            "window": "1h",
            "start": "2024-11-08T00:00:00",
            "end": "2024-11-09T00:00:00",
            "location": "bakersfield",
            "aggregate": "max"
        }),
    );

    assert_eq!(resp["success"], true);
    assert_eq!(resp["tool"], "get_metric_summary");
    assert_eq!(resp["result"]["kind"], "metric_summary");
    let value = resp["result"]["value"].as_f64().expect("value should be present");
    assert!((value - 47.3).abs() < 1e-9);
    assert_eq!(resp["result"]["unit"], "µg/m³");
    assert!(resp.get("error").is_none());
}

#[test]
fn test_exceedances_response_shape() {
    let resp = run(
        "detect_exceedances",
        json!({ "window": "24h", "start": "2024-11-08T00:00:00Z", "end": "2024-11-09T00:00:00Z" }),
    );

    let result = &resp["result"];
    assert_eq!(result["kind"], "exceedance_set");
    assert_eq!(result["total_count"], 1);
    assert_eq!(result["threshold"], 35.0);
    assert_eq!(result["window"], "24h");
    assert_eq!(result["period"], "1h");
    assert_eq!(result["exceedances"][0]["period_start"], "2024-11-08T19:00:00Z");
    assert_eq!(result["exceedances"][0]["qa_flags"], 0);
}

#[test]
fn test_default_controls_report_failure_inside_success() {
    // Hour and month are the default controls; hour explains the gold data
    // completely, which is a statistical outcome and not a tool error.
    let resp = run(
        "find_correlations",
        json!({
            "x_metric": "pm25_corr",
            "y_metric": "wind_speed_ms",
            "start": "2024-11-08",
            "end": "2024-11-09"
        }),
    );

    assert_eq!(resp["success"], true);
    let result = &resp["result"];
    assert_eq!(result["status"], "failed");
    assert_eq!(result["correlation"], Value::Null);
    assert_eq!(result["n_samples"], 144);
    assert_eq!(result["controlled_for"], json!(["hour", "month"]));
    let error = result["error"].as_str().expect("failure carries a reason");
    assert!(error.contains("hour alone explains pm25_corr"), "{}", error);
    assert!(error.contains("drop hour"), "{}", error);
}

#[test]
fn test_inversion_tool_echoes_caveat() {
    let resp = run(
        "infer_inversion",
        json!({ "min_confidence": 0.5, "start": "2024-11-08", "end": "2024-11-09" }),
    );

    assert_eq!(resp["result"]["kind"], "inversion_candidates");
    assert_eq!(resp["result"]["total_count"], 0);
    assert_eq!(
        resp["result"]["caveat"],
        "Surface-based inference without vertical profile data"
    );
}

#[test]
fn test_spike_tool_with_wider_window() {
    let resp = run(
        "detect_spikes",
        json!({
            "metric": "pm25_raw",
            "rolling_window": "3h",
            "z_threshold": 6.0,
            "start": "2024-11-08",
            "end": "2024-11-09"
        }),
    );
    assert_eq!(resp["success"], true);
    assert_eq!(resp["result"]["method"], "MAD z-score");
    assert_eq!(resp["result"]["rolling_window"], "3h");
}

#[test]
fn test_bad_input_never_reaches_the_core() {
    let resp = run(
        "detect_spikes",
        json!({ "metric": "pm25_corr; DROP TABLE observations_aq", "start": "2024-11-08", "end": "2024-11-09" }),
    );
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error_kind"], "invalid_params");
    assert!(resp.get("result").is_none());

    let resp = run("detect_exceedances", json!({ "start": "2024-11-08", "end": "2024-11-09" }));
    assert_eq!(resp["error_kind"], "invalid_params", "window is required");
}

#[test]
fn test_unlisted_aggregate_is_rejected() {
    let resp = run(
        "get_metric_summary",
        json!({
            "metric": "pm25_corr",
            "window": "24h",
            "aggregate": "min",
            "start": "2024-11-08T00:00:00",
            "end": "2024-11-09T00:00:00"
        }),
    );
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error_kind"], "invalid_params");
    assert!(resp.get("result").is_none());
}

#[test]
fn test_unknown_tool_is_reported() {
    let resp = run("summarize_everything", json!({}));
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error_kind"], "unknown_tool");
    assert_eq!(resp["tool"], "summarize_everything");
}

#[test]
fn test_registry_serializes_with_schemas() {
    let defs = serde_json::to_value(tool_definitions()).unwrap();
    let names: Vec<&str> = defs
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();

    for expected in [
        "get_metric_summary",
        "detect_exceedances",
        "detect_spikes",
        "find_correlations",
        "infer_inversion",
        "compare_periods",
    ] {
        assert!(names.contains(&expected), "{} missing from registry", expected);
    }
    assert!(defs[0]["input_schema"]["required"]
        .as_array()
        .unwrap()
        .contains(&json!("start")));
}
