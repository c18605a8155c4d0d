use std::time::Duration;
use rand::Rng;
use serde_json::{json, Value};
use crate::common::TimeRange;
use crate::config::Settings;
use crate::decoder::{SeriesMeta, SeriesSelection, UnknownFieldPolicy};
use crate::error::DatasourceError;
use crate::exemplar::EXEMPLAR_FRAME_NAME;
use crate::frame::{FieldValues, NoticeSeverity};
use crate::interval::{Calculator, IntervalCalculator};
use crate::query::{calculate_step, QueryModel};
use crate::response::{parse_algorithm_response, parse_realtime_response, parse_response, QueryResponse};
use crate::tests::fixtures::*;

#[test]
fn range_response_is_named_and_tagged() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("up", "{{job}}", &settings)?;
    assert_eq!(query.step, Duration::from_secs(60));

    let body = success_body(
        "matrix",
        json!([
            matrix_entry(json!({"__name__": "up", "job": "api"}), &[(1700000000.0, "1"), (1700000060.0, "1")]),
            matrix_entry(json!({"__name__": "up", "job": "db"}), &[(1700000000.0, "0")]),
        ]),
    );
    let res = parse_response(body.as_slice(), &query, &settings);
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 2);

    let names: Vec<&str> = res.frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["api", "db"]);
    for frame in &res.frames {
        assert_eq!(frame.ref_id, "A");
        let meta = frame.meta.as_ref().expect("frame meta");
        assert_eq!(meta.executed_query_string.as_deref(), Some("Expr: up\nStep: 1m0s"));
        assert_eq!(frame.fields[0].config.interval_ms, Some(60_000.0));
        assert_eq!(frame.fields[1].config.display_name_from_ds.as_deref(), Some(frame.name.as_str()));
    }
    Ok(())
}

#[test]
fn wide_response_names_every_value_column() -> anyhow::Result<()> {
    let settings = Settings {
        wide_series: true,
        ..Default::default()
    };
    let query = resolve_query("rate(req[5m])", "", &settings)?;
    let body = success_body(
        "matrix",
        json!([
            matrix_entry(json!({"__name__": "req", "code": "200"}), &[(1700000000.0, "5")]),
            matrix_entry(json!({"__name__": "req", "code": "500"}), &[(1700000060.0, "1")]),
        ]),
    );
    let res = parse_response(body.as_slice(), &query, &settings);
    assert_eq!(res.frames.len(), 1);

    let frame = &res.frames[0];
    assert!(frame.validate().is_ok());
    let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Time", "req{code=\"200\"}", "req{code=\"500\"}"]);
    Ok(())
}

#[test]
fn scalar_without_labels_is_named_after_the_expression() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("up{}", "", &settings)?;
    let body = success_body("scalar", json!([1700000000, "3"]));
    let res = parse_response(body.as_slice(), &query, &settings);
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.frames[0].name, "up{}");
    Ok(())
}

#[test]
fn exemplars_are_sampled_into_one_frame() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("histogram_quantile(0.9, req)", "", &settings)?;
    let body = json!({
        "status": "success",
        "data": [
            {
                "seriesLabels": {"__name__": "req", "job": "api"},
                "exemplars": [
                    {"labels": {"traceID": "t1"}, "value": "100", "timestamp": 1700000040},
                    {"labels": {"traceID": "t2"}, "value": "99", "timestamp": 1700000045},
                    {"labels": {"traceID": "t3"}, "value": "1", "timestamp": 1700000050}
                ]
            },
            {
                "seriesLabels": {"__name__": "req", "job": "db"},
                "exemplars": [
                    {"labels": {"traceID": "t4"}, "value": "50", "timestamp": 1700000110}
                ]
            }
        ]
    });
    let res = parse_response(body.to_string().as_bytes(), &query, &settings);
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 1);

    let frame = &res.frames[0];
    assert_eq!(frame.name, EXEMPLAR_FRAME_NAME);
    assert_eq!(frame.ref_id, "A");
    assert_eq!(frame.result_type(), Some("exemplar"));
    assert_eq!(
        frame.fields[0].values,
        FieldValues::Time(vec![1_700_000_040_000, 1_700_000_050_000, 1_700_000_110_000])
    );
    assert_eq!(frame.fields[1].values, FieldValues::Float64(vec![100.0, 1.0, 50.0]));
    assert_eq!(
        frame.field("traceID").map(|f| f.values.clone()),
        Some(FieldValues::String(vec!["t1".into(), "t3".into(), "t4".into()]))
    );
    assert_eq!(
        frame.field("job").map(|f| f.values.clone()),
        Some(FieldValues::String(vec!["api".into(), "api".into(), "db".into()]))
    );
    Ok(())
}

#[test]
fn upstream_error_reaches_the_response() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("up", "", &settings)?;
    let res = parse_response(error_body("bad_data", "parse error").as_slice(), &query, &settings);
    assert!(res.is_err());
    assert!(res.frames.is_empty());
    assert_eq!(res.error, Some(DatasourceError::upstream("bad_data", "parse error")));
    Ok(())
}

#[test]
fn collected_unknown_fields_surface_in_the_response() -> anyhow::Result<()> {
    let settings = Settings {
        unknown_fields: UnknownFieldPolicy::Collect,
        ..Default::default()
    };
    let query = resolve_query("up", "", &settings)?;
    let body = br#"{"status":"success","isPartial":false,"data":{"resultType":"vector","result":[]}}"#;
    let res = parse_response(body.as_slice(), &query, &settings);
    assert_eq!(res.unknown_fields, vec!["isPartial".to_string()]);
    assert_eq!(res.error, Some(DatasourceError::EmptyResult));
    assert!(!res.is_err());
    Ok(())
}

fn algorithm_body() -> &'static [u8] {
    br#"{"status":"success","code":200,"data":[{
        "timestamp":[1700000000000,1700000060000,1700000120000],
        "value":[1,2,3],
        "upper":[4,5,6],
        "anomaly":[0,1,0]
    }]}"#
}

#[test]
fn single_series_selection_replaces_prior_frames() -> anyhow::Result<()> {
    let settings = Settings::default();
    let mut query = resolve_query("cpu", "", &settings)?;
    let prior = parse_response(
        success_body("matrix", json!([matrix_entry(json!({"__name__": "cpu"}), &[(1700000000.0, "1")])])).as_slice(),
        &query,
        &settings,
    );
    assert_eq!(prior.frames.len(), 1);

    query.series = SeriesSelection::parse("anomaly");
    let meta = SeriesMeta::from_strings(r#"{"__name__":"cpu","host":"a"}"#, "60")?;
    let res = parse_algorithm_response(algorithm_body(), &query, prior.frames, vec![meta], &settings);
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 1);

    let frame = &res.frames[0];
    assert_eq!(frame.name, "anomaly");
    assert_eq!(frame.ref_id, "A");
    assert_eq!(frame.fields[1].values, FieldValues::Float64(vec![0.0, 1.0, 0.0]));
    assert_eq!(frame.fields[1].labels, Some(labels(&[("__name__", "cpu"), ("host", "a")])));
    assert_eq!(frame.fields[0].config.interval_ms, Some(60_000.0));

    let meta = frame.meta.as_ref().expect("frame meta");
    assert_eq!(meta.executed_query_string.as_deref(), Some("Expr: cpu\nStep: 1m0s"));
    assert_eq!(frame.result_type(), Some("algorithm"));
    assert_eq!(frame.custom("series"), Some(&Value::String("anomaly".into())));
    Ok(())
}

#[test]
fn all_series_are_appended_after_prior_frames() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("cpu", "", &settings)?;
    let prior = parse_response(
        success_body("matrix", json!([matrix_entry(json!({"__name__": "cpu"}), &[(1700000000.0, "1")])])).as_slice(),
        &query,
        &settings,
    );

    let res = parse_algorithm_response(algorithm_body(), &query, prior.frames, Vec::new(), &settings);
    let names: Vec<&str> = res.frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["cpu", "value", "upper", "anomaly"]);
    assert!(res.frames.iter().all(|f| f.ref_id == "A"));
    Ok(())
}

#[test]
fn failed_algorithm_series_keeps_the_others() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("cpu", "", &settings)?;
    let body = br#"{"status":"success","data":[
        {"status":{"code":500,"status":"failed","message":"model missing"},"timestamp":[1000],"value":[1]},
        {"timestamp":[1000,2000],"value":[1,2]}
    ]}"#;
    let res = parse_algorithm_response(body.as_slice(), &query, Vec::new(), Vec::new(), &settings);
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 2);
    assert_eq!(res.series_errors, vec![DatasourceError::upstream(500, "model missing")]);
    assert_eq!(res.frames[0].notices().len(), 1);
    assert_eq!(res.frames[0].notices()[0].severity, NoticeSeverity::Error);
    assert!(res.frames[1].notices().is_empty());
    Ok(())
}

#[test]
fn realtime_results_keep_algorithm_outputs() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("cpu", "", &settings)?;
    let body = br#"{"status":"success","data":[{"data":{"resultType":"matrix","result":[
        {"metric":{"__name__":"lower_bound"},"values":[[1700000000,"1"]]},
        {"metric":{"__name__":"cpu"},"values":[[1700000000,"2"]]}
    ]}}]}"#;
    let res = parse_realtime_response(body.as_slice(), &query, &settings);
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.frames[0].name, "lower_bound");
    assert_eq!(res.frames[0].ref_id, "A");
    assert_eq!(res.frames[0].result_type(), Some("matrix"));
    Ok(())
}

#[test]
fn sub_query_responses_merge() -> anyhow::Result<()> {
    let settings = Settings::default();
    let query = resolve_query("up", "", &settings)?;
    let range = parse_response(
        success_body("matrix", json!([matrix_entry(json!({"job": "a"}), &[(1.0, "1"), (2.0, "x")])])).as_slice(),
        &query,
        &settings,
    );
    let instant = parse_response(
        success_body("vector", json!([vector_entry(json!({"job": "a"}), 2.0, "3")])).as_slice(),
        &query,
        &settings,
    );

    let mut res = QueryResponse::default();
    res.merge(range);
    res.merge(instant);
    assert_eq!(res.frames.len(), 2);
    assert_eq!(res.dropped_points, 1);
    assert_eq!(res.error, None);
    Ok(())
}

#[test]
fn step_is_monotonic_in_the_span_and_never_below_the_safe_interval() -> anyhow::Result<()> {
    let mut rng = create_rng(Some(99));
    let settings = Settings::default();
    let calculator = IntervalCalculator::default();
    let model = QueryModel::default();
    let start = START_SECS * 1000;

    for _ in 0..200 {
        let max_points: i64 = rng.gen_range(1..5000);
        let short_ms: i64 = rng.gen_range(1_000..30 * 86_400_000);
        let long_ms = short_ms + rng.gen_range(0..30 * 86_400_000_i64);
        let short = TimeRange::from_millis(start, start + short_ms);
        let long = TimeRange::from_millis(start, start + long_ms);

        let short_step = calculate_step(&model, &short, max_points, &settings, &calculator)?;
        let long_step = calculate_step(&model, &long, max_points, &settings, &calculator)?;
        assert!(short_step <= long_step, "{short_ms}ms -> {short_step:?}, {long_ms}ms -> {long_step:?}");

        let safe = calculator.calculate_safe_interval(&long, settings.safe_resolution);
        assert!(long_step >= safe.value);
        assert!(long_step >= settings.default_time_interval);
    }
    Ok(())
}
