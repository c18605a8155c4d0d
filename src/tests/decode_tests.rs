use serde_json::{json, Value};
use crate::decoder::{decode, decode_slice, DecodeOptions, ResponseFormat, UnknownFieldPolicy};
use crate::error::DatasourceError;
use crate::frame::{FieldValues, FrameType, NoticeSeverity};
use crate::tests::fixtures::*;

#[test]
fn vector_round_trip() {
    let body = success_body(
        "vector",
        json!([vector_entry(json!({"__name__": "up", "job": "x"}), 1_700_000_000.0, "1")]),
    );
    let res = decode_slice(&body, &DecodeOptions::default());
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 1);

    let frame = &res.frames[0];
    assert_eq!(frame.fields[0].values, FieldValues::Time(vec![1_700_000_000_000]));
    assert_eq!(frame.fields[1].values, FieldValues::Float64(vec![1.0]));
    assert_eq!(
        frame.fields[1].labels,
        Some(labels(&[("__name__", "up"), ("job", "x")]))
    );
    assert_eq!(frame.result_type(), Some("vector"));
    assert_eq!(frame.frame_type(), Some(FrameType::TimeSeriesMany));
}

#[test]
fn wide_and_multi_hold_the_same_points() {
    for seed in [7, 42, 1234] {
        let options = MatrixOptions {
            seed: Some(seed),
            ..Default::default()
        };
        let body = success_body("matrix", random_matrix(&options));

        let multi = decode_slice(&body, &DecodeOptions::wide(false));
        let wide = decode_slice(&body, &DecodeOptions::wide(true));
        assert_eq!(multi.frames.len(), options.series);
        assert_eq!(wide.frames.len(), 1);
        assert!(wide.frames[0].validate().is_ok());
        assert_eq!(wide.frames[0].frame_type(), Some(FrameType::TimeSeriesWide));
        assert_eq!(flatten_points(&multi.frames), flatten_points(&wide.frames));
    }
}

#[test]
fn wide_frame_pads_missing_points_with_nulls() {
    let body = success_body(
        "matrix",
        json!([
            matrix_entry(json!({"job": "a"}), &[(20.0, "2"), (10.0, "1")]),
            matrix_entry(json!({"job": "b"}), &[(20.0, "4"), (30.0, "6")]),
        ]),
    );
    let res = decode_slice(&body, &DecodeOptions::wide(true));
    let frame = &res.frames[0];
    assert_eq!(frame.fields[0].values, FieldValues::Time(vec![10_000, 20_000, 30_000]));
    assert_eq!(
        frame.fields[1].values,
        FieldValues::NullableFloat64(vec![Some(1.0), Some(2.0), None])
    );
    assert_eq!(
        frame.fields[2].values,
        FieldValues::NullableFloat64(vec![None, Some(4.0), Some(6.0)])
    );
}

#[test]
fn empty_results_are_not_failures() {
    for result_type in ["matrix", "vector"] {
        let res = decode_slice(&success_body(result_type, json!([])), &DecodeOptions::default());
        assert!(res.frames.is_empty(), "{result_type}");
        assert_eq!(res.error, Some(DatasourceError::EmptyResult));
        assert!(res.is_empty());
        assert!(!res.is_err());
    }
}

#[test]
fn empty_streams_result_keeps_the_logs_frame() {
    let res = decode_slice(&success_body("streams", json!([])), &DecodeOptions::default());
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 1);

    let frame = &res.frames[0];
    assert_eq!(frame.rows(), 0);
    assert!(frame.validate().is_ok());
    let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["__labels", "Time", "line", "TS"]);
    assert_eq!(frame.result_type(), Some("streams"));

    let only_bad_rows = success_body("streams", json!([{"stream": {"job": "db"}, "values": [["bogus", "x"]]}]));
    let res = decode_slice(&only_bad_rows, &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.frames[0].rows(), 0);
    assert_eq!(res.dropped_points, 1);
}

#[test]
fn error_status_short_circuits() {
    let res = decode_slice(&error_body("bad_data", "boom"), &DecodeOptions::default());
    assert!(res.frames.is_empty());
    assert!(res.is_err());
    let msg = res.error.map(|e| e.to_string()).unwrap_or_default();
    assert!(msg.contains("bad_data"));
    assert!(msg.contains("boom"));
}

#[test]
fn error_status_wins_over_data() {
    let body = r#"{"status":"error","errorType":"timeout","error":"query timed out",
        "data":{"resultType":"vector","result":[{"metric":{},"value":[1,"1"]}]}}"#;
    let res = decode_slice(body.as_bytes(), &DecodeOptions::default());
    assert!(res.frames.is_empty());
    assert_eq!(res.error, Some(DatasourceError::upstream("timeout", "query timed out")));
}

#[test]
fn bad_points_are_dropped_and_counted() {
    let body = success_body(
        "matrix",
        json!([matrix_entry(json!({"job": "x"}), &[(1.0, "1"), (2.0, "abc"), (3.0, "NaN"), (4.0, "+Inf")])]),
    );
    let res = decode_slice(&body, &DecodeOptions::default());
    assert_eq!(res.dropped_points, 1);
    let frame = &res.frames[0];
    assert_eq!(frame.rows(), 3);
    assert_eq!(frame.fields[0].values, FieldValues::Time(vec![1000, 3000, 4000]));
    assert!(frame.fields[1].values.float_at(1).is_some_and(f64::is_nan));
    assert_eq!(frame.fields[1].values.float_at(2), Some(f64::INFINITY));
}

#[test]
fn scalar_and_string_results() {
    let scalar = decode_slice(&success_body("scalar", json!([1_700_000_000.5, "42"])), &DecodeOptions::default());
    assert_eq!(scalar.frames.len(), 1);
    assert_eq!(scalar.frames[0].fields[0].values, FieldValues::Time(vec![1_700_000_000_500]));
    assert_eq!(scalar.frames[0].fields[1].values, FieldValues::Float64(vec![42.0]));
    assert_eq!(scalar.frames[0].result_type(), Some("scalar"));

    let string = decode_slice(&success_body("string", json!([10, "hello"])), &DecodeOptions::default());
    assert_eq!(string.frames[0].fields[1].values, FieldValues::String(vec!["hello".to_string()]));
    assert_eq!(string.frames[0].result_type(), Some("string"));
}

#[test]
fn streams_result() {
    let body = success_body(
        "streams",
        json!([
            {
                "values": [["1700000000123456789", "first"], ["1700000001000000000", "second"]],
                "stream": {"job": "api", "app": "web"}
            },
            { "stream": {"job": "db"}, "values": [["bogus", "dropped"]] }
        ]),
    );
    let res = decode_slice(&body, &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.dropped_points, 1);

    let frame = &res.frames[0];
    let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["__labels", "Time", "line", "TS"]);
    assert_eq!(
        frame.fields[1].values,
        FieldValues::Time(vec![1_700_000_000_123, 1_700_000_001_000])
    );
    assert_eq!(
        frame.fields[2].values,
        FieldValues::String(vec!["first".into(), "second".into()])
    );
    assert_eq!(
        frame.fields[3].values,
        FieldValues::String(vec!["1700000000123456789".into(), "1700000001000000000".into()])
    );
    let FieldValues::Json(labels) = &frame.fields[0].values else {
        panic!("labels column is not json");
    };
    assert_eq!(labels[0], json!({"app": "web", "job": "api"}));
    assert_eq!(frame.result_type(), Some("streams"));
}

#[test]
fn histogram_series_become_heatmap_frames() {
    let body = success_body(
        "matrix",
        json!([{
            "metric": {"__name__": "latency"},
            "histograms": [
                [1700000000, {"count": "3", "sum": "1.5", "buckets": [[0, "0.1", "0.5", "2"], [3, "0.5", "1", "1"]]}],
                [1700000015, {"count": "1", "buckets": [[0, "0.1", "0.5", "1"], ["x", "1", "2", "3"]]}]
            ]
        }]),
    );
    let res = decode_slice(&body, &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.dropped_points, 1);

    let frame = &res.frames[0];
    assert_eq!(frame.frame_type(), Some(FrameType::HeatmapCells));
    let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["xMax", "yMin", "yMax", "count", "yLayout"]);
    assert_eq!(frame.rows(), 3);
    assert_eq!(frame.fields[4].values, FieldValues::Int8(vec![0, 3, 0]));
    assert_eq!(frame.fields[3].values, FieldValues::Float64(vec![2.0, 1.0, 1.0]));
}

#[test]
fn array_root_label_names() {
    let body = json!({"status": "success", "data": ["__name__", "job", "instance"]});
    let res = decode_slice(body.to_string().as_bytes(), &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(
        res.frames[0].fields[0].values,
        FieldValues::String(vec!["__name__".into(), "job".into(), "instance".into()])
    );
}

#[test]
fn array_root_series_pads_columns() {
    let body = json!([
        {"__name__": "up", "job": "a"},
        {"__name__": "up", "instance": "h:9"},
        {"job": "c"}
    ]);
    let res = decode_slice(body.to_string().as_bytes(), &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    let frame = &res.frames[0];
    assert!(frame.validate().is_ok());
    assert_eq!(frame.rows(), 3);
    let instance = frame.field("instance").map(|f| f.values.clone());
    assert_eq!(
        instance,
        Some(FieldValues::String(vec!["".into(), "h:9".into(), "".into()]))
    );
    let job = frame.field("job").map(|f| f.values.clone());
    assert_eq!(job, Some(FieldValues::String(vec!["a".into(), "".into(), "c".into()])));
}

#[test]
fn array_root_exemplars() {
    let body = json!({
        "status": "success",
        "data": [{
            "seriesLabels": {"__name__": "req", "job": "api"},
            "exemplars": [
                {"labels": {"traceID": "t1"}, "value": "6", "timestamp": 1700000000.5},
                {"labels": {"traceID": "t2"}, "value": "oops", "timestamp": 1700000001},
                {"labels": {"traceID": "t3"}, "value": "7", "timestamp": 1700000002, "extra": true}
            ]
        }]
    });
    let res = decode_slice(body.to_string().as_bytes(), &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.dropped_points, 1);

    let frame = &res.frames[0];
    assert_eq!(frame.result_type(), Some("exemplar"));
    assert_eq!(frame.rows(), 2);
    assert_eq!(frame.fields[0].values, FieldValues::Time(vec![1_700_000_000_500, 1_700_000_002_000]));
    assert_eq!(frame.fields[1].labels, Some(labels(&[("__name__", "req"), ("job", "api")])));
    assert_eq!(
        frame.field("traceID").map(|f| f.values.clone()),
        Some(FieldValues::String(vec!["t1".into(), "t3".into()]))
    );
    assert_eq!(frame.notices().len(), 1);
    assert_eq!(frame.notices()[0].severity, NoticeSeverity::Error);
}

#[test]
fn warnings_attach_to_every_frame() {
    let body = r#"{"status":"success","warnings":["partial response","slow"],"data":{"resultType":"vector",
        "result":[{"metric":{"job":"a"},"value":[1,"1"]},{"metric":{"job":"b"},"value":[1,"2"]}]}}"#;
    let res = decode_slice(body.as_bytes(), &DecodeOptions::default());
    assert_eq!(res.frames.len(), 2);
    for frame in &res.frames {
        let texts: Vec<&str> = frame.notices().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["partial response", "slow"]);
        assert!(frame.notices().iter().all(|n| n.severity == NoticeSeverity::Warning));
    }
}

#[test]
fn data_status_is_copied_to_first_frame() {
    let body = r#"{"status":"success","data":{"resultType":"vector",
        "result":[{"metric":{"job":"a"},"value":[1,"1"]},{"metric":{"job":"b"},"value":[1,"2"]}],
        "status":{"code":200}}}"#;
    let res = decode_slice(body.as_bytes(), &DecodeOptions::default());
    assert_eq!(res.frames[0].custom("status"), Some(&json!({"code": 200})));
    assert_eq!(res.frames[1].custom("status"), None);
}

#[test]
fn structural_errors_abort() {
    let cases: [&[u8]; 5] = [
        b"42",
        b"{\"status\":\"success\",\"data\":{\"resultType\":\"vector\",\"result\":[",
        b"{\"status\":\"success\",\"data\":{\"result\":[]}}",
        b"{\"status\":\"success\",\"data\":{\"resultType\":\"table\",\"result\":[]}}",
        b"{\"status\":\"success\"} trailing",
    ];
    for body in cases {
        let res = decode_slice(body, &DecodeOptions::default());
        assert!(res.frames.is_empty());
        assert!(
            matches!(res.error, Some(DatasourceError::Structural(_))),
            "{}: {:?}",
            String::from_utf8_lossy(body),
            res.error
        );
    }
}

fn body_with_unknown_fields() -> &'static [u8] {
    br#"{"status":"success","extra":{"nested":[1,2,3]},
        "data":{"resultType":"vector","result":[{"metric":{},"value":[1,"1"],"shard":3}]}}"#
}

#[test]
fn unknown_fields_ignored_by_default() {
    let res = decode_slice(body_with_unknown_fields(), &DecodeOptions::default());
    assert_eq!(res.error, None);
    assert_eq!(res.frames.len(), 1);
    assert!(res.unknown_fields.is_empty());
}

#[test]
fn unknown_fields_collected() {
    let options = DecodeOptions {
        unknown_fields: UnknownFieldPolicy::Collect,
        ..Default::default()
    };
    let res = decode_slice(body_with_unknown_fields(), &options);
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.unknown_fields, vec!["extra".to_string(), "data.result.shard".to_string()]);
}

#[test]
fn unknown_fields_fail() {
    let options = DecodeOptions {
        unknown_fields: UnknownFieldPolicy::Fail,
        ..Default::default()
    };
    let res = decode_slice(body_with_unknown_fields(), &options);
    assert!(res.frames.is_empty());
    assert_eq!(res.error, Some(DatasourceError::UnknownField("extra".to_string())));
}

#[test]
fn algorithm_envelope_through_decode() {
    let body: Value = json!({
        "status": "success",
        "code": 200,
        "data": [{
            "labels": "{\"__name__\":\"cpu\",\"host\":\"a\"}",
            "interval": 60,
            "timestamp": [1700000000000_i64, 1700000060000_i64],
            "value": ["1.5", "2.5"],
            "upper": [3, 4],
            "anomaly": [0, 1]
        }]
    });
    let res = decode(body.to_string().as_bytes(), ResponseFormat::Algorithm, &DecodeOptions::default());
    let names: Vec<&str> = res.frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["value", "upper", "anomaly"]);
    for frame in &res.frames {
        assert_eq!(frame.fields[0].values, FieldValues::Time(vec![1_700_000_000_000, 1_700_000_060_000]));
        assert_eq!(frame.fields[1].labels, Some(labels(&[("__name__", "cpu"), ("host", "a")])));
        assert_eq!(frame.result_type(), Some("algorithm"));
    }
    assert_eq!(res.frames[0].fields[1].values, FieldValues::Float64(vec![1.5, 2.5]));
}

#[test]
fn invalid_algorithm_labels_are_reported_per_series() {
    let body = json!({
        "status": "success",
        "data": [{"labels": "{not json", "timestamp": [1000], "anomaly": [1]}]
    });
    let res = decode(body.to_string().as_bytes(), ResponseFormat::Algorithm, &DecodeOptions::default());
    assert_eq!(res.frames.len(), 1);
    assert_eq!(res.series_errors.len(), 1);
    assert_eq!(res.frames[0].fields[1].labels, Some(labels(&[])));
}
