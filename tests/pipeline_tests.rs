//! End-to-end behaviour of the ingestion pipeline

use graph_aml::clustering::{hash_account, RawTransfer};
use graph_aml::monitoring::PipelineMetrics;
use graph_aml::pipeline::{AlertFeed, ClassificationResult, Pipeline};
use graph_aml::risk::{FixedRiskModel, LogisticNodeModel};
use graph_aml::{AmlError, Pattern};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn pipeline_with(risk: f64) -> Pipeline {
    Pipeline::new(Arc::new(FixedRiskModel::new(risk)), Arc::new(AlertFeed::default()))
}

#[test]
fn test_fan_in_scenario() {
    let pipeline = pipeline_with(0.9);
    for (i, sender) in ["A", "C", "D", "E", "F", "G"].iter().enumerate() {
        pipeline.submit(RawTransfer::new(format!("tx-{}", i), *sender, "B", 100.0));
    }

    let results = pipeline.process_buffer();
    assert_eq!(results.len(), 6);

    let last = results.last().unwrap();
    assert_eq!(last.transaction_id, "tx-5");
    assert_eq!(last.predicted_pattern, Pattern::FanIn);
    assert!(last.predicted_label);
    assert!((last.risk_score - 0.9).abs() < 1e-12);

    // five senders are not yet a fan-in
    assert!(results[..5].iter().all(|r| r.predicted_pattern == Pattern::Normal));

    let stats = pipeline.stats();
    assert_eq!(stats.store.clusters, 1);
    assert_eq!(stats.store.accounts, 7);
    assert_eq!(stats.flagged_clusters, 1);
    assert_eq!(pipeline.alerts().recent(100), results);
}

#[test]
fn test_missing_receiver_is_rejected() {
    let pipeline = pipeline_with(0.9);
    let raw = RawTransfer { receiver: None, ..RawTransfer::new("tx-1", "A", "B", 10.0) };

    let err = pipeline.process_now(raw.clone()).unwrap_err();
    assert!(matches!(err, AmlError::Validation(_)));

    pipeline.submit(raw);
    assert!(pipeline.process_buffer().is_empty());

    assert_eq!(pipeline.stats().store.clusters, 0);
    assert!(pipeline.with_store(|s| s.cluster_of(&hash_account("A")).is_none()));
    assert!(pipeline.alerts().is_empty());
}

#[test]
fn test_alert_window_after_150_results() {
    let pipeline = pipeline_with(0.1);
    for i in 0..150 {
        let (sender, receiver) = (format!("S{}", i), format!("R{}", i));
        pipeline.submit(RawTransfer::new(format!("tx-{}", i), sender, receiver, 1.0));
    }
    pipeline.process_buffer();

    let window = pipeline.alerts().recent(100);
    assert_eq!(window.len(), 100);
    let ids: Vec<&str> = window.iter().map(|r| r.transaction_id.as_str()).collect();
    let expected: Vec<String> = (50..150).map(|i| format!("tx-{}", i)).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn test_simulator_json_replay() {
    let json = r#"[
        {"TransactionID": "T1", "SenderAccount": "ACC1", "ReceiverAccount": "ACC2",
         "Amount": 5000.0, "Timestamp": "2024-03-01T10:00:00", "Channel": "wire"},
        {"TransactionID": "T2", "SenderAccount": "ACC2", "ReceiverAccount": "ACC3",
         "Amount": 4900.0, "Timestamp": "2024-03-01T10:05:00"},
        {"TransactionID": "T3", "SenderAccount": "ACC3", "Amount": 10.0}
    ]"#;
    let transfers: Vec<RawTransfer> = serde_json::from_str(json).unwrap();
    assert_eq!(transfers[0].attributes["Channel"], serde_json::json!("wire"));

    let pipeline = pipeline_with(0.2);
    for transfer in transfers {
        pipeline.submit(transfer);
    }
    let results = pipeline.process_buffer();

    let ids: Vec<&str> = results.iter().map(|r| r.transaction_id.as_str()).collect();
    assert_eq!(ids, vec!["T1", "T2"]);
    assert_eq!(pipeline.stats().store.largest_cluster, 3);
}

#[test]
fn test_result_wire_format() {
    let pipeline = pipeline_with(0.9);
    let result = pipeline.process_now(RawTransfer::new("0xabc", "A", "B", 1.0)).unwrap();
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["TransactionID"], "0xabc");
    assert_eq!(value["PredictedLabel"], true);
    assert_eq!(value["PredictedPattern"], "Normal");
    let back: ClassificationResult = serde_json::from_value(value).unwrap();
    assert_eq!(back, result);
}

#[test]
fn test_metrics_track_pipeline() {
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let pipeline =
        Pipeline::new(Arc::new(LogisticNodeModel::default()), Arc::new(AlertFeed::default()))
            .with_metrics(metrics.clone());

    pipeline.submit(RawTransfer::new("t1", "A", "B", 1.0));
    pipeline.submit(RawTransfer::new("t2", "C", "D", 1.0));
    pipeline.submit(RawTransfer::new("t3", "B", "C", 1.0));
    pipeline.submit(RawTransfer::new("t4", "", "D", 1.0));
    assert_eq!(metrics.buffer_depth.get(), 4);

    pipeline.process_buffer();
    assert_eq!(metrics.transfers_received.get(), 4);
    assert_eq!(metrics.transfers_processed.get(), 3);
    assert_eq!(metrics.transfers_rejected.get(), 1);
    assert_eq!(metrics.cluster_merges.get(), 1);
    assert_eq!(metrics.clusters.get(), 1);
    assert_eq!(metrics.buffer_depth.get(), 0);
}

#[test]
fn test_concurrent_producers() {
    let pipeline = Arc::new(pipeline_with(0.1));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    pipeline.submit(RawTransfer::new(
                        format!("w{}-{}", worker, i),
                        format!("w{}", worker),
                        format!("w{}-dst{}", worker, i),
                        1.0,
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pipeline.process_buffer().len(), 100);
    let stats = pipeline.stats();
    assert_eq!(stats.store.clusters, 4);
    assert_eq!(stats.store.transfers, 100);
    pipeline.with_store(|s| s.verify_integrity()).unwrap();
}
