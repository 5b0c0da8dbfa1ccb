mod common;
use common::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shelfscan::capability::Capability;
use shelfscan::config::{DetectionConfig, FallbackConfig, StageTimeouts};
use shelfscan::detection::FallbackDetector;
use shelfscan::error::{CollaboratorError, PipelineError, Stage};
use shelfscan::pipeline::{Orchestrator, PipelineState};
use shelfscan::service::{LocalDetect, LocalGroup, LocalVisualize};
use shelfscan::visualize::Visualizer;

fn local_orchestrator(
    detector: shelfscan::detection::CascadeDetector,
    engine: shelfscan::grouping::GroupingEngine,
    results_dir: &std::path::Path,
) -> Orchestrator<LocalDetect, LocalGroup, LocalVisualize> {
    Orchestrator::new(
        LocalDetect::new(Arc::new(detector)),
        LocalGroup::new(Arc::new(engine)),
        LocalVisualize::new(Arc::new(Visualizer::new(results_dir))),
        StageTimeouts::default(),
    )
}

#[tokio::test]
async fn test_empty_shelf_reports_no_products() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let orchestrator = local_orchestrator(stub_cascade(vec![]), stub_engine(vec![]), dir.path());
    let image = encode_png(&shelf_image(200, 120, &[]));

    let report = orchestrator.run(image).await;

    assert_eq!(report.outcome, Err(PipelineError::NoDetections));
    assert_eq!(
        report.trace,
        vec![
            PipelineState::Idle,
            PipelineState::Detecting,
            PipelineState::Failed
        ]
    );

    let response = shelfscan::service::ProcessResponse::from(report.outcome);
    assert!(!response.success);
    assert!(
        response
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("No products detected"))
    );
    assert!(response.products_count.is_none());
    Ok(())
}

#[tokio::test]
async fn test_plain_grey_shelf_without_model_reports_no_products() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let detector = shelfscan::detection::CascadeDetector::new(
        Capability::Unavailable("no model".to_string()),
        FallbackDetector::new(FallbackConfig::default()),
        DetectionConfig::default(),
    );
    let orchestrator = local_orchestrator(detector, stub_engine(vec![]), dir.path());
    let image = encode_png(&shelf_image_on(320, 240, [128, 128, 128], &[]));

    let report = orchestrator.run(image).await;

    assert_eq!(report.outcome, Err(PipelineError::NoDetections));
    assert_eq!(report.final_state(), PipelineState::Failed);
    Ok(())
}

#[tokio::test]
async fn test_single_branded_product() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let product = bbox(40, 20, 120, 140);
    let image = shelf_image(200, 160, &[(product, ORANGE)]);
    let orchestrator = local_orchestrator(
        learned_only_cascade(vec![shelfscan::models::Detection::new(product, 0.9)]),
        stub_engine(vec![(ORANGE, "Tide")]),
        dir.path(),
    );

    let response = orchestrator.process(encode_png(&image)).await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.products_count, Some(1));
    assert_eq!(response.groups_count, Some(1));
    assert_eq!(response.groups, Some(BTreeMap::from([(0, 1)])));
    let detections = response.detections.expect("detections in response");
    assert_eq!(detections[0].brand_name(), Some("Tide"));

    let result_image = response.result_image.expect("result image in response");
    assert!(std::path::Path::new(&result_image).exists());
    assert!(result_image.starts_with(dir.path().to_str().expect("utf-8 temp path")));
    Ok(())
}

#[tokio::test]
async fn test_brand_and_visual_groups() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let (image, detections) = four_product_shelf();
    let orchestrator = local_orchestrator(
        learned_only_cascade(detections),
        stub_engine(vec![(RED, "Ariel")]),
        dir.path(),
    );

    let report = orchestrator.run(encode_png(&image)).await;

    assert_eq!(report.final_state(), PipelineState::Done);
    let summary = report.outcome?;
    assert_eq!(summary.products_count, 4);
    assert_eq!(summary.groups_count, 2);
    assert_eq!(summary.groups, BTreeMap::from([(0, 2), (1, 2)]));

    let brands: Vec<_> = summary
        .detections
        .iter()
        .map(|d| d.brand_name().unwrap_or_default().to_string())
        .collect();
    assert_eq!(brands[0], "Ariel");
    assert_eq!(brands[1], "Ariel");
    assert!(brands[2].starts_with("Visual Group"));
    assert_eq!(brands[2], brands[3]);
    assert!(summary.processing_time >= 0.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_grouping_timeout_stops_the_run() -> anyhow::Result<()> {
    let visualize = MockVisualize::new();
    let visualize_calls = visualize.calls.clone();
    let orchestrator = Orchestrator::new(
        MockDetect::returning(vec![detection(10, 10, 60, 90, 0.8)]),
        MockGroup::slow(Duration::from_secs(3600)),
        visualize,
        StageTimeouts::default(),
    );
    let image = encode_png(&shelf_image(100, 100, &[]));

    let report = orchestrator.run(image).await;

    let err = report.outcome.as_ref().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::CollaboratorUnavailable {
            stage: Stage::Grouping,
            ..
        }
    ));
    assert!(err.to_string().starts_with("Grouping service not responding"));
    assert_eq!(report.final_state(), PipelineState::Failed);
    assert_eq!(visualize_calls.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_rejected_detection_is_stage_tagged() -> anyhow::Result<()> {
    let group = MockGroup::single_group();
    let group_calls = group.calls.clone();
    let orchestrator = Orchestrator::new(
        MockDetect::failing(CollaboratorError::Rejected("model exploded".to_string())),
        group,
        MockVisualize::new(),
        StageTimeouts::default(),
    );

    let response = orchestrator
        .process(encode_png(&shelf_image(64, 64, &[])))
        .await;

    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Detection failed: model exploded")
    );
    assert_eq!(group_calls.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_image_never_reaches_detection() -> anyhow::Result<()> {
    let detect = MockDetect::returning(vec![detection(0, 0, 30, 30, 0.9)]);
    let detect_calls = detect.calls.clone();
    let orchestrator = Orchestrator::new(
        detect,
        MockGroup::single_group(),
        MockVisualize::new(),
        StageTimeouts::default(),
    );

    let report = orchestrator.run(b"definitely not an image".to_vec()).await;

    assert!(matches!(report.outcome, Err(PipelineError::InvalidImage(_))));
    assert_eq!(
        report.trace,
        vec![PipelineState::Idle, PipelineState::Failed]
    );
    assert_eq!(detect_calls.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_partially_grouped_reply_is_rejected() -> anyhow::Result<()> {
    let visualize = MockVisualize::new();
    let visualize_calls = visualize.calls.clone();
    let mut group = MockGroup::single_group();
    // grouping "forgets" to label the detection
    group.output = Some(vec![detection(10, 10, 60, 90, 0.8)]);
    let orchestrator = Orchestrator::new(
        MockDetect::returning(vec![detection(10, 10, 60, 90, 0.8)]),
        group,
        visualize,
        StageTimeouts::default(),
    );

    let response = orchestrator
        .process(encode_png(&shelf_image(100, 100, &[])))
        .await;

    assert!(!response.success);
    assert!(
        response
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Grouping failed"))
    );
    assert_eq!(visualize_calls.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_mock_pipeline_trace_reaches_done() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(
        MockDetect::returning(vec![
            detection(10, 10, 60, 90, 0.8),
            detection(70, 10, 120, 90, 0.8),
        ]),
        MockGroup::single_group(),
        MockVisualize::new(),
        StageTimeouts::default(),
    );

    let report = orchestrator
        .run(encode_png(&shelf_image(128, 100, &[])))
        .await;

    assert_eq!(
        report.trace,
        vec![
            PipelineState::Idle,
            PipelineState::Detecting,
            PipelineState::Grouping,
            PipelineState::Visualizing,
            PipelineState::Done,
        ]
    );
    let summary = report.outcome?;
    assert_eq!(summary.result_image, "static/results/mock.jpg");
    assert_eq!(summary.groups, BTreeMap::from([(0, 2)]));
    Ok(())
}

#[tokio::test]
async fn test_health_probes_every_collaborator() -> anyhow::Result<()> {
    let mut group = MockGroup::single_group();
    group.healthy = false;
    let orchestrator = Orchestrator::new(
        MockDetect::returning(vec![]),
        group,
        MockVisualize::new(),
        StageTimeouts::default(),
    );

    let health = orchestrator.health().await;

    assert_eq!(
        health,
        BTreeMap::from([
            ("detection".to_string(), true),
            ("grouping".to_string(), false),
            ("visualization".to_string(), true),
        ])
    );
    Ok(())
}
