mod common;
use common::*;

use shelfscan::capability::Capability;
use shelfscan::config::{DetectionConfig, FallbackConfig};
use shelfscan::detection::{CascadeDetector, FallbackDetector, Tier};
use shelfscan::geometry::{DEDUP_IOU, admit_novel, overlap_ratio};

fn assert_no_duplicates(detections: &[shelfscan::models::Detection]) {
    for (i, a) in detections.iter().enumerate() {
        for b in &detections[i + 1..] {
            assert!(
                overlap_ratio(a.bbox(), b.bbox()) < DEDUP_IOU,
                "{:?} duplicates {:?}",
                a.bbox(),
                b.bbox()
            );
        }
    }
}

#[test]
fn test_two_separated_products_come_from_first_tier() -> anyhow::Result<()> {
    let image = shelf_image(320, 200, &[]);
    let cascade = stub_cascade(vec![
        detection(10, 10, 110, 150, 0.85),
        detection(180, 20, 300, 160, 0.7),
    ]);

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.detections.len(), 2);
    assert_eq!(report.tiers[0].tier, Tier::Primary);
    assert_eq!(report.tiers[0].admitted, 2);
    // later tiers may run, but contribute nothing new
    for tier in &report.tiers[1..] {
        assert_eq!(tier.admitted, 0, "{:?} admitted boxes", tier.tier);
    }
    assert_no_duplicates(&report.detections);
    Ok(())
}

#[test]
fn test_enough_primary_detections_skip_later_tiers() -> anyhow::Result<()> {
    let image = shelf_image(640, 200, &[]);
    let boxes = (0..5)
        .map(|i| detection(10 + i * 120, 10, 100 + i * 120, 150, 0.6))
        .collect();
    let cascade = stub_cascade(boxes);

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.detections.len(), 5);
    assert!(report.ran(Tier::Primary));
    assert!(!report.ran(Tier::Secondary));
    assert!(!report.ran(Tier::Fallback));
    Ok(())
}

#[test]
fn test_secondary_tier_only_admits_novel_boxes() -> anyhow::Result<()> {
    let image = shelf_image(400, 200, &[]);
    let cascade = stub_cascade(vec![
        detection(10, 10, 110, 150, 0.5),
        // low confidence duplicate of the first box
        detection(15, 12, 112, 148, 0.07),
        // low confidence, somewhere else
        detection(250, 20, 350, 160, 0.07),
    ]);

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.detections.len(), 2);
    let secondary = report
        .tiers
        .iter()
        .find(|t| t.tier == Tier::Secondary)
        .expect("secondary tier ran");
    assert_eq!(secondary.candidates, 3);
    assert_eq!(secondary.admitted, 1);
    assert_eq!(report.detections[1].bbox(), &bbox(250, 20, 350, 160));
    assert_no_duplicates(&report.detections);
    Ok(())
}

#[test]
fn test_secondary_tier_dedups_against_its_own_admissions() -> anyhow::Result<()> {
    let image = shelf_image(400, 200, &[]);
    let cascade = stub_cascade(vec![
        detection(10, 10, 110, 150, 0.5),
        detection(200, 20, 300, 160, 0.08),
        detection(205, 22, 302, 158, 0.06),
    ]);

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.detections.len(), 2);
    assert_no_duplicates(&report.detections);
    Ok(())
}

#[test]
fn test_size_filter_is_strict() -> anyhow::Result<()> {
    let image = shelf_image(300, 200, &[]);
    let cascade = learned_only_cascade(vec![
        detection(10, 10, 30, 30, 0.9),   // 20x20, dropped
        detection(100, 10, 121, 31, 0.9), // 21x21, kept
    ]);

    let detections = cascade.detect(&image);

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox(), &bbox(100, 10, 121, 31));
    Ok(())
}

#[test]
fn test_readmission_of_accepted_boxes_is_a_no_op() -> anyhow::Result<()> {
    let image = shelf_image(400, 200, &[]);
    let cascade = stub_cascade(vec![
        detection(10, 10, 110, 150, 0.9),
        detection(150, 10, 250, 150, 0.4),
        detection(280, 10, 380, 150, 0.06),
    ]);
    let accepted = cascade.detect(&image);

    let mut again = accepted.clone();
    let admitted = admit_novel(&mut again, accepted.clone(), DEDUP_IOU);

    assert_eq!(admitted, 0);
    assert_eq!(again, accepted);
    Ok(())
}

#[test]
fn test_failing_learned_detector_falls_back() -> anyhow::Result<()> {
    struct Broken;
    impl shelfscan::detection::ObjectDetector for Broken {
        fn predict(
            &self,
            _image: &image::RgbImage,
            _confidence: f32,
            _nms_iou: f32,
        ) -> anyhow::Result<Vec<shelfscan::models::Detection>> {
            anyhow::bail!("inference error")
        }
    }

    let image = shelf_image(320, 240, &[]);
    let cascade = CascadeDetector::new(
        Capability::Available(Box::new(Broken)),
        FallbackDetector::new(FallbackConfig::default()),
        DetectionConfig::default(),
    );

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.tiers.len(), 1);
    assert_eq!(report.tiers[0].tier, Tier::Fallback);
    Ok(())
}

#[test]
fn test_fallback_finds_bright_product_without_model() -> anyhow::Result<()> {
    let product = bbox(100, 60, 220, 140);
    let image = shelf_image(320, 240, &[(product, [255, 255, 255])]);
    let cascade = CascadeDetector::new(
        Capability::Unavailable("no model".to_string()),
        FallbackDetector::new(FallbackConfig::default()),
        DetectionConfig::default(),
    );
    assert!(!cascade.primary_available());

    let report = cascade.detect_with_report(&image);

    assert_eq!(report.tiers.len(), 1);
    assert_eq!(report.tiers[0].tier, Tier::Fallback);
    assert!(!report.detections.is_empty());
    for det in &report.detections {
        assert!(
            overlap_ratio(det.bbox(), &product) > 0.0,
            "{:?} is away from the product",
            det.bbox()
        );
    }
    Ok(())
}

#[test]
fn test_fallback_finds_nothing_on_empty_shelf() -> anyhow::Result<()> {
    let image = shelf_image(320, 240, &[]);
    let detector = FallbackDetector::new(FallbackConfig::default());

    assert!(detector.detect(&image).is_empty());
    Ok(())
}

#[test]
fn test_fallback_finds_nothing_on_plain_shelves() -> anyhow::Result<()> {
    let detector = FallbackDetector::new(FallbackConfig::default());

    for background in [[128, 128, 128], [255, 255, 255], [200, 180, 160]] {
        let image = shelf_image_on(320, 240, background, &[]);
        let found = detector.detect(&image);
        assert!(found.is_empty(), "{background:?} shelf gave {} boxes", found.len());
    }
    Ok(())
}

#[test]
fn test_fallback_finds_dark_product_on_light_shelf() -> anyhow::Result<()> {
    let product = bbox(100, 60, 220, 140);
    let image = shelf_image_on(320, 240, [200, 200, 200], &[(product, [40, 40, 40])]);
    let detector = FallbackDetector::new(FallbackConfig::default());

    let found = detector.detect(&image);

    assert!(!found.is_empty());
    for det in &found {
        assert!(
            overlap_ratio(det.bbox(), &product) > 0.0,
            "{:?} is away from the product",
            det.bbox()
        );
    }
    Ok(())
}
