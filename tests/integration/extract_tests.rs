//! Region extraction integration tests.
//!
//! Tests verify:
//! - Default viewport, zoom rescale and clamping against real level sizes
//! - Selections scaled by the level-0 ratio
//! - Encoded output is a decodable JPEG of the planned size

use std::path::Path;

use image::GenericImageView;

use histo_volume::encoder::ImageEncoder;
use histo_volume::extractor::{ExtractError, RegionExtractor, ViewState};

use super::test_utils::{SyntheticSlide, is_valid_jpeg};

const SLIDE: &str = "slide.svs";

fn slide() -> SyntheticSlide {
    SyntheticSlide::new(10_000, 8_000, 3)
}

fn view(origin: (f64, f64), previous_level: usize, level: usize) -> ViewState {
    ViewState {
        origin,
        previous_level,
        level,
    }
}

// =============================================================================
// Level Mapping
// =============================================================================

#[test]
fn test_default_viewport_maps_to_level0() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let plan = extractor
        .plan_region(Path::new(SLIDE), view((100.0, 100.0), 2, 2), None)
        .unwrap();

    assert_eq!(plan.origin_level0, (400, 400));
    assert_eq!((plan.width, plan.height), (1920, 1080));
    assert_eq!(plan.bounds.max_level, 2);
    assert_eq!((plan.bounds.level_width, plan.bounds.level_height), (2500, 2000));
}

#[test]
fn test_zoom_rescales_origin() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let plan = extractor
        .plan_region(Path::new(SLIDE), view((1000.0, 800.0), 1, 2), None)
        .unwrap();

    assert_eq!(plan.origin, (500.0, 400.0));
    assert_eq!(plan.origin_level0, (2000, 1600));
}

#[test]
fn test_origin_clamped_into_level() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let plan = extractor
        .plan_region(Path::new(SLIDE), view((2400.0, 1900.0), 2, 2), None)
        .unwrap();

    assert_eq!(plan.origin, (580.0, 920.0));
    assert!(plan.origin.0 + plan.width as f64 <= 2500.0);
    assert!(plan.origin.1 + plan.height as f64 <= 2000.0);
}

#[test]
fn test_selection_scaled_by_level_ratio() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));
    let points = [(10.0, 10.0), (60.0, 10.0), (10.0, 40.0)];

    let plan = extractor
        .plan_region(Path::new(SLIDE), view((0.0, 0.0), 2, 2), Some(&points))
        .unwrap();

    assert_eq!((plan.width, plan.height), (200, 120));
    assert_eq!(plan.origin_level0, (40, 40));
}

#[test]
fn test_selection_needs_three_points() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));
    let points = [(10.0, 10.0), (60.0, 10.0)];

    let err = extractor
        .plan_region(Path::new(SLIDE), view((0.0, 0.0), 0, 0), Some(&points))
        .unwrap_err();
    assert!(matches!(err, ExtractError::Selection { .. }));
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_extract_returns_every_sample() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let extraction = extractor
        .extract(Path::new(SLIDE), 1, (0, 0), 120, 80)
        .unwrap();

    assert_eq!(extraction.pixels.len(), 120 * 80);
    assert_eq!(extraction.bounds.level_width, 5000);
    assert_eq!(slide.reads(), vec![(0, 0, 1, 120, 80)]);
}

#[test]
fn test_level_out_of_range() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let err = extractor
        .extract(Path::new(SLIDE), 3, (0, 0), 10, 10)
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractError::LevelOutOfRange {
            level: 3,
            count: 3,
            ..
        }
    ));
    assert!(slide.reads().is_empty());
}

#[test]
fn test_unknown_slide() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));

    let err = extractor
        .extract(Path::new("other.svs"), 0, (0, 0), 10, 10)
        .unwrap_err();
    assert!(matches!(err, ExtractError::Open { .. }));
}

#[test]
fn test_encoded_region_is_jpeg_of_planned_size() {
    let slide = slide();
    let extractor = RegionExtractor::new(slide.opener(SLIDE));
    let points = [(0.0, 0.0), (40.0, 0.0), (0.0, 25.0)];
    let mut jpeg = Vec::new();

    let plan = extractor
        .extract_encoded(
            Path::new(SLIDE),
            view((0.0, 0.0), 2, 2),
            Some(&points),
            &ImageEncoder::new(85),
            &mut jpeg,
        )
        .unwrap();

    assert!(is_valid_jpeg(&jpeg));
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (plan.width as u32, plan.height as u32));
    assert_eq!(decoded.dimensions(), (160, 100));
}
