//! Volume assembly integration tests.
//!
//! Tests verify:
//! - Stacks read from disk keep their order and dimensions
//! - Undecodable or mismatched slices become zero slices
//! - Manifest-driven assembly matches the in-memory hand-off

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};

use histo_volume::enums::NumericType;
use histo_volume::extractor::ViewState;
use histo_volume::manifest;
use histo_volume::pipeline::SlidePipeline;
use histo_volume::slice_reader::ReaderRegistry;
use histo_volume::volume::VolumeData;
use histo_volume::volume_assembler::{AssembleError, VolumeAssembler};

use super::test_utils::{SyntheticSlide, scratch_dir};

fn write_gray(dir: &Path, name: &str, value: u8) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_pixel(8, 6, Luma([value])).save(&path).unwrap();
    path
}

fn assembler() -> VolumeAssembler {
    VolumeAssembler::new(ReaderRegistry::with_defaults())
}

// =============================================================================
// Disk Stacks
// =============================================================================

#[test]
fn test_stack_keeps_order() {
    let dir = scratch_dir("order");
    let paths: Vec<_> = (0..4)
        .map(|i| write_gray(&dir, &format!("slice{i}.png"), 10 + i as u8 * 40))
        .collect();

    let volume = assembler().assemble(&paths[..], true).unwrap();

    assert_eq!(volume.dim(), (4, 6, 8));
    assert_eq!(volume.components(), 1);
    let VolumeData::U8(data) = volume.data() else {
        panic!("expected 8-bit volume");
    };
    for i in 0..4 {
        assert_eq!(data[[i, 3, 4, 0]], 10 + i as u8 * 40);
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_undecodable_slice_is_zero() {
    let dir = scratch_dir("corrupt");
    let mut paths: Vec<_> = (0..5)
        .map(|i| write_gray(&dir, &format!("slice{i}.png"), 200))
        .collect();
    paths[2] = dir.join("broken.png");
    std::fs::write(&paths[2], b"not a png").unwrap();

    let volume = assembler().assemble(&paths[..], true).unwrap();

    assert_eq!(volume.dim(), (5, 6, 8));
    assert!(volume.is_slice_zero(2));
    for i in [0, 1, 3, 4] {
        assert!(!volume.is_slice_zero(i), "slice {i} should be populated");
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_mismatched_dimensions_are_zero() {
    let dir = scratch_dir("mismatch");
    let first = write_gray(&dir, "a.png", 100);
    let odd = dir.join("b.png");
    GrayImage::from_pixel(4, 4, Luma([100])).save(&odd).unwrap();

    let volume = assembler().assemble(&[first, odd], true).unwrap();

    assert_eq!(volume.dim(), (2, 6, 8));
    assert!(volume.is_slice_zero(1));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unsupported_extension_skipped() {
    let dir = scratch_dir("skip");
    let paths = vec![
        write_gray(&dir, "a.png", 50),
        dir.join("notes.xyz"),
        write_gray(&dir, "b.png", 60),
    ];

    let skipped = assembler().assemble(&paths[..], true).unwrap();
    assert_eq!(skipped.dim().0, 2);

    let kept = assembler().assemble(&paths[..], false).unwrap();
    assert_eq!(kept.dim().0, 3);
    assert!(kept.is_slice_zero(1));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_reference_fixes_format() {
    let dir = scratch_dir("format");
    let rgb = dir.join("rgb.png");
    RgbImage::from_pixel(8, 6, Rgb([255, 0, 0])).save(&rgb).unwrap();
    let gray = write_gray(&dir, "gray.png", 255);

    let volume = assembler().assemble(&[rgb, gray], true).unwrap();

    assert_eq!(volume.components(), 3);
    assert_eq!(volume.format().numeric, NumericType::UnsignedInteger);
    let VolumeData::U8(data) = volume.data() else {
        panic!("expected 8-bit volume");
    };
    // the gray slice only fills the first component
    assert_eq!(data[[1, 0, 0, 0]], 255);
    assert_eq!(data[[1, 0, 0, 1]], 0);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_empty_list() {
    let err = assembler()
        .assemble(&[] as &[PathBuf], true)
        .unwrap_err();
    assert!(matches!(err, AssembleError::NoSupportedSlices(_)));
}

#[test]
fn test_value_range_is_type_range() {
    let dir = scratch_dir("range");
    let path = write_gray(&dir, "a.png", 7);

    let volume = assembler().assemble(&[path], true).unwrap();

    assert_eq!(volume.data_range, (0.0, 255.0));
    assert_eq!(volume.value_range, (0.0, 255.0));
    std::fs::remove_dir_all(&dir).unwrap();
}

// =============================================================================
// Slide Hand-off
// =============================================================================

#[test]
fn test_manifest_matches_in_memory_handoff() {
    let dir = scratch_dir("handoff");
    let slide = SyntheticSlide::new(1024, 768, 2);
    let pipeline = SlidePipeline::new(slide.opener("slide.svs")).with_repeat(4);
    let view = ViewState {
        origin: (16.0, 8.0),
        previous_level: 1,
        level: 1,
    };
    let points = [(16.0, 8.0), (48.0, 8.0), (16.0, 24.0)];
    let image = dir.join("output.jpg");
    let manifest_path = dir.join("output.txt");

    let exported = pipeline
        .export(Path::new("slide.svs"), view, Some(&points), &image, &manifest_path)
        .unwrap();
    let (planned, in_memory) = pipeline
        .build_volume(Path::new("slide.svs"), view, Some(&points))
        .unwrap();
    let from_disk = pipeline.assemble_manifest(&manifest_path).unwrap();

    assert_eq!(exported, planned);
    assert_eq!(manifest::read_manifest(&manifest_path).unwrap().len(), 4);
    assert_eq!(in_memory.dim(), from_disk.dim());
    assert_eq!(in_memory.dim(), (4, 32, 64));
    for i in 0..4 {
        assert_eq!(in_memory.normalized_slice(i), from_disk.normalized_slice(i));
    }
    std::fs::remove_dir_all(&dir).unwrap();
}
