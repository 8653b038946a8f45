mod common;

use std::collections::HashSet;

use common::{png, zip_archive};
use u3m_viewer::material::{parse_archive_bytes, Channel, MaterialSource, TextureSlot};
use u3m_viewer::ViewerError;

#[test]
fn constant_only_descriptor_without_preview() {
    let bytes = zip_archive(&[(
        "material.u3m",
        br#"{"material":{"front":{"basecolor":{"constant":[1,0,0]}}}}"#,
    )]);

    let bundle = parse_archive_bytes(&bytes).unwrap();

    assert_eq!(bundle.materials.len(), 1);
    let material = &bundle.materials[0];
    assert_eq!(material.base_color().to_hex(), "#ff0000");
    assert!(!material.has_map(Channel::Albedo));
    assert_eq!(material.source(), MaterialSource::Archive);
    assert!(bundle.preview.is_none());
    assert!(bundle.issues.is_empty());
}

#[test]
fn every_descriptor_yields_a_distinct_definition() {
    let descriptor = br#"{"material":{"front":{"basecolor":{"constant":[0.5,0.5,0.5]}}}}"#;
    let bytes = zip_archive(&[
        ("a.u3m", descriptor),
        ("b.u3m", descriptor),
        ("nested/c.u3m", descriptor),
    ]);

    let bundle = parse_archive_bytes(&bytes).unwrap();

    assert_eq!(bundle.materials.len(), 3);
    let ids: HashSet<_> = bundle.materials.iter().map(|m| m.id()).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn texture_with_constant_keeps_both() {
    let albedo = png(2, 2, [200, 100, 50, 255]);
    let bytes = zip_archive(&[
        (
            "denim.u3m",
            br#"{"material":{"name":"Denim","front":{
                "basecolor":{"constant":[0,0,1],"texture":{"image":{"path":"textures\\albedo.png"}}},
                "roughness":{"constant":0.7,"texture":{"image":{"path":"textures/rough.png"}}}
            }}}"#,
        ),
        ("textures/albedo.png", &albedo),
        ("textures/rough.png", &albedo),
        ("preview.png", &albedo),
    ]);

    let bundle = parse_archive_bytes(&bytes).unwrap();
    let material = bundle.first().unwrap();

    assert_eq!(material.name(), "Denim");
    assert_eq!(material.base_color().to_hex(), "#0000ff");
    assert!(matches!(
        material.map(Channel::Albedo),
        Some(TextureSlot::Resolved(_))
    ));
    assert!(material.has_map(Channel::Roughness));
    assert!((material.scalars().roughness - 0.7).abs() < 1e-6);
    assert!(bundle.preview.is_some());
}

#[test]
fn nested_preview_is_ignored() {
    let preview = png(1, 1, [0, 0, 0, 255]);
    let bytes = zip_archive(&[
        (
            "m.u3m",
            br#"{"material":{"front":{"basecolor":{"constant":[1,1,1]}}}}"#,
        ),
        ("thumbs/preview.png", &preview),
    ]);

    let bundle = parse_archive_bytes(&bytes).unwrap();
    assert!(bundle.preview.is_none());
}

#[test]
fn archive_without_descriptors_gets_default_material() {
    let bytes = zip_archive(&[("readme.txt", b"nothing here")]);
    let bundle = parse_archive_bytes(&bytes).unwrap();

    assert_eq!(bundle.materials.len(), 1);
    assert!(bundle.issues.is_empty());
}

#[test]
fn invalid_descriptor_degrades_to_default() {
    let bytes = zip_archive(&[
        ("broken.u3m", b"{ this is not json"),
        (
            "fine.u3m",
            br#"{"material":{"front":{"basecolor":{"constant":[0,1,0]}}}}"#,
        ),
    ]);

    let bundle = parse_archive_bytes(&bytes).unwrap();

    assert_eq!(bundle.materials.len(), 2);
    assert_eq!(bundle.materials[0].name(), "broken");
    assert_eq!(bundle.issues.len(), 1);
    assert!(matches!(
        bundle.issues[0].error,
        ViewerError::DescriptorInvalid { .. }
    ));
}

#[test]
fn corrupt_container_is_the_only_hard_failure() {
    let err = parse_archive_bytes(b"PK\x03\x04 not really a zip").unwrap_err();
    assert!(matches!(err, ViewerError::ArchiveCorrupt { .. }));
}
