use wildcomp::compiler::loader::{self, RunManifest};
use wildcomp::indexer::BucketLimits;
use wildcomp::BlockSpec;
use std::collections::BTreeMap;
use std::fs;

const MANIFEST: &str = r#"
id: "portraits"
name: "Portrait sweep"
external_texts:
  - "studio lighting"
  - "outdoors"
wildcards:
  color: ["red", "blue"]
  animal: ["cat", "dog", "fox"]
blocks:
  - content: "a __color__ __animal__"
    children:
      - content: "wearing a hat"
  - content: "background"
max_compositions: 4
buckets:
  ext_max: 1
  wildcard_max: 2
  overrides:
    animal: 3
"#;

#[test]
fn test_load_manifest_from_yaml() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("manifest.yaml");
    fs::write(&file_path, MANIFEST).expect("Failed to write temp file");

    let manifest = loader::load_manifest_from_yaml(&file_path).expect("Failed to load manifest");

    let expected = RunManifest {
        id: "portraits".to_string(),
        name: "Portrait sweep".to_string(),
        external_texts: vec!["studio lighting".to_string(), "outdoors".to_string()],
        wildcards: BTreeMap::from([
            ("animal".to_string(), vec!["cat".into(), "dog".into(), "fox".into()]),
            ("color".to_string(), vec!["red".into(), "blue".into()]),
        ]),
        blocks: vec![
            BlockSpec::new("a __color__ __animal__").with_child(BlockSpec::new("wearing a hat")),
            BlockSpec::new("background"),
        ],
        max_compositions: Some(4),
        buckets: Some(BucketLimits {
            ext_max: 1,
            wildcard_max: 2,
            overrides: BTreeMap::from([("animal".to_string(), 3)]),
        }),
    };
    assert_eq!(manifest, expected);

    temp_dir.close().expect("Failed to close temp dir");
}

#[test]
fn test_manifest_derived_views() {
    let manifest: RunManifest = serde_yaml::from_str(MANIFEST).unwrap();

    let space = manifest.space();
    assert_eq!(space.cardinality(), Ok(12));
    assert_eq!(space.wildcard_names().collect::<Vec<_>>(), vec!["animal", "color"]);

    let bucketed = manifest.bucketed().unwrap().unwrap();
    // ext: 2 buckets of 1, animal: 1 bucket of 3, color: 1 bucket of 2
    assert_eq!(bucketed.bucket_dimensions(), vec![2, 1, 1]);

    let paths: Vec<String> = manifest
        .tree()
        .walk()
        .iter()
        .map(|b| b.path.to_string())
        .collect();
    assert_eq!(paths, vec!["0", "0.0", "1"]);
}

#[test]
fn test_minimal_manifest_defaults() {
    let manifest: RunManifest = serde_yaml::from_str("id: bare\n").unwrap();
    assert!(manifest.blocks.is_empty());
    assert!(manifest.buckets.is_none());
    assert!(manifest.bucketed().unwrap().is_none());
    assert_eq!(manifest.space().cardinality(), Ok(1));
}

#[test]
fn test_load_errors_carry_the_path() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let missing = temp_dir.path().join("missing.yaml");
    let err = loader::load_manifest_from_yaml(&missing).unwrap_err();
    assert!(format!("{}", err).contains("missing.yaml"));

    let broken = temp_dir.path().join("broken.yaml");
    fs::write(&broken, "id: [unterminated").expect("Failed to write temp file");
    let err = loader::load_manifest_from_yaml(&broken).unwrap_err();
    assert!(format!("{}", err).contains("Failed to deserialize"));
}
