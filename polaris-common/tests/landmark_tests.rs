//! Landmark catalog parsing and validation

use polaris_common::landmarks::{parse_content, parse_places, LandmarkCatalog, Place};
use polaris_common::Error;
use std::path::PathBuf;

fn content_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("content")
}

const CANONICAL: &str = "\
Name,Description,FollowUpQuestion1,FollowUpAnswer1,FollowUpQuestion2,FollowUpAnswer2
Widener Library,Harvard's flagship library.,How big is it?,Very.,Who built it?,The Wideners.
";

#[test]
fn test_parse_canonical_headers() {
    let rows = parse_content(CANONICAL.as_bytes()).unwrap().accepted;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Widener Library");
    assert_eq!(rows[0].follow_ups[0].question, "How big is it?");
    assert_eq!(rows[0].follow_ups[1].answer, "The Wideners.");
}

#[test]
fn test_parse_tour_sheet_headers() {
    let csv = "\
Name,2MinDescription,FollowUpQ1,FollowUpA1,FollowUpQ2,FollowUpA2
Memorial Church,  A church.  ,Q one?,A one.,Q two?,A two.
";
    let rows = parse_content(csv.as_bytes()).unwrap().accepted;
    assert_eq!(rows[0].description, "A church.");
    assert_eq!(rows[0].follow_ups[1].question, "Q two?");
}

#[test]
fn test_blank_field_skips_only_that_row() {
    let csv = "\
Name,Description,FollowUpQuestion1,FollowUpAnswer1,FollowUpQuestion2,FollowUpAnswer2
Widener Library,Desc,Q1,A1,Q2,A2
Memorial Church,Desc,Q1,   ,Q2,A2
Massachusetts Hall,Desc,Q1,A1,Q2,A2
";
    let report = parse_content(csv.as_bytes()).unwrap();

    let names: Vec<&str> = report.accepted.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Widener Library", "Massachusetts Hall"]);
    assert_eq!(report.rejected.len(), 1);
    match &report.rejected[0] {
        Error::InvalidLandmark { row, reason } => {
            assert_eq!(*row, 2);
            assert!(reason.contains("FollowUpAnswer1"), "{}", reason);
        }
        other => panic!("expected InvalidLandmark, got {:?}", other),
    }
}

#[test]
fn test_missing_column_rejects_every_row() {
    let csv = "\
Name,Description,FollowUpQuestion1,FollowUpAnswer1
Widener Library,Desc,Q1,A1
";
    let report = parse_content(csv.as_bytes()).unwrap();
    assert!(report.accepted.is_empty());
    assert!(matches!(
        report.rejected.as_slice(),
        [Error::InvalidLandmark { row: 1, .. }]
    ));
}

#[test]
fn test_duplicate_name_keeps_first_row() {
    let csv = format!(
        "{}Widener Library,Again,Q1,A1,Q2,A2\n",
        CANONICAL
    );
    let report = parse_content(csv.as_bytes()).unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].description, "Harvard's flagship library.");
    match &report.rejected[..] {
        [Error::InvalidLandmark { row, reason }] => {
            assert_eq!(*row, 2);
            assert!(reason.contains("duplicate"));
        }
        other => panic!("expected duplicate rejection, got {:?}", other),
    }
}

#[test]
fn test_places_out_of_range_skipped() {
    let toml = r#"
[[place]]
name = "Nowhere"
lat = 123.0
lng = 0.0

[[place]]
name = "Widener Library"
lat = 42.3734
lng = -71.1147
"#;
    let report = parse_places(toml).unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].name, "Widener Library");
    assert!(matches!(
        report.rejected.as_slice(),
        [Error::InvalidLandmark { row: 1, .. }]
    ));
}

#[test]
fn test_bad_row_does_not_empty_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("landmarks.csv");
    let places = dir.path().join("places.toml");
    std::fs::write(
        &csv,
        format!("{}Memorial Church,,Q1,A1,Q2,A2\n", CANONICAL),
    )
    .unwrap();
    std::fs::write(
        &places,
        "[[place]]\nname = \"Widener Library\"\nlat = 42.3734\nlng = -71.1147\n\n\
         [[place]]\nname = \"Memorial Church\"\nlat = 42.3749\nlng = -71.1160\n",
    )
    .unwrap();

    let catalog = LandmarkCatalog::load_or_empty(&csv, &places);
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("Widener Library").is_some());
    assert!(catalog.get("Memorial Church").is_none());
}

#[test]
fn test_join_skips_unmatched_entries() {
    let content = parse_content(CANONICAL.as_bytes()).unwrap().accepted;
    let places = vec![
        Place {
            name: "Widener Library".to_string(),
            lat: 42.3734,
            lng: -71.1147,
            image: Some("widener.jpg".to_string()),
        },
        Place {
            name: "Unwritten Hall".to_string(),
            lat: 42.0,
            lng: -71.0,
            image: None,
        },
    ];

    let catalog = LandmarkCatalog::from_parts(content, places);
    assert_eq!(catalog.len(), 1);
    let widener = catalog.get("Widener Library").unwrap();
    assert_eq!(widener.coordinate.lat, 42.3734);
    assert_eq!(widener.image.as_deref(), Some("widener.jpg"));
    assert!(catalog.get("Unwritten Hall").is_none());
}

#[test]
fn test_canned_answer_matches_exact_question() {
    let content = parse_content(CANONICAL.as_bytes()).unwrap().accepted;
    let places = parse_places(
        "[[place]]\nname = \"Widener Library\"\nlat = 42.3734\nlng = -71.1147\n",
    )
    .unwrap()
    .accepted;
    let catalog = LandmarkCatalog::from_parts(content, places);
    let widener = catalog.require("Widener Library").unwrap();

    assert_eq!(widener.canned_answer("Who built it?"), Some("The Wideners."));
    assert_eq!(widener.canned_answer("who built it"), None);
    assert!(matches!(
        catalog.require("Houghton Library"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_bundled_content_loads() {
    let dir = content_dir();
    let catalog =
        LandmarkCatalog::load(&dir.join("landmarks.csv"), &dir.join("places.toml")).unwrap();
    assert_eq!(catalog.len(), 3);
    let widener = catalog.get("Widener Library").unwrap();
    assert!(widener.description.starts_with("Harvard's flagship library"));
}

#[test]
fn test_missing_content_degrades_to_empty_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = LandmarkCatalog::load_or_empty(
        &dir.path().join("landmarks.csv"),
        &dir.path().join("places.toml"),
    );
    assert!(catalog.is_empty());
}
