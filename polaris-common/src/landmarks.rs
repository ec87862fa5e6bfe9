//! Landmark catalog
//!
//! Narration content comes from a CSV table (one row per landmark) and map
//! placement from a TOML list of places. Both are joined by name into
//! immutable [`Landmark`] records at startup.

use crate::geo::Coordinate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A canned follow-up question with its scripted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub question: String,
    pub answer: String,
}

/// Named point of interest with fixed narration content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub coordinate: Coordinate,
    pub description: String,
    pub follow_ups: [FollowUp; 2],
    pub image: Option<String>,
}

impl Landmark {
    /// Scripted answer for `question` when it is one of the two canned follow-ups
    pub fn canned_answer(&self, question: &str) -> Option<&str> {
        let question = question.trim();
        self.follow_ups
            .iter()
            .find(|f| f.question == question)
            .map(|f| f.answer.as_str())
    }
}

/// Narration content for one landmark, as read from the CSV table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkContent {
    pub name: String,
    pub description: String,
    pub follow_ups: [FollowUp; 2],
}

/// Raw CSV row; both the canonical and the tour-sheet headers are accepted
#[derive(Debug, Deserialize)]
struct ContentRow {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Description", alias = "2MinDescription")]
    description: Option<String>,
    #[serde(rename = "FollowUpQuestion1", alias = "FollowUpQ1")]
    question1: Option<String>,
    #[serde(rename = "FollowUpAnswer1", alias = "FollowUpA1")]
    answer1: Option<String>,
    #[serde(rename = "FollowUpQuestion2", alias = "FollowUpQ2")]
    question2: Option<String>,
    #[serde(rename = "FollowUpAnswer2", alias = "FollowUpA2")]
    answer2: Option<String>,
}

impl ContentRow {
    fn validate(self, row: usize) -> Result<LandmarkContent> {
        let field = |value: Option<String>, column: &str| -> Result<String> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(Error::InvalidLandmark {
                    row,
                    reason: format!("missing {}", column),
                }),
            }
        };

        let name = field(self.name, "Name")?;
        let description = field(self.description, "Description")?;
        let q1 = field(self.question1, "FollowUpQuestion1")?;
        let a1 = field(self.answer1, "FollowUpAnswer1")?;
        let q2 = field(self.question2, "FollowUpQuestion2")?;
        let a2 = field(self.answer2, "FollowUpAnswer2")?;

        if q1 == q2 {
            return Err(Error::InvalidLandmark {
                row,
                reason: format!("{}: both follow-up questions are identical", name),
            });
        }

        Ok(LandmarkContent {
            name,
            description,
            follow_ups: [
                FollowUp { question: q1, answer: a1 },
                FollowUp { question: q2, answer: a2 },
            ],
        })
    }
}

/// Entries that passed validation, plus the ones that were skipped
#[derive(Debug)]
pub struct ParseReport<T> {
    pub accepted: Vec<T>,
    /// One [`Error::InvalidLandmark`] per skipped entry
    pub rejected: Vec<Error>,
}

impl<T> Default for ParseReport<T> {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> ParseReport<T> {
    fn reject(&mut self, error: Error) {
        warn!("Skipping landmark entry: {}", error);
        self.rejected.push(error);
    }
}

/// Parse and validate the landmark content table
///
/// Rows are numbered from 1, excluding the header. A bad row only loses that
/// landmark: it is logged and skipped. Only an unreadable source is an error.
pub fn parse_content<R: Read>(reader: R) -> Result<ParseReport<LandmarkContent>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut report = ParseReport::default();

    for (index, record) in csv.deserialize::<ContentRow>().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                report.reject(Error::InvalidLandmark {
                    row,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let content = match record.validate(row) {
            Ok(content) => content,
            Err(e) => {
                report.reject(e);
                continue;
            }
        };

        if !seen.insert(content.name.clone()) {
            report.reject(Error::InvalidLandmark {
                row,
                reason: format!("duplicate landmark name: {}", content.name),
            });
            continue;
        }
        report.accepted.push(content);
    }

    Ok(report)
}

/// Map placement for a landmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlacesFile {
    #[serde(default, rename = "place")]
    places: Vec<Place>,
}

/// Parse the `[[place]]` TOML document
///
/// Places with out-of-range coordinates or a repeated name are skipped.
pub fn parse_places(content: &str) -> Result<ParseReport<Place>> {
    let file: PlacesFile = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid places file: {}", e)))?;

    let mut seen = HashSet::new();
    let mut report = ParseReport::default();
    for (index, place) in file.places.into_iter().enumerate() {
        let row = index + 1;
        if let Err(e) = Coordinate::new(place.lat, place.lng) {
            report.reject(Error::InvalidLandmark {
                row,
                reason: format!("{}: {}", place.name, e),
            });
            continue;
        }
        if !seen.insert(place.name.trim().to_string()) {
            report.reject(Error::InvalidLandmark {
                row,
                reason: format!("duplicate place name: {}", place.name),
            });
            continue;
        }
        report.accepted.push(place);
    }

    Ok(report)
}

/// Immutable set of landmarks, looked up by name
#[derive(Debug, Clone, Default)]
pub struct LandmarkCatalog {
    landmarks: Vec<Arc<Landmark>>,
    by_name: HashMap<String, usize>,
}

impl LandmarkCatalog {
    /// Join content rows with places by name
    ///
    /// Entries present on only one side are skipped with a warning.
    pub fn from_parts(content: Vec<LandmarkContent>, places: Vec<Place>) -> Self {
        let mut places: HashMap<String, Place> = places
            .into_iter()
            .map(|p| (p.name.trim().to_string(), p))
            .collect();

        let mut catalog = LandmarkCatalog::default();
        for row in content {
            let Some(place) = places.remove(&row.name) else {
                warn!(landmark = %row.name, "No map placement for landmark, skipping");
                continue;
            };
            catalog.insert(Landmark {
                name: row.name,
                coordinate: Coordinate {
                    lat: place.lat,
                    lng: place.lng,
                },
                description: row.description,
                follow_ups: row.follow_ups,
                image: place.image,
            });
        }

        for name in places.keys() {
            warn!(landmark = %name, "Place has no narration content, skipping");
        }

        catalog
    }

    /// Build a catalog directly from landmarks
    pub fn from_landmarks(landmarks: impl IntoIterator<Item = Landmark>) -> Self {
        let mut catalog = LandmarkCatalog::default();
        for landmark in landmarks {
            catalog.insert(landmark);
        }
        catalog
    }

    fn insert(&mut self, landmark: Landmark) {
        if self.by_name.contains_key(&landmark.name) {
            warn!(landmark = %landmark.name, "Duplicate landmark ignored");
            return;
        }
        self.by_name.insert(landmark.name.clone(), self.landmarks.len());
        self.landmarks.push(Arc::new(landmark));
    }

    /// Load content CSV and places TOML from disk
    pub fn load(content_csv: &Path, places_toml: &Path) -> Result<Self> {
        let file = std::fs::File::open(content_csv).map_err(|e| {
            Error::Config(format!("Cannot open {}: {}", content_csv.display(), e))
        })?;
        let content = parse_content(file)?;

        let places = std::fs::read_to_string(places_toml).map_err(|e| {
            Error::Config(format!("Cannot open {}: {}", places_toml.display(), e))
        })?;
        let places = parse_places(&places)?;

        let skipped = content.rejected.len() + places.rejected.len();
        let catalog = Self::from_parts(content.accepted, places.accepted);
        info!("Loaded {} landmarks ({} entries skipped)", catalog.len(), skipped);
        Ok(catalog)
    }

    /// Like [`load`](Self::load) but a failure degrades to an empty catalog
    pub fn load_or_empty(content_csv: &Path, places_toml: &Path) -> Self {
        match Self::load(content_csv, places_toml) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Landmark content unavailable, continuing with no landmarks: {}", e);
                Self::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Landmark>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.landmarks[index]))
    }

    /// Like [`get`](Self::get) but unknown names are an error
    pub fn require(&self, name: &str) -> Result<Arc<Landmark>> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("landmark {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Landmark>> {
        self.landmarks.iter()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
