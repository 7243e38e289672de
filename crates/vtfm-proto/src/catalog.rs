//! Static station/quality catalog and the playlist derived from it.
//!
//! The catalog is loaded once at startup and never mutated.  Every
//! (station, quality) pair maps to exactly one playlist entry addressed by its
//! [`TrackKey`], the concatenation of both identifiers (`"111" + "2"` →
//! `"1112"`).  Loading fails if two pairs would produce the same key.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Default stream URL pattern.  `{slug}` and `{bitrate}` are substituted per entry.
pub const DEFAULT_STREAM_TEMPLATE: &str = "https://stream.vocaltrance.fm/{slug}_{bitrate}";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no stations")]
    NoStations,
    #[error("catalog has no qualities")]
    NoQualities,
    #[error("duplicate station id {0}")]
    DuplicateStation(StationId),
    #[error("duplicate quality id {0}")]
    DuplicateQuality(QualityId),
    #[error("station {0} has an empty slug")]
    EmptySlug(StationId),
    #[error("default quality {0} is not in the catalog")]
    UnknownDefaultQuality(QualityId),
    #[error("track key {0} is produced by more than one station/quality pair")]
    DuplicateTrackKey(TrackKey),
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Toml(#[from] toml::de::Error),
}

// ── identifiers ───────────────────────────────────────────────────────────────

/// Station identifier.  Numeric in-process, decimal string on disk and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StationId(u16);

/// Quality identifier.  Numeric in-process, decimal string on disk and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct QualityId(u8);

macro_rules! string_id {
    ($name:ident, $inner:ty) => {
        impl $name {
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<$inner>().map(Self)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = std::num::ParseIntError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

string_id!(StationId, u16);
string_id!(QualityId, u8);

/// Address of one stream variant in the engine playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackKey(String);

impl TrackKey {
    pub fn new(station: StationId, quality: QualityId) -> Self {
        Self(format!("{}{}", station, quality))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── catalog entries ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    /// Path segment used by the now-playing endpoint (`get_<slug>_track`).
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub id: QualityId,
    pub title: String,
    /// Nominal bitrate in kbps.
    pub bitrate: u16,
}

/// One playable stream variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub key: TrackKey,
    pub url: String,
    pub title: String,
    pub artist: String,
}

/// The user's chosen (station, quality) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub station: StationId,
    pub quality: QualityId,
}

impl Selection {
    pub fn track_key(&self) -> TrackKey {
        TrackKey::new(self.station, self.quality)
    }
}

// ── catalog ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Catalog {
    stations: Vec<Station>,
    qualities: Vec<Quality>,
    default_quality: QualityId,
    playlist: Vec<Track>,
}

impl Catalog {
    /// Build and validate a catalog.  `streams` overrides the templated URL for
    /// individual track keys.
    pub fn new(
        stations: Vec<Station>,
        qualities: Vec<Quality>,
        default_quality: QualityId,
        stream_template: &str,
        streams: &HashMap<TrackKey, String>,
    ) -> Result<Self, CatalogError> {
        if stations.is_empty() {
            return Err(CatalogError::NoStations);
        }
        if qualities.is_empty() {
            return Err(CatalogError::NoQualities);
        }

        let mut seen_stations = HashSet::new();
        for s in &stations {
            if !seen_stations.insert(s.id) {
                return Err(CatalogError::DuplicateStation(s.id));
            }
            if s.slug.trim().is_empty() {
                return Err(CatalogError::EmptySlug(s.id));
            }
        }
        let mut seen_qualities = HashSet::new();
        for q in &qualities {
            if !seen_qualities.insert(q.id) {
                return Err(CatalogError::DuplicateQuality(q.id));
            }
        }
        if !seen_qualities.contains(&default_quality) {
            return Err(CatalogError::UnknownDefaultQuality(default_quality));
        }

        let mut seen_keys = HashSet::new();
        for s in &stations {
            for q in &qualities {
                let key = TrackKey::new(s.id, q.id);
                if !seen_keys.insert(key.clone()) {
                    return Err(CatalogError::DuplicateTrackKey(key));
                }
            }
        }

        Ok(Self::assemble(
            stations,
            qualities,
            default_quality,
            stream_template,
            streams,
        ))
    }

    fn assemble(
        stations: Vec<Station>,
        qualities: Vec<Quality>,
        default_quality: QualityId,
        stream_template: &str,
        streams: &HashMap<TrackKey, String>,
    ) -> Self {
        let mut playlist = Vec::with_capacity(stations.len() * qualities.len());
        for s in &stations {
            for q in &qualities {
                let key = TrackKey::new(s.id, q.id);
                let url = streams.get(&key).cloned().unwrap_or_else(|| {
                    stream_template
                        .replace("{slug}", &s.slug)
                        .replace("{bitrate}", &q.bitrate.to_string())
                });
                playlist.push(Track {
                    key,
                    url,
                    title: s.title.clone(),
                    artist: format!("Vocal Trance FM \u{b7} {} kbps", q.bitrate),
                });
            }
        }

        Self {
            stations,
            qualities,
            default_quality,
            playlist,
        }
    }

    /// The five Vocal Trance FM channels in three bitrates.  Covered by the
    /// same checks as `new` in the tests below.
    pub fn builtin() -> Self {
        Self::assemble(
            builtin_stations(),
            builtin_qualities(),
            QualityId::new(2),
            DEFAULT_STREAM_TEMPLATE,
            &HashMap::new(),
        )
    }

    /// Load an override file, or the built-in catalog when `path` does not exist.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a catalog file.  Missing `[[station]]` or `[[quality]]` tables fall
    /// back to the built-in lists.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: TomlCatalogFile = toml::from_str(content)?;

        let stations = if file.station.is_empty() {
            builtin_stations()
        } else {
            file.station
                .into_iter()
                .map(|s| Station {
                    id: StationId::new(s.id),
                    slug: s.slug,
                    title: s.title,
                })
                .collect()
        };
        let qualities = if file.quality.is_empty() {
            builtin_qualities()
        } else {
            file.quality
                .into_iter()
                .map(|q| Quality {
                    id: QualityId::new(q.id),
                    title: q.title,
                    bitrate: q.bitrate,
                })
                .collect()
        };
        let streams = file
            .stream
            .into_iter()
            .map(|s| {
                (
                    TrackKey::new(StationId::new(s.station), QualityId::new(s.quality)),
                    s.url,
                )
            })
            .collect();

        Self::new(
            stations,
            qualities,
            QualityId::new(file.default_quality.unwrap_or(2)),
            file.stream_template
                .as_deref()
                .unwrap_or(DEFAULT_STREAM_TEMPLATE),
            &streams,
        )
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn qualities(&self) -> &[Quality] {
        &self.qualities
    }

    pub fn playlist(&self) -> &[Track] {
        &self.playlist
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn quality(&self, id: QualityId) -> Option<&Quality> {
        self.qualities.iter().find(|q| q.id == id)
    }

    pub fn first_station(&self) -> StationId {
        self.stations[0].id
    }

    pub fn default_quality(&self) -> QualityId {
        self.default_quality
    }

    pub fn default_selection(&self) -> Selection {
        Selection {
            station: self.first_station(),
            quality: self.default_quality,
        }
    }

    pub fn track(&self, key: &TrackKey) -> Option<&Track> {
        self.playlist.iter().find(|t| &t.key == key)
    }
}

fn builtin_stations() -> Vec<Station> {
    [
        (111, "vocaltrance", "Vocal Trance"),
        (222, "deep", "Deep Trance"),
        (333, "positive", "Positive Trance"),
        (444, "uplifting", "Uplifting Trance"),
        (555, "chillout", "Chillout"),
    ]
    .into_iter()
    .map(|(id, slug, title)| Station {
        id: StationId::new(id),
        slug: slug.to_string(),
        title: title.to_string(),
    })
    .collect()
}

fn builtin_qualities() -> Vec<Quality> {
    [(1, "Low", 128), (2, "Medium", 256), (3, "High", 320)]
        .into_iter()
        .map(|(id, title, bitrate)| Quality {
            id: QualityId::new(id),
            title: title.to_string(),
            bitrate,
        })
        .collect()
}

// ── TOML catalog file ─────────────────────────────────────────────────────────

/// On-disk schema.  Kept apart from the public types so the file format can
/// use plain integers for ids.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    stream_template: Option<String>,
    #[serde(default)]
    default_quality: Option<u8>,
    #[serde(default)]
    station: Vec<TomlStation>,
    #[serde(default)]
    quality: Vec<TomlQuality>,
    #[serde(default)]
    stream: Vec<TomlStream>,
}

#[derive(Debug, Deserialize)]
struct TomlStation {
    id: u16,
    slug: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuality {
    id: u8,
    title: String,
    bitrate: u16,
}

#[derive(Debug, Deserialize)]
struct TomlStream {
    station: u16,
    quality: u8,
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_key_concatenates_ids() {
        let key = TrackKey::new(StationId::new(111), QualityId::new(3));
        assert_eq!(key.as_str(), "1113");
    }

    #[test]
    fn test_builtin_defaults() {
        let catalog = Catalog::builtin();
        let sel = catalog.default_selection();
        assert_eq!(sel.station, StationId::new(111));
        assert_eq!(sel.quality, QualityId::new(2));
        assert_eq!(sel.track_key().as_str(), "1112");
        assert_eq!(catalog.playlist().len(), 15);
    }

    #[test]
    fn test_builtin_passes_validation() {
        let validated = Catalog::new(
            builtin_stations(),
            builtin_qualities(),
            QualityId::new(2),
            DEFAULT_STREAM_TEMPLATE,
            &HashMap::new(),
        );
        assert!(validated.is_ok());
    }

    #[test]
    fn test_every_pair_has_exactly_one_track() {
        let catalog = Catalog::builtin();
        for s in catalog.stations() {
            for q in catalog.qualities() {
                let key = TrackKey::new(s.id, q.id);
                let hits = catalog.playlist().iter().filter(|t| t.key == key).count();
                assert_eq!(hits, 1, "key {key}");
            }
        }
    }

    #[test]
    fn test_stream_template_substitution() {
        let catalog = Catalog::builtin();
        let track = catalog.track(&TrackKey::from("2223")).unwrap();
        assert_eq!(track.url, "https://stream.vocaltrance.fm/deep_320");
        assert_eq!(track.title, "Deep Trance");
    }

    #[test]
    fn test_colliding_track_keys_rejected() {
        // "11" + "13" and "111" + "3" both produce "1113"
        let stations = vec![
            Station { id: StationId::new(11), slug: "a".into(), title: "A".into() },
            Station { id: StationId::new(111), slug: "b".into(), title: "B".into() },
        ];
        let qualities = vec![
            Quality { id: QualityId::new(13), title: "x".into(), bitrate: 64 },
            Quality { id: QualityId::new(3), title: "y".into(), bitrate: 320 },
        ];
        let err = Catalog::new(
            stations,
            qualities,
            QualityId::new(3),
            DEFAULT_STREAM_TEMPLATE,
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTrackKey(k) if k.as_str() == "1113"));
    }

    #[test]
    fn test_unknown_default_quality_rejected() {
        let err = Catalog::from_toml_str("default_quality = 9").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownDefaultQuality(q) if q.get() == 9));
    }

    #[test]
    fn test_toml_override() {
        let toml = r#"
stream_template = "http://example.test/{slug}/{bitrate}"

[[station]]
id = 777
slug = "test"
title = "Test FM"

[[stream]]
station = 777
quality = 1
url = "http://override.test/low"
"#;
        let catalog = Catalog::from_toml_str(toml).unwrap();
        assert_eq!(catalog.stations().len(), 1);
        assert_eq!(catalog.qualities().len(), 3);
        assert_eq!(
            catalog.track(&TrackKey::from("7771")).unwrap().url,
            "http://override.test/low"
        );
        assert_eq!(
            catalog.track(&TrackKey::from("7772")).unwrap().url,
            "http://example.test/test/256"
        );
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let sel = Selection {
            station: StationId::new(333),
            quality: QualityId::new(1),
        };
        let json = serde_json::to_string(&sel).unwrap();
        assert_eq!(json, r#"{"station":"333","quality":"1"}"#);
        let back: Selection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sel);
    }

    #[test]
    fn test_id_parse_trims_and_rejects_garbage() {
        assert_eq!(" 222 ".parse::<StationId>().unwrap(), StationId::new(222));
        assert!("abc".parse::<QualityId>().is_err());
    }
}
