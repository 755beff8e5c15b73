//!
//! src/types.rs  Andrew Belles  Oct 19th, 2026
//!
//! Track records, the quality tier and cited sources shared by the
//! query service, the simulator and the presentation state
//!

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::SonicError;

/// Shown whenever a record's artwork is missing or does not parse
pub const PLACEHOLDER_ARTWORK: &str =
    "https://images.unsplash.com/photo-1614613535308-eb5fbd3d2c17?q=80&w=600&auto=format&fit=crop";

// Quality selector, applied globally and stamped onto displayed records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    #[serde(rename = "320kbps")]
    Mp3_320,
    #[serde(rename = "FLAC")]
    Flac,
}

impl Tier {
    pub fn extension(self) -> &'static str {
        match self {
            Tier::Mp3_320 => "mp3",
            Tier::Flac => "flac",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Tier::Mp3_320 => "audio/mpeg",
            Tier::Flac => "audio/flac",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Mp3_320 => "320kbps MP3",
            Tier::Flac => "Lossless FLAC",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Mp3_320 => f.write_str("320kbps"),
            Tier::Flac => f.write_str("FLAC"),
        }
    }
}

impl FromStr for Tier {
    type Err = SonicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "320kbps" | "320" | "mp3" | "standard" => Ok(Tier::Mp3_320),
            "flac" | "lossless" => Ok(Tier::Flac),
            other => Err(SonicError::Parse(format!("unknown tier: {other}"))),
        }
    }
}

/// A cited web source the backend grounded its answer on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub title: String,
    pub uri: String,
}

/// One discoverable song. Carries no tier; see `StampedTrack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub genre: String,
    pub duration: String,
    pub thumbnail_url: Option<String>,
    pub sample_rate: Option<String>,
    pub bit_depth: Option<String>,
}

impl TrackRecord {
    /// Artwork to render. Falls back to the placeholder when the
    /// reference is absent or is not an http(s) URL.
    pub fn artwork_url(&self) -> Url {
        let parsed = self.thumbnail_url.as_deref()
            .and_then(|raw| Url::parse(raw.trim()).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"));

        match parsed {
            Some(url) => url,
            None => Url::parse(PLACEHOLDER_ARTWORK)
                .unwrap_or_else(|_| unreachable!("placeholder artwork url is valid")),
        }
    }

    /// "96kHz / 24-bit" style badge, when the backend suggested one
    pub fn audio_spec(&self) -> Option<String> {
        match (self.sample_rate.as_deref(), self.bit_depth.as_deref()) {
            (Some(rate), Some(depth)) => Some(format!("{rate} / {depth}")),
            (Some(rate), None) => Some(rate.to_string()),
            _ => None,
        }
    }
}

/// A record paired with the tier it is shown or exported at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StampedTrack {
    pub record: TrackRecord,
    pub tier: Tier,
}

impl StampedTrack {
    pub fn new(record: TrackRecord, tier: Tier) -> Self {
        Self { record, tier }
    }

    /// `artist - title (tier).ext`
    pub fn file_name(&self) -> String {
        format!(
            "{} - {} ({}).{}",
            self.record.artist,
            self.record.title,
            self.tier,
            self.tier.extension()
        )
    }
}

/// Everything one successful search produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub records: Vec<TrackRecord>,
    pub sources: Vec<Provenance>,
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, title: &str) -> TrackRecord {
    TrackRecord {
        id: id.to_string(),
        title: title.to_string(),
        artist: "Tame Impala".to_string(),
        album: "Currents".to_string(),
        year: "2015".to_string(),
        genre: "Psychedelic Pop".to_string(),
        duration: "7:47".to_string(),
        thumbnail_url: Some("https://example.com/currents.jpg".to_string()),
        sample_rate: Some("96kHz".to_string()),
        bit_depth: Some("24-bit".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parses_aliases() -> Result<(), SonicError> {
        assert_eq!("flac".parse::<Tier>()?, Tier::Flac);
        assert_eq!(" Lossless ".parse::<Tier>()?, Tier::Flac);
        assert_eq!("mp3".parse::<Tier>()?, Tier::Mp3_320);
        assert_eq!("320kbps".parse::<Tier>()?, Tier::Mp3_320);
        assert!("ogg".parse::<Tier>().is_err());
        Ok(())
    }

    #[test]
    fn tier_serializes_as_wire_labels() -> Result<(), SonicError> {
        assert_eq!(serde_json::to_string(&Tier::Mp3_320)?, "\"320kbps\"");
        assert_eq!(serde_json::to_string(&Tier::Flac)?, "\"FLAC\"");
        Ok(())
    }

    #[test]
    fn file_name_carries_tier_and_extension() {
        let track = StampedTrack::new(sample_record("a", "Let It Happen"), Tier::Flac);
        assert_eq!(track.file_name(), "Tame Impala - Let It Happen (FLAC).flac");

        let track = StampedTrack::new(sample_record("a", "Let It Happen"), Tier::Mp3_320);
        assert_eq!(track.file_name(), "Tame Impala - Let It Happen (320kbps).mp3");
    }

    #[test]
    fn artwork_falls_back_to_placeholder() {
        let mut record = sample_record("a", "Eventually");
        assert_eq!(record.artwork_url().as_str(), "https://example.com/currents.jpg");

        record.thumbnail_url = Some("not a url".to_string());
        assert_eq!(record.artwork_url().as_str(), PLACEHOLDER_ARTWORK);

        record.thumbnail_url = Some("ftp://example.com/a.jpg".to_string());
        assert_eq!(record.artwork_url().as_str(), PLACEHOLDER_ARTWORK);

        record.thumbnail_url = None;
        assert_eq!(record.artwork_url().as_str(), PLACEHOLDER_ARTWORK);
    }

    #[test]
    fn audio_spec_badge() {
        let mut record = sample_record("a", "Eventually");
        assert_eq!(record.audio_spec().as_deref(), Some("96kHz / 24-bit"));
        record.bit_depth = None;
        assert_eq!(record.audio_spec().as_deref(), Some("96kHz"));
        record.sample_rate = None;
        assert_eq!(record.audio_spec(), None);
    }
}
