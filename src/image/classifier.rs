//! Build-lifecycle classification of image tags
//!
//! Tags follow `<class>-<timestamp>-<suffix>`, except the `prepare` family
//! which carries a build id first: `prepare-<buildid>-<timestamp>-<suffix>`.
//! Any tag containing `-config-` is a one-off config image. Everything else
//! is [`ImageClass::Unknown`] and is left alone by the collector.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const CONFIG_MARKER: &str = "-config-";
const TAG_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageClass {
    Meta,
    Release,
    Prepare,
    Config,
    Unknown,
}

impl ImageClass {
    /// Classes subject to keep-count / keep-duration retention, in the order
    /// their deletions are emitted
    pub const RETAINED: [ImageClass; 3] = [ImageClass::Meta, ImageClass::Release, ImageClass::Prepare];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageClass::Meta => "meta",
            ImageClass::Release => "release",
            ImageClass::Prepare => "prepare",
            ImageClass::Config => "config",
            ImageClass::Unknown => "unknown",
        }
    }

    /// Field count of a well-formed tag and the index of its timestamp field
    fn tag_shape(&self) -> Option<(usize, usize)> {
        match self {
            ImageClass::Meta | ImageClass::Release => Some((3, 1)),
            ImageClass::Prepare => Some((4, 2)),
            ImageClass::Config | ImageClass::Unknown => None,
        }
    }
}

impl fmt::Display for ImageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(ImageClass::Meta),
            "release" => Ok(ImageClass::Release),
            "prepare" => Ok(ImageClass::Prepare),
            "config" => Ok(ImageClass::Config),
            "unknown" => Ok(ImageClass::Unknown),
            other => Err(format!("unknown image class: {}", other)),
        }
    }
}

/// Result of classifying one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub class: ImageClass,
    /// Unix timestamp in seconds, present only for retention-grouped classes
    pub timestamp: Option<i64>,
}

impl Classification {
    const UNKNOWN: Classification = Classification {
        class: ImageClass::Unknown,
        timestamp: None,
    };

    const CONFIG: Classification = Classification {
        class: ImageClass::Config,
        timestamp: None,
    };
}

/// Classify a tag. Malformed tags degrade to `Unknown`, never an error.
pub fn classify(tag: &str) -> Classification {
    if tag.contains(CONFIG_MARKER) {
        return Classification::CONFIG;
    }

    let fields: Vec<&str> = tag.split(TAG_SEPARATOR).collect();
    let class = match fields[0].parse::<ImageClass>() {
        Ok(class) => class,
        Err(_) => return Classification::UNKNOWN,
    };

    let Some((field_count, timestamp_index)) = class.tag_shape() else {
        return Classification::UNKNOWN;
    };

    if fields.len() != field_count {
        return Classification::UNKNOWN;
    }

    match parse_timestamp(fields[timestamp_index]) {
        Some(timestamp) => Classification {
            class,
            timestamp: Some(timestamp),
        },
        None => Classification::UNKNOWN,
    }
}

// Plain decimal digits only; `i64::from_str` alone would accept a leading `+`.
fn parse_timestamp(field: &str) -> Option<i64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
