use serde::Deserialize;

use crate::tags::{Rational, TagMap, TagSlot, TagValue};

/// A `geoData` / `geoDataExif` block of a sidecar, signed decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct GeoData {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

/// One axis as reference letter plus degrees/minutes/seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    /// `N`/`S` or `E`/`W`
    pub reference: char,
    pub dms: [Rational; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Altitude {
    pub below_sea_level: bool,
    pub meters: Rational,
}

/// Geolocation ready for embedding; either part may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geolocation {
    pub position: Option<(Coordinate, Coordinate)>,
    pub altitude: Option<Altitude>,
}

/// Merge the edited and the camera-derived blocks.
///
/// Latitude/longitude come from `geoData` unless both are exactly zero there,
/// in which case the pair comes from `geoDataExif`. Altitude falls back on its
/// own when `geoData.altitude` is zero. Zero values are omitted; `None` when
/// nothing is left.
pub fn merge(edited: Option<&GeoData>, exif: Option<&GeoData>) -> Option<Geolocation> {
    let edited = edited.copied().unwrap_or_default();
    let exif = exif.copied().unwrap_or_default();

    let (latitude, longitude) = if edited.latitude == 0.0 && edited.longitude == 0.0 {
        (exif.latitude, exif.longitude)
    } else {
        (edited.latitude, edited.longitude)
    };
    let altitude = if edited.altitude != 0.0 {
        edited.altitude
    } else {
        exif.altitude
    };

    let position = if latitude != 0.0 || longitude != 0.0 {
        Some((
            coordinate(latitude, 'N', 'S'),
            coordinate(longitude, 'E', 'W'),
        ))
    } else {
        None
    };

    let meters = altitude.abs().round();
    let altitude = if meters != 0.0 && meters <= u32::MAX as f64 {
        Some(Altitude {
            below_sea_level: altitude < 0.0,
            meters: Rational::new(meters as u32, 1),
        })
    } else {
        None
    };

    if position.is_none() && altitude.is_none() {
        return None;
    }
    Some(Geolocation { position, altitude })
}

fn coordinate(value: f64, positive: char, negative: char) -> Coordinate {
    Coordinate {
        reference: if value >= 0.0 { positive } else { negative },
        dms: degrees_to_dms(value.abs()),
    }
}

/// Unsigned decimal degrees to (deg/1, min/1, sec*100/100).
pub fn degrees_to_dms(degrees: f64) -> [Rational; 3] {
    let minutes_f = degrees.fract() * 60.0;
    let seconds_f = minutes_f.fract() * 60.0;
    [
        Rational::new(degrees.floor() as u32, 1),
        Rational::new(minutes_f.floor() as u32, 1),
        Rational::new((seconds_f * 100.0).round() as u32, 100),
    ]
}

impl Geolocation {
    pub fn to_tags(&self) -> TagMap {
        let mut tags = TagMap::new();
        tags.insert(TagSlot::GpsVersionId, TagValue::Byte(vec![2, 0, 0, 0]));
        if let Some((lat, lon)) = &self.position {
            tags.insert(TagSlot::GpsLatitudeRef, TagValue::Ascii(lat.reference.to_string()));
            tags.insert(TagSlot::GpsLatitude, TagValue::Rational(lat.dms.to_vec()));
            tags.insert(TagSlot::GpsLongitudeRef, TagValue::Ascii(lon.reference.to_string()));
            tags.insert(TagSlot::GpsLongitude, TagValue::Rational(lon.dms.to_vec()));
        }
        if let Some(alt) = &self.altitude {
            tags.insert(TagSlot::GpsAltitudeRef, TagValue::Byte(vec![u8::from(alt.below_sea_level)]));
            tags.insert(TagSlot::GpsAltitude, TagValue::Rational(vec![alt.meters]));
        }
        tags
    }
}
