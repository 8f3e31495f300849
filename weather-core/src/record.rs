//! Weather payload types.
//!
//! [`RawWeather`] mirrors the OpenWeather "current weather" response closely
//! enough to deserialize it; every field is optional so partial payloads still
//! parse. [`normalize`] turns it into the canonical [`WeatherRecord`], which
//! always carries every key.

use serde::{Deserialize, Deserializer, Serialize};

// ------------------------------------------------------------------ //
//  Raw provider payload                                               //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWeather {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub coord: Option<RawCoord>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub weather: Vec<RawCondition>,
    #[serde(default)]
    pub main: Option<RawMain>,
    #[serde(default)]
    pub wind: Option<RawWind>,
    #[serde(default)]
    pub sys: Option<RawSys>,
    #[serde(default)]
    pub visibility: Option<i64>,
    #[serde(default)]
    pub dt: Option<i64>,
    #[serde(default)]
    pub timezone: Option<i64>,
}

/// Accept an explicit `null` where a list is expected.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCoord {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCondition {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMain {
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    /// Relative humidity in percent; some stations report fractional values.
    #[serde(default)]
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWind {
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSys {
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

// ------------------------------------------------------------------ //
//  Normalized record                                                  //
// ------------------------------------------------------------------ //

/// Canonical weather record served to callers and stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub name: String,
    pub weather: Conditions,
    pub temperature: Temperature,
    pub wind: Wind,
    pub sys: SunTimes,
    pub visibility: String,
    /// Observation time, unix seconds.
    pub datetime: i64,
    /// Offset from UTC in seconds.
    pub timezone: i64,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub main: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: i64,
    pub sunset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Build a [`WeatherRecord`] from a provider payload, defaulting whatever is
/// missing. Only the first entry of `weather` is used.
pub fn normalize(raw: &RawWeather) -> WeatherRecord {
    let condition = raw.weather.first();
    let main = raw.main.clone().unwrap_or_default();
    let sys = raw.sys.clone().unwrap_or_default();
    let coord = raw.coord.clone().unwrap_or_default();

    WeatherRecord {
        name: raw.name.clone().unwrap_or_default(),
        weather: Conditions {
            main: condition.and_then(|c| c.main.clone()).unwrap_or_default(),
            description: condition
                .and_then(|c| c.description.clone())
                .unwrap_or_default(),
        },
        temperature: Temperature {
            temp: main.temp.unwrap_or_default(),
            feels_like: main.feels_like.unwrap_or_default(),
            humidity: main.humidity.map(|h| h.round() as i64).unwrap_or_default(),
        },
        wind: Wind {
            speed: raw.wind.as_ref().and_then(|w| w.speed).unwrap_or_default(),
        },
        sys: SunTimes {
            sunrise: sys.sunrise.unwrap_or_default(),
            sunset: sys.sunset.unwrap_or_default(),
        },
        visibility: raw.visibility.map(|v| v.to_string()).unwrap_or_default(),
        datetime: raw.dt.unwrap_or_default(),
        timezone: raw.timezone.unwrap_or_default(),
        coordinates: Coordinates {
            lat: coord.lat.unwrap_or_default(),
            lon: coord.lon.unwrap_or_default(),
        },
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
