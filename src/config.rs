use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::{CinemaError, Vendor};

/// Per-theater connection record supplied at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct TheaterConfig {
    #[serde(default)]
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Vendor hint; decides which login flow is tried first.
    #[serde(rename = "type", default, deserialize_with = "de_vendor_hint")]
    pub vendor_hint: Option<Vendor>,
}

fn de_vendor_hint<'de, D>(deserializer: D) -> Result<Option<Vendor>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl TheaterConfig {
    pub fn new(name: &str, url: &str, username: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            vendor_hint: None,
        }
    }

    pub fn with_vendor_hint(mut self, vendor: Vendor) -> Self {
        self.vendor_hint = Some(vendor);
        self
    }

    pub fn validate(&self) -> Result<(), CinemaError> {
        if self.name.trim().is_empty() {
            return Err(CinemaError::InvalidConfig(
                "theater name must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.url).map_err(|e| {
            CinemaError::InvalidConfig(format!("{}: invalid url {:?}: {}", self.name, self.url, e))
        })?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawFleetConfig {
    #[serde(deserialize_with = "de_ordered_theaters")]
    theaters: Vec<(String, TheaterConfig)>,
}

/// Map entries in file order.
fn de_ordered_theaters<'de, D>(deserializer: D) -> Result<Vec<(String, TheaterConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedTheaters;

    impl<'de> Visitor<'de> for OrderedTheaters {
        type Value = Vec<(String, TheaterConfig)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of theater name to connection record")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut theaters = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, theater)) = map.next_entry::<String, TheaterConfig>()? {
                theaters.retain(|(existing, _): &(String, TheaterConfig)| existing != &name);
                theaters.push((name, theater));
            }
            Ok(theaters)
        }
    }

    deserializer.deserialize_map(OrderedTheaters)
}

/// The set of theaters one process manages.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub theaters: Vec<TheaterConfig>,
}

impl FleetConfig {
    /// Parse `{ "theaters": { "<name>": { "url", "username", "password", "type" } } }`.
    pub fn from_json_str(json: &str) -> Result<Self, CinemaError> {
        let raw: RawFleetConfig = serde_json::from_str(json)?;
        let theaters = raw
            .theaters
            .into_iter()
            .map(|(name, mut theater)| {
                theater.name = name;
                theater.validate().map(|()| theater)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { theaters })
    }
}
