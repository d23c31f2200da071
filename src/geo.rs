//! Country / region / city reference data.
//!
//! The catalog is fetched level by level from the ajax geo endpoints and kept
//! as a single JSON snapshot. Everything that reads it treats a missing
//! snapshot as "no catalog" rather than a failure.

use crate::config::{Config, Endpoints};
use crate::delay_manager::Sleeper;
use crate::error::{Error, Result};
use crate::extractor::decode_ajax_payload;
use crate::http_client::Transport;
use crate::retry::{run_with_retry, RetryPolicies};
use crate::search_engine::GeoFilter;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Countries listed by `show countries` without `--all`.
pub const COUNTRIES_SHORT: [&str; 9] = [
    "Россия",
    "Украина",
    "Беларусь",
    "Казахстан",
    "Грузия",
    "Армения",
    "Азербайджан",
    "Таджикистан",
    "Узбекистан",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    #[serde(deserialize_with = "id_string")]
    pub city_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(deserialize_with = "id_string")]
    pub region_id: String,
    pub name: String,
    #[serde(default)]
    pub cities: Vec<City>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    #[serde(deserialize_with = "id_string")]
    pub country_id: String,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// The upstream is not consistent about ids being strings or numbers.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoCatalog {
    pub countries: Vec<Country>,
}

impl GeoCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::GeoFileMissing(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let catalog: GeoCatalog = serde_json::from_reader(BufReader::new(file))?;
        info!("Geo catalog loaded: {} countries", catalog.countries.len());
        Ok(catalog)
    }

    /// Logs and returns `None` when the snapshot is unusable.
    pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> Option<Self> {
        match Self::load(path) {
            Ok(catalog) => Some(catalog),
            Err(Error::GeoFileMissing(path)) => {
                error!("Geo file {:?} not found. Try to run with the update_geo command", path);
                None
            }
            Err(e) => {
                error!("Geo file unreadable, geo lookups disabled: {}", e);
                None
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_vec(self)?)?;
        info!("Geo catalog saved to {:?}", path.as_ref());
        Ok(())
    }

    pub fn country(&self, country_id: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.country_id == country_id)
    }

    pub fn region(&self, country_id: &str, region_id: &str) -> Option<&Region> {
        self.country(country_id)?
            .regions
            .iter()
            .find(|r| r.region_id == region_id)
    }

    pub fn regions_of(&self, country_id: &str) -> &[Region] {
        self.country(country_id)
            .map(|c| c.regions.as_slice())
            .unwrap_or(&[])
    }

    pub fn cities_of(&self, country_id: &str, region_id: &str) -> &[City] {
        self.region(country_id, region_id)
            .map(|r| r.cities.as_slice())
            .unwrap_or(&[])
    }

    /// Every country, or just the short CIS list.
    pub fn countries(&self, all: bool) -> Vec<&Country> {
        self.countries
            .iter()
            .filter(|c| all || COUNTRIES_SHORT.contains(&c.name.as_str()))
            .collect()
    }

    /// Human-readable names for the ids in a search filter.
    pub fn describe_filter(&self, filter: &GeoFilter) -> Vec<String> {
        let mut parts = Vec::new();
        let country_id = filter.country.map(|id| id.to_string());
        let region_id = filter.region.map(|id| id.to_string());

        if let Some(id) = &country_id {
            parts.push(match self.country(id) {
                Some(c) => format!("country {} ({})", c.name, id),
                None => format!("country {} (unknown)", id),
            });
        }
        if let Some(id) = &region_id {
            let region = country_id.as_deref().and_then(|c| self.region(c, id));
            parts.push(match region {
                Some(r) => format!("region {} ({})", r.name, id),
                None => format!("region {}", id),
            });
        }
        if let Some(id) = filter.city {
            let id = id.to_string();
            let city = match (&country_id, &region_id) {
                (Some(c), Some(r)) => self.cities_of(c, r).iter().find(|city| city.city_id == id),
                _ => None,
            };
            parts.push(match city {
                Some(city) => format!("city {} ({})", city.name, id),
                None => format!("city {}", id),
            });
        }
        parts
    }
}

/// `(id, name)` rows laid out in three aligned columns, like the console listing.
pub fn columns_table(rows: &[(&str, &str)]) -> String {
    let id_width = rows.iter().map(|(id, _)| id.chars().count()).max().unwrap_or(0);
    let name_width = rows.iter().map(|(_, name)| name.chars().count()).max().unwrap_or(0) + 1;

    let mut out = String::new();
    for chunk in rows.chunks(3) {
        let mut line = String::new();
        for i in 0..3 {
            let (id, name) = chunk.get(i).copied().unwrap_or((" ", " "));
            line.push_str(&format!("{:<iw$} {:<nw$}", id, name, iw = id_width, nw = name_width));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[derive(Deserialize)]
struct GeoListing<T> {
    result: Vec<T>,
}

/// Walks the three geo levels and assembles a full catalog.
pub struct GeoUpdater<'a, T: Transport> {
    transport: &'a T,
    endpoints: &'a Endpoints,
    sleeper: &'a dyn Sleeper,
    policies: RetryPolicies,
}

impl<'a, T: Transport> GeoUpdater<'a, T> {
    pub fn new(
        transport: &'a T,
        config: &'a Config,
        endpoints: &'a Endpoints,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        GeoUpdater {
            transport,
            endpoints,
            sleeper,
            policies: RetryPolicies::from_config(config).without_flood(),
        }
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies.without_flood();
        self
    }

    pub fn countries_url(&self) -> String {
        format!("{}?ajax_call=1&arg_offset=0&func_name=geo.countries", self.endpoints.ajax_url)
    }

    pub fn regions_url(&self, country_id: &str) -> String {
        format!(
            "{}?ajax_call=1&arg_offset=0&func_name=geo.regions&arg_country={}",
            self.endpoints.ajax_url, country_id
        )
    }

    pub fn cities_url(&self, region_id: &str) -> String {
        format!(
            "{}?ajax_call=1&arg_offset=0&func_name=geo.cities&arg_region={}",
            self.endpoints.ajax_url, region_id
        )
    }

    fn fetch_list<I: DeserializeOwned>(&self, url: &str) -> Result<Vec<I>> {
        run_with_retry(&self.policies, self.sleeper, url, || {
            let resp = self.transport.get(url)?;
            let payload = decode_ajax_payload(&resp.body, None)?;
            serde_json::from_value::<GeoListing<I>>(payload)
                .map(|listing| listing.result)
                .map_err(|e| Error::Decode(format!("geo listing: {}", e)))
        })
    }

    pub fn refresh(&self) -> Result<GeoCatalog> {
        let mut countries: Vec<Country> = self.fetch_list(&self.countries_url())?;
        for country in &mut countries {
            info!("{} - {}", country.country_id, country.name);
            let mut regions: Vec<Region> = self.fetch_list(&self.regions_url(&country.country_id))?;
            for region in &mut regions {
                region.cities = self.fetch_list(&self.cities_url(&region.region_id))?;
            }
            country.regions = regions;
        }
        Ok(GeoCatalog { countries })
    }

    /// Fetches the whole tree, then replaces the snapshot at `path`.
    pub fn refresh_to<P: AsRef<Path>>(&self, path: P) -> Result<GeoCatalog> {
        let catalog = self.refresh()?;
        catalog.save(path)?;
        Ok(catalog)
    }
}
