//! Streaming resolution of the remote version index.
//!
//! The index is one large JSON object keyed by version alias:
//!
//! ```json
//! {
//!   "master": {
//!     "version": "0.15.0-dev.1+abc",
//!     "x86_64-linux": { "tarball": "https://…", "shasum": "…", "size": "51234567" }
//!   },
//!   "0.14.1": { "x86_64-linux": { … } }
//! }
//! ```
//!
//! It is walked with a serde visitor straight off the response body. Entries
//! we are not looking for are skipped with [`IgnoredAny`], so nothing but the
//! matched entry is ever materialized. Keys are compared case-insensitively
//! at both levels and unknown fields are ignored.

use std::fmt;
use std::io::{BufReader, Read};

use serde::Deserializer as _;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info};
use url::Url;
use zup_schema::{ResolvedTarget, ResourceDescriptor};

use crate::error::{Error, LookupError, Result};
use crate::http::HttpClient;

/// Index key of the perpetually updated nightly build.
pub const NIGHTLY_ALIAS: &str = "master";

/// Resolves `(version alias, platform)` pairs against a remote index.
pub struct IndexResolver<'a> {
    client: &'a dyn HttpClient,
    index_url: &'a Url,
}

impl fmt::Debug for IndexResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexResolver")
            .field("index_url", &self.index_url.as_str())
            .finish_non_exhaustive()
    }
}

impl<'a> IndexResolver<'a> {
    pub fn new(client: &'a dyn HttpClient, index_url: &'a Url) -> Self {
        Self { client, index_url }
    }

    /// Fetch the index and pick out the entry for `alias` on `platform`.
    pub async fn resolve(&self, alias: &str, platform: &str) -> Result<ResolvedTarget> {
        info!("Resolving '{alias}' for {platform} from {}", self.index_url);
        let response = self.client.get(self.index_url).await?;
        let body = SyncIoBridge::new(response.body);

        let url = self.index_url.to_string();
        let alias = alias.to_string();
        let platform = platform.to_string();
        let target = tokio::task::spawn_blocking(move || {
            resolve_from_reader(BufReader::new(body), &alias, &platform)
        })
        .await
        .map_err(|e| Error::network(url, e))??;

        info!(
            "Resolved {} -> {}",
            target.canonical_version,
            target.resource.archive_url()
        );
        Ok(target)
    }
}

/// Resolve from any reader over the index document.
pub fn resolve_from_reader<R: Read>(
    reader: R,
    alias: &str,
    platform: &str,
) -> Result<ResolvedTarget> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let scan = (&mut de)
        .deserialize_map(IndexVisitor { alias, platform })
        .and_then(|scan| de.end().map(|()| scan))
        .map_err(classify)?;

    let entry = scan.ok_or_else(|| LookupError::Version(alias.to_string()))?;
    let raw = entry.resource.ok_or_else(|| LookupError::Platform {
        version: entry.key.clone(),
        platform: platform.to_string(),
    })?;

    let canonical_version = match entry.version {
        Some(version) => version,
        None => {
            debug!("No explicit version for '{}', using the key", entry.key);
            entry.key
        }
    };
    if canonical_version.trim().is_empty() {
        return Err(Error::MalformedIndex(format!(
            "entry '{alias}' has an empty version"
        )));
    }

    let resource = ResourceDescriptor::from_index_fields(
        &require(raw.tarball, "tarball")?,
        &require(raw.shasum, "shasum")?,
        &require(raw.size, "size")?,
    )?;

    Ok(ResolvedTarget {
        canonical_version,
        resource,
    })
}

fn require(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| Error::MalformedIndex(format!("platform entry has no '{name}' field")))
}

fn classify(err: serde_json::Error) -> Error {
    if err.is_io() {
        Error::network("index body", err)
    } else {
        Error::MalformedIndex(err.to_string())
    }
}

/// The matched top-level entry.
#[derive(Debug)]
struct EntryScan {
    key: String,
    version: Option<String>,
    resource: Option<RawResource>,
}

#[derive(Debug, Default)]
struct RawResource {
    tarball: Option<String>,
    shasum: Option<String>,
    size: Option<String>,
}

struct IndexVisitor<'q> {
    alias: &'q str,
    platform: &'q str,
}

impl<'de> Visitor<'de> for IndexVisitor<'_> {
    type Value = Option<EntryScan>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by version alias")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut found = None;
        while let Some(key) = map.next_key::<String>()? {
            if found.is_none() && key.eq_ignore_ascii_case(self.alias) {
                let (version, resource) = map.next_value_seed(EntrySeed {
                    platform: self.platform,
                })?;
                found = Some(EntryScan {
                    key,
                    version,
                    resource,
                });
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

struct EntrySeed<'q> {
    platform: &'q str,
}

impl<'de> DeserializeSeed<'de> for EntrySeed<'_> {
    type Value = (Option<String>, Option<RawResource>);

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EntrySeed<'_> {
    type Value = (Option<String>, Option<RawResource>);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a version entry object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut version = None;
        let mut resource = None;
        while let Some(key) = map.next_key::<String>()? {
            if version.is_none() && key.eq_ignore_ascii_case("version") {
                version = Some(map.next_value::<String>()?);
            } else if resource.is_none() && key.eq_ignore_ascii_case(self.platform) {
                resource = Some(map.next_value_seed(ResourceSeed)?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok((version, resource))
    }
}

struct ResourceSeed;

impl<'de> DeserializeSeed<'de> for ResourceSeed {
    type Value = RawResource;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ResourceSeed {
    type Value = RawResource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a platform object with tarball, shasum and size")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut raw = RawResource::default();
        while let Some(key) = map.next_key::<String>()? {
            let slot = match key.to_ascii_lowercase().as_str() {
                "tarball" => &mut raw.tarball,
                "shasum" => &mut raw.shasum,
                "size" => &mut raw.size,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            *slot = Some(map.next_value::<String>()?);
        }
        Ok(raw)
    }
}
