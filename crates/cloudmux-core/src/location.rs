// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Geographic scoping of provider resources
//!
//! A [`Location`] is a node in a small tree: provider → region → zone → host.
//! Blob stores use it to decide which regional backend owns a container.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationScope {
    /// Whole provider or account
    Provider,
    /// Geographic region
    Region,
    /// Availability zone / datacenter inside a region
    Zone,
    /// Single host
    Host,
}

impl fmt::Display for LocationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocationScope::Provider => "provider",
            LocationScope::Region => "region",
            LocationScope::Zone => "zone",
            LocationScope::Host => "host",
        };
        f.write_str(name)
    }
}

/// A provider, region, zone or host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Provider-specific identifier (e.g. `RegionOne`, `us-east-1a`)
    pub id: String,
    /// Granularity
    pub scope: LocationScope,
    /// Human readable description
    pub description: String,
    /// Enclosing location, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Location>>,
    /// ISO 3166 codes of the countries this location lives in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iso3166_codes: Vec<String>,
}

impl Location {
    /// Create a root location for a provider
    pub fn provider(id: impl Into<String>) -> Self {
        let id = id.into();
        Location {
            description: id.clone(),
            id,
            scope: LocationScope::Provider,
            parent: None,
            iso3166_codes: Vec::new(),
        }
    }

    /// Create a region nested under `parent`
    pub fn region(id: impl Into<String>, parent: Location) -> Self {
        Self::child(id, LocationScope::Region, parent)
    }

    /// Create a zone nested under `parent`
    pub fn zone(id: impl Into<String>, parent: Location) -> Self {
        Self::child(id, LocationScope::Zone, parent)
    }

    fn child(id: impl Into<String>, scope: LocationScope, parent: Location) -> Self {
        let id = id.into();
        Location {
            description: id.clone(),
            id,
            scope,
            parent: Some(Box::new(parent)),
            iso3166_codes: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the ISO 3166 codes
    pub fn with_iso3166_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iso3166_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Iterate over this location and its ancestors, innermost first
    pub fn ancestry(&self) -> impl Iterator<Item = &Location> {
        std::iter::successors(Some(self), |loc| loc.parent.as_deref())
    }

    /// Id of the closest location with the given scope (self included)
    pub fn scoped_id(&self, scope: LocationScope) -> Option<&str> {
        self.ancestry()
            .find(|loc| loc.scope == scope)
            .map(|loc| loc.id.as_str())
    }

    /// Region this location belongs to
    pub fn region_id(&self) -> Option<&str> {
        self.scoped_id(LocationScope::Region)
    }

    /// Zone this location belongs to
    pub fn zone_id(&self) -> Option<&str> {
        self.scoped_id(LocationScope::Zone)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}
