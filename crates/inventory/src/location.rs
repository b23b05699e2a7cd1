use core::str::FromStr;

use serde::{Deserialize, Serialize};

use pharmacore_core::{DomainError, Entity, LocationId};

/// The two tiers of the location hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    /// Central warehouse: receives stock, feeds the store.
    Warehouse,
    /// Retail floor: the only place sales draw from.
    Store,
}

impl LocationKind {
    pub const ALL: [LocationKind; 2] = [LocationKind::Warehouse, LocationKind::Store];

    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Warehouse => "WAREHOUSE",
            LocationKind::Store => "STORE",
        }
    }
}

impl core::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAREHOUSE" => Ok(LocationKind::Warehouse),
            "STORE" => Ok(LocationKind::Store),
            other => Err(DomainError::validation(format!("unknown location type: {other}"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub kind: LocationKind,
}

impl Location {
    pub fn new(kind: LocationKind) -> Self {
        Self {
            id: LocationId::new(),
            kind,
        }
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The canonical warehouse and store, resolved once at process start.
///
/// Every engine operation addresses locations through this struct instead of
/// looking up "the" warehouse or store per request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locations {
    warehouse: LocationId,
    store: LocationId,
}

impl Locations {
    pub fn new(warehouse: LocationId, store: LocationId) -> Self {
        Self { warehouse, store }
    }

    pub fn warehouse(&self) -> LocationId {
        self.warehouse
    }

    pub fn store(&self) -> LocationId {
        self.store
    }

    pub fn id_of(&self, kind: LocationKind) -> LocationId {
        match kind {
            LocationKind::Warehouse => self.warehouse,
            LocationKind::Store => self.store,
        }
    }
}
