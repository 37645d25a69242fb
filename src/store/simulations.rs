use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::storage::{KeyValueStorage, StorageError};
use crate::core::{
    PartialSimulationData, SimulationData, default_simulation_data, new_id, with_defaults,
};

pub const SIMULATIONS_KEY: &str = "sasu-simulations";
pub const ACTIVE_SIMULATION_KEY: &str = "sasu-active-simulation-id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub id: String,
    pub name: String,
    pub data: SimulationData,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("simulation not found: {0}")]
    SimulationNotFound(String),
}

/// Record shape as read back from storage; older versions may lack fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredSimulation {
    id: Option<String>,
    name: Option<String>,
    data: Option<PartialSimulationData>,
    updated_at: Option<f64>,
}

/// Named simulations plus the active one, mirrored to key-value storage.
///
/// The collection is never empty and `active_id` always names a member.
#[derive(Debug)]
pub struct SimulationStore<S> {
    storage: S,
    simulations: Vec<Simulation>,
    active_id: String,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn default_name(position: usize) -> String {
    format!("Simulation {position}")
}

fn new_simulation(name: String, data: SimulationData) -> Simulation {
    Simulation {
        id: new_id(),
        name,
        data,
        updated_at: now_millis(),
    }
}

impl<S: KeyValueStorage> SimulationStore<S> {
    /// Reads the collection back from storage, falling back to a single
    /// default simulation when nothing usable is stored.
    pub fn load(storage: S) -> Self {
        let loaded_at = now_millis();
        let stored = read_collection(&storage, loaded_at);
        let (mut simulations, minted_ids, read_failed) = match stored {
            Ok(collection) => (collection.simulations, collection.minted_ids, false),
            Err(err) => {
                log::error!("failed to read stored simulations, not overwriting them: {err}");
                (Vec::new(), false, true)
            }
        };
        let seeded = simulations.is_empty();
        if seeded {
            log::info!("no stored simulations, seeding defaults");
            simulations.push(new_simulation(default_name(1), default_simulation_data()));
        }

        let stored_active = match storage.get(ACTIVE_SIMULATION_KEY) {
            Ok(value) => value.map(|id| id.trim().to_string()),
            Err(err) => {
                log::warn!("failed to read active simulation id: {err}");
                None
            }
        };
        let resolved_active = stored_active
            .as_deref()
            .filter(|id| simulations.iter().any(|sim| sim.id == *id))
            .map(str::to_string);
        let repaired = resolved_active.is_none();
        if repaired && stored_active.is_some() {
            log::warn!("stored active simulation id is dangling, using the first simulation");
        }
        let active_id = resolved_active.unwrap_or_else(|| simulations[0].id.clone());

        let mut store = Self {
            storage,
            simulations,
            active_id,
        };
        if !read_failed && (seeded || repaired || minted_ids) {
            store.persist();
        }
        log::info!(
            "loaded {} simulation(s), active {}",
            store.simulations.len(),
            store.active_id
        );
        store
    }

    pub fn simulations(&self) -> &[Simulation] {
        &self.simulations
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> &Simulation {
        &self.simulations[self.active_index()]
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn active_index(&self) -> usize {
        self.simulations
            .iter()
            .position(|sim| sim.id == self.active_id)
            .unwrap_or(0)
    }

    fn index_of(&self, id: &str) -> Result<usize, StoreError> {
        self.simulations
            .iter()
            .position(|sim| sim.id == id)
            .ok_or_else(|| StoreError::SimulationNotFound(id.to_string()))
    }

    /// True when `live` has diverged from the active simulation's saved data.
    pub fn is_dirty(&self, live: &SimulationData) -> bool {
        self.active().data != *live
    }

    /// Write-back pass: copies `live` into the active simulation when it
    /// differs, bumping `updated_at` and persisting. Returns whether anything
    /// was written.
    pub fn sync_active(&mut self, live: &SimulationData) -> bool {
        if !self.is_dirty(live) {
            return false;
        }
        let index = self.active_index();
        let active = &mut self.simulations[index];
        active.data = live.clone();
        active.updated_at = now_millis();
        log::debug!("wrote live data back into simulation {}", active.id);
        self.persist();
        true
    }

    /// Makes `id` active and returns its stored data, to be applied as the
    /// new live data. Callers must run `sync_active` first to keep edits.
    pub fn select(&mut self, id: &str) -> Result<SimulationData, StoreError> {
        let index = self.index_of(id)?;
        if self.active_id != id {
            self.active_id = id.to_string();
            self.persist();
        }
        Ok(self.simulations[index].data.clone())
    }

    /// Adds a simulation seeded from `live` and makes it active.
    pub fn create(&mut self, name: &str, live: &SimulationData) -> String {
        let name = match name.trim() {
            "" => default_name(self.simulations.len() + 1),
            trimmed => trimmed.to_string(),
        };
        let simulation = new_simulation(name, live.clone());
        let id = simulation.id.clone();
        log::info!("created simulation {id} ({})", simulation.name);
        self.simulations.push(simulation);
        self.active_id = id.clone();
        self.persist();
        id
    }

    /// Renames `id`. Blank or unchanged names are ignored and return `false`.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool, StoreError> {
        let index = self.index_of(id)?;
        let name = name.trim();
        let simulation = &mut self.simulations[index];
        if name.is_empty() || simulation.name == name {
            return Ok(false);
        }
        simulation.name = name.to_string();
        simulation.updated_at = now_millis();
        self.persist();
        Ok(true)
    }

    /// Removes `id`. Returns the data that must replace the live data when
    /// the active simulation changed to another stored one.
    ///
    /// Deleting the last simulation recreates a default one seeded from
    /// `live`, so the live data stays as it is.
    pub fn delete(
        &mut self,
        id: &str,
        live: &SimulationData,
    ) -> Result<Option<SimulationData>, StoreError> {
        let index = self.index_of(id)?;
        let removed = self.simulations.remove(index);
        log::info!("deleted simulation {} ({})", removed.id, removed.name);

        let replacement = if self.simulations.is_empty() {
            let simulation = new_simulation(default_name(1), live.clone());
            self.active_id = simulation.id.clone();
            self.simulations.push(simulation);
            None
        } else if removed.id == self.active_id {
            let first = &self.simulations[0];
            self.active_id = first.id.clone();
            Some(first.data.clone())
        } else {
            None
        };

        self.persist();
        Ok(replacement)
    }

    /// Best-effort write of both keys. Failures are logged, never raised.
    pub fn persist(&mut self) {
        if let Err(err) = self.write_state() {
            log::error!("failed to persist simulations: {err}");
        }
    }

    fn write_state(&mut self) -> Result<(), StorageError> {
        let collection = serde_json::to_string(&self.simulations)?;
        self.storage.set(SIMULATIONS_KEY, &collection)?;
        self.storage.set(ACTIVE_SIMULATION_KEY, &self.active_id)
    }
}

#[derive(Debug, Default)]
struct StoredCollection {
    simulations: Vec<Simulation>,
    /// Set when a record lacked an id and got a fresh one.
    minted_ids: bool,
}

/// Parses the stored collection. Absent or malformed data yields an empty
/// list; only a failed read is an error.
fn read_collection<S: KeyValueStorage>(
    storage: &S,
    loaded_at: i64,
) -> Result<StoredCollection, StorageError> {
    let raw = match storage.get(SIMULATIONS_KEY)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(StoredCollection::default()),
    };

    let records: Vec<StoredSimulation> = match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(err) => {
            log::warn!("discarding malformed stored simulations: {err}");
            return Ok(StoredCollection::default());
        }
    };

    let mut seen = HashSet::new();
    let mut minted_ids = false;
    let mut simulations = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let id = match record.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                minted_ids = true;
                new_id()
            }
        };
        if !seen.insert(id.clone()) {
            log::warn!("dropping duplicate stored simulation {id}");
            continue;
        }
        let name = record
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_name(position + 1));
        simulations.push(Simulation {
            id,
            name,
            data: with_defaults(record.data.unwrap_or_default()),
            updated_at: record
                .updated_at
                .filter(|ts| ts.is_finite())
                .map(|ts| ts as i64)
                .unwrap_or(loaded_at),
        });
    }
    Ok(StoredCollection {
        simulations,
        minted_ids,
    })
}
