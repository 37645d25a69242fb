use thiserror::Error;

use crate::core::{SimulationData, SimulationResults, compute, new_charge};
use crate::store::{KeyValueStorage, SimulationStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("deductible charge not found: {0}")]
    ChargeNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&SimulationData, &SimulationResults) + Send>;

/// Live parameter set bound to a simulation store.
///
/// Every edit goes through the write-back pass before listeners run, so the
/// active simulation never lags behind what listeners have seen.
pub struct Session<S> {
    store: SimulationStore<S>,
    live: SimulationData,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl<S: KeyValueStorage> Session<S> {
    pub fn open(storage: S) -> Self {
        let store = SimulationStore::load(storage);
        let live = store.active().data.clone();
        Self {
            store,
            live,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn snapshot(&self) -> &SimulationData {
        &self.live
    }

    pub fn results(&self) -> SimulationResults {
        compute(&self.live)
    }

    pub fn store(&self) -> &SimulationStore<S> {
        &self.store
    }

    /// Registers `listener`, called with the new snapshot and its results
    /// after every change to the live data.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SimulationData, &SimulationResults) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn update<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut SimulationData),
    {
        edit(&mut self.live);
        self.commit();
    }

    pub fn add_charge(&mut self) -> String {
        let charge = new_charge();
        let id = charge.id.clone();
        self.update(|data| data.deductible_charges.push(charge));
        id
    }

    pub fn update_charge_label(&mut self, id: &str, label: &str) -> Result<(), SessionError> {
        let index = self.charge_index(id)?;
        self.update(|data| data.deductible_charges[index].label = label.to_string());
        Ok(())
    }

    /// Negative amounts are clamped to zero.
    pub fn update_charge_amount(&mut self, id: &str, amount: f64) -> Result<(), SessionError> {
        let index = self.charge_index(id)?;
        self.update(|data| data.deductible_charges[index].amount = amount.max(0.0));
        Ok(())
    }

    pub fn remove_charge(&mut self, id: &str) -> Result<(), SessionError> {
        let index = self.charge_index(id)?;
        self.update(|data| {
            data.deductible_charges.remove(index);
        });
        Ok(())
    }

    /// Switches to `id`. Pending live edits are written back into the
    /// currently active simulation before its data is replaced.
    pub fn select(&mut self, id: &str) -> Result<(), SessionError> {
        self.store.sync_active(&self.live);
        let data = self.store.select(id)?;
        self.apply(data);
        Ok(())
    }

    /// Saves the live data as a new simulation, which becomes active.
    pub fn create(&mut self, name: &str) -> String {
        self.store.sync_active(&self.live);
        self.store.create(name, &self.live)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool, SessionError> {
        Ok(self.store.rename(id, name)?)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), SessionError> {
        self.store.sync_active(&self.live);
        if let Some(data) = self.store.delete(id, &self.live)? {
            self.apply(data);
        }
        Ok(())
    }

    fn charge_index(&self, id: &str) -> Result<usize, SessionError> {
        self.live
            .deductible_charges
            .iter()
            .position(|charge| charge.id == id)
            .ok_or_else(|| SessionError::ChargeNotFound(id.to_string()))
    }

    fn commit(&mut self) {
        self.store.sync_active(&self.live);
        self.notify();
    }

    fn apply(&mut self, data: SimulationData) {
        self.live = data;
        self.notify();
    }

    fn notify(&mut self) {
        let results = compute(&self.live);
        for (_, listener) in &mut self.listeners {
            listener(&self.live, &results);
        }
    }
}
