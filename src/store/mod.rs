mod simulations;
mod storage;

pub use simulations::{
    ACTIVE_SIMULATION_KEY, SIMULATIONS_KEY, Simulation, SimulationStore, StoreError,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
