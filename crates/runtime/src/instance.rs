//! The runtime object and the per-thread execution context.

use crate::parking_spot::ParkingSpot;
use crate::sig_registry::SignatureRegistry;
use crate::table::TableInstance;
use crate::threads::Thread;
use crate::SharedMemory;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The shared state intrinsics operate on: the memory and table registries,
/// the address-wait table, the signature registry, and the list of live
/// wasm-spawned threads.
///
/// One runtime exists per embedding; intrinsics receive it through the
/// calling [`Context`] rather than through process-wide state.
#[derive(Debug, Default)]
pub struct Runtime {
    memories: Mutex<HashMap<u64, SharedMemory>>,
    tables: Mutex<HashMap<u64, Arc<TableInstance>>>,
    signatures: SignatureRegistry,
    parking: ParkingSpot,
    threads: Mutex<Vec<Arc<Thread>>>,
}

impl Runtime {
    /// Creates an empty runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Binds `memory` to `id` for resolution by compiled code.
    pub fn register_memory(&self, id: u64, memory: SharedMemory) {
        self.memories.lock().unwrap().insert(id, memory);
    }

    /// Binds `table` to `id` for resolution by compiled code.
    pub fn register_table(&self, id: u64, table: Arc<TableInstance>) {
        self.tables.lock().unwrap().insert(id, table);
    }

    /// The runtime's signature registry.
    pub fn signatures(&self) -> &SignatureRegistry {
        &self.signatures
    }

    /// The runtime's address-wait table.
    pub fn parking(&self) -> &ParkingSpot {
        &self.parking
    }

    /// The number of wasm-spawned threads that have not yet exited.
    pub fn live_threads(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    pub(crate) fn threads(&self) -> &Mutex<Vec<Arc<Thread>>> {
        &self.threads
    }

    /// Resolves the memory bound to `id`. Compiled code only passes ids the
    /// emitter bound, so an unknown id is an embedder wiring bug.
    pub(crate) fn memory(&self, id: u64) -> SharedMemory {
        match self.memories.lock().unwrap().get(&id) {
            Some(memory) => memory.clone(),
            None => fatal!("no memory is registered under id {id}"),
        }
    }

    /// Resolves the table bound to `id`; see [`Runtime::memory`].
    pub(crate) fn table(&self, id: u64) -> Arc<TableInstance> {
        match self.tables.lock().unwrap().get(&id) {
            Some(table) => table.clone(),
            None => fatal!("no table is registered under id {id}"),
        }
    }
}

/// The execution context of one running wasm thread.
///
/// Cloning a context is how a spawned thread inherits its parent's view of
/// the runtime.
#[derive(Clone, Debug)]
pub struct Context {
    runtime: Arc<Runtime>,
}

impl Context {
    /// Creates a context executing against `runtime`.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// The runtime this context executes against.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }
}
