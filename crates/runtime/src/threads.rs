//! Threads spawned by wasm code.

use crate::instance::{Context, Runtime};
use crate::table::FunctionInstance;
use ingot_environ::{FunctionType, Trap, ValueType};
use std::sync::Arc;
use std::thread;

/// Keeps the entry and error functions of a running wasm-spawned thread
/// rooted, along with the thread's execution context.
#[derive(Debug)]
pub(crate) struct Thread {
    #[allow(dead_code)]
    context: Context,
    entry_function: FunctionInstance,
    error_function: FunctionInstance,
}

/// Spawns a detached host thread running the table element at
/// `entry_index` with `argument`.
///
/// Both `entry_index` and `error_index` are resolved through the table bound
/// to `table_id` with the expected signature `(i32) -> ()`; resolution
/// failures trap in the caller before any thread starts. The spawned thread
/// runs the entry function; if it traps, the error function runs with the
/// same argument, and a trap from the error function is a fatal double
/// fault.
pub fn launch_thread(
    context: &Context,
    entry_index: u32,
    argument: i32,
    error_index: u32,
    table_id: u64,
) -> Result<(), Trap> {
    let runtime = context.runtime().clone();
    let table = runtime.table(table_id);
    let expected = runtime
        .signatures()
        .register(&FunctionType::new(vec![ValueType::I32], vec![]));

    let thread = Arc::new(Thread {
        context: context.clone(),
        entry_function: table.get_function(&expected, entry_index)?.clone(),
        error_function: table.get_function(&expected, error_index)?.clone(),
    });
    runtime.threads().lock().unwrap().push(thread.clone());

    log::debug!("launching wasm thread for table element {entry_index}");
    let spawn = thread::Builder::new()
        .name("wasm-thread".to_string())
        .spawn(move || thread_func(runtime, thread, argument));
    match spawn {
        // Detach by dropping the join handle; the thread unregisters itself.
        Ok(handle) => drop(handle),
        Err(error) => fatal!("failed to spawn a wasm thread: {error}"),
    }
    Ok(())
}

fn thread_func(runtime: Arc<Runtime>, thread: Arc<Thread>, argument: i32) {
    if let Err(trap) = thread.entry_function.invoke(argument) {
        log::error!("runtime exception in thread: {trap}");
        log::error!("passing exception on to thread error handler");
        if let Err(trap) = thread.error_function.invoke(argument) {
            log::error!("runtime exception in thread error handler: {trap}");
            fatal!("double fault");
        }
    }

    // The thread-local wake event is destroyed by its TLS destructor; all
    // that's left is unregistering this thread.
    let mut threads = runtime.threads().lock().unwrap();
    if let Some(position) = threads.iter().position(|entry| Arc::ptr_eq(entry, &thread)) {
        threads.remove(position);
    }
}
