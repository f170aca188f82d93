//! The [`GdbStub`] facade: lifecycle, shared state, and the debug-event
//! listener the execution engine drives.

pub mod breakpoints;

pub(crate) mod cache;
pub(crate) mod commands;
pub(crate) mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::Mutex;

use crate::conn::{Connection, SocketServer};
use crate::stub::breakpoints::BreakpointTable;
use crate::stub::cache::ExecutionCache;
use crate::target::{DebugListener, KernelObjectTable, Processor, ThreadSnapshot};

/// Everything the session actor and the engine callbacks share. One lock
/// guards all of it; every holder does bounded work.
#[derive(Default)]
pub(crate) struct StubState {
    pub cache: ExecutionCache,
    pub breakpoints: BreakpointTable,
}

/// The RSP stub for one emulator instance.
///
/// The host constructs it around its execution engine and kernel object
/// table, wires it into the engine's debug-listener slot, and is
/// responsible for its lifetime. Clients reach the stub through the
/// host's socket layer: either the accept service hands each connection
/// to [`GdbStub::serve`], or [`GdbStub::listen`] wires that up through
/// the host's [`SocketServer`] implementation.
///
/// [`GdbStub::shutdown`] ends every session at its next loop iteration;
/// it does *not* detach the client's breakpoints. Only a `D` packet or
/// [`DebugListener::on_detached`] clears those.
pub struct GdbStub {
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) kernel_objects: Arc<dyn KernelObjectTable>,
    pub(crate) state: Mutex<StubState>,
    shutdown: AtomicBool,
}

impl GdbStub {
    pub fn new(
        processor: Arc<dyn Processor>,
        kernel_objects: Arc<dyn KernelObjectTable>,
    ) -> Arc<GdbStub> {
        let stub = Arc::new(GdbStub {
            processor,
            kernel_objects,
            state: Mutex::new(StubState::default()),
            shutdown: AtomicBool::new(false),
        });
        stub.update_cache();
        stub
    }

    /// Construct a stub and bind it through the host's accept service.
    ///
    /// The host owns the returned server; dropping it stops new clients
    /// on the host's terms without touching live sessions.
    pub fn create<S: SocketServer>(
        processor: Arc<dyn Processor>,
        kernel_objects: Arc<dyn KernelObjectTable>,
        port: u16,
    ) -> Result<(Arc<GdbStub>, S), S::Error> {
        let stub = GdbStub::new(processor, kernel_objects);
        let server = stub.clone().listen(port)?;
        Ok((stub, server))
    }

    /// Bind `port` through the host's accept service and serve every
    /// client it hands over.
    ///
    /// The stub keeps no strong reference to itself: once the host drops
    /// its last handle, later clients are turned away.
    pub fn listen<S: SocketServer>(self: Arc<Self>, port: u16) -> Result<S, S::Error> {
        let weak: Weak<GdbStub> = Arc::downgrade(&self);
        S::create(port, move |mut conn| {
            if let Some(stub) = weak.upgrade() {
                session::run(&stub, &mut conn);
            }
        })
    }

    /// Run one client session on the calling thread. Returns when the
    /// client disconnects or the stub shuts down.
    pub fn serve<C: Connection>(&self, conn: &mut C) {
        session::run(self, conn);
    }

    /// End every session at its next loop iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn update_cache(&self) {
        let mut state = self.state.lock();
        state
            .cache
            .refresh(&*self.processor, &*self.kernel_objects);
    }
}

impl DebugListener for GdbStub {
    fn on_focus(&self) {}

    fn on_detached(&self) {
        debug!("detached by the host");
        self.update_cache();
        self.state.lock().breakpoints.clear(&*self.processor);
    }

    fn on_execution_paused(&self) {
        debug!("execution paused");
        self.update_cache();
    }

    fn on_execution_continued(&self) {
        debug!("execution continued");
        self.update_cache();
    }

    fn on_execution_ended(&self) {
        debug!("execution ended");
        self.update_cache();
    }

    fn on_step_completed(&self, thread: &ThreadSnapshot) {
        debug!("step completed (thread {:#x})", thread.thread_id);
        let mut state = self.state.lock();
        // a step is not a breakpoint hit: same stop-reply shape, but the
        // PC must come from the unwinder, not a breakpoint address
        state.cache.notify_bp_thread_id = Some(thread.thread_id);
        state.cache.last_bp_thread_id = Some(thread.thread_id);
        state
            .cache
            .refresh(&*self.processor, &*self.kernel_objects);
    }

    fn on_breakpoint_hit(&self, guest_address: u32, thread: &ThreadSnapshot) {
        debug!(
            "breakpoint hit at {:#010x} (thread {:#x})",
            guest_address, thread.thread_id
        );
        let mut state = self.state.lock();
        state.cache.notify_bp_guest_address = Some(guest_address);
        state.cache.notify_bp_thread_id = Some(thread.thread_id);
        state.cache.last_bp_thread_id = Some(thread.thread_id);
        state
            .cache
            .refresh(&*self.processor, &*self.kernel_objects);
    }
}
