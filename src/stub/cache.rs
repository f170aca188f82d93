use crate::target::{ExecutionState, KernelObjectTable, ModuleRef, Processor, ThreadSnapshot};

/// Last-seen execution state, shared between the session actor and the
/// engine's debug callbacks. Mutated only under the stub mutex.
#[derive(Default)]
pub(crate) struct ExecutionCache {
    pub is_stopped: bool,
    /// One-way edge from engine threads to the session actor: set on every
    /// refresh that observes a stopped engine, drained by the session when
    /// it sends the asynchronous stop reply.
    pub notify_stopped: bool,
    /// Guest address of the most recently hit breakpoint. Consumed by the
    /// next read of register 64 so the client's breakpoint lookup matches
    /// even when the engine's reported PC lags the trap site.
    pub notify_bp_guest_address: Option<u32>,
    /// Thread to report in the next asynchronous stop reply.
    pub notify_bp_thread_id: Option<u32>,
    /// Thread the last breakpoint hit or step landed on; `s` steps it.
    pub last_bp_thread_id: Option<u32>,
    pub cur_thread_id: Option<u32>,
    pub threads: Vec<ThreadSnapshot>,
    /// Held while stopped so the loader keeps the modules resident.
    pub modules: Vec<ModuleRef>,
}

impl ExecutionCache {
    /// Re-sync with the engine after an execution-state transition.
    ///
    /// While the engine runs, the previous snapshot is kept unchanged;
    /// thread and module state cannot be read consistently mid-execution.
    pub fn refresh(&mut self, processor: &dyn Processor, kernel_objects: &dyn KernelObjectTable) {
        self.is_stopped = processor.execution_state() != ExecutionState::Running;
        self.notify_stopped = self.is_stopped;
        if !self.is_stopped {
            return;
        }

        self.modules = kernel_objects.modules();
        self.threads = processor.query_thread_debug_infos();
        if self.cur_thread_id.is_none() {
            self.cur_thread_id = self.threads.first().map(|thread| thread.thread_id);
        }
    }

    pub fn thread(&self, thread_id: u32) -> Option<&ThreadSnapshot> {
        self.threads
            .iter()
            .find(|thread| thread.thread_id == thread_id)
    }

    pub fn cur_thread(&self) -> Option<&ThreadSnapshot> {
        self.thread(self.cur_thread_id?)
    }

    /// One-shot consumption of the breakpoint-address PC override.
    pub fn take_notify_bp_guest_address(&mut self) -> Option<u32> {
        self.notify_bp_guest_address.take()
    }
}
