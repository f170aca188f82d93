//! Interfaces the stub consumes from the host emulator, and the listener
//! interface it implements in return.
//!
//! The emulator side (execution engine, guest memory manager, kernel object
//! table) is hidden behind traits so the stub can be wired into any host,
//! including the scripted engines the tests drive.

use bitflags::bitflags;

use crate::arch::ppc::reg::PpcContext;
use crate::stub::breakpoints::SoftwareBreakpoint;

/// Coarse execution engine state.
///
/// The stub treats everything except `Running` as "stopped": a stepping
/// engine has already given up control of the thread being stepped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Paused,
    Running,
    Stepping,
    Ended,
}

bitflags! {
    /// Guest page protection bits, as reported by [`GuestHeap::query_protect`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MemoryProtect: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

/// One call frame of a stopped guest thread.
///
/// `guest_pc` is zero for frames the unwinder could only resolve to host
/// code (JIT prologue, kernel trampolines).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub guest_pc: u32,
}

/// A captured view of one guest thread, valid until the engine resumes.
#[derive(Clone, Debug, Default)]
pub struct ThreadSnapshot {
    pub thread_id: u32,
    pub thread_name: String,
    pub context: PpcContext,
    /// Innermost frame first.
    pub frames: Vec<Frame>,
}

/// A loaded guest module, held by the cache while stopped so the loader
/// keeps it resident.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRef {
    pub name: String,
    pub guest_base: u32,
}

/// The execution engine hosting the guest CPU.
///
/// Execution-control calls (`pause`, `resume`, `step_guest_instruction`)
/// are asynchronous: completion is reported through [`DebugListener`]
/// callbacks on the engine's own threads.
pub trait Processor: Send + Sync {
    fn execution_state(&self) -> ExecutionState;

    fn pause(&self);

    fn resume(&self);

    /// Step one guest instruction on the given thread.
    fn step_guest_instruction(&self, thread_id: u32);

    /// Install a software breakpoint. The engine may copy whatever it needs
    /// from the breakpoint; the table retains ownership.
    fn add_breakpoint(&self, breakpoint: &SoftwareBreakpoint);

    fn remove_breakpoint(&self, breakpoint: &SoftwareBreakpoint);

    /// Snapshot every guest thread. Only meaningful while stopped.
    fn query_thread_debug_infos(&self) -> Vec<ThreadSnapshot>;

    /// Enumerate the host instruction addresses the JIT emitted for a guest
    /// instruction. One guest address may map to several host addresses.
    fn resolve_host_addresses(&self, guest_address: u32) -> Vec<u64>;

    fn memory(&self) -> &dyn GuestMemory;
}

/// The guest memory manager.
pub trait GuestMemory {
    /// Resolve the heap backing a guest address, if any.
    fn lookup_heap(&self, address: u32) -> Option<&dyn GuestHeap>;

    /// Borrow `len` bytes of host memory backing the guest range.
    /// Returns `None` if any part of the range is unmapped.
    fn translate_virtual(&self, address: u32, len: usize) -> Option<&[u8]>;
}

/// One heap of the guest memory manager.
pub trait GuestHeap {
    fn query_protect(&self, address: u32) -> Option<MemoryProtect>;
}

/// The kernel object table, used to enumerate loaded modules.
pub trait KernelObjectTable: Send + Sync {
    fn modules(&self) -> Vec<ModuleRef>;
}

/// Debug events raised by the execution engine, on its own threads.
///
/// The stub implements this; the host wires it into the engine's listener
/// slot. Every callback refreshes the stub's execution cache.
pub trait DebugListener: Send + Sync {
    fn on_focus(&self);

    /// The front-end detached the debugger (as opposed to the client
    /// sending `D`). All stub-owned breakpoints are removed.
    fn on_detached(&self);

    fn on_execution_paused(&self);

    fn on_execution_continued(&self);

    fn on_execution_ended(&self);

    /// A single-step completed on `thread`.
    fn on_step_completed(&self, thread: &ThreadSnapshot);

    /// A stub-owned breakpoint at `guest_address` was hit on `thread`.
    fn on_breakpoint_hit(&self, guest_address: u32, thread: &ThreadSnapshot);
}
