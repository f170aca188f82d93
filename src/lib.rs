//! `ppcstub` implements the GDB Remote Serial Protocol for an emulator
//! hosting a 32-bit PowerPC guest, letting GDB, IDA or LLDB attach over
//! TCP: pause/continue/single-step, read registers and guest memory, set
//! software breakpoints on guest addresses, enumerate threads and modules,
//! and receive asynchronous stop notifications.
//!
//! The emulator side is abstracted behind traits: the host implements
//! [`Processor`](target::Processor) (and friends) for its execution
//! engine, constructs a [`GdbStub`], and wires the stub into the engine's
//! [`DebugListener`](target::DebugListener) slot. The socket layer is a
//! consumed interface too: the host's accept service hands each connected
//! client to [`GdbStub::serve`], either directly or through the
//! [`SocketServer`](conn::SocketServer) seam and [`GdbStub::listen`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ppcstub::GdbStub;
//! # fn wire(processor: Arc<dyn ppcstub::target::Processor>,
//! #         kernel_objects: Arc<dyn ppcstub::target::KernelObjectTable>) {
//! let stub = GdbStub::new(processor, kernel_objects);
//! // engine.set_debug_listener(stub.clone());
//! // socket_server.on_accept(|mut conn| stub.serve(&mut conn));
//! # }
//! ```
//!
//! A few deliberate compatibility quirks, inherited from the debuggers
//! this stub is used with:
//!
//! - every register is reported 32 bits wide (FPRs excepted) so clients
//!   do not flip into 64-bit PowerPC mode;
//! - after a breakpoint hit, the reported PC is the breakpoint's guest
//!   address rather than the engine's momentary PC, so the client can
//!   match the stop against its breakpoint list;
//! - register writes are accepted and discarded.
//!
//! Logging goes through the [`log`] facade; hosts install their own
//! logger.

pub mod arch;
pub mod conn;
pub mod protocol;
pub mod stub;
pub mod target;

pub use stub::breakpoints::SoftwareBreakpoint;
pub use stub::GdbStub;
