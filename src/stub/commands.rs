use log::{debug, trace};

use crate::arch::ppc::reg::{first_guest_pc, render_register, PpcRegId, MAX_REG_ID};
use crate::arch::ppc::TARGET_XML;
use crate::protocol::hex::{decode_hex, decode_hex_signed, hex32, to_hex_byte};
use crate::protocol::packet::Command;
use crate::stub::cache::ExecutionCache;
use crate::stub::GdbStub;
use crate::target::{ExecutionState, MemoryProtect};

/// Signal reported for every stop, breakpoint hit or completed step.
pub(crate) const SIGTRAP: u8 = 0x05;

const REPLY_OK: &str = "OK";
const REPLY_ERROR: &str = "E01";
const STOPPED_SIGTRAP: &str = "S05";

/// Dispatch one parsed command to its handler and produce the reply
/// payload. Tokens outside the supported surface get an empty reply, which
/// clients read as "not supported".
pub(crate) fn handle_command(stub: &GdbStub, command: &Command) -> String {
    match command.cmd.as_slice() {
        // sent when the connection is established, to query why the target
        // halted
        b"?" => STOPPED_SIGTRAP.into(),
        // extended mode: acknowledged, changes nothing
        b"!" => REPLY_OK.into(),
        // the signal argument of 'C' is deliberately ignored
        b"c" | b"C" => continue_execution(stub),
        b"s" => step(stub),
        b"\x03" => pause(stub),
        b"m" => read_memory(stub, &command.data),
        b"p" => read_register(stub, &command.data),
        // register writes are accepted and dropped; refusing them makes
        // some clients abort the session
        b"P" => REPLY_OK.into(),
        b"g" => read_all_registers(stub),
        b"H" => set_cur_thread(stub, &command.data),
        b"qC" => query_cur_thread(stub),
        b"Z" => create_breakpoint(stub, &command.data),
        b"z" => delete_breakpoint(stub, &command.data),
        b"D" => detach(stub),
        b"vAttach" => STOPPED_SIGTRAP.into(),
        b"qSupported" => "PacketSize=1024;qXfer:features:read+;qXfer:threads:read+".into(),
        b"qfThreadInfo" => thread_info(stub),
        b"qXfer" => xfer(stub, &command.data),
        other => {
            trace!("unsupported command {:?}", String::from_utf8_lossy(other));
            String::new()
        }
    }
}

fn continue_execution(stub: &GdbStub) -> String {
    debug!("execution continue");
    stub.processor.resume();
    REPLY_OK.into()
}

fn pause(stub: &GdbStub) -> String {
    debug!("execution pause");
    stub.processor.pause();
    REPLY_OK.into()
}

/// Step the thread the last breakpoint or step landed on. With no such
/// thread the step is silently dropped; the client still gets `OK` and
/// recovers on the next stop.
fn step(stub: &GdbStub) -> String {
    let thread_id = stub.state.lock().cache.last_bp_thread_id;
    debug!("execution step (thread {:?})", thread_id);
    if let Some(thread_id) = thread_id {
        stub.processor.step_guest_instruction(thread_id);
    }
    REPLY_OK.into()
}

/// The view of a single register, or `None` for ids past the register
/// file (the caller maps that to an error reply).
///
/// Register 64 first serves a pending breakpoint address, once: right
/// after a hit, the client asks for the PC to match the stop against its
/// own breakpoint list, and the engine's PC may not agree with the trap
/// site yet.
fn register_view(cache: &mut ExecutionCache, rid: u32) -> Option<String> {
    if rid == 64 {
        if let Some(guest_address) = cache.take_notify_bp_guest_address() {
            return Some(hex32(guest_address));
        }
    }

    let (reg, _) = PpcRegId::from_raw_id(rid)?;
    let thread = cache.cur_thread()?;
    Some(render_register(thread, reg))
}

fn read_register(stub: &GdbStub, data: &[u8]) -> String {
    let Ok(rid) = decode_hex::<u32>(data) else {
        return REPLY_ERROR.into();
    };

    let mut state = stub.state.lock();
    register_view(&mut state.cache, rid).unwrap_or_else(|| REPLY_ERROR.into())
}

fn read_all_registers(stub: &GdbStub) -> String {
    let mut state = stub.state.lock();
    let cache = &mut state.cache;
    if cache.cur_thread().is_none() {
        return REPLY_ERROR.into();
    }

    let mut out = String::with_capacity(39 * 8 + 32 * 16);
    for rid in 0..=MAX_REG_ID {
        match register_view(cache, rid) {
            Some(view) => out.push_str(&view),
            None => return REPLY_ERROR.into(),
        }
    }
    out
}

fn read_memory(stub: &GdbStub, data: &[u8]) -> String {
    let mut parts = data.splitn(2, |&b| b == b',');
    let addr = parts.next().and_then(|part| decode_hex::<u32>(part).ok());
    let len = parts.next().and_then(|part| decode_hex::<u32>(part).ok());
    let (Some(addr), Some(len)) = (addr, len) else {
        return REPLY_ERROR.into();
    };

    let memory = stub.processor.memory();
    let Some(heap) = memory.lookup_heap(addr) else {
        return REPLY_ERROR.into();
    };
    let readable = heap
        .query_protect(addr)
        .is_some_and(|protect| protect.contains(MemoryProtect::READ));
    if !readable {
        return REPLY_ERROR.into();
    }
    let Some(bytes) = memory.translate_virtual(addr, len as usize) else {
        return REPLY_ERROR.into();
    };

    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        let digits = to_hex_byte(byte);
        out.push(digits[0] as char);
        out.push(digits[1] as char);
    }
    out
}

/// `H<op><tid>`: select the thread later register/memory queries refer to.
/// The op letter carries no information for this stub and is skipped; the
/// id is hex and may be `-1` ("all threads"), which falls back to the
/// first thread like any other unknown id.
fn set_cur_thread(stub: &GdbStub, data: &[u8]) -> String {
    let mut state = stub.state.lock();
    let cache = &mut state.cache;

    // reset to a known-good selection first
    cache.cur_thread_id = cache.threads.first().map(|thread| thread.thread_id);

    if data.len() > 1 {
        if let Some(id) = decode_hex_signed(&data[1..]) {
            if cache
                .threads
                .iter()
                .any(|thread| i64::from(thread.thread_id) == id)
            {
                cache.cur_thread_id = Some(id as u32);
            }
        }
    }

    REPLY_OK.into()
}

fn query_cur_thread(stub: &GdbStub) -> String {
    let state = stub.state.lock();
    let thread_id = state
        .cache
        .cur_thread_id
        .or_else(|| state.cache.threads.first().map(|thread| thread.thread_id))
        .unwrap_or(0);
    format!("QC{}", thread_id)
}

/// `Z<type>,<addr>,<kind>` / `z<type>,<addr>,<kind>`: every type installs
/// a software breakpoint on the guest address; kind (instruction width) is
/// meaningless on fixed-width PowerPC.
fn parse_breakpoint_address(data: &[u8]) -> Option<u32> {
    let rest = data.get(2..)?;
    let hex = rest.split(|&b| b == b',').next()?;
    decode_hex(hex).ok()
}

fn create_breakpoint(stub: &GdbStub, data: &[u8]) -> String {
    let Some(guest_address) = parse_breakpoint_address(data) else {
        return REPLY_ERROR.into();
    };

    let mut state = stub.state.lock();
    match state.breakpoints.install(&*stub.processor, guest_address) {
        Ok(()) => REPLY_OK.into(),
        Err(err) => {
            debug!("rejecting breakpoint: {}", err);
            REPLY_ERROR.into()
        }
    }
}

fn delete_breakpoint(stub: &GdbStub, data: &[u8]) -> String {
    if let Some(guest_address) = parse_breakpoint_address(data) {
        let mut state = stub.state.lock();
        state.breakpoints.remove(&*stub.processor, guest_address);
    }
    // removal is idempotent, unknown addresses included
    REPLY_OK.into()
}

fn detach(stub: &GdbStub) -> String {
    debug!("debugger detached");
    stub.state.lock().breakpoints.clear(&*stub.processor);
    if stub.processor.execution_state() == ExecutionState::Paused {
        stub.processor.resume();
    }
    REPLY_OK.into()
}

fn thread_info(stub: &GdbStub) -> String {
    let state = stub.state.lock();
    let ids: Vec<String> = state
        .cache
        .threads
        .iter()
        .map(|thread| thread.thread_id.to_string())
        .collect();
    format!("m{}", ids.join(","))
}

fn xfer(stub: &GdbStub, data: &[u8]) -> String {
    let data = data.strip_prefix(b":").unwrap_or(data);
    let sub_cmd = data.split(|&b| b == b':').next().unwrap_or_default();
    // both blobs fit well under the client's read window, so they are
    // served whole ('l' prefix) and the offset/length suffix is ignored
    match sub_cmd {
        b"features" => TARGET_XML.into(),
        b"threads" => thread_list_xml(&stub.state.lock().cache),
        _ => REPLY_ERROR.into(),
    }
}

fn thread_list_xml(cache: &ExecutionCache) -> String {
    let mut xml = String::from(r#"l<?xml version="1.0"?><threads>"#);
    for thread in &cache.threads {
        xml.push_str(&format!(
            r#"<thread id="{:x}" name="{}"/>"#,
            thread.thread_id, thread.thread_name
        ));
    }
    xml.push_str("</threads>");
    xml
}

/// The `T` stop reply for a known thread, `S05` otherwise.
///
/// Reports PC and LR inline so clients skip a register round-trip. A
/// pending breakpoint address overrides the unwound PC, but stays pending:
/// the register read that follows the stop reply consumes it.
pub(crate) fn thread_state_reply(
    cache: &ExecutionCache,
    thread_id: Option<u32>,
    signal: u8,
) -> String {
    const PC_REGISTER: u32 = 64;
    const LR_REGISTER: u32 = 67;

    if let Some(thread) = thread_id.and_then(|thread_id| cache.thread(thread_id)) {
        let mut pc = first_guest_pc(&thread.frames);
        if let Some(guest_address) = cache.notify_bp_guest_address {
            pc = guest_address;
        }

        return format!(
            "T{:02x}{:02x}:{};{:02x}:{};thread:{:x};",
            signal,
            PC_REGISTER,
            hex32(pc),
            LR_REGISTER,
            hex32(thread.context.lr),
            thread.thread_id
        );
    }
    STOPPED_SIGTRAP.into()
}
