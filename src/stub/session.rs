use std::time::Duration;

use log::{info, trace, warn};

use crate::conn::Connection;
use crate::protocol::packet::{
    frame_out, parse_packet, ACK, INTERRUPT, NACK, PACKET_END,
};
use crate::stub::commands::{handle_command, thread_state_reply, SIGTRAP};
use crate::stub::GdbStub;

/// How long to sleep when the socket has nothing for us.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Receive granularity; also the packet size advertised via `qSupported`.
const RECV_CHUNK: usize = 1024;

/// Drive one client connection until it disconnects or the stub shuts
/// down.
///
/// Everything runs on the caller's thread: receive and frame bytes,
/// dispatch complete packets, and between packets drain the pending-stop
/// flag the engine callbacks raise.
pub(crate) fn run<C: Connection>(stub: &GdbStub, conn: &mut C) {
    info!("debugger client connected");

    // a client attaching wants the target stopped
    stub.processor.pause();
    stub.update_cache();

    if conn.set_nonblocking(true).is_err() {
        return;
    }

    let mut rx_buf: Vec<u8> = Vec::new();

    while !stub.is_shut_down() {
        if !conn.is_connected() {
            break;
        }

        match pump_incoming(stub, conn, &mut rx_buf) {
            Ok(true) => {}
            Ok(false) => {
                if !conn.is_connected() {
                    break;
                }
                std::thread::sleep(IDLE_POLL);
            }
            Err(_) => break,
        }

        // anything to notify the client about?
        let notification = {
            let mut state = stub.state.lock();
            if state.cache.notify_stopped {
                if state.cache.notify_bp_thread_id.is_some() {
                    state.cache.cur_thread_id = state.cache.notify_bp_thread_id;
                }
                // a stop with no associated thread (an interrupt-induced
                // pause) is reported against the current thread
                let reply_thread = state
                    .cache
                    .notify_bp_thread_id
                    .or(state.cache.cur_thread_id);
                let reply = thread_state_reply(&state.cache, reply_thread, SIGTRAP);
                state.cache.notify_bp_thread_id = None;
                state.cache.notify_stopped = false;
                Some(reply)
            } else {
                None
            }
        };
        if let Some(reply) = notification {
            if send_reply(conn, &reply).is_err() {
                break;
            }
        }
    }

    info!("debugger client disconnected");
}

/// Pull bytes off the socket and handle every complete packet in the
/// buffer. `Ok(false)` means the socket had nothing for us.
fn pump_incoming<C: Connection>(
    stub: &GdbStub,
    conn: &mut C,
    rx_buf: &mut Vec<u8>,
) -> Result<bool, C::Error> {
    let mut chunk = [0u8; RECV_CHUNK];
    let received = conn.receive(&mut chunk)?;
    if received == 0 {
        return Ok(false);
    }
    rx_buf.extend_from_slice(&chunk[..received]);

    while let Some(raw) = extract_packet(rx_buf) {
        match parse_packet(&raw) {
            Ok(command) => {
                trace!("<-- {:?}", String::from_utf8_lossy(&raw));
                conn.send(&[ACK])?;
                let reply = handle_command(stub, &command);
                send_reply(conn, &reply)?;
            }
            Err(err) => {
                warn!("dropping malformed packet: {:?}", err);
                conn.send(&[NACK])?;
            }
        }
    }

    Ok(true)
}

/// Take one framed packet (or a bare interrupt byte) off the front of the
/// receive buffer.
///
/// This only locates packet boundaries. Stray leading acks travel with
/// their frame; the codec owns the two-ack tolerance and rejects anything
/// past it.
fn extract_packet(rx_buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    if rx_buf.first() == Some(&INTERRUPT) {
        rx_buf.remove(0);
        return Some(vec![INTERRUPT]);
    }

    let end = rx_buf.iter().position(|&b| b == PACKET_END)?;
    // the two checksum digits must have arrived too
    if end + 2 >= rx_buf.len() {
        return None;
    }
    Some(rx_buf.drain(..end + 3).collect())
}

fn send_reply<C: Connection>(conn: &mut C, payload: &str) -> Result<(), C::Error> {
    trace!("--> ${}#..", payload);
    conn.send(&frame_out(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_waits_for_a_complete_frame() {
        let mut buf = b"$qSupported".to_vec();
        assert_eq!(extract_packet(&mut buf), None);

        buf.extend_from_slice(b"#37");
        let raw = extract_packet(&mut buf).unwrap();
        assert_eq!(raw, b"$qSupported#37");
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_splits_back_to_back_frames() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&frame_out(b"?"));
        buf.extend_from_slice(&frame_out(b"g"));
        buf.extend_from_slice(b"$tail");

        assert_eq!(extract_packet(&mut buf).unwrap(), frame_out(b"?"));
        assert_eq!(extract_packet(&mut buf).unwrap(), frame_out(b"g"));
        assert_eq!(extract_packet(&mut buf), None);
        assert_eq!(buf, b"$tail");
    }

    #[test]
    fn extract_handles_a_leading_interrupt() {
        let mut buf = b"\x03$?#3f".to_vec();
        assert_eq!(extract_packet(&mut buf).unwrap(), vec![INTERRUPT]);
        assert_eq!(extract_packet(&mut buf).unwrap(), b"$?#3f");
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_leaves_stray_acks_to_the_parser() {
        // leading acks travel with their frame; the codec enforces the
        // two-ack tolerance
        let mut buf = b"++$?#3f".to_vec();
        assert_eq!(extract_packet(&mut buf).unwrap(), b"++$?#3f");
        assert!(buf.is_empty());

        // lone acks are not a frame; they wait for one
        let mut buf = b"+".to_vec();
        assert_eq!(extract_packet(&mut buf), None);
        assert_eq!(buf, b"+");
    }

    #[test]
    fn extract_keeps_checksum_digits_with_their_frame() {
        // '#' present but only one checksum digit so far
        let mut buf = b"$?#3".to_vec();
        assert_eq!(extract_packet(&mut buf), None);
        buf.push(b'f');
        assert_eq!(extract_packet(&mut buf).unwrap(), b"$?#3f");
    }
}
