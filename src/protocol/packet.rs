use crate::protocol::hex::{from_hex_digit, to_hex_byte};

pub const ACK: u8 = b'+';
pub const NACK: u8 = b'-';
pub const PACKET_START: u8 = b'$';
pub const PACKET_END: u8 = b'#';
pub const INTERRUPT: u8 = 0x03;
const ESCAPE: u8 = b'}';

/// Packet parse error.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketParseError {
    EmptyBuf,
    MissingStart(u8),
    TruncatedEscape,
    MissingChecksum,
    MalformedChecksum,
    ChecksumMismatched { checksum: u8, calculated: u8 },
}

/// A framed RSP request, split into its command token and payload.
///
/// The interrupt pseudo-packet is represented with `cmd == [0x03]` and no
/// data. The separator byte that ended the command token is kept as the
/// first byte of `data`, as clients encode meaning into it (`qXfer` uses
/// `:`, `vCont` uses `;`).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Command {
    pub cmd: Vec<u8>,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl Command {
    pub fn is_interrupt(&self) -> bool {
        self.cmd == [INTERRUPT]
    }

    fn interrupt() -> Self {
        Command {
            cmd: vec![INTERRUPT],
            ..Default::default()
        }
    }
}

/// Parse one framed packet (or the bare interrupt byte).
///
/// Tokenization rules:
/// - up to two stray leading `+` bytes are skipped (GDB opens the
///   conversation with one, IDA sometimes doubles it);
/// - a `0x03` byte is the interrupt pseudo-packet and carries no framing;
/// - the command token ends at the first `:`, `.` or `;`, which becomes the
///   first byte of the payload;
/// - only `q` and `v` commands have multi-byte tokens; any other first byte
///   is the entire token.
///
/// The two checksum digits must equal the 8-bit sum of the decoded body
/// bytes. Escaped bytes (`}` followed by `byte ^ 0x20`) contribute their
/// decoded value.
pub fn parse_packet(raw: &[u8]) -> Result<Command, PacketParseError> {
    let mut iter = raw.iter().copied();
    let mut first = iter.next().ok_or(PacketParseError::EmptyBuf)?;

    if first != PACKET_START {
        for _ in 0..2 {
            if first == ACK {
                first = iter.next().ok_or(PacketParseError::EmptyBuf)?;
            }
        }
        if first == INTERRUPT {
            return Ok(Command::interrupt());
        }
        if first != PACKET_START {
            return Err(PacketParseError::MissingStart(first));
        }
    }

    let mut out = Command::default();
    let mut in_cmd = true;
    let mut calculated: u8 = 0;

    loop {
        let mut c = match iter.next() {
            None => return Err(PacketParseError::MissingChecksum),
            Some(PACKET_END) => break,
            Some(c) => c,
        };

        if c == ESCAPE {
            c = iter.next().ok_or(PacketParseError::TruncatedEscape)? ^ 0x20;
        }
        calculated = calculated.wrapping_add(c);

        if in_cmd && matches!(c, b':' | b'.' | b';') {
            in_cmd = false;
        }

        if in_cmd {
            out.cmd.push(c);
            // only 'q' and 'v' commands have multi-byte names
            if out.cmd.len() == 1 && c != b'q' && c != b'v' {
                in_cmd = false;
            }
        } else {
            out.data.push(c);
        }
    }

    let hi = iter.next().ok_or(PacketParseError::MissingChecksum)?;
    let lo = iter.next().ok_or(PacketParseError::MissingChecksum)?;
    let checksum = from_hex_digit(hi)
        .zip(from_hex_digit(lo))
        .map(|(hi, lo)| hi << 4 | lo)
        .ok_or(PacketParseError::MalformedChecksum)?;

    if checksum != calculated {
        return Err(PacketParseError::ChecksumMismatched {
            checksum,
            calculated,
        });
    }

    out.checksum = checksum;
    Ok(out)
}

/// Frame a reply payload as `$<payload>#<checksum>`.
///
/// `#`, `$`, `}` and `*` are escaped as `}` followed by the byte XOR 0x20;
/// the checksum covers the unescaped payload, matching what the parser
/// computes on the way back in.
pub fn frame_out(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(PACKET_START);

    let mut checksum: u8 = 0;
    for &b in payload {
        checksum = checksum.wrapping_add(b);
        if matches!(b, PACKET_END | PACKET_START | ESCAPE | b'*') {
            out.push(ESCAPE);
            out.push(b ^ 0x20);
        } else {
            out.push(b);
        }
    }

    out.push(PACKET_END);
    out.extend_from_slice(&to_hex_byte(checksum));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn framed(payload: &[u8]) -> Command {
        parse_packet(&frame_out(payload)).unwrap()
    }

    #[test]
    fn splits_cmd_and_data() {
        let cmd = framed(b"qSupported:multiprocess+");
        assert_eq!(cmd.cmd, b"qSupported");
        assert_eq!(cmd.data, b":multiprocess+");

        let cmd = framed(b"m82001234,40");
        assert_eq!(cmd.cmd, b"m");
        assert_eq!(cmd.data, b"82001234,40");

        let cmd = framed(b"Hg0");
        assert_eq!(cmd.cmd, b"H");
        assert_eq!(cmd.data, b"g0");

        let cmd = framed(b"vAttach;1");
        assert_eq!(cmd.cmd, b"vAttach");
        assert_eq!(cmd.data, b";1");
    }

    #[test]
    fn interrupt_is_a_bare_byte() {
        let cmd = parse_packet(&[0x03]).unwrap();
        assert!(cmd.is_interrupt());
        assert!(cmd.data.is_empty());
    }

    #[test]
    fn stray_acks_are_skipped() {
        for prefix in [&b"+"[..], b"++"] {
            let mut raw = prefix.to_vec();
            raw.extend_from_slice(&frame_out(b"?"));
            assert_eq!(parse_packet(&raw).unwrap().cmd, b"?");
        }
        // three stray acks is past lenience
        let mut raw = b"+++".to_vec();
        raw.extend_from_slice(&frame_out(b"?"));
        assert_eq!(
            parse_packet(&raw),
            Err(PacketParseError::MissingStart(b'+'))
        );
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut raw = frame_out(b"g");
        *raw.last_mut().unwrap() ^= 0x01;
        assert!(matches!(
            parse_packet(&raw),
            Err(PacketParseError::ChecksumMismatched { .. })
        ));
    }

    #[test]
    fn truncated_packets_are_rejected() {
        assert_eq!(parse_packet(b""), Err(PacketParseError::EmptyBuf));
        assert_eq!(parse_packet(b"$g"), Err(PacketParseError::MissingChecksum));
        assert_eq!(
            parse_packet(b"$g#6"),
            Err(PacketParseError::MissingChecksum)
        );
        assert_eq!(
            parse_packet(b"$g#zz"),
            Err(PacketParseError::MalformedChecksum)
        );
        assert_eq!(parse_packet(b"$}"), Err(PacketParseError::TruncatedEscape));
    }

    #[test]
    fn escaped_bytes_round_trip() {
        for c in [b'#', b'$', b'}', b'*'] {
            let payload = [b'X', c, b'Y'];
            let raw = frame_out(&payload);
            // the wire form must not contain the raw special byte in its body
            assert!(!raw[1..raw.len() - 3].contains(&c));
            let cmd = parse_packet(&raw).unwrap();
            assert_eq!(cmd.cmd, b"X");
            assert_eq!(cmd.data, &payload[1..]);
        }
    }

    proptest! {
        /// `frame_out` output is always accepted by the parser, reproduces
        /// the payload, and carries the sum-mod-256 checksum.
        #[test]
        fn frame_round_trip(payload: Vec<u8>) {
            let cmd = parse_packet(&frame_out(&payload)).unwrap();
            let mut body = cmd.cmd.clone();
            body.extend_from_slice(&cmd.data);
            prop_assert_eq!(body, payload.clone());
            let sum = payload.iter().fold(0u8, |a, b| a.wrapping_add(*b));
            prop_assert_eq!(cmd.checksum, sum);
        }
    }
}
