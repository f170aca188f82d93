pub mod id;

pub use id::{PpcRegId, MAX_REG_ID};

use crate::protocol::hex::{hex32, hex64};
use crate::target::{Frame, ThreadSnapshot};

/// Captured 32-bit PowerPC register file.
///
/// FPRs keep their full 64-bit IEEE representation; everything else is held
/// (and reported) at 32 bits.
#[derive(Clone, Debug, Default)]
pub struct PpcContext {
    /// General purpose registers
    pub r: [u32; 32],
    /// Float registers
    pub f: [f64; 32],
    /// Condition register
    pub cr: u32,
    /// Link register
    pub lr: u32,
    /// Count register
    pub ctr: u32,
    /// Machine state register (opaque to the client)
    pub msr: u32,
    /// Integer exception register (opaque to the client)
    pub xer: u32,
    /// Floating-point status and control register (opaque to the client)
    pub fpscr: u32,
}

/// The view of a register value served to the client, as fixed-width
/// lower-case hex.
///
/// Everything is presented as if the architecture were 32-bit PowerPC; some
/// debuggers otherwise flip into 64-bit mode and refuse to decompile. FPRs
/// are the exception at 16 nibbles of raw double bits. msr/xer/fpscr render
/// as eight `x` characters, which clients treat as "unavailable".
///
/// `Pc` renders the first frame carrying a non-zero guest address; the
/// breakpoint-address override on top of this lives with the stub, which
/// owns the pending-notification state.
pub fn render_register(thread: &ThreadSnapshot, reg: PpcRegId) -> String {
    let ctx = &thread.context;
    match reg {
        PpcRegId::Gpr(n) => hex32(ctx.r[n as usize]),
        PpcRegId::Fpr(n) => hex64(ctx.f[n as usize].to_bits()),
        PpcRegId::Pc => hex32(first_guest_pc(&thread.frames)),
        PpcRegId::Cr => hex32(ctx.cr),
        PpcRegId::Lr => hex32(ctx.lr),
        PpcRegId::Ctr => hex32(ctx.ctr),
        PpcRegId::Msr | PpcRegId::Xer | PpcRegId::Fpscr => opaque(),
    }
}

/// The first guest PC the unwinder could attach to a frame, or zero.
/// Host-only frames are skipped; the client has no use for host addresses.
pub fn first_guest_pc(frames: &[Frame]) -> u32 {
    frames
        .iter()
        .map(|frame| frame.guest_pc)
        .find(|&pc| pc != 0)
        .unwrap_or(0)
}

fn opaque() -> String {
    "x".repeat(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ThreadSnapshot {
        let mut thread = ThreadSnapshot {
            thread_id: 0x10,
            thread_name: "main".into(),
            ..Default::default()
        };
        thread.context.r[0] = 0xdead_beef;
        thread.context.r[31] = 1;
        thread.context.f[2] = 1.5;
        thread.context.cr = 0x2200_0000;
        thread.context.lr = 0x8200_0040;
        thread.context.msr = 0x1234_5678;
        thread.frames = vec![
            Frame { guest_pc: 0 },
            Frame { guest_pc: 0x8200_1234 },
            Frame { guest_pc: 0x8200_9999 },
        ];
        thread
    }

    #[test]
    fn gprs_render_as_eight_nibbles() {
        let thread = snapshot();
        assert_eq!(render_register(&thread, PpcRegId::Gpr(0)), "deadbeef");
        assert_eq!(render_register(&thread, PpcRegId::Gpr(31)), "00000001");
        assert_eq!(render_register(&thread, PpcRegId::Gpr(5)), "00000000");
    }

    #[test]
    fn fprs_render_raw_double_bits() {
        let thread = snapshot();
        assert_eq!(
            render_register(&thread, PpcRegId::Fpr(2)),
            format!("{:016x}", 1.5f64.to_bits())
        );
        assert_eq!(render_register(&thread, PpcRegId::Fpr(0)).len(), 16);
    }

    #[test]
    fn opaque_registers_render_as_x() {
        let thread = snapshot();
        // msr holds a value, but the client still sees it as unavailable
        assert_eq!(render_register(&thread, PpcRegId::Msr), "xxxxxxxx");
        assert_eq!(render_register(&thread, PpcRegId::Xer), "xxxxxxxx");
        assert_eq!(render_register(&thread, PpcRegId::Fpscr), "xxxxxxxx");
    }

    #[test]
    fn pc_skips_host_only_frames() {
        let thread = snapshot();
        assert_eq!(render_register(&thread, PpcRegId::Pc), "82001234");

        let mut no_guest = snapshot();
        no_guest.frames = vec![Frame { guest_pc: 0 }];
        assert_eq!(render_register(&no_guest, PpcRegId::Pc), "00000000");

        no_guest.frames.clear();
        assert_eq!(render_register(&no_guest, PpcRegId::Pc), "00000000");
    }
}
