/// RSP register identifier for the 32-bit PowerPC register file.
///
/// Numbering follows gdb's `rs6000` feature files: 0-31 GPRs, 32-63 FPRs,
/// 64-70 specials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpcRegId {
    /// General purpose registers (r0-r31)
    Gpr(u8),
    /// Floating point registers (f0-f31)
    Fpr(u8),
    /// Program counter
    Pc,
    /// Machine state
    Msr,
    /// Condition register
    Cr,
    /// Link register
    Lr,
    /// Count register
    Ctr,
    /// Integer exception register
    Xer,
    /// Floating-point status and control register
    Fpscr,
}

/// Highest register id the stub serves.
pub const MAX_REG_ID: u32 = 70;

impl PpcRegId {
    /// Map a raw RSP register id to its register and byte width.
    pub fn from_raw_id(id: u32) -> Option<(Self, usize)> {
        let reg = match id {
            0..=31 => (Self::Gpr(id as u8), 4),
            32..=63 => (Self::Fpr(id as u8 - 32), 8),
            64 => (Self::Pc, 4),
            65 => (Self::Msr, 4),
            66 => (Self::Cr, 4),
            67 => (Self::Lr, 4),
            68 => (Self::Ctr, 4),
            69 => (Self::Xer, 4),
            70 => (Self::Fpscr, 4),
            _ => return None,
        };

        Some(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_is_dense_up_to_max() {
        for id in 0..=MAX_REG_ID {
            assert!(PpcRegId::from_raw_id(id).is_some(), "id {} unmapped", id);
        }
        assert_eq!(PpcRegId::from_raw_id(MAX_REG_ID + 1), None);
    }

    #[test]
    fn widths_match_the_wire_format() {
        // 32 GPRs + 7 specials at 4 bytes, 32 FPRs at 8 bytes
        let total: usize = (0..=MAX_REG_ID)
            .filter_map(|id| PpcRegId::from_raw_id(id))
            .map(|(_, size)| size)
            .sum();
        assert_eq!(total, 32 * 4 + 32 * 8 + 7 * 4);

        assert_eq!(PpcRegId::from_raw_id(0), Some((PpcRegId::Gpr(0), 4)));
        assert_eq!(PpcRegId::from_raw_id(63), Some((PpcRegId::Fpr(31), 8)));
        assert_eq!(PpcRegId::from_raw_id(64), Some((PpcRegId::Pc, 4)));
        assert_eq!(PpcRegId::from_raw_id(70), Some((PpcRegId::Fpscr, 4)));
    }
}
