use std::collections::{BTreeSet, HashMap};

use log::debug;
use thiserror::Error;

use crate::target::Processor;

/// A software breakpoint on a guest address.
///
/// Owned exclusively by the [`BreakpointTable`]; the execution engine is
/// handed a borrow for the duration of install/remove and keeps only what
/// it copies out.
#[derive(Clone, Debug)]
pub struct SoftwareBreakpoint {
    guest_address: u32,
    host_addresses: BTreeSet<u64>,
    installed: bool,
}

impl SoftwareBreakpoint {
    pub fn guest_address(&self) -> u32 {
        self.guest_address
    }

    /// Host instruction addresses the JIT emitted for this guest address.
    pub fn host_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.host_addresses.iter().copied()
    }

    pub fn contains_host_address(&self, host_address: u64) -> bool {
        self.host_addresses.contains(&host_address)
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("a breakpoint already exists at guest address {0:#010x}")]
    AlreadyExists(u32),
    #[error("host address {host_address:#x} is claimed by the breakpoint at {existing:#010x}")]
    HostAddressInUse { host_address: u64, existing: u32 },
}

/// All stub-owned breakpoints, keyed by guest address.
///
/// Entries are installed in the engine exactly as long as they are present
/// here. No two entries share a guest address or a host address.
#[derive(Default)]
pub struct BreakpointTable {
    by_guest_address: HashMap<u32, SoftwareBreakpoint>,
    install_order: Vec<u32>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.install_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.install_order.is_empty()
    }

    pub fn get(&self, guest_address: u32) -> Option<&SoftwareBreakpoint> {
        self.by_guest_address.get(&guest_address)
    }

    /// Install a breakpoint at `guest_address`.
    ///
    /// Rejects the install if the guest address is already breakpointed, or
    /// if any host address the JIT maps it to is claimed by another entry
    /// (two guest instructions can share host code after inlining).
    pub fn install(
        &mut self,
        processor: &dyn Processor,
        guest_address: u32,
    ) -> Result<(), InstallError> {
        if self.by_guest_address.contains_key(&guest_address) {
            return Err(InstallError::AlreadyExists(guest_address));
        }

        let host_addresses: BTreeSet<u64> = processor
            .resolve_host_addresses(guest_address)
            .into_iter()
            .collect();

        for existing in self.by_guest_address.values() {
            for &host_address in &host_addresses {
                if existing.contains_host_address(host_address) {
                    return Err(InstallError::HostAddressInUse {
                        host_address,
                        existing: existing.guest_address(),
                    });
                }
            }
        }

        debug!("adding breakpoint at {:#010x}", guest_address);

        let mut breakpoint = SoftwareBreakpoint {
            guest_address,
            host_addresses,
            installed: false,
        };
        processor.add_breakpoint(&breakpoint);
        breakpoint.installed = true;

        self.install_order.push(guest_address);
        self.by_guest_address.insert(guest_address, breakpoint);
        Ok(())
    }

    /// Remove the breakpoint at `guest_address`, if one exists.
    pub fn remove(&mut self, processor: &dyn Processor, guest_address: u32) -> bool {
        let Some(mut breakpoint) = self.by_guest_address.remove(&guest_address) else {
            return false;
        };

        debug!("deleting breakpoint at {:#010x}", guest_address);

        processor.remove_breakpoint(&breakpoint);
        breakpoint.installed = false;
        self.install_order.retain(|&addr| addr != guest_address);
        true
    }

    /// Remove every breakpoint, oldest first.
    pub fn clear(&mut self, processor: &dyn Processor) {
        for guest_address in std::mem::take(&mut self.install_order) {
            if let Some(mut breakpoint) = self.by_guest_address.remove(&guest_address) {
                processor.remove_breakpoint(&breakpoint);
                breakpoint.installed = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{
        ExecutionState, GuestMemory, ThreadSnapshot,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct NoMemory;

    impl GuestMemory for NoMemory {
        fn lookup_heap(&self, _address: u32) -> Option<&dyn crate::target::GuestHeap> {
            None
        }

        fn translate_virtual(&self, _address: u32, _len: usize) -> Option<&[u8]> {
            None
        }
    }

    static NO_MEMORY: NoMemory = NoMemory;

    /// Records install/remove calls; maps each guest address to a fixed set
    /// of host addresses.
    #[derive(Default)]
    struct FakeJit {
        code_map: HashMap<u32, Vec<u64>>,
        installed: Mutex<Vec<u32>>,
    }

    impl Processor for FakeJit {
        fn execution_state(&self) -> ExecutionState {
            ExecutionState::Paused
        }

        fn pause(&self) {}

        fn resume(&self) {}

        fn step_guest_instruction(&self, _thread_id: u32) {}

        fn add_breakpoint(&self, breakpoint: &SoftwareBreakpoint) {
            self.installed.lock().push(breakpoint.guest_address());
        }

        fn remove_breakpoint(&self, breakpoint: &SoftwareBreakpoint) {
            let mut installed = self.installed.lock();
            let pos = installed
                .iter()
                .position(|&addr| addr == breakpoint.guest_address())
                .expect("removing a breakpoint the engine never saw");
            installed.remove(pos);
        }

        fn query_thread_debug_infos(&self) -> Vec<ThreadSnapshot> {
            Vec::new()
        }

        fn resolve_host_addresses(&self, guest_address: u32) -> Vec<u64> {
            self.code_map.get(&guest_address).cloned().unwrap_or_default()
        }

        fn memory(&self) -> &dyn GuestMemory {
            &NO_MEMORY
        }
    }

    fn jit(map: &[(u32, &[u64])]) -> FakeJit {
        FakeJit {
            code_map: map.iter().map(|(g, h)| (*g, h.to_vec())).collect(),
            installed: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn install_is_rejected_until_removed() {
        let processor = jit(&[(0x8200_1000, &[0x7000])]);
        let mut table = BreakpointTable::new();

        assert_eq!(table.install(&processor, 0x8200_1000), Ok(()));
        assert_eq!(
            table.install(&processor, 0x8200_1000),
            Err(InstallError::AlreadyExists(0x8200_1000))
        );
        assert!(table.remove(&processor, 0x8200_1000));
        assert_eq!(table.install(&processor, 0x8200_1000), Ok(()));
    }

    #[test]
    fn host_address_collisions_are_rejected() {
        let processor = jit(&[
            (0x8200_1000, &[0x7000, 0x7004]),
            (0x8200_2000, &[0x7004]),
            (0x8200_3000, &[0x9000]),
        ]);
        let mut table = BreakpointTable::new();

        table.install(&processor, 0x8200_1000).unwrap();
        assert_eq!(
            table.install(&processor, 0x8200_2000),
            Err(InstallError::HostAddressInUse {
                host_address: 0x7004,
                existing: 0x8200_1000,
            })
        );
        // a rejected install leaves nothing behind in the engine
        assert_eq!(processor.installed.lock().len(), 1);
        table.install(&processor, 0x8200_3000).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn removal_of_unknown_address_is_a_no_op() {
        let processor = jit(&[]);
        let mut table = BreakpointTable::new();
        assert!(!table.remove(&processor, 0x8200_1000));
    }

    #[test]
    fn engine_and_table_stay_in_sync() {
        let processor = jit(&[
            (0x8200_1000, &[0x7000]),
            (0x8200_2000, &[0x7100]),
            (0x8200_3000, &[0x7200]),
        ]);
        let mut table = BreakpointTable::new();

        for addr in [0x8200_1000, 0x8200_2000, 0x8200_3000] {
            table.install(&processor, addr).unwrap();
            assert!(table.get(addr).unwrap().is_installed());
        }
        assert_eq!(*processor.installed.lock(), vec![
            0x8200_1000,
            0x8200_2000,
            0x8200_3000
        ]);

        table.remove(&processor, 0x8200_2000);
        assert_eq!(*processor.installed.lock(), vec![0x8200_1000, 0x8200_3000]);

        table.clear(&processor);
        assert!(table.is_empty());
        assert!(processor.installed.lock().is_empty());
    }
}
