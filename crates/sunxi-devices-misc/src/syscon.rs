//! System Controller (SYSCON).

use tracing::warn;

use sunxi_io_snapshot::io::misc::state::SysconState;
use sunxi_io_snapshot::io::state::{IoSnapshot, SnapshotResult, SnapshotVersion};

/// Size of the MMIO register window.
pub const REG_MEM_SIZE: u64 = 0x1000;

// Register offsets.
pub const REG_VER: u64 = 0x24; // Version (read-only)
pub const REG_EMAC_PHY_CLK: u64 = 0x30; // EMAC PHY Clock

/// Highest register address plus one word, in bytes.
const REGS_MAXADDR: u64 = 0x34;
const REGS_NUM: usize = (REGS_MAXADDR / 4) as usize;

const RESET_EMAC_PHY_CLK: u32 = 0x0005_8000;

pub struct Syscon {
    regs: [u32; REGS_NUM],
}

impl Syscon {
    pub fn new() -> Self {
        let mut syscon = Self {
            regs: [0; REGS_NUM],
        };
        syscon.reset();
        syscon
    }

    pub fn reset(&mut self) {
        self.regs = [0; REGS_NUM];
        self.regs[(REG_EMAC_PHY_CLK / 4) as usize] = RESET_EMAC_PHY_CLK;
    }

    pub fn read_u32(&self, offset: u64) -> u32 {
        let idx = (offset / 4) as usize;
        if offset % 4 != 0 || idx >= REGS_NUM {
            warn!(
                offset = format_args!("{offset:#x}"),
                "read from unknown SYSCON register"
            );
            return 0;
        }
        self.regs[idx]
    }

    pub fn write_u32(&mut self, offset: u64, value: u32) {
        let idx = (offset / 4) as usize;
        if offset % 4 != 0 || idx >= REGS_NUM {
            warn!(
                offset = format_args!("{offset:#x}"),
                "write to unknown SYSCON register"
            );
            return;
        }
        if offset == REG_VER {
            // Version is hardwired.
            return;
        }
        self.regs[idx] = value;
    }

    pub fn snapshot_state(&self) -> SysconState {
        SysconState {
            regs: self.regs.to_vec(),
        }
    }

    pub fn restore_state(&mut self, state: &SysconState) {
        self.regs = [0; REGS_NUM];
        for (dst, src) in self.regs.iter_mut().zip(&state.regs) {
            *dst = *src;
        }
    }
}

impl Default for Syscon {
    fn default() -> Self {
        Self::new()
    }
}

impl IoSnapshot for Syscon {
    const DEVICE_ID: [u8; 4] = <SysconState as IoSnapshot>::DEVICE_ID;
    const DEVICE_VERSION: SnapshotVersion = <SysconState as IoSnapshot>::DEVICE_VERSION;

    fn save_state(&self) -> Vec<u8> {
        self.snapshot_state().save_state()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let mut state = SysconState::default();
        state.load_state(bytes)?;
        self.restore_state(&state);
        Ok(())
    }
}
