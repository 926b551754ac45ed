//! Clock Control Unit (CCU).
//!
//! Clocks are not modelled; the CCU exists so firmware can program PLLs and
//! bus dividers and read back what it wrote. The one behavioural requirement
//! is the PLL lock handshake: enabling a PLL must make its LOCK bit read as
//! set, because boot code spins on it.

use tracing::{trace, warn};

use sunxi_io_snapshot::io::misc::state::CcuState;
use sunxi_io_snapshot::io::state::{IoSnapshot, SnapshotResult, SnapshotVersion};

/// Size of the MMIO register window.
pub const REG_MEM_SIZE: u64 = 0x400;

// Register offsets.
pub const REG_PLL_CPUX: u64 = 0x0000;
pub const REG_PLL_AUDIO: u64 = 0x0008;
pub const REG_PLL_VIDEO: u64 = 0x0010;
pub const REG_PLL_VE: u64 = 0x0018;
pub const REG_PLL_DDR: u64 = 0x0020;
pub const REG_PLL_PERIPH0: u64 = 0x0028;
pub const REG_PLL_GPU: u64 = 0x0038;
pub const REG_PLL_PERIPH1: u64 = 0x0044;
pub const REG_PLL_DE: u64 = 0x0048;
pub const REG_CPUX_AXI: u64 = 0x0050;
pub const REG_APB1: u64 = 0x0054;
pub const REG_APB2: u64 = 0x0058;
pub const REG_MBUS: u64 = 0x00FC;
pub const REG_PLL_TIME0: u64 = 0x0200;
pub const REG_PLL_TIME1: u64 = 0x0204;
pub const REG_PLL_CPUX_BIAS: u64 = 0x0220;
pub const REG_PLL_AUDIO_BIAS: u64 = 0x0224;
pub const REG_PLL_VIDEO_BIAS: u64 = 0x0228;
pub const REG_PLL_VE_BIAS: u64 = 0x022C;
pub const REG_PLL_DDR_BIAS: u64 = 0x0230;
pub const REG_PLL_PERIPH0_BIAS: u64 = 0x0234;
pub const REG_PLL_GPU_BIAS: u64 = 0x023C;
pub const REG_PLL_PERIPH1_BIAS: u64 = 0x0244;
pub const REG_PLL_DE_BIAS: u64 = 0x0248;
pub const REG_PLL_CPUX_TUNING: u64 = 0x0250;
pub const REG_PLL_DDR_TUNING: u64 = 0x0260;

/// Highest register address plus one word, in bytes.
const REGS_MAXADDR: u64 = 0x304;
const REGS_NUM: usize = (REGS_MAXADDR / 4) as usize;

// PLL control register bits.
pub const PLL_ENABLE: u32 = 1 << 31;
pub const PLL_LOCK: u32 = 1 << 28;

pub struct Ccu {
    regs: [u32; REGS_NUM],
}

impl Ccu {
    pub fn new() -> Self {
        let mut ccu = Self {
            regs: [0; REGS_NUM],
        };
        ccu.reset();
        ccu
    }

    pub fn reset(&mut self) {
        self.regs = [0; REGS_NUM];
        for (offset, value) in [
            (REG_PLL_CPUX, 0x0000_1000),
            (REG_PLL_AUDIO, 0x0003_5514),
            (REG_PLL_VIDEO, 0x0300_6207),
            (REG_PLL_VE, 0x0300_6207),
            (REG_PLL_DDR, 0x0000_1000),
            (REG_PLL_PERIPH0, 0x0004_1811),
            (REG_PLL_GPU, 0x0300_6207),
            (REG_PLL_PERIPH1, 0x0004_1811),
            (REG_PLL_DE, 0x0300_6207),
            (REG_CPUX_AXI, 0x0001_0000),
            (REG_APB1, 0x0000_1010),
            (REG_APB2, 0x0100_0000),
            (REG_MBUS, 0x8000_0000),
            (REG_PLL_TIME0, 0x0000_00FF),
            (REG_PLL_TIME1, 0x0000_00FF),
            (REG_PLL_CPUX_BIAS, 0x0810_0200),
            (REG_PLL_AUDIO_BIAS, 0x1010_0000),
            (REG_PLL_VIDEO_BIAS, 0x1010_0000),
            (REG_PLL_VE_BIAS, 0x1010_0000),
            (REG_PLL_DDR_BIAS, 0x8110_4000),
            (REG_PLL_PERIPH0_BIAS, 0x1010_0010),
            (REG_PLL_GPU_BIAS, 0x1010_0000),
            (REG_PLL_PERIPH1_BIAS, 0x1010_0010),
            (REG_PLL_DE_BIAS, 0x1010_0000),
            (REG_PLL_CPUX_TUNING, 0x0A10_1000),
            (REG_PLL_DDR_TUNING, 0x1488_0000),
        ] {
            self.regs[(offset / 4) as usize] = value;
        }
    }

    pub fn read_u32(&self, offset: u64) -> u32 {
        let idx = (offset / 4) as usize;
        if offset % 4 != 0 || idx >= REGS_NUM {
            warn!(
                offset = format_args!("{offset:#x}"),
                "read from unknown CCU register"
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
                "write to unknown CCU register"
            );
            return;
        }

        let mut value = value;
        match offset {
            REG_PLL_CPUX | REG_PLL_AUDIO | REG_PLL_VIDEO | REG_PLL_VE | REG_PLL_DDR
            | REG_PLL_PERIPH0 | REG_PLL_GPU | REG_PLL_PERIPH1 | REG_PLL_DE => {
                // An enabled PLL locks immediately; firmware spins on LOCK.
                if value & PLL_ENABLE != 0 {
                    value |= PLL_LOCK;
                }
            }
            _ => {
                trace!(
                    offset = format_args!("{offset:#x}"),
                    "unmodelled CCU register, storing raw value"
                );
            }
        }
        self.regs[idx] = value;
    }

    pub fn snapshot_state(&self) -> CcuState {
        CcuState {
            regs: self.regs.to_vec(),
        }
    }

    pub fn restore_state(&mut self, state: &CcuState) {
        self.regs = [0; REGS_NUM];
        for (dst, src) in self.regs.iter_mut().zip(&state.regs) {
            *dst = *src;
        }
    }
}

impl Default for Ccu {
    fn default() -> Self {
        Self::new()
    }
}

impl IoSnapshot for Ccu {
    const DEVICE_ID: [u8; 4] = <CcuState as IoSnapshot>::DEVICE_ID;
    const DEVICE_VERSION: SnapshotVersion = <CcuState as IoSnapshot>::DEVICE_VERSION;

    fn save_state(&self) -> Vec<u8> {
        self.snapshot_state().save_state()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let mut state = CcuState::default();
        state.load_state(bytes)?;
        self.restore_state(&state);
        Ok(())
    }
}
