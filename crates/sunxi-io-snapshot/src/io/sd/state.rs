//! Guest-visible state of the SD/MMC host controller.

use crate::io::state::codec::{Decoder, Encoder};
use crate::io::state::{IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter};

/// Full register file of the SD host controller, including the residual
/// transfer counter. Restoring this struct restores everything a guest can
/// observe through MMIO.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdHostState {
    pub global_ctl: u32,
    pub clock_ctl: u32,
    pub timeout: u32,
    pub bus_width: u32,
    pub block_size: u32,
    pub byte_count: u32,
    pub transfer_cnt: u32,
    pub command: u32,
    pub command_arg: u32,
    pub response: [u32; 4],
    pub irq_mask: u32,
    pub irq_status: u32,
    pub status: u32,
    pub fifo_wlevel: u32,
    pub fifo_func_sel: u32,
    pub debug_enable: u32,
    pub auto12_arg: u32,
    pub newtiming_set: u32,
    pub newtiming_debug: u32,
    pub hardware_rst: u32,
    pub dmac: u32,
    pub desc_base: u32,
    pub dmac_status: u32,
    pub dmac_irq: u32,
    pub card_threshold: u32,
    pub startbit_detect: u32,
    pub response_crc: u32,
    pub data_crc: [u32; 8],
    pub status_crc: u32,
}

const TAG_REGS: u16 = 1;
const TAG_CRC: u16 = 2;

impl IoSnapshot for SdHostState {
    const DEVICE_ID: [u8; 4] = *b"SDHC";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);

        let mut regs = Encoder::new()
            .u32(self.global_ctl)
            .u32(self.clock_ctl)
            .u32(self.timeout)
            .u32(self.bus_width)
            .u32(self.block_size)
            .u32(self.byte_count)
            .u32(self.transfer_cnt)
            .u32(self.command)
            .u32(self.command_arg);
        for r in self.response {
            regs = regs.u32(r);
        }
        regs = regs
            .u32(self.irq_mask)
            .u32(self.irq_status)
            .u32(self.status)
            .u32(self.fifo_wlevel)
            .u32(self.fifo_func_sel)
            .u32(self.debug_enable)
            .u32(self.auto12_arg)
            .u32(self.newtiming_set)
            .u32(self.newtiming_debug)
            .u32(self.hardware_rst)
            .u32(self.dmac)
            .u32(self.desc_base)
            .u32(self.dmac_status)
            .u32(self.dmac_irq)
            .u32(self.card_threshold)
            .u32(self.startbit_detect);
        w.field_bytes(TAG_REGS, regs.finish());

        let mut crc = Encoder::new().u32(self.response_crc);
        for c in self.data_crc {
            crc = crc.u32(c);
        }
        crc = crc.u32(self.status_crc);
        w.field_bytes(TAG_CRC, crc.finish());

        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        if let Some(buf) = r.bytes(TAG_REGS) {
            let mut d = Decoder::new(buf);
            self.global_ctl = d.u32()?;
            self.clock_ctl = d.u32()?;
            self.timeout = d.u32()?;
            self.bus_width = d.u32()?;
            self.block_size = d.u32()?;
            self.byte_count = d.u32()?;
            self.transfer_cnt = d.u32()?;
            self.command = d.u32()?;
            self.command_arg = d.u32()?;
            for r in &mut self.response {
                *r = d.u32()?;
            }
            self.irq_mask = d.u32()?;
            self.irq_status = d.u32()?;
            self.status = d.u32()?;
            self.fifo_wlevel = d.u32()?;
            self.fifo_func_sel = d.u32()?;
            self.debug_enable = d.u32()?;
            self.auto12_arg = d.u32()?;
            self.newtiming_set = d.u32()?;
            self.newtiming_debug = d.u32()?;
            self.hardware_rst = d.u32()?;
            self.dmac = d.u32()?;
            self.desc_base = d.u32()?;
            self.dmac_status = d.u32()?;
            self.dmac_irq = d.u32()?;
            self.card_threshold = d.u32()?;
            self.startbit_detect = d.u32()?;
            d.finish()?;
        }

        if let Some(buf) = r.bytes(TAG_CRC) {
            let mut d = Decoder::new(buf);
            self.response_crc = d.u32()?;
            for c in &mut self.data_crc {
                *c = d.u32()?;
            }
            self.status_crc = d.u32()?;
            d.finish()?;
        }

        Ok(())
    }
}
