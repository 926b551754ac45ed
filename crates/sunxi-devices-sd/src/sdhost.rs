//! SD/MMC host controller core: register decode, command engine, internal
//! DMA descriptor walker, PIO FIFO path, and interrupt aggregation.
//!
//! The programming model is the Allwinner H3 one: the guest programs block
//! size and byte count, loads a command with CMDR.LOAD, and moves data either
//! through the FIFO register or by pointing the internal DMA engine at a
//! chain of 16-byte descriptors in guest memory. Completion is reported
//! through the raw interrupt status register and a single level IRQ output.

use std::fmt;

use tracing::{trace, warn};

use sunxi_io_snapshot::io::sd::state::SdHostState;
use sunxi_io_snapshot::io::state::{IoSnapshot, SnapshotResult, SnapshotVersion};

use crate::bus::{GuestMemory, GuestMemoryExt, IrqLine};
use crate::sdbus::{SdBus, SdBusError, SdResponse};

/// Size of the MMIO register window.
pub const REG_MEM_SIZE: u64 = 0x1000;

// Register offsets.
pub const REG_GCTL: u64 = 0x00; // Global Control
pub const REG_CKCR: u64 = 0x04; // Clock Control
pub const REG_TMOR: u64 = 0x08; // Timeout
pub const REG_BWDR: u64 = 0x0C; // Bus Width
pub const REG_BKSR: u64 = 0x10; // Block Size
pub const REG_BYCR: u64 = 0x14; // Byte Count
pub const REG_CMDR: u64 = 0x18; // Command
pub const REG_CAGR: u64 = 0x1C; // Command Argument
pub const REG_RESP0: u64 = 0x20;
pub const REG_RESP1: u64 = 0x24;
pub const REG_RESP2: u64 = 0x28;
pub const REG_RESP3: u64 = 0x2C;
pub const REG_IMKR: u64 = 0x30; // Interrupt Mask
pub const REG_MISR: u64 = 0x34; // Masked Interrupt Status
pub const REG_RISR: u64 = 0x38; // Raw Interrupt Status
pub const REG_STAR: u64 = 0x3C; // Status
pub const REG_FWLR: u64 = 0x40; // FIFO Water Level
pub const REG_FUNS: u64 = 0x44; // FIFO Function Select
pub const REG_DBGC: u64 = 0x50; // Debug Enable
pub const REG_A12A: u64 = 0x58; // Auto command 12 argument
pub const REG_NTSR: u64 = 0x5C; // NewTiming Set
pub const REG_SDBG: u64 = 0x60; // NewTiming Set Debug
pub const REG_HWRST: u64 = 0x78; // Hardware Reset
pub const REG_DMAC: u64 = 0x80; // Internal DMA Controller Control
pub const REG_DLBA: u64 = 0x84; // Descriptor List Base Address
pub const REG_IDST: u64 = 0x88; // Internal DMA Controller Status
pub const REG_IDIE: u64 = 0x8C; // Internal DMA Controller IRQ Enable
pub const REG_THLDC: u64 = 0x100; // Card Threshold Control
pub const REG_DSBD: u64 = 0x10C; // eMMC DDR Start Bit Detection Control
pub const REG_RES_CRC: u64 = 0x110; // Response CRC
pub const REG_DATA7_CRC: u64 = 0x114; // CRC Data 7..0, one word each
pub const REG_DATA0_CRC: u64 = 0x130;
pub const REG_CRC_STA: u64 = 0x134; // CRC status during write
pub const REG_FIFO: u64 = 0x200; // Read/Write FIFO

// Global control bits.
pub const GCTL_DMA_ENB: u32 = 1 << 5;
pub const GCTL_INT_ENB: u32 = 1 << 4;
pub const GCTL_DMA_RST: u32 = 1 << 2;
pub const GCTL_FIFO_RST: u32 = 1 << 1;
pub const GCTL_SOFT_RST: u32 = 1 << 0;

// Command register bits.
pub const CMDR_LOAD: u32 = 1 << 31;
pub const CMDR_CLKCHANGE: u32 = 1 << 21;
pub const CMDR_AUTOSTOP: u32 = 1 << 12;
pub const CMDR_WRITE: u32 = 1 << 10;
pub const CMDR_DATA: u32 = 1 << 9;
pub const CMDR_RESPONSE_LONG: u32 = 1 << 7;
pub const CMDR_RESPONSE: u32 = 1 << 6;
pub const CMDR_CMDID_MASK: u32 = 0x3F;

// Raw interrupt status bits.
pub const RISR_CARD_REMOVE: u32 = 1 << 31;
pub const RISR_CARD_INSERT: u32 = 1 << 30;
pub const RISR_AUTOCMD_DONE: u32 = 1 << 14;
pub const RISR_DATA_COMPLETE: u32 = 1 << 3;
pub const RISR_CMD_COMPLETE: u32 = 1 << 2;
pub const RISR_NO_RESPONSE: u32 = 1 << 1;

// Status bits.
pub const STAR_CARD_PRESENT: u32 = 1 << 8;

// Internal DMA controller status bits.
pub const IDST_SUM_RECEIVE_IRQ: u32 = 1 << 8;
pub const IDST_RECEIVE_IRQ: u32 = 1 << 1;
pub const IDST_TRANSMIT_IRQ: u32 = 1 << 0;
/// Only these IDST bits are clearable by the guest.
pub const IDST_WR_MASK: u32 = 0x3FF;

// DMA descriptor status flags (guest ABI, little-endian words in memory).
pub const DESC_STATUS_HOLD: u32 = 1 << 31;
pub const DESC_STATUS_ERROR: u32 = 1 << 30;
pub const DESC_STATUS_CHAIN: u32 = 1 << 4;
pub const DESC_STATUS_FIRST: u32 = 1 << 3;
pub const DESC_STATUS_LAST: u32 = 1 << 2;
pub const DESC_STATUS_NOIRQ: u32 = 1 << 1;

/// Low two bits of a descriptor's buffer address are ignored.
const DESC_ADDR_MASK: u32 = 0xFFFF_FFFC;

/// A descriptor size field of zero means a 64 KiB segment.
const DESC_SIZE_ZERO_BYTES: u32 = 0x1_0000;

/// Upper bound on descriptors consumed by a single walk. The architectural
/// terminator is the LAST flag (or byte count depletion); a malformed chain
/// that provides neither is cut off here.
const MAX_CHAIN_DESCRIPTORS: u32 = 4096;

// Register reset values.
const RESET_GCTL: u32 = 0x0000_0300;
const RESET_TMOR: u32 = 0xFFFF_FF40;
const RESET_BKSR: u32 = 0x0000_0200;
const RESET_BYCR: u32 = 0x0000_0200;
const RESET_STAR: u32 = 0x0000_0100;
const RESET_FWLR: u32 = 0x000F_0000;
const RESET_A12A: u32 = 0x0000_FFFF;
const RESET_NTSR: u32 = 0x0000_0001;
const RESET_HWRST: u32 = 0x0000_0001;

/// One entry of the DMA descriptor chain, 16 bytes in guest memory.
#[derive(Debug, Clone, Copy)]
struct TransferDescriptor {
    status: u32,
    size: u32,
    addr: u32,
    next: u32,
}

impl TransferDescriptor {
    fn read(mem: &dyn GuestMemory, desc_addr: u32) -> Self {
        Self {
            status: mem.read_u32(desc_addr),
            size: mem.read_u32(desc_addr.wrapping_add(4)),
            addr: mem.read_u32(desc_addr.wrapping_add(8)),
            next: mem.read_u32(desc_addr.wrapping_add(12)),
        }
    }

    fn write_back(&self, mem: &mut dyn GuestMemory, desc_addr: u32) {
        mem.write_u32(desc_addr, self.status);
        mem.write_u32(desc_addr.wrapping_add(4), self.size);
        mem.write_u32(desc_addr.wrapping_add(8), self.addr);
        mem.write_u32(desc_addr.wrapping_add(12), self.next);
    }
}

/// One SD/MMC host controller instance (one card slot).
pub struct SdHostController {
    global_ctl: u32,
    clock_ctl: u32,
    timeout: u32,
    bus_width: u32,
    block_size: u32,
    byte_count: u32,
    transfer_cnt: u32,
    command: u32,
    command_arg: u32,
    response: [u32; 4],
    irq_mask: u32,
    irq_status: u32,
    status: u32,
    fifo_wlevel: u32,
    fifo_func_sel: u32,
    debug_enable: u32,
    auto12_arg: u32,
    newtiming_set: u32,
    newtiming_debug: u32,
    hardware_rst: u32,
    dmac: u32,
    desc_base: u32,
    dmac_status: u32,
    dmac_irq: u32,
    card_threshold: u32,
    startbit_detect: u32,
    response_crc: u32,
    data_crc: [u32; 8],
    status_crc: u32,

    card: Option<Box<dyn SdBus>>,
    irq: Box<dyn IrqLine>,
}

impl SdHostController {
    pub fn new(irq: Box<dyn IrqLine>) -> Self {
        let mut host = Self {
            global_ctl: 0,
            clock_ctl: 0,
            timeout: 0,
            bus_width: 0,
            block_size: 0,
            byte_count: 0,
            transfer_cnt: 0,
            command: 0,
            command_arg: 0,
            response: [0; 4],
            irq_mask: 0,
            irq_status: 0,
            status: 0,
            fifo_wlevel: 0,
            fifo_func_sel: 0,
            debug_enable: 0,
            auto12_arg: 0,
            newtiming_set: 0,
            newtiming_debug: 0,
            hardware_rst: 0,
            dmac: 0,
            desc_base: 0,
            dmac_status: 0,
            dmac_irq: 0,
            card_threshold: 0,
            startbit_detect: 0,
            response_crc: 0,
            data_crc: [0; 8],
            status_crc: 0,
            card: None,
            irq,
        };
        host.reset();
        host
    }

    /// Attach a card and report the insertion to the guest.
    pub fn insert_card(&mut self, card: Box<dyn SdBus>) {
        self.card = Some(card);
        self.set_inserted(true);
    }

    /// Detach the card, if any, and report the removal to the guest.
    pub fn eject_card(&mut self) -> Option<Box<dyn SdBus>> {
        let card = self.card.take();
        if card.is_some() {
            self.set_inserted(false);
        }
        card
    }

    /// Card presence change notification from the bus.
    pub fn set_inserted(&mut self, inserted: bool) {
        trace!(inserted, "card presence change");
        if inserted {
            self.irq_status |= RISR_CARD_INSERT;
            self.irq_status &= !RISR_CARD_REMOVE;
            self.status |= STAR_CARD_PRESENT;
        } else {
            self.irq_status &= !RISR_CARD_INSERT;
            self.irq_status |= RISR_CARD_REMOVE;
            self.status &= !STAR_CARD_PRESENT;
        }
        self.update_irq();
    }

    /// Restore the power-on register state. The attached card (and the
    /// CARD_PRESENT reset default) are unaffected.
    pub fn reset(&mut self) {
        self.global_ctl = RESET_GCTL;
        self.clock_ctl = 0;
        self.timeout = RESET_TMOR;
        self.bus_width = 0;
        self.block_size = RESET_BKSR;
        self.byte_count = RESET_BYCR;
        self.transfer_cnt = 0;

        self.command = 0;
        self.command_arg = 0;
        self.response = [0; 4];

        self.irq_mask = 0;
        self.irq_status = 0;
        self.status = RESET_STAR;

        self.fifo_wlevel = RESET_FWLR;
        self.fifo_func_sel = 0;
        self.debug_enable = 0;
        self.auto12_arg = RESET_A12A;
        self.newtiming_set = RESET_NTSR;
        self.newtiming_debug = 0;
        self.hardware_rst = RESET_HWRST;
        self.dmac = 0;
        self.desc_base = 0;
        self.dmac_status = 0;
        self.dmac_irq = 0;
        self.card_threshold = 0;
        self.startbit_detect = 0;

        self.response_crc = 0;
        self.data_crc = [0; 8];
        self.status_crc = 0;

        self.update_irq();
    }

    fn update_irq(&self) {
        let level =
            self.global_ctl & GCTL_INT_ENB != 0 && self.irq_status & self.irq_mask != 0;
        self.irq.set_level(level);
    }

    fn update_transfer_cnt(&mut self, bytes: u32) {
        self.transfer_cnt = self.transfer_cnt.saturating_sub(bytes);
        if self.transfer_cnt == 0 {
            self.irq_status |= RISR_DATA_COMPLETE | RISR_AUTOCMD_DONE;
        }
    }

    fn send_command(&mut self) {
        // The load flag is consumed by the dispatch, never read back.
        self.command &= !CMDR_LOAD;

        // A clock change cycles the card clock only; the bus stays idle.
        if self.command & CMDR_CLKCHANGE == 0 {
            let cmd = (self.command & CMDR_CMDID_MASK) as u8;
            let arg = self.command_arg;

            let result = match self.card.as_mut() {
                Some(card) => card.submit(cmd, arg),
                None => Err(SdBusError::NoCard),
            };

            let response = match result {
                Ok(response) => response,
                Err(_) => {
                    self.irq_status |= RISR_NO_RESPONSE;
                    return;
                }
            };

            if self.command & CMDR_RESPONSE != 0 {
                let long = self.command & CMDR_RESPONSE_LONG != 0;
                match (response, long) {
                    (SdResponse::Short(b), false) => {
                        self.response[0] = u32::from_be_bytes(b);
                        self.response[1] = 0;
                        self.response[2] = 0;
                        self.response[3] = 0;
                    }
                    (SdResponse::Long(b), true) => {
                        self.response[0] = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
                        self.response[1] = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
                        self.response[2] = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
                        self.response[3] = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                    }
                    _ => {
                        // Response length does not match what the command
                        // register asked for.
                        self.irq_status |= RISR_NO_RESPONSE;
                        return;
                    }
                }
            }
        }

        self.irq_status |= RISR_CMD_COMPLETE;
    }

    /// Inject CMD12 (STOP_TRANSMISSION) once a multi-block transfer drained,
    /// returning the SD bus to the transfer state.
    fn auto_stop(&mut self) {
        if self.command & CMDR_AUTOSTOP != 0 && self.transfer_cnt == 0 {
            let saved_cmd = self.command;
            let saved_arg = self.command_arg;

            self.command = (self.command & !CMDR_CMDID_MASK) | 12;
            self.command_arg = 0;
            self.send_command();

            self.command = saved_cmd;
            self.command_arg = saved_arg;
        }
    }

    /// Move one descriptor's worth of data between guest memory and the
    /// card, bounce-buffered in 1 KiB chunks, then clear the descriptor's
    /// HOLD flag in place. Returns the descriptor and the bytes moved.
    fn process_desc(
        &mut self,
        mem: &mut dyn GuestMemory,
        desc_addr: u32,
        is_write: bool,
        max_bytes: u32,
    ) -> (TransferDescriptor, u32) {
        let mut desc = TransferDescriptor::read(&*mem, desc_addr);

        let seg = if desc.size == 0 {
            DESC_SIZE_ZERO_BYTES
        } else {
            desc.size
        };
        let num_bytes = seg.min(max_bytes);

        trace!(
            desc_addr = format_args!("{desc_addr:#010x}"),
            size = desc.size,
            is_write,
            num_bytes,
            "processing DMA descriptor"
        );

        let mut buf = [0u8; 1024];
        let mut num_done = 0u32;
        while num_done < num_bytes {
            let chunk = (num_bytes - num_done).min(buf.len() as u32) as usize;
            let buf_addr = (desc.addr & DESC_ADDR_MASK).wrapping_add(num_done);

            if is_write {
                mem.read(buf_addr, &mut buf[..chunk]);
                if let Some(card) = self.card.as_mut() {
                    for &b in &buf[..chunk] {
                        card.write_byte(b);
                    }
                }
            } else {
                if let Some(card) = self.card.as_mut() {
                    for b in &mut buf[..chunk] {
                        *b = card.read_byte();
                    }
                }
                mem.write(buf_addr, &buf[..chunk]);
            }
            num_done += chunk as u32;
        }

        // The cleared HOLD flag is what the guest driver polls for
        // completion of this segment.
        desc.status &= !DESC_STATUS_HOLD;
        desc.write_back(mem, desc_addr);

        (desc, num_done)
    }

    fn dma(&mut self, mem: &mut dyn GuestMemory) {
        let is_write = self.command & CMDR_WRITE != 0;

        if self.byte_count == 0
            || self.block_size == 0
            || self.global_ctl & GCTL_DMA_ENB == 0
        {
            return;
        }

        // A read needs bytes waiting on the bus. If there are none the guest
        // started the engine too early; nothing may change.
        if !is_write && !self.card.as_ref().is_some_and(|c| c.data_ready()) {
            return;
        }

        let mut desc_addr = self.desc_base;
        let mut chain_len = 0u32;
        while self.byte_count > 0 {
            if chain_len == MAX_CHAIN_DESCRIPTORS {
                warn!(
                    desc_base = format_args!("{:#010x}", self.desc_base),
                    "descriptor chain exceeds {MAX_CHAIN_DESCRIPTORS} entries without LAST, ending walk"
                );
                break;
            }
            chain_len += 1;

            let (desc, bytes_done) = self.process_desc(mem, desc_addr, is_write, self.byte_count);
            self.update_transfer_cnt(bytes_done);
            self.byte_count = self.byte_count.saturating_sub(bytes_done);

            if desc.status & DESC_STATUS_LAST != 0 {
                break;
            }
            desc_addr = desc.next;
        }

        self.irq_status |= RISR_DATA_COMPLETE | RISR_AUTOCMD_DONE;

        if is_write {
            self.dmac_status |= IDST_TRANSMIT_IRQ;
        } else {
            self.dmac_status |= IDST_SUM_RECEIVE_IRQ | IDST_RECEIVE_IRQ;
        }
    }

    fn read_fifo(&mut self) -> u32 {
        match self.card.as_mut() {
            Some(card) if card.data_ready() => {
                let mut bytes = [0u8; 4];
                for b in &mut bytes {
                    *b = card.read_byte();
                }
                let value = u32::from_le_bytes(bytes);
                self.update_transfer_cnt(4);
                self.auto_stop();
                self.update_irq();
                value
            }
            _ => {
                warn!("FIFO read with no data ready on the SD bus");
                0
            }
        }
    }

    fn write_fifo(&mut self, value: u32) {
        if let Some(card) = self.card.as_mut() {
            for b in value.to_le_bytes() {
                card.write_byte(b);
            }
        }
        self.update_transfer_cnt(4);
        self.auto_stop();
        self.update_irq();
    }

    pub fn read_u32(&mut self, offset: u64) -> u32 {
        let res = match offset {
            REG_GCTL => self.global_ctl,
            REG_CKCR => self.clock_ctl,
            REG_TMOR => self.timeout,
            REG_BWDR => self.bus_width,
            REG_BKSR => self.block_size,
            REG_BYCR => self.byte_count,
            REG_CMDR => self.command,
            REG_CAGR => self.command_arg,
            REG_RESP0 => self.response[0],
            REG_RESP1 => self.response[1],
            REG_RESP2 => self.response[2],
            REG_RESP3 => self.response[3],
            REG_IMKR => self.irq_mask,
            REG_MISR => self.irq_status & self.irq_mask,
            REG_RISR => self.irq_status,
            REG_STAR => self.status,
            REG_FWLR => self.fifo_wlevel,
            REG_FUNS => self.fifo_func_sel,
            REG_DBGC => self.debug_enable,
            REG_A12A => self.auto12_arg,
            REG_NTSR => self.newtiming_set,
            REG_SDBG => self.newtiming_debug,
            REG_HWRST => self.hardware_rst,
            REG_DMAC => self.dmac,
            REG_DLBA => self.desc_base,
            REG_IDST => self.dmac_status,
            REG_IDIE => self.dmac_irq,
            REG_THLDC => self.card_threshold,
            REG_DSBD => self.startbit_detect,
            REG_RES_CRC => self.response_crc,
            REG_DATA7_CRC..=REG_DATA0_CRC => {
                self.data_crc[((offset - REG_DATA7_CRC) / 4) as usize]
            }
            REG_CRC_STA => self.status_crc,
            REG_FIFO => self.read_fifo(),
            _ => {
                warn!(
                    offset = format_args!("{offset:#x}"),
                    "read from unknown SD host register"
                );
                0
            }
        };
        trace!(
            offset = format_args!("{offset:#x}"),
            value = format_args!("{res:#010x}"),
            "register read"
        );
        res
    }

    pub fn write_u32(&mut self, mem: &mut dyn GuestMemory, offset: u64, value: u32) {
        trace!(
            offset = format_args!("{offset:#x}"),
            value = format_args!("{value:#010x}"),
            "register write"
        );
        match offset {
            REG_GCTL => {
                // The three reset request bits complete immediately and
                // always read back as zero.
                self.global_ctl = value & !(GCTL_DMA_RST | GCTL_FIFO_RST | GCTL_SOFT_RST);
                self.update_irq();
            }
            REG_CKCR => self.clock_ctl = value,
            REG_TMOR => self.timeout = value,
            REG_BWDR => self.bus_width = value,
            REG_BKSR => self.block_size = value,
            REG_BYCR => {
                self.byte_count = value;
                self.transfer_cnt = value;
            }
            REG_CMDR => {
                self.command = value;
                if value & CMDR_LOAD != 0 {
                    self.send_command();
                    self.dma(mem);
                    self.auto_stop();
                }
                self.update_irq();
            }
            REG_CAGR => self.command_arg = value,
            REG_RESP0 => self.response[0] = value,
            REG_RESP1 => self.response[1] = value,
            REG_RESP2 => self.response[2] = value,
            REG_RESP3 => self.response[3] = value,
            REG_IMKR => {
                self.irq_mask = value;
                self.update_irq();
            }
            REG_MISR | REG_RISR => {
                // Write 1 to clear.
                self.irq_status &= !value;
                self.update_irq();
            }
            REG_STAR => {
                // Write 1 to clear.
                self.status &= !value;
                self.update_irq();
            }
            REG_FWLR => self.fifo_wlevel = value,
            REG_FUNS => self.fifo_func_sel = value,
            REG_DBGC => self.debug_enable = value,
            REG_A12A => self.auto12_arg = value,
            REG_NTSR => self.newtiming_set = value,
            REG_SDBG => self.newtiming_debug = value,
            REG_HWRST => self.hardware_rst = value,
            REG_DMAC => {
                self.dmac = value;
                self.update_irq();
            }
            REG_DLBA => self.desc_base = value,
            REG_IDST => {
                // Write 1 to clear, restricted to the writable bit range.
                self.dmac_status &= !(value & IDST_WR_MASK);
                self.update_irq();
            }
            REG_IDIE => {
                self.dmac_irq = value;
                self.update_irq();
            }
            REG_THLDC => self.card_threshold = value,
            REG_DSBD => self.startbit_detect = value,
            REG_FIFO => self.write_fifo(value),
            REG_RES_CRC..=REG_CRC_STA => {
                // CRC capture registers are read-only storage.
            }
            _ => {
                warn!(
                    offset = format_args!("{offset:#x}"),
                    "write to unknown SD host register"
                );
            }
        }
    }

    pub fn snapshot_state(&self) -> SdHostState {
        SdHostState {
            global_ctl: self.global_ctl,
            clock_ctl: self.clock_ctl,
            timeout: self.timeout,
            bus_width: self.bus_width,
            block_size: self.block_size,
            byte_count: self.byte_count,
            transfer_cnt: self.transfer_cnt,
            command: self.command,
            command_arg: self.command_arg,
            response: self.response,
            irq_mask: self.irq_mask,
            irq_status: self.irq_status,
            status: self.status,
            fifo_wlevel: self.fifo_wlevel,
            fifo_func_sel: self.fifo_func_sel,
            debug_enable: self.debug_enable,
            auto12_arg: self.auto12_arg,
            newtiming_set: self.newtiming_set,
            newtiming_debug: self.newtiming_debug,
            hardware_rst: self.hardware_rst,
            dmac: self.dmac,
            desc_base: self.desc_base,
            dmac_status: self.dmac_status,
            dmac_irq: self.dmac_irq,
            card_threshold: self.card_threshold,
            startbit_detect: self.startbit_detect,
            response_crc: self.response_crc,
            data_crc: self.data_crc,
            status_crc: self.status_crc,
        }
    }

    pub fn restore_state(&mut self, state: &SdHostState) {
        self.global_ctl = state.global_ctl;
        self.clock_ctl = state.clock_ctl;
        self.timeout = state.timeout;
        self.bus_width = state.bus_width;
        self.block_size = state.block_size;
        self.byte_count = state.byte_count;
        self.transfer_cnt = state.transfer_cnt;
        self.command = state.command;
        self.command_arg = state.command_arg;
        self.response = state.response;
        self.irq_mask = state.irq_mask;
        self.irq_status = state.irq_status;
        self.status = state.status;
        self.fifo_wlevel = state.fifo_wlevel;
        self.fifo_func_sel = state.fifo_func_sel;
        self.debug_enable = state.debug_enable;
        self.auto12_arg = state.auto12_arg;
        self.newtiming_set = state.newtiming_set;
        self.newtiming_debug = state.newtiming_debug;
        self.hardware_rst = state.hardware_rst;
        self.dmac = state.dmac;
        self.desc_base = state.desc_base;
        self.dmac_status = state.dmac_status;
        self.dmac_irq = state.dmac_irq;
        self.card_threshold = state.card_threshold;
        self.startbit_detect = state.startbit_detect;
        self.response_crc = state.response_crc;
        self.data_crc = state.data_crc;
        self.status_crc = state.status_crc;

        self.update_irq();
    }
}

impl fmt::Debug for SdHostController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdHostController")
            .field("global_ctl", &self.global_ctl)
            .field("command", &self.command)
            .field("irq_status", &self.irq_status)
            .field("irq_mask", &self.irq_mask)
            .field("byte_count", &self.byte_count)
            .field("transfer_cnt", &self.transfer_cnt)
            .field("has_card", &self.card.is_some())
            .finish_non_exhaustive()
    }
}

impl IoSnapshot for SdHostController {
    const DEVICE_ID: [u8; 4] = <SdHostState as IoSnapshot>::DEVICE_ID;
    const DEVICE_VERSION: SnapshotVersion = <SdHostState as IoSnapshot>::DEVICE_VERSION;

    fn save_state(&self) -> Vec<u8> {
        // Commands and DMA complete synchronously inside the MMIO write that
        // triggers them, so the register file is the complete state.
        self.snapshot_state().save_state()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let mut state = SdHostState::default();
        state.load_state(bytes)?;
        self.restore_state(&state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{TestIrqLine, TestMemory};
    use crate::sdbus::ScriptedCard;

    fn setup_host() -> (SdHostController, TestIrqLine, TestMemory, ScriptedCard) {
        let irq = TestIrqLine::default();
        let mut host = SdHostController::new(Box::new(irq.clone()));
        let mut mem = TestMemory::new(0x2_0000);
        let card = ScriptedCard::new();
        host.insert_card(Box::new(card.clone()));
        // Drop the insertion event so tests observe only their own bits.
        host.write_u32(&mut mem, REG_RISR, !0);
        (host, irq, mem, card)
    }

    fn write_desc(mem: &mut TestMemory, desc_addr: u32, status: u32, size: u32, buf: u32, next: u32) {
        mem.write_u32(desc_addr, status);
        mem.write_u32(desc_addr + 4, size);
        mem.write_u32(desc_addr + 8, buf);
        mem.write_u32(desc_addr + 12, next);
    }

    #[test]
    fn reset_values_match_hardware_defaults() {
        let irq = TestIrqLine::default();
        let mut host = SdHostController::new(Box::new(irq));

        for (offset, expect) in [
            (REG_GCTL, 0x0000_0300),
            (REG_CKCR, 0),
            (REG_TMOR, 0xFFFF_FF40),
            (REG_BWDR, 0),
            (REG_BKSR, 0x0000_0200),
            (REG_BYCR, 0x0000_0200),
            (REG_CMDR, 0),
            (REG_CAGR, 0),
            (REG_RESP0, 0),
            (REG_RESP3, 0),
            (REG_IMKR, 0),
            (REG_MISR, 0),
            (REG_RISR, 0),
            (REG_STAR, 0x0000_0100),
            (REG_FWLR, 0x000F_0000),
            (REG_FUNS, 0),
            (REG_DBGC, 0),
            (REG_A12A, 0x0000_FFFF),
            (REG_NTSR, 0x0000_0001),
            (REG_SDBG, 0),
            (REG_HWRST, 0x0000_0001),
            (REG_DMAC, 0),
            (REG_DLBA, 0),
            (REG_IDST, 0),
            (REG_IDIE, 0),
            (REG_THLDC, 0),
            (REG_DSBD, 0),
            (REG_RES_CRC, 0),
            (REG_DATA7_CRC, 0),
            (REG_DATA0_CRC, 0),
            (REG_CRC_STA, 0),
        ] {
            assert_eq!(host.read_u32(offset), expect, "offset {offset:#x}");
        }
        assert_eq!(host.snapshot_state().transfer_cnt, 0);
    }

    #[test]
    fn pio_fifo_write_pushes_le_bytes_and_completes() {
        let (mut host, irq, mut mem, card) = setup_host();

        host.write_u32(&mut mem, REG_GCTL, GCTL_INT_ENB);
        host.write_u32(&mut mem, REG_IMKR, RISR_DATA_COMPLETE | RISR_AUTOCMD_DONE);
        host.write_u32(&mut mem, REG_BKSR, 0x200);
        host.write_u32(&mut mem, REG_BYCR, 4);
        host.write_u32(&mut mem, REG_FIFO, 0xDEAD_BEEF);

        assert_eq!(card.written(), vec![0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(host.snapshot_state().transfer_cnt, 0);
        let risr = host.read_u32(REG_RISR);
        assert_eq!(
            risr & (RISR_DATA_COMPLETE | RISR_AUTOCMD_DONE),
            RISR_DATA_COMPLETE | RISR_AUTOCMD_DONE
        );
        assert!(irq.level());
    }

    #[test]
    fn pio_fifo_read_packs_le_and_updates_counter() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.extend_read_data([0x78, 0x56, 0x34, 0x12]);

        host.write_u32(&mut mem, REG_BYCR, 4);
        assert_eq!(host.read_u32(REG_FIFO), 0x1234_5678);
        assert_eq!(host.snapshot_state().transfer_cnt, 0);
        assert_ne!(host.read_u32(REG_RISR) & RISR_DATA_COMPLETE, 0);
    }

    #[test]
    fn pio_fifo_read_without_data_is_inert() {
        let (mut host, _irq, mut mem, _card) = setup_host();
        host.write_u32(&mut mem, REG_BYCR, 8);

        assert_eq!(host.read_u32(REG_FIFO), 0);
        assert_eq!(host.snapshot_state().transfer_cnt, 8);
        assert_eq!(host.read_u32(REG_RISR), 0);
    }

    #[test]
    fn command_with_short_response() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.push_response(Ok(SdResponse::Short([0x11, 0x22, 0x33, 0x44])));

        host.write_u32(&mut mem, REG_CAGR, 0);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_RESPONSE | 8);

        assert_eq!(card.commands(), vec![(8, 0)]);
        assert_eq!(host.read_u32(REG_RESP0), 0x1122_3344);
        assert_eq!(host.read_u32(REG_RESP1), 0);
        assert_eq!(host.read_u32(REG_RESP2), 0);
        assert_eq!(host.read_u32(REG_RESP3), 0);
        assert_ne!(host.read_u32(REG_RISR) & RISR_CMD_COMPLETE, 0);
        // The load flag must never survive the dispatch.
        assert_eq!(host.read_u32(REG_CMDR) & CMDR_LOAD, 0);
    }

    #[test]
    fn command_with_long_response() {
        let (mut host, _irq, mut mem, card) = setup_host();
        let mut raw = [0u8; 16];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        card.push_response(Ok(SdResponse::Long(raw)));

        host.write_u32(
            &mut mem,
            REG_CMDR,
            CMDR_LOAD | CMDR_RESPONSE | CMDR_RESPONSE_LONG | 2,
        );

        assert_eq!(host.read_u32(REG_RESP0), 0x0C0D_0E0F);
        assert_eq!(host.read_u32(REG_RESP1), 0x0809_0A0B);
        assert_eq!(host.read_u32(REG_RESP2), 0x0405_0607);
        assert_eq!(host.read_u32(REG_RESP3), 0x0001_0203);
        assert_ne!(host.read_u32(REG_RISR) & RISR_CMD_COMPLETE, 0);
    }

    #[test]
    fn response_length_mismatch_sets_no_response() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.push_response(Ok(SdResponse::Short([1, 2, 3, 4])));

        host.write_u32(
            &mut mem,
            REG_CMDR,
            CMDR_LOAD | CMDR_RESPONSE | CMDR_RESPONSE_LONG | 2,
        );

        let risr = host.read_u32(REG_RISR);
        assert_ne!(risr & RISR_NO_RESPONSE, 0);
        assert_eq!(risr & RISR_CMD_COMPLETE, 0);
        assert_eq!(host.read_u32(REG_RESP0), 0);
    }

    #[test]
    fn missing_response_sets_no_response() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.push_response(Ok(SdResponse::None));

        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_RESPONSE | 17);

        let risr = host.read_u32(REG_RISR);
        assert_ne!(risr & RISR_NO_RESPONSE, 0);
        assert_eq!(risr & RISR_CMD_COMPLETE, 0);
    }

    #[test]
    fn command_failure_sets_no_response() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.push_response(Err(SdBusError::CommandFailed));

        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | 1);

        assert_ne!(host.read_u32(REG_RISR) & RISR_NO_RESPONSE, 0);
    }

    #[test]
    fn command_without_card_sets_no_response() {
        let irq = TestIrqLine::default();
        let mut host = SdHostController::new(Box::new(irq));
        let mut mem = TestMemory::new(0x1000);

        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | 0);

        assert_ne!(host.read_u32(REG_RISR) & RISR_NO_RESPONSE, 0);
    }

    #[test]
    fn unwanted_response_is_ignored() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.push_response(Ok(SdResponse::Short([1, 2, 3, 4])));

        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | 7);

        assert_eq!(host.read_u32(REG_RESP0), 0);
        assert_ne!(host.read_u32(REG_RISR) & RISR_CMD_COMPLETE, 0);
    }

    #[test]
    fn clock_change_skips_the_bus() {
        let (mut host, _irq, mut mem, card) = setup_host();

        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_CLKCHANGE);

        assert!(card.commands().is_empty());
        assert_ne!(host.read_u32(REG_RISR) & RISR_CMD_COMPLETE, 0);
        assert_eq!(host.read_u32(REG_CMDR), CMDR_CLKCHANGE);
    }

    #[test]
    fn dma_read_walks_two_descriptors() {
        let (mut host, irq, mut mem, card) = setup_host();
        card.extend_read_data((0..1024u32).map(|i| i as u8));

        write_desc(
            &mut mem,
            0x1000,
            DESC_STATUS_HOLD | DESC_STATUS_FIRST,
            512,
            0x4000,
            0x1010,
        );
        write_desc(
            &mut mem,
            0x1010,
            DESC_STATUS_HOLD | DESC_STATUS_LAST,
            512,
            0x5000,
            0,
        );

        host.write_u32(&mut mem, REG_GCTL, GCTL_INT_ENB | GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_IMKR, RISR_DATA_COMPLETE);
        host.write_u32(&mut mem, REG_BKSR, 0x200);
        host.write_u32(&mut mem, REG_BYCR, 1024);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA | 18);

        let expect: Vec<u8> = (0..1024u32).map(|i| i as u8).collect();
        assert_eq!(&mem.as_slice()[0x4000..0x4200], &expect[..512]);
        assert_eq!(&mem.as_slice()[0x5000..0x5200], &expect[512..]);

        // HOLD cleared in place, other flags intact.
        assert_eq!(mem.read_u32(0x1000), DESC_STATUS_FIRST);
        assert_eq!(mem.read_u32(0x1010), DESC_STATUS_LAST);

        assert_eq!(
            host.read_u32(REG_IDST),
            IDST_SUM_RECEIVE_IRQ | IDST_RECEIVE_IRQ
        );
        let risr = host.read_u32(REG_RISR);
        assert_ne!(risr & RISR_DATA_COMPLETE, 0);
        assert_ne!(risr & RISR_AUTOCMD_DONE, 0);
        assert_eq!(host.read_u32(REG_BYCR), 0);
        assert_eq!(host.snapshot_state().transfer_cnt, 0);
        assert!(irq.level());
    }

    #[test]
    fn dma_write_pushes_guest_bytes_to_card() {
        let (mut host, _irq, mut mem, card) = setup_host();

        let payload: Vec<u8> = (0..512u32).map(|i| (i * 3) as u8).collect();
        mem.write(0x4000, &payload);
        write_desc(
            &mut mem,
            0x1000,
            DESC_STATUS_HOLD | DESC_STATUS_FIRST | DESC_STATUS_LAST,
            512,
            0x4000,
            0,
        );

        host.write_u32(&mut mem, REG_GCTL, GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_BYCR, 512);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA | CMDR_WRITE | 24);

        assert_eq!(card.written(), payload);
        assert_eq!(host.read_u32(REG_IDST), IDST_TRANSMIT_IRQ);
        assert_eq!(mem.read_u32(0x1000), DESC_STATUS_FIRST | DESC_STATUS_LAST);
    }

    #[test]
    fn dma_size_zero_descriptor_means_64k_not_zero() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.extend_read_data((0..2048u32).map(|i| i as u8));

        write_desc(
            &mut mem,
            0x1000,
            DESC_STATUS_HOLD | DESC_STATUS_LAST,
            0,
            0x4000,
            0,
        );

        host.write_u32(&mut mem, REG_GCTL, GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_BYCR, 2048);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA);

        let expect: Vec<u8> = (0..2048u32).map(|i| i as u8).collect();
        assert_eq!(&mem.as_slice()[0x4000..0x4800], &expect[..]);
        assert_eq!(host.read_u32(REG_BYCR), 0);
    }

    #[test]
    fn dma_requires_dma_enable() {
        let (mut host, _irq, mut mem, card) = setup_host();
        card.extend_read_data([0u8; 64]);

        write_desc(&mut mem, 0x1000, DESC_STATUS_HOLD | DESC_STATUS_LAST, 64, 0x4000, 0);
        host.write_u32(&mut mem, REG_BYCR, 64);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA);

        // Walker never ran: descriptor untouched, no DMA status bits.
        assert_eq!(mem.read_u32(0x1000), DESC_STATUS_HOLD | DESC_STATUS_LAST);
        assert_eq!(host.read_u32(REG_IDST), 0);
    }

    #[test]
    fn dma_read_without_data_ready_is_inert() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        write_desc(&mut mem, 0x1000, DESC_STATUS_HOLD | DESC_STATUS_LAST, 64, 0x4000, 0);
        host.write_u32(&mut mem, REG_GCTL, GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_BYCR, 64);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA);

        assert_eq!(mem.read_u32(0x1000), DESC_STATUS_HOLD | DESC_STATUS_LAST);
        assert_eq!(host.read_u32(REG_IDST), 0);
        assert_eq!(host.read_u32(REG_BYCR), 64);
    }

    #[test]
    fn dma_chain_without_last_is_capped() {
        let (mut host, _irq, mut mem, card) = setup_host();

        // A self-looping descriptor that never sets LAST. Byte count is
        // larger than the cap can drain, so the cap is the only terminator.
        write_desc(&mut mem, 0x1000, DESC_STATUS_HOLD, 16, 0x4000, 0x1000);

        host.write_u32(&mut mem, REG_GCTL, GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_BYCR, 0x2_0000);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(&mut mem, REG_CMDR, CMDR_LOAD | CMDR_DATA | CMDR_WRITE);

        // 4096 descriptors * 16 bytes each.
        assert_eq!(card.written().len(), 0x1_0000);
        assert_eq!(host.read_u32(REG_BYCR), 0x1_0000);
    }

    #[test]
    fn auto_stop_injects_cmd12_and_restores_registers() {
        let (mut host, _irq, mut mem, card) = setup_host();

        let cmd_val = CMDR_AUTOSTOP | 25;
        host.write_u32(&mut mem, REG_CAGR, 0x55);
        host.write_u32(&mut mem, REG_CMDR, cmd_val);
        host.write_u32(&mut mem, REG_BYCR, 4);
        host.write_u32(&mut mem, REG_FIFO, 0x0102_0304);

        assert_eq!(card.commands(), vec![(12, 0)]);
        assert_eq!(host.read_u32(REG_CMDR), cmd_val);
        assert_eq!(host.read_u32(REG_CAGR), 0x55);
    }

    #[test]
    fn auto_stop_after_dma_transfer() {
        let (mut host, _irq, mut mem, card) = setup_host();

        mem.write(0x4000, &[0u8; 512]);
        write_desc(
            &mut mem,
            0x1000,
            DESC_STATUS_HOLD | DESC_STATUS_LAST,
            512,
            0x4000,
            0,
        );

        host.write_u32(&mut mem, REG_GCTL, GCTL_DMA_ENB);
        host.write_u32(&mut mem, REG_BYCR, 512);
        host.write_u32(&mut mem, REG_DLBA, 0x1000);
        host.write_u32(
            &mut mem,
            REG_CMDR,
            CMDR_LOAD | CMDR_DATA | CMDR_WRITE | CMDR_AUTOSTOP | 25,
        );

        assert_eq!(card.commands(), vec![(25, 0), (12, 0)]);
        assert_eq!(host.read_u32(REG_CMDR) & CMDR_CMDID_MASK, 25);
    }

    #[test]
    fn auto_stop_waits_for_counter_to_drain() {
        let (mut host, _irq, mut mem, card) = setup_host();

        host.write_u32(&mut mem, REG_CMDR, CMDR_AUTOSTOP | 25);
        host.write_u32(&mut mem, REG_BYCR, 8);
        host.write_u32(&mut mem, REG_FIFO, 0x1111_1111);
        assert!(card.commands().is_empty());

        host.write_u32(&mut mem, REG_FIFO, 0x2222_2222);
        assert_eq!(card.commands(), vec![(12, 0)]);
    }

    #[test]
    fn irq_line_follows_status_mask_and_enable() {
        let irq = TestIrqLine::default();
        let mut host = SdHostController::new(Box::new(irq.clone()));
        let mut mem = TestMemory::new(0x1000);

        host.set_inserted(true);
        assert!(!irq.level());

        host.write_u32(&mut mem, REG_IMKR, RISR_CARD_INSERT);
        assert!(!irq.level()); // INT_ENB still clear

        host.write_u32(&mut mem, REG_GCTL, GCTL_INT_ENB);
        assert!(irq.level());

        host.write_u32(&mut mem, REG_IMKR, 0);
        assert!(!irq.level());

        host.write_u32(&mut mem, REG_IMKR, RISR_CARD_INSERT);
        host.write_u32(&mut mem, REG_GCTL, 0);
        assert!(!irq.level());
    }

    #[test]
    fn masked_status_read_applies_mask() {
        let (mut host, _irq, mut mem, _card) = setup_host();
        host.set_inserted(true);

        assert_ne!(host.read_u32(REG_RISR) & RISR_CARD_INSERT, 0);
        assert_eq!(host.read_u32(REG_MISR), 0);

        host.write_u32(&mut mem, REG_IMKR, RISR_CARD_INSERT);
        assert_eq!(host.read_u32(REG_MISR), RISR_CARD_INSERT);
    }

    #[test]
    fn interrupt_status_is_write_one_to_clear() {
        let (mut host, _irq, mut mem, _card) = setup_host();
        host.set_inserted(true);
        host.write_u32(&mut mem, REG_BYCR, 4);
        host.write_u32(&mut mem, REG_FIFO, 0);

        let before = host.read_u32(REG_RISR);
        assert_ne!(before, 0);

        host.write_u32(&mut mem, REG_RISR, RISR_DATA_COMPLETE);
        assert_eq!(host.read_u32(REG_RISR), before & !RISR_DATA_COMPLETE);

        host.write_u32(&mut mem, REG_MISR, !0);
        assert_eq!(host.read_u32(REG_RISR), 0);
    }

    #[test]
    fn status_register_is_write_one_to_clear() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        assert_ne!(host.read_u32(REG_STAR) & STAR_CARD_PRESENT, 0);
        host.write_u32(&mut mem, REG_STAR, STAR_CARD_PRESENT);
        assert_eq!(host.read_u32(REG_STAR) & STAR_CARD_PRESENT, 0);
    }

    #[test]
    fn idst_clears_only_within_writable_mask() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        let state = SdHostState {
            dmac_status: 0xFFFF,
            ..host.snapshot_state()
        };
        host.restore_state(&state);

        host.write_u32(&mut mem, REG_IDST, !0);
        assert_eq!(host.read_u32(REG_IDST), 0xFC00);
    }

    #[test]
    fn gctl_reset_request_bits_self_clear() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        host.write_u32(
            &mut mem,
            REG_GCTL,
            0x300 | GCTL_DMA_RST | GCTL_FIFO_RST | GCTL_SOFT_RST,
        );
        assert_eq!(host.read_u32(REG_GCTL), 0x300);
    }

    #[test]
    fn card_insert_and_remove_events() {
        let irq = TestIrqLine::default();
        let mut host = SdHostController::new(Box::new(irq));

        host.set_inserted(true);
        assert_ne!(host.read_u32(REG_STAR) & STAR_CARD_PRESENT, 0);
        assert_ne!(host.read_u32(REG_RISR) & RISR_CARD_INSERT, 0);

        host.set_inserted(false);
        assert_eq!(host.read_u32(REG_STAR) & STAR_CARD_PRESENT, 0);
        let risr = host.read_u32(REG_RISR);
        assert_ne!(risr & RISR_CARD_REMOVE, 0);
        assert_eq!(risr & RISR_CARD_INSERT, 0);
    }

    #[test]
    fn eject_card_reports_removal() {
        let (mut host, _irq, _mem, _card) = setup_host();

        assert!(host.eject_card().is_some());
        assert_eq!(host.read_u32(REG_STAR) & STAR_CARD_PRESENT, 0);
        assert_ne!(host.read_u32(REG_RISR) & RISR_CARD_REMOVE, 0);
        assert!(host.eject_card().is_none());
    }

    #[test]
    fn crc_registers_are_read_only_storage() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        let state = SdHostState {
            response_crc: 0x7F,
            data_crc: [1, 2, 3, 4, 5, 6, 7, 8],
            status_crc: 0x55,
            ..host.snapshot_state()
        };
        host.restore_state(&state);

        host.write_u32(&mut mem, REG_RES_CRC, !0);
        host.write_u32(&mut mem, REG_DATA7_CRC, !0);
        host.write_u32(&mut mem, REG_CRC_STA, !0);

        assert_eq!(host.read_u32(REG_RES_CRC), 0x7F);
        assert_eq!(host.read_u32(REG_DATA7_CRC), 1);
        assert_eq!(host.read_u32(REG_DATA7_CRC + 4), 2);
        assert_eq!(host.read_u32(REG_DATA0_CRC), 8);
        assert_eq!(host.read_u32(REG_CRC_STA), 0x55);
    }

    #[test]
    fn unknown_offsets_read_zero_and_discard_writes() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        assert_eq!(host.read_u32(0x64), 0);
        assert_eq!(host.read_u32(0x400), 0);
        host.write_u32(&mut mem, 0x64, 0x1234_5678);
        assert_eq!(host.read_u32(0x64), 0);
    }

    #[test]
    fn byte_count_write_reloads_transfer_counter() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        host.write_u32(&mut mem, REG_BYCR, 0x1234);
        assert_eq!(host.read_u32(REG_BYCR), 0x1234);
        assert_eq!(host.snapshot_state().transfer_cnt, 0x1234);
    }

    #[test]
    fn response_registers_are_guest_writable() {
        let (mut host, _irq, mut mem, _card) = setup_host();

        host.write_u32(&mut mem, REG_RESP2, 0xABCD_EF01);
        assert_eq!(host.read_u32(REG_RESP2), 0xABCD_EF01);
    }
}
