//! Guest-visible state of the register-file peripherals (CCU, SYSCON).

use crate::io::state::codec::{Decoder, Encoder};
use crate::io::state::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

// Register files are architecturally fixed in size; reject anything larger
// so corrupted snapshots cannot force pathological allocations.
const MAX_REGFILE_WORDS: usize = 4096;

fn save_regs(device_id: [u8; 4], version: SnapshotVersion, tag: u16, regs: &[u32]) -> Vec<u8> {
    let mut w = SnapshotWriter::new(device_id, version);
    let mut e = Encoder::new().u32(regs.len() as u32);
    for &r in regs {
        e = e.u32(r);
    }
    w.field_bytes(tag, e.finish());
    w.finish()
}

fn load_regs(r: &SnapshotReader<'_>, tag: u16, regs: &mut Vec<u32>) -> SnapshotResult<()> {
    regs.clear();
    if let Some(buf) = r.bytes(tag) {
        let mut d = Decoder::new(buf);
        let count = d.u32()? as usize;
        if count > MAX_REGFILE_WORDS {
            return Err(SnapshotError::InvalidFieldEncoding("register file size"));
        }
        for _ in 0..count {
            regs.push(d.u32()?);
        }
        d.finish()?;
    }
    Ok(())
}

/// Clock Control Unit register array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CcuState {
    pub regs: Vec<u32>,
}

const TAG_CCU_REGS: u16 = 1;

impl IoSnapshot for CcuState {
    const DEVICE_ID: [u8; 4] = *b"CCU0";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        save_regs(Self::DEVICE_ID, Self::DEVICE_VERSION, TAG_CCU_REGS, &self.regs)
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;
        load_regs(&r, TAG_CCU_REGS, &mut self.regs)
    }
}

/// System Controller register array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SysconState {
    pub regs: Vec<u32>,
}

const TAG_SYSCON_REGS: u16 = 1;

impl IoSnapshot for SysconState {
    const DEVICE_ID: [u8; 4] = *b"SYSC";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        save_regs(
            Self::DEVICE_ID,
            Self::DEVICE_VERSION,
            TAG_SYSCON_REGS,
            &self.regs,
        )
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;
        load_regs(&r, TAG_SYSCON_REGS, &mut self.regs)
    }
}
