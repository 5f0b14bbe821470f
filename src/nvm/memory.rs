use std::convert::TryFrom;

use crate::nvm::MappedMemory;
use crate::{ErrorKind, Result};

/// メモリベースの`MappedMemory`の実装.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、
/// `MappedMemory`が本来要求する"不揮発性"は満たしていない.
#[derive(Debug, Default)]
pub struct MemoryNvm {
    memory: Vec<u8>,
    mapped: bool,
    closed: bool,
}
impl MemoryNvm {
    /// 新しい`MemoryNvm`インスタンスを生成する.
    ///
    /// `memory`の長さが、永続化層上のサイズ(`stat_len`)として扱われる.
    pub fn new(memory: Vec<u8>) -> Self {
        MemoryNvm {
            memory,
            mapped: false,
            closed: false,
        }
    }

    fn check_not_closed(&self) -> Result<()> {
        track_assert!(!self.closed, ErrorKind::Closed);
        Ok(())
    }
}
impl MappedMemory for MemoryNvm {
    fn stat_len(&self) -> Result<u64> {
        track!(self.check_not_closed())?;
        Ok(self.memory.len() as u64)
    }
    fn truncate(&mut self, size: u64) -> Result<()> {
        track!(self.check_not_closed())?;
        track_assert!(!self.mapped, ErrorKind::InvalidInput, "Memory is mapped");
        let size = track_assert_some!(
            usize::try_from(size).ok(),
            ErrorKind::InvalidInput,
            "Too large: size={}",
            size
        );
        if let Some(additional) = size.checked_sub(self.memory.len()) {
            track_assert!(
                self.memory.try_reserve(additional).is_ok(),
                ErrorKind::InvalidInput,
                "Cannot reserve memory: size={}",
                size
            );
        }
        self.memory.resize(size, 0);
        Ok(())
    }
    fn map(&mut self) -> Result<()> {
        track!(self.check_not_closed())?;
        self.mapped = true;
        Ok(())
    }
    fn unmap(&mut self) -> Result<()> {
        track!(self.check_not_closed())?;
        self.mapped = false;
        Ok(())
    }
    fn is_mapped(&self) -> bool {
        self.mapped
    }
    fn as_bytes(&self) -> &[u8] {
        if self.mapped {
            &self.memory
        } else {
            &[]
        }
    }
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.mapped {
            &mut self.memory
        } else {
            &mut []
        }
    }
    fn flush(&mut self) -> Result<()> {
        track!(self.check_not_closed())?;
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        track!(self.check_not_closed())?;
        track_assert!(!self.mapped, ErrorKind::InvalidInput, "Memory is mapped");
        self.closed = true;
        Ok(())
    }
}
