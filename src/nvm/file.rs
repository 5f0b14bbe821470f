#[cfg(unix)]
use libc;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::nvm::MappedMemory;
use crate::{ErrorKind, Result};

/// `FileNvm`のビルダ
///
/// 二つのメンバを持ち、それぞれ次の意味を表す:
/// exclusive_lock: `FileNvm`の実体ファイルに対するアクセスの排他制御を行うかどうか
/// create_dir: ファイルの親ディレクトリが存在しない場合に作成するかどうか
#[derive(Debug, Clone)]
pub struct FileNvmBuilder {
    exclusive_lock: bool,
    create_dir: bool,
}

impl FileNvmBuilder {
    /// デフォルト設定で`FileNvmBuilder`インスタンスを作成する
    ///
    /// デフォルトでは、exclusive_lock = trueかつcreate_dir = trueとなる
    pub fn new() -> Self {
        FileNvmBuilder {
            exclusive_lock: true,
            create_dir: true,
        }
    }

    #[cfg(unix)]
    fn set_exclusive_file_lock_if_flag_is_on(&self, file: &File) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        if self.exclusive_lock {
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
                track_io!(Err(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
    #[cfg(not(unix))]
    fn set_exclusive_file_lock_if_flag_is_on(&self, _file: &File) -> Result<()> {
        Ok(())
    }

    /// exclusive_lockのon/offを設定する
    pub fn exclusive_lock(&mut self, enabled: bool) -> &mut Self {
        self.exclusive_lock = enabled;
        self
    }

    /// create_dirのon/offを設定する
    pub fn create_dir(&mut self, enabled: bool) -> &mut Self {
        self.create_dir = enabled;
        self
    }

    /// `dir`配下の`name`ファイルを開いて`FileNvm`インスタンスを生成する.
    ///
    /// ファイルが存在しない場合には、空のファイルが新規に作成される.
    ///
    /// ファイルの内容には一切手を加えないので、既存ファイルの場合には、
    /// 以前の内容がそのまま`Allocator`から参照可能となる.
    pub fn open_or_create<P: AsRef<Path>>(&self, dir: P, name: &str) -> Result<FileNvm> {
        let dir = dir.as_ref();
        if self.create_dir {
            track_io!(fs::create_dir_all(dir))?;
        }
        let file = track_io!(fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(name)))?;
        track!(self.set_exclusive_file_lock_if_flag_is_on(&file))?;
        Ok(FileNvm {
            file: Some(file),
            mmap: None,
        })
    }
}
impl Default for FileNvmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// ファイルベースの`MappedMemory`の実装.
///
/// ファイルの内容は`memmap2`を用いて読み書き可能な形でマップされる.
///
/// UNIX環境であれば、デフォルトではファイルに対して排他ロック(`flock`)が取得される.
#[derive(Debug)]
pub struct FileNvm {
    file: Option<File>,
    mmap: Option<MmapMut>,
}
impl FileNvm {
    /// デフォルト設定で`FileNvm`インスタンスを生成する.
    ///
    /// `FileNvmBuilder::new().open_or_create(dir, name)`と等しい.
    pub fn open_or_create<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        FileNvmBuilder::new().open_or_create(dir, name)
    }

    fn file(&self) -> Result<&File> {
        let file = track_assert_some!(self.file.as_ref(), ErrorKind::Closed);
        Ok(file)
    }
}
impl MappedMemory for FileNvm {
    fn stat_len(&self) -> Result<u64> {
        let metadata = track_io!(track!(self.file())?.metadata())?;
        Ok(metadata.len())
    }
    fn truncate(&mut self, size: u64) -> Result<()> {
        track_assert!(self.mmap.is_none(), ErrorKind::InvalidInput, "File is mapped");
        track_io!(track!(self.file())?.set_len(size))?;
        Ok(())
    }
    fn map(&mut self) -> Result<()> {
        self.mmap = None;
        let mmap = {
            let file = track!(self.file())?;
            // ファイルのサイズ変更は`truncate`経由でのみ行われ、その前には必ずマップが解除される
            track_io!(unsafe { MmapOptions::new().map_mut(file) })?
        };
        self.mmap = Some(mmap);
        Ok(())
    }
    fn unmap(&mut self) -> Result<()> {
        track!(self.file())?;
        self.mmap = None;
        Ok(())
    }
    fn is_mapped(&self) -> bool {
        self.mmap.is_some()
    }
    fn as_bytes(&self) -> &[u8] {
        match self.mmap {
            Some(ref m) => &m[..],
            None => &[],
        }
    }
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self.mmap {
            Some(ref mut m) => &mut m[..],
            None => &mut [],
        }
    }
    fn flush(&mut self) -> Result<()> {
        track!(self.file())?;
        if let Some(ref mmap) = self.mmap {
            track_io!(mmap.flush())?;
        }
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        track_assert!(self.mmap.is_none(), ErrorKind::InvalidInput, "File is mapped");
        let file = track_assert_some!(self.file.take(), ErrorKind::Closed);
        track_io!(file.sync_all())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use tempdir::TempDir;
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn open_or_create_works() -> TestResult {
        let dir = track_io!(TempDir::new("mmap_allocator_test"))?;

        // 存在しないファイルは新規に作成される
        let mut nvm = track!(FileNvm::open_or_create(dir.path(), "foo"))?;
        assert!(dir.path().join("foo").exists());
        assert_eq!(track!(nvm.stat_len())?, 0);
        assert!(!nvm.is_mapped());
        assert!(nvm.as_bytes().is_empty());

        track!(nvm.truncate(1024))?;
        track!(nvm.map())?;
        assert_eq!(nvm.as_bytes().len(), 1024);
        nvm.as_bytes_mut()[..3].copy_from_slice(b"bar");
        track!(nvm.flush())?;
        track!(nvm.unmap())?;
        track!(nvm.close())?;

        // 既存ファイルの内容はそのまま残っている
        let bytes = track_io!(fs::read(dir.path().join("foo")))?;
        assert_eq!(bytes.len(), 1024);
        assert_eq!(&bytes[..3], b"bar");

        let mut nvm = track!(FileNvm::open_or_create(dir.path(), "foo"))?;
        assert_eq!(track!(nvm.stat_len())?, 1024);
        track!(nvm.map())?;
        assert_eq!(&nvm.as_bytes()[..3], b"bar");
        Ok(())
    }

    #[test]
    fn nested_directory_is_created() -> TestResult {
        let dir = track_io!(TempDir::new("mmap_allocator_test"))?;
        let nested = dir.path().join("a").join("b");

        assert!(FileNvmBuilder::new()
            .create_dir(false)
            .open_or_create(&nested, "foo")
            .is_err());

        track!(FileNvm::open_or_create(&nested, "foo"))?;
        assert!(nested.join("foo").exists());
        Ok(())
    }

    #[test]
    fn error_handlings_works() -> TestResult {
        let dir = track_io!(TempDir::new("mmap_allocator_test"))?;
        let mut nvm = track!(FileNvm::open_or_create(dir.path(), "foo"))?;
        track!(nvm.truncate(512))?;
        track!(nvm.map())?;

        // マップ中のサイズ変更・クローズは不可
        assert_eq!(
            nvm.truncate(1024).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        assert!(nvm.close().is_err());

        track!(nvm.unmap())?;
        track!(nvm.close())?;

        // クローズ後の操作は全て失敗する
        assert_eq!(nvm.stat_len().err().map(|e| *e.kind()), Some(ErrorKind::Closed));
        assert_eq!(nvm.map().err().map(|e| *e.kind()), Some(ErrorKind::Closed));
        assert_eq!(nvm.flush().err().map(|e| *e.kind()), Some(ErrorKind::Closed));
        assert_eq!(nvm.close().err().map(|e| *e.kind()), Some(ErrorKind::Closed));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn exclusive_lock_works() -> TestResult {
        let dir = track_io!(TempDir::new("mmap_allocator_test"))?;
        let mut nvm = track!(FileNvm::open_or_create(dir.path(), "foo"))?;

        // 同じファイルを同時に開くことはできない
        assert!(FileNvm::open_or_create(dir.path(), "foo").is_err());

        // 一度閉じれば、オープン可能
        track!(nvm.close())?;
        track!(FileNvm::open_or_create(dir.path(), "foo"))?;
        Ok(())
    }

    #[test]
    fn disabling_exclusive_lock_works() -> TestResult {
        let dir = track_io!(TempDir::new("mmap_allocator_test"))?;
        let mut builder = FileNvmBuilder::new();
        builder.exclusive_lock(false);

        let _first = track!(builder.open_or_create(dir.path(), "foo"))?;
        let _second = track!(builder.open_or_create(dir.path(), "foo"))?;
        Ok(())
    }
}
