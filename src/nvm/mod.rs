//! メモリマップ可能な不揮発性メモリのインターフェース定義と実装群.
//!
//! このモジュールは[Allocator](../allocator/struct.Allocator.html)が部分領域の読み書きに使用する
//! 永続化領域を提供する.
pub use self::file::{FileNvm, FileNvmBuilder};
pub use self::memory::MemoryNvm;

use crate::Result;

mod file;
mod memory;

/// メモリマップ可能な不揮発性メモリを表すトレイト.
///
/// "不揮発性メモリ"は「サイズ変更が可能な永続化可能なバイト列(領域)」を意味する.
///
/// 領域の内容は、`map`を呼び出してから`unmap`を呼び出すまでの間、
/// `as_bytes`および`as_bytes_mut`を通して直接読み書きすることができる.
///
/// 各操作は、失敗した場合にはそれぞれ個別のエラーを返す必要がある.
pub trait MappedMemory {
    /// 永続化層上での、現在の領域のサイズ(バイト単位)を返す.
    ///
    /// マップの有無には影響されない.
    fn stat_len(&self) -> Result<u64>;

    /// 領域のサイズを`size`に変更する.
    ///
    /// # Errors
    ///
    /// マップ中に呼び出された場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// 領域全体をメモリにマップする.
    ///
    /// 既にマップ済みの場合には、古いマップは破棄されて、現在のサイズで作り直される.
    fn map(&mut self) -> Result<()>;

    /// マップを解除する.
    ///
    /// マップされていない場合には何もしない.
    fn unmap(&mut self) -> Result<()>;

    /// 現在マップ中かどうかを返す.
    fn is_mapped(&self) -> bool;

    /// マップされている領域を返す.
    ///
    /// マップされていない場合には空のスライスが返される.
    fn as_bytes(&self) -> &[u8];

    /// マップされている領域を、書き込み可能な形で返す.
    ///
    /// マップされていない場合には空のスライスが返される.
    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// マップ領域への書き込み内容を、物理デバイスに同期する.
    ///
    /// マップされていない場合には何もしない.
    fn flush(&mut self) -> Result<()>;

    /// 永続化層のハンドルを閉じる.
    ///
    /// 閉じた後の操作は全て`ErrorKind::Closed`で失敗する.
    fn close(&mut self) -> Result<()>;
}
