//! Memory-mapped Section Allocator.
//!
//! `mmap_allocator`は、伸長可能なメモリマップドファイルの上に構築された、永続的な領域アロケータ.
//!
//! # 特徴
//!
//! - オフセットとサイズの組で表現される部分領域([Section])を払い出す
//! - 解放された部分領域は、同じサイズの割当要求に対して再利用される
//! - 容量が不足した場合には、ファイルのサイズを倍々に拡張した上で、再マップを行う
//!   - 拡張の度に、登録済みのリスナー群に通知が行われる
//! - ファイルにはヘッダ等のメタデータは一切書き込まない
//!   - 割当状況はメモリ上にのみ存在し、再起動を跨いで保持したい場合には、利用者側での復元が必要
//!
//! # モジュールの依存関係
//!
//! ```text
//! allocator => nvm
//! ```
//!
//! - [allocator]モジュール:
//!   - 主に[Allocator]構造体を提供
//!   - 部分領域の割当・解放・読み書き、およびファイルの拡張を担当する
//! - [nvm]モジュール:
//!   - 主に[MappedMemory]トレイトとその実装である[FileNvm]を提供
//!   - [allocator]に対して、メモリマップ可能な永続化層を提供するのが目的
//!
//! [Section]: ./allocator/struct.Section.html
//! [allocator]: ./allocator/index.html
//! [Allocator]: ./allocator/struct.Allocator.html
//! [nvm]: ./nvm/index.html
//! [MappedMemory]: ./nvm/trait.MappedMemory.html
//! [FileNvm]: ./nvm/struct.FileNvm.html
#![warn(missing_docs)]
extern crate libc;
extern crate memmap2;
extern crate prometrics;
#[cfg(test)]
extern crate proptest;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind, MultipleErrors};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod allocator;
pub mod metrics;
pub mod nvm;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
