//! Free List

use std::collections::{BTreeMap, HashMap};

use super::Section;
use crate::{ErrorKind, Result};

/// 解放済みの部分領域を、再利用のために保持するためのリスト.
///
/// # 割当戦略
///
/// このリストは"ExactFit"戦略を採用している.
///
/// 解放された部分領域は、そのサイズをキーとして保持され、
/// 全く同じサイズの割当要求に対してのみ再利用される.
/// 隣接する空き領域の結合も行わない.
///
/// 固定長の部分領域(e.g., スロット)のみを扱う利用者であれば、
/// 解放された領域は全て再利用されることになるが、
/// 様々なサイズを扱う利用者の場合には、サイズ毎に断片化した空き領域が溜まっていく.
///
/// なお、この戦略は`Allocator`の公開インタフェースには影響を与えないので、
/// 必要に応じてBestFit等に置き換えることが可能である.
#[derive(Debug, Default)]
pub struct FreeList {
    size_to_offsets: HashMap<u64, Vec<u64>>,
    offset_to_size: BTreeMap<u64, u64>,
}
impl FreeList {
    /// 空のフリーリストを生成する.
    pub fn new() -> Self {
        Self::default()
    }

    /// `size`と同じサイズを持つ解放済みの部分領域を取り出して、その開始位置を返す.
    ///
    /// 該当する領域が存在しない場合には`None`が返される.
    pub fn acquire(&mut self, size: u64) -> Option<u64> {
        let (offset, is_empty) = {
            let offsets = self.size_to_offsets.get_mut(&size)?;
            let offset = offsets.pop()?;
            (offset, offsets.is_empty())
        };
        if is_empty {
            self.size_to_offsets.remove(&size);
        }
        assert_eq!(self.offset_to_size.remove(&offset), Some(size));
        Some(offset)
    }

    /// 部分領域をリストに追加して、以後の`acquire`で再利用可能にする.
    ///
    /// # Errors
    ///
    /// `section`がリスト内の既存の領域と重なっている場合(e.g., 二重解放)には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返され、リストは変更されない.
    pub fn release(&mut self, section: Section) -> Result<()> {
        track_assert!(
            !self.overlaps_with_free_section(&section),
            ErrorKind::InvalidInput,
            "Already released: {:?}",
            section
        );
        self.offset_to_size.insert(section.offset, section.size);
        self.size_to_offsets
            .entry(section.size)
            .or_insert_with(Vec::new)
            .push(section.offset);
        Ok(())
    }

    /// リスト内の部分領域の数を返す.
    pub fn len(&self) -> usize {
        self.offset_to_size.len()
    }

    /// リストが空かどうかを返す.
    pub fn is_empty(&self) -> bool {
        self.offset_to_size.is_empty()
    }

    // リスト内の領域同士は互いに素なので、
    // `section`の直前と直後の領域とのみ比較すれば十分.
    fn overlaps_with_free_section(&self, section: &Section) -> bool {
        let prev = self.offset_to_size.range(..=section.offset).next_back();
        let next = self.offset_to_size.range(section.offset..).next();
        prev.into_iter()
            .chain(next)
            .any(|(&offset, &size)| section.overlaps(&Section::new(offset, size)))
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn it_works() -> TestResult {
        let mut list = FreeList::new();
        assert!(list.is_empty());
        assert_eq!(list.acquire(10), None);

        track!(list.release(Section::new(0, 10)))?;
        track!(list.release(Section::new(10, 20)))?;
        track!(list.release(Section::new(30, 10)))?;
        assert_eq!(list.len(), 3);

        // サイズが完全に一致するもののみが再利用される
        assert_eq!(list.acquire(5), None);
        assert_eq!(list.acquire(30), None);
        assert_eq!(list.acquire(20), Some(10));
        assert_eq!(list.acquire(20), None);

        // 同じサイズの中では、最後に解放されたものから再利用される
        assert_eq!(list.acquire(10), Some(30));
        assert_eq!(list.acquire(10), Some(0));
        assert_eq!(list.acquire(10), None);
        assert!(list.is_empty());
        Ok(())
    }

    #[test]
    fn no_coalescing() -> TestResult {
        let mut list = FreeList::new();
        track!(list.release(Section::new(0, 8)))?;
        track!(list.release(Section::new(8, 8)))?;

        // 隣接する領域は結合されない
        assert_eq!(list.acquire(16), None);
        assert_eq!(list.len(), 2);
        Ok(())
    }

    #[test]
    fn double_release_is_rejected() -> TestResult {
        let mut list = FreeList::new();
        track!(list.release(Section::new(100, 50)))?;

        let e = list.release(Section::new(100, 50)).unwrap_err();
        assert_eq!(*e.kind(), ErrorKind::InvalidInput);

        // 一部だけが重なっている場合も不可
        assert!(list.release(Section::new(90, 20)).is_err());
        assert!(list.release(Section::new(149, 10)).is_err());
        assert!(list.release(Section::new(120, 5)).is_err());
        assert_eq!(list.len(), 1);

        // 隣接しているだけなら問題ない
        track!(list.release(Section::new(50, 50)))?;
        track!(list.release(Section::new(150, 50)))?;
        assert_eq!(list.len(), 3);

        // 再利用された後であれば、再び解放可能
        assert_eq!(list.acquire(50), Some(150));
        track!(list.release(Section::new(150, 50)))?;
        Ok(())
    }
}
