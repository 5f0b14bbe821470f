use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::State;
use crate::nvm::MappedMemory;

/// マップ領域内の部分領域に対する読み込み用のビュー.
///
/// ビューが生存している間は、アロケータの共有ロックが保持され続けるため、
/// 領域の拡張(再マップ)が行われることはない.
/// 逆に言えば、ビューを長時間保持すると、他のスレッドによる拡張がブロックされる.
///
/// # Deadlock
///
/// ビューを保持したまま、同じスレッドで排他ロックを必要とする操作
/// (e.g., `allocate`, `grow`, `close`, `get_mut`, `copy`)を呼び出すと、永久にブロックする.
/// 部分領域間のコピーには`Allocator::copy`を使用すること.
pub struct SectionView<'a, N: MappedMemory> {
    state: RwLockReadGuard<'a, State<N>>,
    range: Range<usize>,
}
impl<'a, N: MappedMemory> SectionView<'a, N> {
    pub(crate) fn new(state: RwLockReadGuard<'a, State<N>>, range: Range<usize>) -> Self {
        SectionView { state, range }
    }
}
impl<'a, N: MappedMemory> Deref for SectionView<'a, N> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.state.nvm.as_bytes()[self.range.clone()]
    }
}
impl<'a, N: MappedMemory> fmt::Debug for SectionView<'a, N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SectionView")
            .field("range", &self.range)
            .finish()
    }
}

/// マップ領域内の部分領域に対する書き込み用のビュー.
///
/// ビューが生存している間は、アロケータの排他ロックが保持され続ける.
///
/// # Deadlock
///
/// ビューを保持したまま、同じスレッドでアロケータの他の操作(読み込みも含む)を呼び出すと、
/// 永久にブロックする.
/// 書き込み処理を局所化したい場合には`Allocator::with_bytes_mut`を使用すること.
pub struct SectionViewMut<'a, N: MappedMemory> {
    state: RwLockWriteGuard<'a, State<N>>,
    range: Range<usize>,
}
impl<'a, N: MappedMemory> SectionViewMut<'a, N> {
    pub(crate) fn new(state: RwLockWriteGuard<'a, State<N>>, range: Range<usize>) -> Self {
        SectionViewMut { state, range }
    }
}
impl<'a, N: MappedMemory> Deref for SectionViewMut<'a, N> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.state.nvm.as_bytes()[self.range.clone()]
    }
}
impl<'a, N: MappedMemory> DerefMut for SectionViewMut<'a, N> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let range = self.range.clone();
        &mut self.state.nvm.as_bytes_mut()[range]
    }
}
impl<'a, N: MappedMemory> fmt::Debug for SectionViewMut<'a, N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SectionViewMut")
            .field("range", &self.range)
            .finish()
    }
}
