//! 部分領域のアロケータ.
//!
//! アロケータは、メモリマップ可能な永続化領域([MappedMemory])を受け取り、
//! その中から要求サイズ分の部分領域([Section])を払い出す責務を負っている.
//!
//! 払い出し可能な領域が不足した場合には、永続化領域のサイズを倍々に拡張した上で、再マップを行う.
//!
//! 割当状況はメモリ上にのみ保持され、永続化領域にはヘッダ等のメタデータは一切書き込まれない.
//!
//! [MappedMemory]: ../nvm/trait.MappedMemory.html
//! [Section]: ./struct.Section.html
use slog::Logger;
use std::fmt;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use self::builder::AllocatorBuilder;
pub use self::free_list::FreeList;
pub use self::section::Section;
pub use self::view::{SectionView, SectionViewMut};

use crate::metrics::AllocatorMetrics;
use crate::nvm::MappedMemory;
use crate::{Error, ErrorKind, MultipleErrors, Result};

mod builder;
mod free_list;
mod section;
mod view;

/// 領域の拡張時に呼び出されるリスナー.
pub type GrowListener = Box<dyn Fn() + Send + Sync + 'static>;

/// 伸長可能なメモリマップ領域から、部分領域を払い出すアロケータ.
///
/// 複数スレッドから同時に利用可能であり、典型的には`Arc`で包んで共有される.
///
/// # 排他制御
///
/// - 永続化領域・末尾位置(tail)・容量(capacity)は、一つの`RwLock`で保護される
///   - 割当・拡張・クローズ・書き込み用ビューの取得は排他ロック、読み込み用ビューの取得は共有ロックを使う
/// - フリーリストは専用の`Mutex`で保護される
/// - 拡張時のリスナー群への通知は、排他ロックを解放した後に行われる
///   - そのため、リスナーの中からアロケータの操作(e.g., `get`)を呼び出すことができる
///   - ただし、リスナーの中から`on_grow`を呼び出してはいけない
///
/// # 拡張戦略
///
/// 容量は、要求サイズを超えるまで倍々に増やされる.
/// コストの高いtruncate+再マップの回数を、多数の小さな割当に対して償却するためである.
pub struct Allocator<N: MappedMemory> {
    state: RwLock<State<N>>,
    free_list: Mutex<FreeList>,
    listeners: RwLock<Vec<GrowListener>>,
    logger: Logger,
    metrics: AllocatorMetrics,
}
impl<N: MappedMemory> Allocator<N> {
    pub(crate) fn new(builder: AllocatorBuilder, nvm: N) -> Self {
        Allocator {
            state: RwLock::new(State {
                nvm,
                tail: 0,
                capacity: 0,
                closed: false,
            }),
            free_list: Mutex::new(FreeList::new()),
            listeners: RwLock::new(Vec::new()),
            logger: builder.logger,
            metrics: AllocatorMetrics::new(&builder.metrics),
        }
    }

    /// 末尾位置が少なくとも`size`以上であることを保証する.
    ///
    /// 既に末尾位置が`size`以上の場合には何もしない.
    /// そうでない場合には、必要に応じて領域を拡張した上で、末尾位置を`size`に設定する.
    ///
    /// 再起動後に、以前の割当済み領域を`get`で参照可能にするために使われることを想定している.
    ///
    /// 返り値は、領域の拡張が行われたかどうか.
    pub fn ensure_size(&self, size: u64) -> Result<bool> {
        let grew = {
            let mut state = track!(self.write_state())?;
            track!(state.check_open())?;
            if state.tail >= size {
                return Ok(false);
            }
            let grew = track!(self.grow_locked(&mut state, size))?;
            state.tail = size;
            self.metrics.tail_bytes.set(size as f64);
            grew
        };
        if grew {
            self.notify_grow();
        }
        Ok(grew)
    }

    /// `size`バイトの部分領域を割り当てる.
    ///
    /// まずフリーリストから同じサイズの解放済み領域を探し、存在すればそれを返す.
    /// 存在しない場合には、末尾位置から新しい領域を切り出し、必要であれば領域を拡張する.
    ///
    /// 返り値のタプルの二番目の値は、領域の拡張が行われたかどうか.
    ///
    /// # Errors
    ///
    /// - `size`が`0`の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    /// - 拡張に失敗した場合には、末尾位置および容量は変更されずに、そのエラーが返される
    pub fn allocate(&self, size: u64) -> Result<(Section, bool)> {
        track_assert_ne!(size, 0, ErrorKind::InvalidInput);

        let reused = {
            let state = track!(self.read_state())?;
            track!(state.check_open())?;
            let mut free_list = track!(self.lock_free_list())?;
            free_list.acquire(size)
        };
        if let Some(offset) = reused {
            debug!(self.logger, "Reuses a released section"; "offset" => offset, "size" => size);
            self.metrics.count_allocation(size, true);
            return Ok((Section::new(offset, size), false));
        }

        let (section, grew) = {
            let mut state = track!(self.write_state())?;
            track!(state.check_open())?;
            let offset = state.tail;
            let tail = track_assert_some!(
                offset.checked_add(size),
                ErrorKind::InvalidInput,
                "Tail overflow: tail={}, size={}",
                offset,
                size
            );
            let grew = track!(self.grow_locked(&mut state, tail))?;
            state.tail = tail;
            self.metrics.tail_bytes.set(tail as f64);
            (Section::new(offset, size), grew)
        };
        self.metrics.count_allocation(size, false);
        if grew {
            self.notify_grow();
        }
        Ok((section, grew))
    }

    /// 割当済みの部分領域を解放して、以後の`allocate`で再利用可能にする.
    ///
    /// 末尾位置や容量が縮小されることはない.
    ///
    /// # 事前条件
    ///
    /// - `section`は「以前に`allocate`で割り当てられた」かつ「未解放」の部分領域である
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返され、フリーリストは変更されない:
    ///
    /// - `section`のサイズが`0`
    /// - `section`が末尾位置を超えている
    /// - `section`が解放済みの領域と重なっている (e.g., 二重解放)
    ///
    /// なお、末尾位置の範囲内にある未割当の領域(i.e., `ensure_size`で確保された領域)の解放は検出できない.
    pub fn release(&self, section: Section) -> Result<()> {
        track_assert_ne!(section.size, 0, ErrorKind::InvalidInput);
        {
            let state = track!(self.read_state())?;
            track!(state.check_open())?;
            let end = track_assert_some!(section.end(), ErrorKind::InvalidInput);
            track_assert!(
                end <= state.tail,
                ErrorKind::InvalidInput,
                "Out of range: section={:?}, tail={}",
                section,
                state.tail
            );
            track!(self.lock_free_list()?.release(section))?;
        }
        debug!(self.logger, "Released a section"; "offset" => section.offset, "size" => section.size);
        self.metrics.count_release(section.size);
        Ok(())
    }

    /// マップ領域内の`[offset, offset + size)`を読み込むためのビューを返す.
    ///
    /// # Errors
    ///
    /// 範囲が末尾位置を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Deadlock
    ///
    /// ビューは破棄されるまで共有ロックを保持し続ける.
    /// 同じスレッドでビューを保持したまま、排他ロックを要する操作
    /// (`allocate`, `ensure_size`, `grow`, `close`, `get_mut`, `with_bytes_mut`, `copy`)を呼び出すと、
    /// 永久にブロックする.
    ///
    /// 部分領域間のコピーには`copy`を使うこと.
    pub fn get(&self, offset: u64, size: u64) -> Result<SectionView<N>> {
        let state = track!(self.read_state())?;
        let range = track!(state.range(offset, size))?;
        Ok(SectionView::new(state, range))
    }

    /// マップ領域内の`[offset, offset + size)`に書き込むためのビューを返す.
    ///
    /// ビューが破棄されるまでの間、他の全ての操作はブロックされる.
    ///
    /// # Errors
    ///
    /// 範囲が末尾位置を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Deadlock
    ///
    /// ビューは破棄されるまで排他ロックを保持し続ける.
    /// 同じスレッドでビューを保持したまま、このアロケータの(`tail`等の参照系も含む)
    /// いずれかの操作を呼び出すと、永久にブロックする.
    ///
    /// 書き込み範囲がその場で完結する場合には`with_bytes_mut`の方が安全.
    pub fn get_mut(&self, offset: u64, size: u64) -> Result<SectionViewMut<N>> {
        let state = track!(self.write_state())?;
        let range = track!(state.range(offset, size))?;
        Ok(SectionViewMut::new(state, range))
    }

    /// マップ領域内の`[offset, offset + size)`を引数として`f`を呼び出す.
    ///
    /// 排他ロックは`f`の実行中のみ保持される.
    /// `f`の中から、このアロケータの操作を呼び出してはいけない.
    ///
    /// # Errors
    ///
    /// 範囲が末尾位置を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返され、`f`は呼び出されない.
    pub fn with_bytes_mut<F, T>(&self, offset: u64, size: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut [u8]) -> T,
    {
        let mut view = track!(self.get_mut(offset, size))?;
        Ok(f(&mut view[..]))
    }

    /// `src`の内容を`dst`にコピーする.
    ///
    /// 一つの排他ロックの下で行われるので、二つのビューを同時に保持する必要はない.
    /// 二つの部分領域が重なっていても構わない.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `src`と`dst`のサイズが異なる
    /// - いずれかの部分領域が末尾位置を超えている
    pub fn copy(&self, src: Section, dst: Section) -> Result<()> {
        track_assert_eq!(src.size, dst.size, ErrorKind::InvalidInput);
        let mut state = track!(self.write_state())?;
        let src = track!(state.range(src.offset, src.size))?;
        let dst = track!(state.range(dst.offset, dst.size))?;
        state.nvm.as_bytes_mut().copy_within(src, dst.start);
        Ok(())
    }

    /// 容量が`size`を超えるように、領域を拡張する.
    ///
    /// 既に容量が`size`を超えている場合には何もしない.
    ///
    /// 拡張が行われた場合には、登録済みの全てのリスナーが、登録順に一度ずつ呼び出される.
    ///
    /// 返り値は、領域の拡張が行われたかどうか.
    pub fn grow(&self, size: u64) -> Result<bool> {
        let grew = {
            let mut state = track!(self.write_state())?;
            track!(state.check_open())?;
            track!(self.grow_locked(&mut state, size))?
        };
        if grew {
            self.notify_grow();
        }
        Ok(grew)
    }

    /// 領域の拡張の度に呼び出されるリスナーを登録する.
    ///
    /// 登録したリスナーを解除する手段は提供されていない.
    /// 途中で通知が不要になった場合には、リスナー側でフラグ等を確認すること.
    pub fn on_grow<F>(&self, f: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        track!(track!(self.read_state())?.check_open())?;
        let mut listeners = track!(self.listeners.write().map_err(Error::from))?;
        listeners.push(Box::new(f));
        Ok(())
    }

    /// アロケータをクローズする.
    ///
    /// マップ領域の内容を物理デバイスに同期した上で、マップを解除し、永続化層のハンドルを閉じる.
    ///
    /// 途中の処理が失敗した場合でも、後続の処理は続行される.
    /// 複数の処理が失敗した場合には、`MultipleErrors`を原因とするエラーが返される.
    ///
    /// クローズ後の操作は(二度目の`close`も含めて)全て`ErrorKind::Closed`で失敗する.
    pub fn close(&self) -> Result<()> {
        let mut state = track!(self.write_state())?;
        track!(state.check_open())?;
        state.closed = true;

        let errors = state.release_nvm();
        for e in &errors {
            error!(self.logger, "Close failure: {}", e);
        }
        info!(self.logger, "Allocator closed";
              "tail" => state.tail, "capacity" => state.capacity, "failures" => errors.len());
        MultipleErrors::into_result(errors)
    }

    /// 現在の末尾位置を返す.
    pub fn tail(&self) -> u64 {
        self.inspect_state().tail
    }

    /// 現在の容量を返す.
    ///
    /// 一度も拡張が行われていない場合には`0`となる.
    pub fn capacity(&self) -> u64 {
        self.inspect_state().capacity
    }

    /// クローズ済みかどうかを返す.
    pub fn is_closed(&self) -> bool {
        self.inspect_state().closed
    }

    /// フリーリスト内の部分領域の数を返す.
    pub fn free_list_len(&self) -> usize {
        self.free_list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &AllocatorMetrics {
        &self.metrics
    }

    fn grow_locked(&self, state: &mut State<N>, size: u64) -> Result<bool> {
        let capacity = match track!(state.next_capacity(size)) {
            Ok(None) => return Ok(false),
            Ok(Some(capacity)) => capacity,
            Err(e) => {
                self.metrics.grow_failures.increment();
                error!(self.logger, "Cannot decide the new capacity: {}", e; "size" => size);
                return Err(e);
            }
        };
        if let Err(e) = track!(self.remap(state, capacity)) {
            self.metrics.grow_failures.increment();
            error!(self.logger, "Cannot grow the backing store: {}", e;
                   "from" => state.capacity, "to" => capacity);
            return Err(e);
        }

        info!(self.logger, "Backing store grew"; "from" => state.capacity, "to" => capacity);
        state.capacity = capacity;
        self.metrics.grows.increment();
        self.metrics.capacity_bytes.set(capacity as f64);
        Ok(true)
    }

    fn remap(&self, state: &mut State<N>, capacity: u64) -> Result<()> {
        let previous_len = track!(state.nvm.stat_len())?;
        track!(state.nvm.unmap())?;
        let result = track!(state.nvm.truncate(capacity)).and_then(|()| track!(state.nvm.map()));
        if result.is_err() {
            // 拡張前のサイズに戻し、既にマップ済みだった場合には再マップする
            let was_mapped = state.capacity > 0;
            let restored = track!(state.nvm.unmap())
                .and_then(|()| track!(state.nvm.stat_len()))
                .and_then(|len| {
                    if len != previous_len {
                        track!(state.nvm.truncate(previous_len))?;
                    }
                    if was_mapped {
                        track!(state.nvm.map())?;
                    }
                    Ok(())
                });
            if let Err(e) = restored {
                warn!(self.logger, "Cannot restore the previous mapping: {}", e;
                      "size" => previous_len);
            }
        }
        result
    }

    fn notify_grow(&self) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener();
        }
    }

    fn read_state(&self) -> Result<RwLockReadGuard<State<N>>> {
        self.state.read().map_err(|e| track!(Error::from(e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<State<N>>> {
        self.state.write().map_err(|e| track!(Error::from(e)))
    }

    fn inspect_state(&self) -> RwLockReadGuard<State<N>> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_free_list(&self) -> Result<MutexGuard<FreeList>> {
        self.free_list.lock().map_err(|e| track!(Error::from(e)))
    }
}
impl<N: MappedMemory> fmt::Debug for Allocator<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let listeners = self
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or_else(|e| e.into_inner().len());
        f.debug_struct("Allocator")
            .field("free_list", &self.free_list)
            .field("listeners", &listeners)
            .field("metrics", &self.metrics)
            .finish()
    }
}
impl<N: MappedMemory> Drop for Allocator<N> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(e) => e.into_inner(),
        };
        if state.closed {
            return;
        }
        state.closed = true;
        for e in state.release_nvm() {
            warn!(self.logger, "Failure while dropping an unclosed allocator: {}", e);
        }
    }
}

pub(crate) struct State<N> {
    nvm: N,
    tail: u64,
    capacity: u64,
    closed: bool,
}
impl<N: MappedMemory> State<N> {
    fn check_open(&self) -> Result<()> {
        track_assert!(!self.closed, ErrorKind::Closed);
        Ok(())
    }

    fn range(&self, offset: u64, size: u64) -> Result<Range<usize>> {
        track!(self.check_open())?;
        let end = track_assert_some!(offset.checked_add(size), ErrorKind::InvalidInput);
        track_assert!(
            end <= self.tail,
            ErrorKind::InvalidInput,
            "Out of range: offset={}, size={}, tail={}",
            offset,
            size,
            self.tail
        );
        track_assert!(
            size == 0 || (self.nvm.is_mapped() && end <= self.nvm.as_bytes().len() as u64),
            ErrorKind::InconsistentState,
            "Not mapped: offset={}, size={}, mapped={}",
            offset,
            size,
            self.nvm.as_bytes().len()
        );
        Ok(offset as usize..end as usize)
    }

    // 容量が`size`を超えていれば`None`を返す.
    fn next_capacity(&self, size: u64) -> Result<Option<u64>> {
        if self.capacity > size {
            return Ok(None);
        }
        let mut capacity = self.capacity;
        if capacity == 0 {
            capacity = track!(self.nvm.stat_len())?;
            if capacity == 0 {
                capacity = size;
            }
            if capacity == 0 {
                return Ok(None);
            }
        }
        while capacity <= size {
            capacity = track_assert_some!(
                capacity.checked_mul(2),
                ErrorKind::InvalidInput,
                "Capacity overflow: size={}",
                size
            );
        }
        Ok(Some(capacity))
    }

    // flush, unmap, closeを順に実行し、失敗したもの全てを返す.
    fn release_nvm(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();
        if let Err(e) = track!(self.nvm.flush()) {
            errors.push(e);
        }
        if let Err(e) = track!(self.nvm.unmap()) {
            errors.push(e);
        }
        if let Err(e) = track!(self.nvm.close()) {
            errors.push(e);
        }
        errors
    }
}
