//! Section

/// アロケータが払い出す、連続した部分領域を示すための構造体.
///
/// オフセットはマップ領域の先頭からの絶対位置(バイト単位).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Section {
    /// 部分領域の開始位置（バイト単位）
    pub offset: u64,

    /// 部分領域の長さ（バイト単位）
    pub size: u64,
}
impl Section {
    /// 新しい`Section`インスタンスを生成する.
    pub fn new(offset: u64, size: u64) -> Self {
        Section { offset, size }
    }

    /// 部分領域の終端位置を返す.
    /// **注意**: Sectionは [offset, end) の領域を用いるため、
    /// end部は領域に含まれない。
    ///
    /// 終端位置が`u64`の範囲に収まらない場合には`None`が返される.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// 二つの部分領域が重なっているかどうかを判定する.
    pub fn overlaps(&self, other: &Section) -> bool {
        self.offset < other.offset.saturating_add(other.size)
            && other.offset < self.offset.saturating_add(self.size)
    }
}
