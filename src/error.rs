use std::fmt;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::InconsistentState.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// アロケータが既にクローズされている.
    ///
    /// `Allocator::close()`の後に呼び出された操作は、
    /// (二度目の`close()`も含めて)全てこのエラーとなる.
    ///
    /// # 典型的な対応策
    ///
    /// - 新しいアロケータを作り直す
    Closed,

    /// 入力が不正.
    ///
    /// 範囲外の`get`、サイズ`0`の割当、二重解放、容量のオーバーフロー等.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., stat/truncate/map/unmap/flush時のI/Oエラー
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側で（指数バックオフ等を挟みつつ）何度かリトライ
    ///   - それでもダメなら、致命的な異常が発生していると判断
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}

/// 複数の失敗をまとめたエラー.
///
/// クローズ処理のように、途中で失敗しても後続の処理を続行する操作において、
/// 発生した全てのエラーを利用者に伝えるために使用される.
#[derive(Debug, Clone)]
pub struct MultipleErrors(Vec<Error>);
impl MultipleErrors {
    /// 発生したエラー群を、発生順に返す.
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    /// `errors`を一つの`Result`にまとめる.
    ///
    /// エラーが一つだけの場合はそれ自体を、二つ以上の場合は`MultipleErrors`を原因とするエラーを返す.
    pub(crate) fn into_result(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ErrorKind::Other.cause(MultipleErrors(errors)).into()),
        }
    }
}
impl fmt::Display for MultipleErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} errors occurred", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            write!(f, "; [{}] {}", i, e)?;
        }
        Ok(())
    }
}
impl std::error::Error for MultipleErrors {}
