use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use super::Allocator;
use crate::nvm::MappedMemory;

/// `Allocator`のビルダ.
#[derive(Debug, Clone)]
pub struct AllocatorBuilder {
    pub(crate) metrics: MetricBuilder,
    pub(crate) logger: Logger,
}
impl AllocatorBuilder {
    /// デフォルト設定で`AllocatorBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        AllocatorBuilder {
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// アロケータ用の logger を登録する
    ///
    /// デフォルトでは、ログは全て破棄される.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// `nvm`を永続化層として使用する`Allocator`を生成する.
    ///
    /// この時点ではマップは行われず、最初の拡張(e.g., `allocate`や`ensure_size`の呼び出し)時に
    /// `nvm`の既存サイズを元に容量が決定される.
    pub fn finish<N>(&self, nvm: N) -> Allocator<N>
    where
        N: MappedMemory,
    {
        Allocator::new(self.clone(), nvm)
    }
}
impl Default for AllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
