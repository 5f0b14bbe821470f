//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// [`Allocator`]のメトリクス.
///
/// [`Allocator`]: ../allocator/struct.Allocator.html
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) allocated_sections: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) reused_sections: Counter,
    pub(crate) released_sections: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) grows: Counter,
    pub(crate) grow_failures: Counter,
    pub(crate) capacity_bytes: Gauge,
    pub(crate) tail_bytes: Gauge,
}
impl AllocatorMetrics {
    /// 部分領域の割当回数.
    ///
    /// フリーリストから再利用された割当も含む.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_allocated_sections_total <COUNTER>
    /// ```
    pub fn allocated_sections(&self) -> u64 {
        self.allocated_sections.value() as u64
    }

    /// これまでに割り当てた部分領域のバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// フリーリストから再利用された部分領域の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_reused_sections_total <COUNTER>
    /// ```
    pub fn reused_sections(&self) -> u64 {
        self.reused_sections.value() as u64
    }

    /// 部分領域の解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_released_sections_total <COUNTER>
    /// ```
    pub fn released_sections(&self) -> u64 {
        self.released_sections.value() as u64
    }

    /// これまでに解放された部分領域のバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// フリーリストの長さ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_released_sections_total - mmap_allocator_allocator_reused_sections_total
    /// ```
    pub fn free_list_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.reused_sections();
        let inc = self.released_sections();
        (inc - dec) as usize
    }

    /// 使用中の部分領域のバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_allocated_bytes_total - mmap_allocator_allocator_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// 領域の拡張回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_grows_total <COUNTER>
    /// ```
    pub fn grows(&self) -> u64 {
        self.grows.value() as u64
    }

    /// 領域の拡張に失敗した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_grow_failures_total <COUNTER>
    /// ```
    pub fn grow_failures(&self) -> u64 {
        self.grow_failures.value() as u64
    }

    /// 現在の容量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// 現在の末尾位置.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mmap_allocator_allocator_tail_bytes <GAUGE>
    /// ```
    pub fn tail_bytes(&self) -> u64 {
        self.tail_bytes.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("mmap_allocator").subsystem("allocator");
        AllocatorMetrics {
            allocated_sections: builder
                .counter("allocated_sections_total")
                .help("Number of allocated sections")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            reused_sections: builder
                .counter("reused_sections_total")
                .help("Number of sections taken from the free list")
                .finish()
                .expect("Never fails"),
            released_sections: builder
                .counter("released_sections_total")
                .help("Number of released sections")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            grows: builder
                .counter("grows_total")
                .help("Number of times the backing store was grown")
                .finish()
                .expect("Never fails"),
            grow_failures: builder
                .counter("grow_failures_total")
                .help("Number of failed attempts to grow the backing store")
                .finish()
                .expect("Never fails"),
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Size of the backing store")
                .finish()
                .expect("Never fails"),
            tail_bytes: builder
                .gauge("tail_bytes")
                .help("End offset of all space ever claimed")
                .finish()
                .expect("Never fails"),
        }
    }

    pub(crate) fn count_allocation(&self, size: u64, reused: bool) {
        self.allocated_sections.increment();
        self.allocated_bytes.add_u64(size);
        if reused {
            self.reused_sections.increment();
        }
    }

    pub(crate) fn count_release(&self, size: u64) {
        self.released_sections.increment();
        self.released_bytes.add_u64(size);
    }
}
