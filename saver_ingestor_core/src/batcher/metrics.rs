use saver_observability::{Counter, UpDownCounter};

pub struct BatcherMetrics {
    pub active_batches: UpDownCounter<i64>,
    pub flushed_batches: Counter<u64>,
    pub flushed_events: Counter<u64>,
}

impl Default for BatcherMetrics {
    fn default() -> Self {
        let meter = saver_observability::meter("batcher");
        Self {
            active_batches: meter
                .i64_up_down_counter("saver.batcher.active_batches")
                .with_unit("{batch}")
                .with_description("groups with a live batch")
                .build(),
            flushed_batches: meter
                .u64_counter("saver.batcher.flushed_batches")
                .with_unit("{batch}")
                .with_description("batches flushed, by reason")
                .build(),
            flushed_events: meter
                .u64_counter("saver.batcher.flushed_events")
                .with_unit("{event}")
                .with_description("events flushed, by reason")
                .build(),
        }
    }
}
