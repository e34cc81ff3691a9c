// Domain models

mod analytics;
mod page;
mod rollup;
mod sample;

pub use analytics::{AnalyticsSummary, ComponentSummary};
pub use page::{
    DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, FindOptions, Page, PageOptions, SortDirection, SortKey,
    parse_fields, parse_sort,
};
pub use rollup::{
    Aggregates, HourlyRollup, MS_PER_HOUR, RollupPayload, hour_bucket_ms, normalize_hour,
};
pub use sample::{
    ComponentInfo, ComponentType, HealthStatus, MetricSample, SampleMetric, SampleSource,
    SeriesPoint,
};
