mod event;
mod series;

pub use event::{EventRecord, MalformedRecord, SubjectRef, SubjectStatus, UsageEvent};
pub use series::{
    Bucket, QuotaState, RankedView, Resolution, SeriesEntry, TimeWindow, TrendResult, UsageTotals,
};
