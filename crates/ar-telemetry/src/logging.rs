//! Structured logging helpers.
//!
//! Every line carries a `component` field (`storage`, `manager`,
//! `delivery`, `simulator`) so JSON logs can be filtered per stage.

#[doc(hidden)]
pub use tracing as __tracing;

/// Structured log entry with a component field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::$level!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a source-related event with standard fields.
#[macro_export]
macro_rules! log_source_event {
    ($level:ident, $msg:expr, $source_event_id:expr, $reporting_origin:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::$level!(
            component = "source",
            source_event_id = $source_event_id,
            reporting_origin = %$reporting_origin,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a trigger-related event with standard fields.
#[macro_export]
macro_rules! log_trigger_event {
    ($level:ident, $msg:expr, $destination:expr, $reporting_origin:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::$level!(
            component = "trigger",
            destination = %$destination,
            reporting_origin = %$reporting_origin,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a report-related event with standard fields.
#[macro_export]
macro_rules! log_report_event {
    ($level:ident, $msg:expr, $report_id:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::$level!(
            component = "report",
            report_id = %$report_id,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::init_test_tracing;

    #[test]
    fn test_macros_expand() {
        init_test_tracing();
        let origin = "https://ads.example";
        crate::log_event!(info, "simulator", "event handled", time = 42u64);
        crate::log_event!(warn, "simulator", "no fields");
        crate::log_source_event!(debug, "source stored", 7u64, origin, status = "success");
        crate::log_trigger_event!(info, "trigger handled", "https://shop.example", origin);
        crate::log_report_event!(warn, "report dropped", "1234", attempts = 3u32);
    }
}
