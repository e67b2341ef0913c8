//! ---
//! rig_section: "03-logging"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Structured logging adapters and sinks."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---

/// Shared expansion for the leveled macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! __rig_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            script = ctx.script.unwrap_or(""),
            test = ctx.test.unwrap_or(""),
            user = ctx.user.unwrap_or(""),
            entity = ctx.entity.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with harness context.
#[macro_export]
macro_rules! rig_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with harness context.
#[macro_export]
macro_rules! rig_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with harness context.
#[macro_export]
macro_rules! rig_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with harness context.
#[macro_export]
macro_rules! rig_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__rig_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
