//! Zero-cost-when-off lifecycle tracing.
//!
//! The per-class/per-cache/per-epoch stat counters are plain, unconditional
//! `AtomicU64`s updated at their call sites (see `size_class.rs`); the only
//! build-time toggle over the stats surface is `config::ENABLE_DIAGNOSTIC_COUNTERS`,
//! which gates the `committed_bytes`/`live_bytes` *computation* in
//! `SizeClass::snapshot`, not counter maintenance. `trace_lifecycle!` is a
//! `println!`-under-`cfg(feature = "debug")` idiom, built on a variadic
//! `format!`.

/// Traces a lifecycle transition (mint, publish, cache push/pop, epoch
/// advance/close, zombie repair) when the `debug` feature is enabled.
/// Compiles to nothing otherwise.
#[macro_export]
macro_rules! trace_lifecycle {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug")]
        {
            ::std::eprintln!("[slabrt] {}", ::std::format!($($arg)*));
        }
    };
}
