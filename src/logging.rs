//! Logging macros
//!
//! Library code logs through these so it builds the same way for the board and
//! for host tests:
//! - `stm32` feature: forwards to `defmt`
//! - host tests: prints to stdout / stderr
//! - anything else: arguments are type-checked and dropped

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "stm32"), test))]
        println!("[INFO] {}", format!($($arg)*));

        #[cfg(all(not(feature = "stm32"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "stm32"), test))]
        println!("[WARN] {}", format!($($arg)*));

        #[cfg(all(not(feature = "stm32"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "stm32"), test))]
        eprintln!("[ERROR] {}", format!($($arg)*));

        #[cfg(all(not(feature = "stm32"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "stm32"), test))]
        println!("[DEBUG] {}", format!($($arg)*));

        #[cfg(all(not(feature = "stm32"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
