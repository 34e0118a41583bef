#![no_std]

//! Logging macros shared by the workspace crates.
//!
//! The calling crate decides where messages go by enabling its own `log` or `defmt` feature
//! (which must forward to the same feature of this crate). With neither enabled the macros
//! expand to nothing, but their arguments are still type-checked so a backend can be switched
//! on without surprises.

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:ident, $($args:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::$level!($($args)*);
        #[cfg(feature = "log")]
        ::log::$level!($($args)*);
        #[cfg(not(any(feature = "defmt", feature = "log")))]
        let _ = || {
            let _ = ::core::format_args!($($args)*);
        };
    }};
}

#[macro_export]
macro_rules! trace {
    ($($args:tt)*) => {
        $crate::__log!(trace, $($args)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)*) => {
        $crate::__log!(debug, $($args)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        $crate::__log!(info, $($args)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)*) => {
        $crate::__log!(warn, $($args)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        $crate::__log!(error, $($args)*)
    };
}
