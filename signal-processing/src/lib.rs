#![cfg_attr(not(test), no_std)]

//! Integer streaming building blocks: ring windows, running sums, composable filters,
//! decimation, median smoothing, heart rate and rate conversion.

#[macro_use]
extern crate logger;

pub mod filter;
pub mod heart_rate;
pub mod lerp;
pub mod moving;
pub mod sliding;
