// SPDX-License-Identifier: BSD-3-Clause-LBNL
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;
pub mod metrics;
pub mod rsi;

pub use rsi::{Address, Dissection, FrameInfo, RsiDissector, SegmentStatus};
