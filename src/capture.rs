// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Offline frame driver for the RSI decoder: pcap input and the `pnrsi` sub-commands.
pub mod cli;
pub mod pcap;
