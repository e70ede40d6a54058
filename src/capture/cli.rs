// SPDX-License-Identifier: BSD-3-Clause-LBNL
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::capture::pcap::{decode_pcap, CaptureOptions, CaptureReport};
use crate::config::{Config, OutputFormat};
use crate::errors::{Error, Result};
use crate::metrics;
use crate::rsi::{Dissection, FrameInfo, RsiDissector};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode the RSI PDUs carried in a pcap file.
    Pcap(PcapArgs),
    /// Decode one hex encoded RSI PDU.
    Hex(HexArgs),
}

impl Command {
    pub fn run(&self, config: &Config) -> Result<()> {
        match self {
            Command::Pcap(args) => args.run(config),
            Command::Hex(args) => args.run(config),
        }
    }
}

#[derive(Args, Debug)]
pub struct PcapArgs {
    /// Capture file in the classic pcap format.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Every PDU starts with the security envelope.
    #[arg(long)]
    pub secured: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Include the decoded field tree of every PDU.
    #[arg(long)]
    pub tree: bool,

    /// Print the decoder metrics after the report.
    #[arg(long)]
    pub metrics: bool,
}

impl PcapArgs {
    fn run(&self, config: &Config) -> Result<()> {
        metrics::init_metrics();

        let mut options = CaptureOptions::from_config(config);
        options.decoder.secured |= self.secured;
        options.show_tree |= self.tree;
        let format = output_format(config, self.json);

        let report: CaptureReport = decode_pcap(&self.file, &options)?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => println!("{report}"),
        }

        if self.metrics {
            print!("{}", metrics::gather_text()?);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct HexArgs {
    /// PDU bytes as hex, whitespace and a leading 0x are ignored.
    #[arg(value_name = "HEX")]
    pub hex: String,

    /// The PDU starts with the security envelope.
    #[arg(long)]
    pub secured: bool,

    /// Print the decoded PDU as JSON.
    #[arg(long)]
    pub json: bool,
}

impl HexArgs {
    fn run(&self, config: &Config) -> Result<()> {
        let bytes = parse_hex(&self.hex)?;
        debug!("decoding {} bytes", bytes.len());

        let mut dissector = RsiDissector::with_config(&config.decoder);
        let frame = FrameInfo::new(1);
        let dissection = if self.secured || config.decoder.secured {
            dissector.dissect_with_security(&frame, &bytes, 0)
        } else {
            dissector.dissect(&frame, &bytes, 0)
        };

        match output_format(config, self.json) {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dissection)?),
            OutputFormat::Text => print!("{}", render(&dissection)),
        }
        Ok(())
    }
}

fn output_format(config: &Config, json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        config.output.format
    }
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.split_whitespace().collect();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);
    if cleaned.is_empty() {
        return Err(Error::Usage("no PDU bytes given".to_string()));
    }
    Ok(hex::decode(cleaned)?)
}

fn render(dissection: &Dissection) -> String {
    let mut out = format!(
        "{} {} ({} bytes)\n",
        dissection.protocol, dissection.info, dissection.end_offset
    );
    for note in &dissection.notes {
        out.push_str(&format!(
            "{:?} at {}: {}\n",
            note.severity, note.offset, note.message
        ));
    }
    out.push_str(&dissection.tree.to_string());
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x0001 ff").unwrap(), vec![0x00, 0x01, 0xff]);
        assert!(matches!(parse_hex("  "), Err(Error::Usage(_))));
        assert!(matches!(parse_hex("abc"), Err(Error::Hex(_))));
    }

    #[test]
    fn test_render_ack() {
        let mut dissector = RsiDissector::new();
        let ack = parse_hex("1234 0001 13 00 0001 0000 0000").unwrap();
        let text = render(&dissector.dissect(&FrameInfo::new(1), &ack, 0));
        assert!(text.starts_with("PNIO-RSI ACK-RTA (12 bytes)\n"));
        assert!(text.contains("PROFINET IO RSI\n"));
        assert!(text.contains("    AddFlags"));
    }
}
