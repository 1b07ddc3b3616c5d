mod framing;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rtp_h264::media::h264::{annexb, depacketizer::DEFAULT_MAX_FRAGMENT_BYTES};
use rtp_h264::media::h264::packetizer::DEFAULT_MTU;
use rtp_h264::{DepacketizerConfig, Extracted, H264Depacketizer, H264Packetizer, RtpPacket};
use tracing_subscriber::EnvFilter;

use crate::framing::{FrameReader, write_frame};

/// H.264 video clock rate.
const CLOCK_RATE: u32 = 90_000;

#[derive(Parser)]
#[command(
    name = "rtp-h264",
    about = "Convert between RFC 4571 framed RTP/H.264 and Annex B byte streams"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reassemble NAL units from RTP packets and write them as Annex B
    Depacketize {
        /// Framed RTP input, `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: PathBuf,
        /// Annex B output, `-` for stdout
        #[arg(long, short, default_value = "-")]
        output: PathBuf,
        /// Only keep packets from this SSRC (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32)]
        ssrc: Option<u32>,
        /// Largest NAL unit accepted from fragments, 0 for no limit
        #[arg(long, default_value_t = DEFAULT_MAX_FRAGMENT_BYTES)]
        max_fragment_bytes: usize,
        /// Abandon a fragment run when a sequence number is skipped
        #[arg(long)]
        drop_on_gap: bool,
    },
    /// Split an Annex B stream into RTP packets
    Packetize {
        /// Annex B input, `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: PathBuf,
        /// Framed RTP output, `-` for stdout
        #[arg(long, short, default_value = "-")]
        output: PathBuf,
        /// Largest RTP payload in bytes
        #[arg(long, default_value_t = DEFAULT_MTU)]
        mtu: usize,
        /// RTP payload type
        #[arg(long, default_value_t = 96)]
        payload_type: u8,
        /// SSRC to stamp on packets, random if omitted
        #[arg(long, value_parser = parse_u32)]
        ssrc: Option<u32>,
        /// Frame rate used to advance the 90 kHz timestamp
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Combine small NAL units into STAP-A packets
        #[arg(long)]
        aggregate: bool,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid value {s:?}: {e}"))
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &Path) -> anyhow::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

#[derive(Debug, Default)]
struct DepacketizeStats {
    packets: u64,
    skipped_ssrc: u64,
    rejected: u64,
    nal_units: u64,
    bytes: u64,
}

/// Feed framed RTP packets through one depacketizer per SSRC, writing every
/// completed NAL unit as Annex B.
fn depacketize<R: Read, W: Write>(
    input: R,
    output: &mut W,
    ssrc_filter: Option<u32>,
    config: DepacketizerConfig,
) -> anyhow::Result<DepacketizeStats> {
    let mut streams: HashMap<u32, H264Depacketizer> = HashMap::new();
    let mut stats = DepacketizeStats::default();
    let mut annexb_buf = Vec::new();

    for frame in FrameReader::new(input) {
        let frame = frame.context("reading framed RTP input")?;
        stats.packets += 1;

        let packet = match RtpPacket::parse(&frame) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(packet = stats.packets, "skipping packet: {}", e);
                stats.rejected += 1;
                continue;
            }
        };
        if ssrc_filter.is_some_and(|want| want != packet.ssrc) {
            stats.skipped_ssrc += 1;
            continue;
        }

        let depacketizer = streams.entry(packet.ssrc).or_insert_with(|| {
            tracing::info!(ssrc = format_args!("{:#010x}", packet.ssrc), "new stream");
            H264Depacketizer::with_config(config)
        });
        let nals = match depacketizer.extract_packet(&packet) {
            Ok(Extracted::Nothing) => continue,
            Ok(out) => out.into_nal_units(),
            Err(e) => {
                tracing::warn!(
                    ssrc = format_args!("{:#010x}", packet.ssrc),
                    seq = packet.sequence_number,
                    "skipping packet: {}",
                    e
                );
                stats.rejected += 1;
                continue;
            }
        };

        annexb_buf.clear();
        for nal in &nals {
            tracing::trace!(nal_type = nal.nal_type(), len = nal.len(), "NAL unit");
            annexb::append_nal_unit(&mut annexb_buf, nal.as_bytes());
        }
        output
            .write_all(&annexb_buf)
            .context("writing Annex B output")?;
        stats.nal_units += nals.len() as u64;
        stats.bytes += annexb_buf.len() as u64;
    }

    for (ssrc, depacketizer) in &streams {
        if depacketizer.has_pending_fragments() {
            tracing::warn!(
                ssrc = format_args!("{:#010x}", ssrc),
                "input ended inside a fragmented NAL unit"
            );
        }
    }
    output.flush().context("flushing Annex B output")?;
    Ok(stats)
}

fn write_access_unit<W: Write>(
    nals: &[&[u8]],
    output: &mut W,
    packetizer: &mut H264Packetizer,
    stats: &mut PacketizeStats,
) -> anyhow::Result<()> {
    for packet in packetizer.packetize_frame(nals) {
        write_frame(output, &packet).context("writing framed RTP output")?;
        stats.packets += 1;
    }
    stats.frames += 1;
    Ok(())
}

#[derive(Debug, Default)]
struct PacketizeStats {
    frames: u64,
    nal_units: u64,
    packets: u64,
}

/// A NAL type that carries a coded slice, which closes an access unit.
fn is_vcl(nal: &[u8]) -> bool {
    nal.first().is_some_and(|b| (1..=5).contains(&(b & 0x1F)))
}

/// Group Annex B NAL units into access units, packetize each one and write
/// the packets with RFC 4571 framing.
fn packetize<W: Write>(
    annexb_data: &[u8],
    output: &mut W,
    packetizer: &mut H264Packetizer,
    timestamp_increment: u32,
) -> anyhow::Result<PacketizeStats> {
    let mut stats = PacketizeStats::default();
    let nals = annexb::split_nal_units(annexb_data);
    stats.nal_units = nals.len() as u64;

    let mut frame: Vec<&[u8]> = Vec::new();
    for nal in nals {
        frame.push(nal);
        if is_vcl(nal) {
            write_access_unit(&frame, output, packetizer, &mut stats)?;
            packetizer.advance_timestamp(timestamp_increment);
            frame.clear();
        }
    }
    if !frame.is_empty() {
        write_access_unit(&frame, output, packetizer, &mut stats)?;
        packetizer.advance_timestamp(timestamp_increment);
    }

    output.flush().context("flushing framed RTP output")?;
    Ok(stats)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Depacketize {
            input,
            output,
            ssrc,
            max_fragment_bytes,
            drop_on_gap,
        } => {
            let config = DepacketizerConfig {
                max_fragment_bytes: (max_fragment_bytes != 0).then_some(max_fragment_bytes),
                drop_run_on_sequence_gap: drop_on_gap,
            };
            let reader = open_input(&input)?;
            let mut writer = open_output(&output)?;
            let stats = depacketize(reader, &mut writer, ssrc, config)?;
            tracing::info!(
                packets = stats.packets,
                rejected = stats.rejected,
                skipped_ssrc = stats.skipped_ssrc,
                nal_units = stats.nal_units,
                bytes = stats.bytes,
                "depacketize finished"
            );
        }
        Command::Packetize {
            input,
            output,
            mtu,
            payload_type,
            ssrc,
            fps,
            aggregate,
        } => {
            anyhow::ensure!(fps > 0, "--fps must be greater than zero");
            let mut data = Vec::new();
            open_input(&input)?
                .read_to_end(&mut data)
                .with_context(|| format!("reading {}", input.display()))?;

            let packetizer = match ssrc {
                Some(ssrc) => H264Packetizer::new(payload_type, ssrc),
                None => H264Packetizer::with_random_ssrc(payload_type),
            };
            let mut packetizer = packetizer.with_mtu(mtu).with_aggregation(aggregate);
            tracing::info!(
                ssrc = format_args!("{:#010x}", packetizer.ssrc()),
                mtu = packetizer.mtu(),
                "packetizing"
            );

            let mut writer = open_output(&output)?;
            let stats = packetize(&data, &mut writer, &mut packetizer, CLOCK_RATE / fps)?;
            tracing::info!(
                frames = stats.frames,
                nal_units = stats.nal_units,
                packets = stats.packets,
                "packetize finished"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(header: u8, len: usize) -> Vec<u8> {
        let mut v = vec![header];
        v.extend((0..len).map(|i| (i as u8) | 0x01));
        v
    }

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_u32("42"), Ok(42));
        assert_eq!(parse_u32("0xdeadBEEF"), Ok(0xDEAD_BEEF));
        assert!(parse_u32("0xzz").is_err());
        assert!(parse_u32("-1").is_err());
    }

    #[test]
    fn annexb_survives_packetize_and_depacketize() {
        let nals = vec![nal(0x67, 10), nal(0x68, 4), nal(0x65, 5000), nal(0x41, 900)];
        let stream = annexb::join_nal_units(&nals);

        let mut framed = Vec::new();
        let mut packetizer = H264Packetizer::new(96, 0x1234).with_mtu(1000);
        let pstats = packetize(&stream, &mut framed, &mut packetizer, 3000).unwrap();
        assert_eq!(pstats.frames, 2);
        assert_eq!(pstats.nal_units, 4);

        let mut out = Vec::new();
        let dstats =
            depacketize(&framed[..], &mut out, None, DepacketizerConfig::default()).unwrap();
        assert_eq!(dstats.packets, pstats.packets);
        assert_eq!(dstats.rejected, 0);
        assert_eq!(dstats.nal_units, 4);
        assert_eq!(out, stream);
    }

    #[test]
    fn filters_by_ssrc_and_skips_garbage() {
        let wanted = nal(0x65, 20);
        let other = nal(0x41, 20);

        let mut framed = Vec::new();
        write_frame(&mut framed, &[0x40, 0x60, 0, 1]).unwrap();
        let mut a = H264Packetizer::new(96, 1);
        let mut b = H264Packetizer::new(96, 2);
        packetize(&annexb::join_nal_units([&other]), &mut framed, &mut b, 3000).unwrap();
        packetize(&annexb::join_nal_units([&wanted]), &mut framed, &mut a, 3000).unwrap();

        let mut out = Vec::new();
        let stats =
            depacketize(&framed[..], &mut out, Some(1), DepacketizerConfig::default()).unwrap();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.skipped_ssrc, 1);
        assert_eq!(out, annexb::join_nal_units([&wanted]));
    }

    #[test]
    fn trailing_parameter_sets_form_a_frame() {
        let stream = annexb::join_nal_units([nal(0x65, 8), nal(0x67, 4)]);
        let mut framed = Vec::new();
        let mut packetizer = H264Packetizer::new(96, 9);
        let stats = packetize(&stream, &mut framed, &mut packetizer, 3000).unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.packets, 2);
    }
}
