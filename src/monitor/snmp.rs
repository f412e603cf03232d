//! Supplementary association counters from the kernel's SCTP MIB.
//!
//! `/proc/net/sctp/snmp` is a keyed text table maintained by the kernel. It
//! is read-only, optional and may simply not exist (no SCTP module loaded,
//! non-Linux kernel); callers treat a read failure as "omit that section".

use std::io;

pub const PROC_SCTP_SNMP: &str = "/proc/net/sctp/snmp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SctpMib {
    pub current_established: u64,
    pub aborted: u64,
    pub out_of_blues: u64,
    pub packets_received: u64,
    pub packet_discards: u64,
    pub data_chunk_discards: u64,
}

impl SctpMib {
    /// Extracts the counters of interest; unknown keys and malformed lines
    /// are ignored, missing keys stay zero.
    pub fn parse(text: &str) -> Self {
        let mut mib = Self::default();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(value) = value.parse::<u64>() else {
                continue;
            };
            match key {
                "SctpCurrEstab" => mib.current_established = value,
                "SctpAborteds" => mib.aborted = value,
                "SctpOutOfBlues" => mib.out_of_blues = value,
                "SctpInSCTPPacks" => mib.packets_received = value,
                "SctpInPktDiscards" => mib.packet_discards = value,
                "SctpInDataChunkDiscards" => mib.data_chunk_discards = value,
                _ => {}
            }
        }
        mib
    }

    pub fn read() -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(PROC_SCTP_SNMP)?))
    }
}
