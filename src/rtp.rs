//! Minimal view of the fixed 12-byte RTP header carried by the video payload.
//!
//! The bridge treats the payload as opaque except for the sequence number,
//! which drives the loss accounting on the receiver side. Extensions, CSRC
//! lists and padding are left untouched.

pub const RTP_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    /// Parses the fixed header prefix; `None` when the buffer is too short to
    /// be an RTP packet.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return None;
        }
        Some(Self {
            version: buf[0] >> 6,
            padding: buf[0] & 0x20 != 0,
            extension: buf[0] & 0x10 != 0,
            csrc_count: buf[0] & 0x0f,
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7f,
            sequence_number: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_header_fields() {
        let mut buf = [0u8; 16];
        buf[0] = 0x90; // version 2, extension bit
        buf[1] = 0xe0; // marker, payload type 96
        buf[2..4].copy_from_slice(&4660u16.to_be_bytes());
        buf[4..8].copy_from_slice(&0x01020304u32.to_be_bytes());
        buf[8..12].copy_from_slice(&0xdeadbeefu32.to_be_bytes());

        let hdr = RtpHeader::parse(&buf).unwrap();
        assert_eq!(hdr.version, 2);
        assert!(hdr.extension);
        assert!(!hdr.padding);
        assert!(hdr.marker);
        assert_eq!(hdr.payload_type, 96);
        assert_eq!(hdr.sequence_number, 4660);
        assert_eq!(hdr.timestamp, 0x01020304);
        assert_eq!(hdr.ssrc, 0xdeadbeef);
    }

    #[test]
    fn short_buffer_is_not_rtp() {
        assert_eq!(RtpHeader::parse(&[0u8; 11]), None);
    }
}
