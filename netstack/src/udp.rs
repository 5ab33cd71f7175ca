//! UDP processor (L3).
//!
//! Builds and parses the 8-byte UDP header and completes the checksum
//! using the pseudo-header seed IPv6 precomputed at `connect`. Receive
//! does not verify the UDP checksum: that work is left to the
//! link-layer integrity check of the constrained transport this stack
//! targets, and is not revisited here.

use crate::cursor::{checksum_finalize, checksum_partial, Cursor};
use crate::layer::{L3PseudoSum, Layer};
use crate::status::{NetResult, Status};

pub const UDP_HEADER_LEN: u16 = 8;

pub struct UdpLayer<L: Layer + L3PseudoSum> {
    source_port: u16,
    destination_port: u16,
    l3_seed: u16,
    lower: L,
}

impl<L: Layer + L3PseudoSum> UdpLayer<L> {
    pub fn new(lower: L) -> Self {
        UdpLayer {
            source_port: 0,
            destination_port: 0,
            l3_seed: 0,
            lower,
        }
    }

    pub fn set_source_port(&mut self, port: u16) {
        self.source_port = port;
    }

    pub fn set_destination_port(&mut self, port: u16) {
        self.destination_port = port;
    }

    /// Must be called once, bottom-up, before any `send`/`recv`. Caches
    /// the L3 pseudo-header checksum seed; it remains valid only while
    /// the lower layer's addresses and next-header stay unmutated.
    pub fn connect(&mut self) -> NetResult<()> {
        if self.source_port == 0 || self.destination_port == 0 {
            debug::logln!(debug::LL::Debug, "udp: connect with unset port");
            return Err(Status::EConfig);
        }
        self.l3_seed = self.lower.l3_pseudo_sum();
        Ok(())
    }
}

impl<L: Layer + L3PseudoSum> Layer for UdpLayer<L> {
    fn payload_position(&self) -> u16 {
        self.lower.payload_position() + UDP_HEADER_LEN
    }

    fn recv(&mut self, buf: &mut [u8]) -> NetResult<(u16, u16)> {
        let (data_offset, data_len) = self.lower.recv(buf)?;
        if data_len < UDP_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "udp: recv shorter than header");
            return Err(Status::EOverflow);
        }

        let mut cursor = Cursor::new(buf, data_offset);
        let src_port = cursor.get_u16()?;
        let dst_port = cursor.get_u16()?;
        if src_port != self.destination_port || dst_port != self.source_port {
            return Err(Status::EAgain);
        }
        let length = cursor.get_u16()?;
        if length > data_len {
            debug::logln!(debug::LL::Debug, "udp: length field exceeds available data");
            return Err(Status::EOverflow);
        }

        Ok((data_offset + UDP_HEADER_LEN, data_len - UDP_HEADER_LEN))
    }

    fn send(&mut self, buf: &mut [u8], data_offset: u16, data_len: u16) -> NetResult<()> {
        let header_pos = self.lower.payload_position();
        if header_pos != data_offset - UDP_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "udp: send data_offset mismatches header size");
            return Err(Status::EOverflow);
        }
        if data_offset as usize + data_len as usize > buf.len() {
            debug::logln!(debug::LL::Debug, "udp: send would overrun buffer");
            return Err(Status::EOverflow);
        }

        let udp_len = UDP_HEADER_LEN + data_len;
        let mut cursor = Cursor::new(buf, header_pos);
        cursor.put_u16(self.source_port)?;
        cursor.put_u16(self.destination_port)?;
        cursor.put_u16(udp_len)?;
        cursor.put_u16(0x0000)?; // checksum placeholder

        let hp = header_pos as usize;
        let mut sum = self.l3_seed;
        sum = checksum_partial(sum, &udp_len.to_be_bytes());
        sum = checksum_partial(sum, &buf[hp..hp + udp_len as usize]);
        let sum = checksum_finalize(sum);
        buf[hp + 6] = (sum >> 8) as u8;
        buf[hp + 7] = (sum & 0xFF) as u8;

        self.lower.send(buf, header_pos, udp_len)
    }
}
