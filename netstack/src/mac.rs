//! Ethernet II framer (L1).
//!
//! Builds and parses the 14-byte MAC header, filters inbound frames by
//! destination L2 address and EtherType, and matches the configured
//! IPv6 multicast suffixes used by the NDP responder one layer up.

use crate::layer::{GetL2Addr, Layer, LinkDriver};
use crate::status::{NetResult, Status};

pub const MAC_HEADER_LEN: u16 = 14;

/// Up to 256 accepted `33:33:xx:xx:xx:xx` multicast suffixes (the last 4
/// bytes of the destination address), per spec §3.
pub const MAX_MCAST_SUFFIXES: usize = 256;

/// L1 context: configured addresses plus the link driver.
pub struct MacLayer<D: LinkDriver> {
    src_l2addr: [u8; 6],
    dst_l2addr: [u8; 6],
    ethertype: [u8; 2],
    mcast_suffixes: heapless_suffixes::SuffixList,
    driver: D,
}

mod heapless_suffixes {
    use super::MAX_MCAST_SUFFIXES;

    /// A fixed-capacity, no_std list of 4-byte multicast suffixes.
    pub struct SuffixList {
        entries: [[u8; 4]; MAX_MCAST_SUFFIXES],
        len: usize,
    }

    impl SuffixList {
        pub const fn new() -> Self {
            SuffixList {
                entries: [[0u8; 4]; MAX_MCAST_SUFFIXES],
                len: 0,
            }
        }

        pub fn clear(&mut self) {
            self.len = 0;
        }

        pub fn push(&mut self, suffix: [u8; 4]) -> bool {
            if self.len >= MAX_MCAST_SUFFIXES {
                return false;
            }
            self.entries[self.len] = suffix;
            self.len += 1;
            true
        }

        pub fn iter(&self) -> impl Iterator<Item = &[u8; 4]> {
            self.entries[..self.len].iter()
        }
    }
}

impl<D: LinkDriver> MacLayer<D> {
    pub fn new(driver: D) -> Self {
        MacLayer {
            src_l2addr: [0u8; 6],
            dst_l2addr: [0u8; 6],
            ethertype: [0u8; 2],
            mcast_suffixes: heapless_suffixes::SuffixList::new(),
            driver,
        }
    }

    pub fn set_source_addr(&mut self, addr: [u8; 6]) {
        self.src_l2addr = addr;
    }

    pub fn set_destination_addr(&mut self, addr: [u8; 6]) {
        self.dst_l2addr = addr;
    }

    pub fn set_ethertype(&mut self, ethertype: u16) {
        self.ethertype = ethertype.to_be_bytes();
    }

    /// Replace the accepted IPv6 multicast suffix list. Entries beyond
    /// `MAX_MCAST_SUFFIXES` are dropped.
    pub fn set_ip6_mcast_suffixes(&mut self, suffixes: &[[u8; 4]]) {
        self.mcast_suffixes.clear();
        for s in suffixes {
            if !self.mcast_suffixes.push(*s) {
                break;
            }
        }
    }

    fn accepts_destination(&self, dest: &[u8]) -> bool {
        if dest == self.src_l2addr {
            return true;
        }
        if dest[0] == 0x33 && dest[1] == 0x33 {
            let suffix = [dest[2], dest[3], dest[4], dest[5]];
            return self.mcast_suffixes.iter().any(|s| *s == suffix);
        }
        false
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: LinkDriver> GetL2Addr for MacLayer<D> {
    fn l2_addr(&self) -> [u8; 6] {
        self.src_l2addr
    }
}

impl<D: LinkDriver> Layer for MacLayer<D> {
    fn payload_position(&self) -> u16 {
        MAC_HEADER_LEN
    }

    fn recv(&mut self, buf: &mut [u8]) -> NetResult<(u16, u16)> {
        let frame_len = self.driver.frame_recv(buf);
        if frame_len < MAC_HEADER_LEN {
            debug::logln!(debug::LL::Trace, "mac: short frame");
            return Err(Status::EAgain);
        }
        if buf[12] != self.ethertype[0] || buf[13] != self.ethertype[1] {
            return Err(Status::EAgain);
        }
        if !self.accepts_destination(&buf[0..6]) {
            return Err(Status::EAgain);
        }
        Ok((MAC_HEADER_LEN, frame_len - MAC_HEADER_LEN))
    }

    fn send(&mut self, buf: &mut [u8], data_offset: u16, data_len: u16) -> NetResult<()> {
        let frame_len = MAC_HEADER_LEN + data_len;
        if frame_len as usize > buf.len() || data_offset != MAC_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "mac: send data_offset or length invalid");
            return Err(Status::EOverflow);
        }
        buf[0..6].copy_from_slice(&self.dst_l2addr);
        buf[6..12].copy_from_slice(&self.src_l2addr);
        buf[12..14].copy_from_slice(&self.ethertype);
        let sent = self.driver.frame_send(&buf[..frame_len as usize]);
        if sent == frame_len {
            Ok(())
        } else {
            Err(Status::EAgain)
        }
    }
}
