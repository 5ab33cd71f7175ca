//! IPv6 processor (L2) with an embedded Neighbor Discovery responder.
//!
//! Builds and parses the fixed 40-byte IPv6 header, intercepts ICMPv6
//! Neighbor Solicitations to reply with a Neighbor Advertisement, and
//! exposes the L3 pseudo-header checksum seed UDP needs at `connect`.
//!
//! IPv6 `recv` does not verify ICMPv6 checksums on inbound Neighbor
//! Discovery messages; this mirrors the original stack's choice to
//! trust the link layer for integrity on this path rather than spend
//! cycles re-verifying it here.

use crate::cursor::{checksum_finalize, checksum_partial, Cursor};
use crate::layer::{GetL2Addr, L3PseudoSum, Layer};
use crate::status::{NetResult, Status};

pub const IPV6_HEADER_LEN: u16 = 40;
const ICMPV6_HDR_LEN: u16 = 4;
const ICMPV6_NS_BODY_LEN: u16 = 20;
const ICMPV6_NA_BODY_LEN: u16 = 20;
const NDP_OPT_TLLA_LEN: u16 = 8;

const NH_ICMPV6: u8 = 58;

const ICMPV6_TYPE_NS: u8 = 135;
const ICMPV6_TYPE_NA: u8 = 136;

const NDP_OPT_TARGET_LLA: u8 = 2;

/// L2 context: addresses, next header, and the lower (MAC) layer.
pub struct Ipv6Layer<L: Layer + GetL2Addr> {
    src_addr: [u8; 16],
    dst_addr: [u8; 16],
    next_header: u8,
    lower: L,
}

enum NsDestination {
    Unicast,
    LinkLocal,
    AllNodes,
    SolicitedNode,
    Other,
}

fn is_unspecified(addr: &[u8]) -> bool {
    addr.iter().all(|b| *b == 0)
}

fn link_local_form(global: &[u8; 16]) -> [u8; 16] {
    let mut ll = [0u8; 16];
    ll[0] = 0xFE;
    ll[1] = 0x80;
    ll[8..16].copy_from_slice(&global[8..16]);
    ll
}

impl<L: Layer + GetL2Addr> Ipv6Layer<L> {
    pub fn new(lower: L) -> Self {
        Ipv6Layer {
            src_addr: [0u8; 16],
            dst_addr: [0u8; 16],
            next_header: 0,
            lower,
        }
    }

    pub fn set_source_addr(&mut self, addr: [u8; 16]) {
        self.src_addr = addr;
    }

    pub fn set_destination_addr(&mut self, addr: [u8; 16]) {
        self.dst_addr = addr;
    }

    pub fn set_next_header(&mut self, nh: u8) {
        self.next_header = nh;
    }

    pub fn lower_mut(&mut self) -> &mut L {
        &mut self.lower
    }

    fn classify_ns_destination(&self, dst: &[u8; 16]) -> NsDestination {
        if *dst == self.src_addr {
            return NsDestination::Unicast;
        }
        if *dst == link_local_form(&self.src_addr) {
            return NsDestination::LinkLocal;
        }
        if dst[0] == 0xFF && dst[1] == 0x02 && dst[2..11].iter().all(|b| *b == 0) {
            if dst[11..16] == [0, 0, 0, 0, 1] {
                return NsDestination::AllNodes;
            }
            if dst[11] == 1
                && dst[12] == 0xFF
                && dst[13] == self.src_addr[13]
                && dst[14] == self.src_addr[14]
                && dst[15] == self.src_addr[15]
            {
                return NsDestination::SolicitedNode;
            }
        }
        NsDestination::Other
    }

    fn process_icmpv6(
        &mut self,
        buf: &mut [u8],
        data_offset: u16,
        data_len: u16,
        src_addr: [u8; 16],
        dst_addr: [u8; 16],
    ) -> NetResult<()> {
        let mut cursor = Cursor::new(buf, data_offset);
        if data_len < ICMPV6_HDR_LEN {
            debug::logln!(debug::LL::Debug, "ipv6: icmpv6 message shorter than header");
            return Err(Status::EOverflow);
        }
        let icmp_type = cursor.get_u8()?;
        cursor.skip(3)?; // code + checksum, not verified on receive

        if icmp_type != ICMPV6_TYPE_NS {
            // NA (136) and RA (133) are accepted but ignored.
            return Err(Status::EAgain);
        }

        if matches!(self.classify_ns_destination(&dst_addr), NsDestination::Other) {
            return Err(Status::EAgain);
        }

        if data_len < ICMPV6_HDR_LEN + ICMPV6_NS_BODY_LEN {
            debug::logln!(debug::LL::Debug, "ipv6: neighbor solicitation shorter than body");
            return Err(Status::EOverflow);
        }
        cursor.skip(4)?; // reserved
        let mut target = [0u8; 16];
        cursor.copy_out(&mut target)?;

        if target != self.src_addr && target != link_local_form(&self.src_addr) {
            return Err(Status::EAgain);
        }

        let reply_dst = if is_unspecified(&src_addr) {
            let mut all_nodes = [0u8; 16];
            all_nodes[0] = 0xFF;
            all_nodes[1] = 0x02;
            all_nodes[15] = 0x01;
            all_nodes
        } else {
            src_addr
        };

        let na_header_pos = data_offset - IPV6_HEADER_LEN;
        let _ = self.send_neighbor_advertisement(buf, na_header_pos, reply_dst, target, true);
        Err(Status::EAgain)
    }

    fn send_neighbor_advertisement(
        &mut self,
        buf: &mut [u8],
        header_pos: u16,
        dst_addr: [u8; 16],
        target_addr: [u8; 16],
        solicited: bool,
    ) -> NetResult<()> {
        let icmp_len = ICMPV6_HDR_LEN + ICMPV6_NA_BODY_LEN + NDP_OPT_TLLA_LEN;
        if (header_pos as usize) + (IPV6_HEADER_LEN + icmp_len) as usize > buf.len() {
            debug::logln!(debug::LL::Debug, "ipv6: neighbor advertisement would overrun buffer");
            return Err(Status::EOverflow);
        }

        let src_ll = link_local_form(&self.src_addr);
        let l2_addr = self.lower.l2_addr();

        let mut cursor = Cursor::new(buf, header_pos);
        cursor.put_u8(0x60)?; // version 6, traffic class high nibble 0
        cursor.put_u8(0x00)?;
        cursor.put_u16(0x0000)?; // flow label
        cursor.put_u16(icmp_len)?;
        cursor.put_u8(NH_ICMPV6)?;
        cursor.put_u8(255)?; // hop limit
        cursor.put_bytes(&src_ll)?;
        cursor.put_bytes(&dst_addr)?;

        cursor.put_u8(ICMPV6_TYPE_NA)?;
        cursor.put_u8(0)?; // code
        cursor.put_u16(0)?; // checksum placeholder
        cursor.put_u32(if solicited { 0x6000_0000 } else { 0x2000_0000 })?;
        cursor.put_bytes(&target_addr)?;
        cursor.put_u8(NDP_OPT_TARGET_LLA)?;
        cursor.put_u8(1)?; // length in 8-byte units
        cursor.put_bytes(&l2_addr)?;

        self.fix_icmpv6_checksum(buf, header_pos, icmp_len);

        self.lower
            .send(buf, header_pos, IPV6_HEADER_LEN + icmp_len)
    }

    fn fix_icmpv6_checksum(&self, buf: &mut [u8], header_pos: u16, icmp_len: u16) {
        let hp = header_pos as usize;
        let mut sum = 0u16;
        sum = checksum_partial(sum, &buf[hp + 8..hp + 40]); // src + dst
        sum = checksum_partial(sum, &buf[hp + 4..hp + 6]); // payload length
        sum = checksum_partial(sum, &[0x00, NH_ICMPV6]);
        sum = checksum_partial(sum, &buf[hp + 40..hp + 40 + icmp_len as usize]);
        let sum = checksum_finalize(sum);
        buf[hp + 40 + 2] = (sum >> 8) as u8;
        buf[hp + 40 + 3] = (sum & 0xFF) as u8;
    }
}

impl<L: Layer + GetL2Addr> L3PseudoSum for Ipv6Layer<L> {
    fn l3_pseudo_sum(&self) -> u16 {
        let mut sum = 0u16;
        sum = checksum_partial(sum, &self.src_addr);
        sum = checksum_partial(sum, &self.dst_addr);
        sum = checksum_partial(sum, &[0x00, self.next_header]);
        sum
    }
}

impl<L: Layer + GetL2Addr> Layer for Ipv6Layer<L> {
    fn payload_position(&self) -> u16 {
        self.lower.payload_position() + IPV6_HEADER_LEN
    }

    fn recv(&mut self, buf: &mut [u8]) -> NetResult<(u16, u16)> {
        let (data_offset, data_len) = self.lower.recv(buf)?;

        if data_len < IPV6_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "ipv6: recv shorter than fixed header");
            return Err(Status::EOverflow);
        }

        let mut cursor = Cursor::new(buf, data_offset);
        let version = cursor.get_u8()?;
        cursor.skip(3)?; // remaining traffic class + flow label
        let payload_len = cursor.get_u16()?;
        let next_header = cursor.get_u8()?;
        cursor.skip(1)?; // hop limit
        let mut src_addr = [0u8; 16];
        cursor.copy_out(&mut src_addr)?;
        let mut dst_addr = [0u8; 16];
        cursor.copy_out(&mut dst_addr)?;

        if (version >> 4) != 6 {
            debug::logln!(debug::LL::Debug, "ipv6: recv wrong version");
            return Err(Status::EProto);
        }
        if payload_len > data_len - IPV6_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "ipv6: payload length exceeds frame");
            return Err(Status::EOverflow);
        }

        if next_header == NH_ICMPV6 {
            let _ = self.process_icmpv6(
                buf,
                data_offset + IPV6_HEADER_LEN,
                payload_len,
                src_addr,
                dst_addr,
            );
            Err(Status::EAgain)
        } else if next_header == self.next_header {
            if src_addr == self.dst_addr && dst_addr == self.src_addr {
                Ok((data_offset + IPV6_HEADER_LEN, payload_len))
            } else {
                Err(Status::EAgain)
            }
        } else {
            Err(Status::EAgain)
        }
    }

    fn send(&mut self, buf: &mut [u8], data_offset: u16, data_len: u16) -> NetResult<()> {
        let header_pos = self.lower.payload_position();
        if header_pos != data_offset - IPV6_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "ipv6: send data_offset mismatches header size");
            return Err(Status::EOverflow);
        }
        if data_offset as usize + data_len as usize > buf.len() {
            debug::logln!(debug::LL::Debug, "ipv6: send would overrun buffer");
            return Err(Status::EOverflow);
        }

        let mut cursor = Cursor::new(buf, header_pos);
        cursor.put_u8(0x60)?;
        cursor.put_u8(0x00)?;
        cursor.put_u16(0x0000)?;
        cursor.put_u16(data_len)?;
        cursor.put_u8(self.next_header)?;
        cursor.put_u8(255)?;
        cursor.put_bytes(&self.src_addr)?;
        cursor.put_bytes(&self.dst_addr)?;

        self.lower
            .send(buf, header_pos, data_len + IPV6_HEADER_LEN)
    }
}
