//! A small, synchronous, `no_std` network stack for constrained links:
//! Ethernet II framing, IPv6 with an embedded Neighbor Discovery
//! responder, UDP, and a client-side CoAP exchange, composed by static
//! generic parameterization over a single shared frame buffer.
//!
//! Layers are built bottom-up and stacked by wrapping: `MacLayer` wraps
//! a board-specific [`LinkDriver`], `Ipv6Layer` wraps a `MacLayer`,
//! `UdpLayer` wraps an `Ipv6Layer`, and [`coap::CoapLayer`] wraps a
//! `UdpLayer`. No layer allocates; every header is written into or read
//! out of the caller-owned `&mut [u8]` passed to `send`/`recv`.

#![no_std]

pub mod coap;
pub mod cursor;
pub mod ipv6;
pub mod layer;
pub mod mac;
pub mod status;
pub mod udp;

pub use coap::{CoapLayer, CoapOutcome, MessageType};
pub use ipv6::Ipv6Layer;
pub use layer::{GetL2Addr, L3PseudoSum, Layer, LinkDriver};
pub use mac::MacLayer;
pub use status::{NetResult, Status};
pub use udp::UdpLayer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::MAC_HEADER_LEN;

    /// A single-slot loopback wire: whatever is `inject`ed is handed back
    /// by the next `frame_recv`, and whatever is sent is captured for
    /// inspection, modeled on a bare hex-framed stub transport.
    struct LoopbackDriver {
        inbox: [u8; 128],
        inbox_len: u16,
        outbox: [u8; 128],
        outbox_len: u16,
    }

    impl LoopbackDriver {
        fn new() -> Self {
            LoopbackDriver {
                inbox: [0u8; 128],
                inbox_len: 0,
                outbox: [0u8; 128],
                outbox_len: 0,
            }
        }

        fn inject(&mut self, frame: &[u8]) {
            self.inbox[..frame.len()].copy_from_slice(frame);
            self.inbox_len = frame.len() as u16;
        }

        fn sent(&self) -> &[u8] {
            &self.outbox[..self.outbox_len as usize]
        }
    }

    impl LinkDriver for LoopbackDriver {
        fn frame_recv(&mut self, buf: &mut [u8]) -> u16 {
            let len = self.inbox_len as usize;
            buf[..len].copy_from_slice(&self.inbox[..len]);
            self.inbox_len = 0;
            len as u16
        }

        fn frame_send(&mut self, buf: &[u8]) -> u16 {
            self.outbox[..buf.len()].copy_from_slice(buf);
            self.outbox_len = buf.len() as u16;
            buf.len() as u16
        }
    }

    const OUR_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const PEER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
    const OUR_GLOBAL: [u8; 16] = [
        0x20, 0x01, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x0f, 0x00, 0x0e, 0x00, 0x0d, 0x00,
        0x0c,
    ];

    fn make_mac() -> MacLayer<LoopbackDriver> {
        let mut mac = MacLayer::new(LoopbackDriver::new());
        mac.set_source_addr(OUR_MAC);
        mac.set_destination_addr(PEER_MAC);
        mac.set_ethertype(0x86DD);
        mac.set_ip6_mcast_suffixes(&[[0xFF, 0x0D, 0x00, 0x0C]]);
        mac
    }

    fn make_ipv6() -> Ipv6Layer<MacLayer<LoopbackDriver>> {
        let mut v6 = Ipv6Layer::new(make_mac());
        v6.set_source_addr(OUR_GLOBAL);
        v6.set_destination_addr([0xBB; 16]);
        v6.set_next_header(17);
        v6
    }

    #[test]
    fn neighbor_solicitation_gets_a_matching_advertisement() {
        let mut v6 = make_ipv6();

        // Solicited-node multicast address for OUR_GLOBAL's low 24 bits
        // (0x0d, 0x00, 0x0c): ff02::1:ff0d:c.
        let solicited_node: [u8; 16] = [
            0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff, 0x0d, 0x00, 0x0c,
        ];

        let mut ns = [0u8; 80];
        ns[0..6].copy_from_slice(&[0x33, 0x33, 0xff, 0x0d, 0x00, 0x0c]); // MAC dst
        ns[6..12].copy_from_slice(&PEER_MAC); // MAC src
        ns[12..14].copy_from_slice(&[0x86, 0xDD]); // ethertype

        ns[14] = 0x60; // IPv6 version
        let icmp_len: u16 = 4 + 20;
        ns[18..20].copy_from_slice(&icmp_len.to_be_bytes());
        ns[20] = 58; // next header: ICMPv6
        ns[21] = 255; // hop limit
        ns[22..38].copy_from_slice(&[0xCC; 16]); // solicitor's address
        ns[38..54].copy_from_slice(&solicited_node);

        ns[54] = 135; // ICMPv6 type: Neighbor Solicitation
        ns[62..78].copy_from_slice(&OUR_GLOBAL); // target address

        v6.lower_mut().driver_mut().inject(&ns[..78]);

        let mut buf = [0u8; 128];
        assert_eq!(v6.recv(&mut buf), Err(Status::EAgain));

        let sent_len;
        let na_type;
        let target_matches;
        {
            let sent = v6.lower_mut().driver_mut().sent();
            sent_len = sent.len();
            na_type = sent[MAC_HEADER_LEN as usize + 40];
            target_matches =
                sent[MAC_HEADER_LEN as usize + 48..MAC_HEADER_LEN as usize + 64] == OUR_GLOBAL;
        }
        assert_eq!(sent_len, 14 + 40 + 4 + 20 + 8);
        assert_eq!(na_type, 136); // NA type
        assert!(target_matches);
    }

    #[test]
    fn udp_and_coap_round_trip_through_the_full_stack() {
        let mut v6 = make_ipv6();
        v6.set_destination_addr([0xDD; 16]);
        let mut udp = UdpLayer::new(v6);
        udp.set_source_port(5683);
        udp.set_destination_port(5683);
        udp.connect().unwrap();
        let mut coap = CoapLayer::new(udp);
        coap.set_token(&[0x01]);
        coap.set_method(MessageType::NonConfirmable, 1); // GET

        let pos = coap.payload_position().unwrap();
        let mut buf = [0u8; 256];
        coap.send(&mut buf, pos, 0).unwrap();

        assert_eq!(buf[MAC_HEADER_LEN as usize], 0x60); // IPv6 version nibble
    }

    #[test]
    fn coap_request_with_uri_path_round_trips_through_the_full_stack() {
        let mut v6 = make_ipv6();
        v6.set_destination_addr([0xDD; 16]);
        let mut udp = UdpLayer::new(v6);
        udp.set_source_port(5683);
        udp.set_destination_port(5683);
        udp.connect().unwrap();
        let mut coap = CoapLayer::new(udp);
        coap.set_token(&[0x01]);
        coap.set_method(MessageType::NonConfirmable, 2); // POST
        coap.set_uri_path(&["sensors"]).unwrap();

        let pos = coap.payload_position().unwrap();
        let mut buf = [0u8; 256];
        let payload = b"42";
        buf[pos as usize..pos as usize + payload.len()].copy_from_slice(payload);
        coap.send(&mut buf, pos, payload.len() as u16).unwrap();

        // What `coap.send` wrote into `buf` is the complete wire frame; loop
        // it into a freshly-built receiving stack with swapped addresses.
        let frame_len = pos as usize + payload.len();
        let mut rx_driver = LoopbackDriver::new();
        rx_driver.inject(&buf[..frame_len]);

        let mut rx_mac = MacLayer::new(rx_driver);
        rx_mac.set_source_addr(PEER_MAC);
        rx_mac.set_destination_addr(OUR_MAC);
        rx_mac.set_ethertype(0x86DD);
        let mut rx_v6 = Ipv6Layer::new(rx_mac);
        rx_v6.set_source_addr([0xDD; 16]);
        rx_v6.set_destination_addr(OUR_GLOBAL);
        rx_v6.set_next_header(17);
        let mut rx_udp = UdpLayer::new(rx_v6);
        rx_udp.set_source_port(5683);
        rx_udp.set_destination_port(5683);
        rx_udp.connect().unwrap();
        let mut rx_coap = CoapLayer::new(rx_udp);
        rx_coap.set_token(&[0x01]);

        let mut rx_buf = [0u8; 256];
        match rx_coap.recv(&mut rx_buf).unwrap() {
            CoapOutcome::Data(data_offset, data_len) => {
                assert_eq!(data_len, payload.len() as u16);
                assert_eq!(
                    &rx_buf[data_offset as usize..data_offset as usize + data_len as usize],
                    payload
                );
            }
            other => panic!("expected Data outcome, got {:?}", other),
        }
    }
}
