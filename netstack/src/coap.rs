//! CoAP processor (L4, RFC 7252) for a single client-side exchange.
//!
//! Implements just enough of the wire format to drive one outstanding
//! request/response exchange: base header, token, URI-path/URI-query/
//! content-format options, and the confirmable/non-confirmable/ack/
//! reset correlation described in the state machine below. There is no
//! retransmission, no block-wise transfer, and no support for more than
//! one exchange in flight, matching the scope of this stack.
//!
//! ```text
//! IDLE --send(NON)--> AWAIT_NON_REPLY --recv(matching NON)--> IDLE
//! IDLE --send(CON)--> AWAIT_ACK --recv(ACK code=0, mid=ours)--> AWAIT_SEPARATE_RESPONSE
//!                               --recv(ACK code!=0, mid=ours)--> IDLE (piggyback)
//!                               --recv(RST, mid=ours)--> ERROR
//! AWAIT_SEPARATE_RESPONSE --recv(NON, our token)--> IDLE
//! ```
//! The stack keeps no timers; every transition above is driven by a
//! caller-invoked `recv` returning the matching outcome.

use crate::cursor::Cursor;
use crate::layer::Layer;
use crate::status::{NetResult, Status};

const BASE_HEADER_LEN: u16 = 4;
const VERSION: u8 = 1;

const OPTION_URI_PATH: u16 = 11;
const OPTION_CONTENT_FORMAT: u16 = 12;
const OPTION_URI_QUERY: u16 = 15;

/// CoAP message type, occupying bits 5-4 of the first header byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Ack = 2,
    Reset = 3,
}

/// Result of a successful `CoapLayer::recv` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoapOutcome {
    /// Empty or piggybacked acknowledgement; `get_response_code` reflects
    /// a piggybacked response code, or is untouched for an empty ack.
    Ack,
    /// The peer reset our confirmable message.
    Reset,
    /// A non-confirmable message matching our token was received. The
    /// payload window is `(data_offset, data_len)` within the buffer.
    Data(u16, u16),
}

/// L4 context: cached header size, message state, and token/option
/// references the caller owns for the lifetime of the exchange.
pub struct CoapLayer<'a, L: Layer> {
    header_size: u16,
    message_type: MessageType,
    request_code: u8,
    response_code: u8,
    token: &'a [u8],
    last_message_id: u16,
    content_type: u8,
    uri_path: &'a [&'a str],
    uri_query: &'a [&'a str],
    lower: L,
}

/// Number of extra bytes a delta or length value needs beyond its nibble,
/// per RFC 7252's 13/14 extended-value bands. Shared by the header-size
/// calculator and `put_option` so the two can never drift apart again.
fn ext_bytes(value: u16) -> u16 {
    if value >= 269 {
        2
    } else if value >= 13 {
        1
    } else {
        0
    }
}

fn option_encoded_len(value_len: usize) -> NetResult<u16> {
    if value_len >= 269 {
        // Option values in this client never need the two-byte length
        // extension; reject at configuration time instead of carrying
        // that band forward.
        debug::logln!(debug::LL::Debug, "coap: option value too long");
        return Err(Status::EConfig);
    }
    Ok(1 + ext_bytes(value_len as u16) + value_len as u16)
}

/// Size of one option on the wire, including its delta extension byte(s)
/// on top of `option_encoded_len`'s length-extension accounting. `prev_number`
/// is threaded through in the same emission order `send` uses, so the delta
/// seen here matches the delta `put_option` computes.
fn option_wire_len(number: u16, prev_number: &mut u16, value_len: usize) -> NetResult<u16> {
    let delta = number - *prev_number;
    *prev_number = number;
    Ok(ext_bytes(delta) + option_encoded_len(value_len)?)
}

impl<'a, L: Layer> CoapLayer<'a, L> {
    pub fn new(lower: L) -> Self {
        CoapLayer {
            header_size: 0,
            message_type: MessageType::Confirmable,
            request_code: 0,
            response_code: 0,
            token: &[],
            last_message_id: 0,
            content_type: 0,
            uri_path: &[],
            uri_query: &[],
            lower,
        }
    }

    pub fn set_method(&mut self, message_type: MessageType, request_code: u8) {
        self.message_type = message_type;
        self.request_code = request_code;
    }

    pub fn set_token(&mut self, token: &'a [u8]) {
        self.token = token;
    }

    pub fn set_uri_path(&mut self, uri_path: &'a [&'a str]) -> NetResult<()> {
        for segment in uri_path {
            option_encoded_len(segment.len())?;
        }
        self.header_size = 0;
        self.uri_path = uri_path;
        Ok(())
    }

    pub fn set_uri_query(&mut self, uri_query: &'a [&'a str]) -> NetResult<()> {
        for segment in uri_query {
            option_encoded_len(segment.len())?;
        }
        self.header_size = 0;
        self.uri_query = uri_query;
        Ok(())
    }

    pub fn set_content_type(&mut self, content_type: u8) -> NetResult<()> {
        if (content_type == 0) != (self.content_type == 0) {
            self.header_size = 0;
        }
        self.content_type = content_type;
        Ok(())
    }

    pub fn response_code(&self) -> u8 {
        self.response_code
    }

    fn compute_header_size(&self) -> NetResult<u16> {
        let mut size = BASE_HEADER_LEN + self.token.len() as u16;
        let mut prev_option = 0u16;
        for segment in self.uri_path {
            size += option_wire_len(OPTION_URI_PATH, &mut prev_option, segment.len())?;
        }
        if self.content_type != 0 {
            size += option_wire_len(OPTION_CONTENT_FORMAT, &mut prev_option, 1)?;
        }
        for segment in self.uri_query {
            size += option_wire_len(OPTION_URI_QUERY, &mut prev_option, segment.len())?;
        }
        // Trailing payload-marker byte, counted even when absent; `send`
        // subtracts it back out when there is no payload.
        Ok(size + 1)
    }

    fn put_option(
        cursor: &mut Cursor<'_>,
        prev_number: &mut u16,
        number: u16,
        value: &[u8],
    ) -> NetResult<()> {
        let delta = number - *prev_number;
        *prev_number = number;
        let len = value.len() as u16;

        let delta_nibble = if delta >= 269 {
            0x0E
        } else if delta >= 13 {
            0x0D
        } else {
            delta as u8
        };
        let len_nibble = if len >= 269 {
            0x0E
        } else if len >= 13 {
            0x0D
        } else {
            len as u8
        };
        cursor.put_u8((delta_nibble << 4) | len_nibble)?;

        // RFC 7252 orders the extended delta bytes before the extended
        // length bytes, regardless of which (if either) is present.
        if delta >= 269 {
            cursor.put_u16(delta - 269)?;
        } else if delta >= 13 {
            cursor.put_u8((delta - 13) as u8)?;
        }
        if len >= 269 {
            cursor.put_u16(len - 269)?;
        } else if len >= 13 {
            cursor.put_u8((len - 13) as u8)?;
        }

        cursor.put_bytes(value)
    }
}

impl<'a, L: Layer> CoapLayer<'a, L> {
    pub fn payload_position(&mut self) -> NetResult<u16> {
        if self.header_size == 0 {
            self.header_size = self.compute_header_size()?;
        }
        Ok(self.lower.payload_position() + self.header_size)
    }

    pub fn send(&mut self, buf: &mut [u8], data_offset: u16, data_len: u16) -> NetResult<()> {
        self.response_code = 0;
        self.last_message_id = self.last_message_id.wrapping_add(1);
        let message_id = self.last_message_id;

        if self.header_size == 0 {
            self.header_size = self.compute_header_size()?;
        }
        let header_pos = self.lower.payload_position();
        if header_pos != data_offset - self.header_size {
            debug::logln!(debug::LL::Debug, "coap: send data_offset mismatches header size");
            return Err(Status::EOverflow);
        }
        if data_offset as usize + data_len as usize > buf.len() {
            debug::logln!(debug::LL::Debug, "coap: send would overrun buffer");
            return Err(Status::EOverflow);
        }

        let mut cursor = Cursor::new(buf, header_pos);
        let token_len = self.token.len() as u8;
        cursor.put_u8((VERSION << 6) | ((self.message_type as u8 & 0x03) << 4) | (token_len & 0x0F))?;
        cursor.put_u8(self.request_code)?;
        cursor.put_u16(message_id)?;
        cursor.put_bytes(self.token)?;

        let mut prev_option = 0u16;
        for segment in self.uri_path {
            Self::put_option(&mut cursor, &mut prev_option, OPTION_URI_PATH, segment.as_bytes())?;
        }
        if self.content_type != 0 {
            Self::put_option(
                &mut cursor,
                &mut prev_option,
                OPTION_CONTENT_FORMAT,
                &[self.content_type],
            )?;
        }
        for segment in self.uri_query {
            Self::put_option(&mut cursor, &mut prev_option, OPTION_URI_QUERY, segment.as_bytes())?;
        }

        if data_len > 0 {
            cursor.put_u8(0xFF)?;
            // Caller is trusted to have already placed the payload at
            // `payload_position()`.
        }

        let actual_header_size = self.header_size - if data_len > 0 { 0 } else { 1 };
        self.lower.send(buf, header_pos, actual_header_size + data_len)
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> NetResult<CoapOutcome> {
        let (data_offset, data_len) = self.lower.recv(buf)?;
        if data_len < BASE_HEADER_LEN {
            debug::logln!(debug::LL::Debug, "coap: recv shorter than base header");
            return Err(Status::EOverflow);
        }

        let mut cursor = Cursor::new(buf, data_offset);
        let vtt = cursor.get_u8()?;
        if (vtt >> 6) != VERSION {
            debug::logln!(debug::LL::Debug, "coap: recv wrong version");
            return Err(Status::EProto);
        }
        let type_bits = (vtt >> 4) & 0x03;
        let token_len = (vtt & 0x0F) as u16;
        let code = cursor.get_u8()?;
        let message_id = cursor.get_u16()?;

        if type_bits & 0x02 != 0 {
            // Acknowledgement or Reset.
            if message_id != self.last_message_id {
                return Err(Status::EAgain);
            }
            if type_bits == MessageType::Ack as u8 {
                if code != 0 {
                    self.response_code = code;
                }
                return Ok(CoapOutcome::Ack);
            } else if code == 0 {
                return Ok(CoapOutcome::Reset);
            }
            return Err(Status::EAgain);
        }

        if type_bits != MessageType::NonConfirmable as u8 {
            // Confirmable: this stack is client-only and cannot ack a
            // server-initiated confirmable message.
            return Err(Status::EInval);
        }

        if data_len < BASE_HEADER_LEN + token_len {
            debug::logln!(debug::LL::Debug, "coap: recv shorter than header plus token");
            return Err(Status::EOverflow);
        }
        if token_len != self.token.len() as u16 {
            return Err(Status::EAgain);
        }
        let token = cursor.take(token_len as usize)?;
        if token != self.token {
            return Err(Status::EAgain);
        }

        let mut remaining = data_len - BASE_HEADER_LEN - token_len;
        loop {
            if remaining == 0 {
                self.response_code = code;
                return Ok(CoapOutcome::Data(cursor.position(), 0));
            }
            let opt_byte = cursor.get_u8()?;
            remaining -= 1;
            if opt_byte == 0xFF {
                if remaining == 0 {
                    debug::logln!(debug::LL::Debug, "coap: payload marker with no trailing payload");
                    return Err(Status::EOverflow);
                }
                self.response_code = code;
                return Ok(CoapOutcome::Data(cursor.position(), remaining));
            }

            match opt_byte & 0xF0 {
                0xD0 => {
                    if remaining < 1 {
                        debug::logln!(debug::LL::Debug, "coap: truncated option delta extension");
                        return Err(Status::EOverflow);
                    }
                    cursor.skip(1)?;
                    remaining -= 1;
                }
                0xE0 => {
                    if remaining < 2 {
                        debug::logln!(debug::LL::Debug, "coap: truncated option delta extension");
                        return Err(Status::EOverflow);
                    }
                    cursor.skip(2)?;
                    remaining -= 2;
                }
                0xF0 => {
                    debug::logln!(debug::LL::Debug, "coap: reserved option delta nibble");
                    return Err(Status::EProto);
                }
                _ => {}
            }

            let opt_len = match opt_byte & 0x0F {
                0x0D => {
                    if remaining < 1 {
                        debug::logln!(debug::LL::Debug, "coap: truncated option length extension");
                        return Err(Status::EOverflow);
                    }
                    let extra = cursor.get_u8()? as u16;
                    remaining -= 1;
                    extra + 13
                }
                0x0E => {
                    if remaining < 2 {
                        debug::logln!(debug::LL::Debug, "coap: truncated option length extension");
                        return Err(Status::EOverflow);
                    }
                    let extra = cursor.get_u16()?;
                    remaining -= 2;
                    extra + 269
                }
                0x0F => {
                    debug::logln!(debug::LL::Debug, "coap: reserved option length nibble");
                    return Err(Status::EProto);
                }
                low => low as u16,
            };

            if remaining < opt_len {
                debug::logln!(debug::LL::Debug, "coap: option value runs past end of message");
                return Err(Status::EOverflow);
            }
            cursor.skip(opt_len as usize)?;
            remaining -= opt_len;
        }
    }
}
