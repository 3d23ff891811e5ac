//! Decoding for the three `sendInput` interpretation modes: raw hex bytes,
//! escape/control-code notation, and plain text.

use shelld_core::{Result, ShelldError};

pub fn decode_raw_bytes(input: &str) -> Result<Vec<u8>> {
    hex::decode(input.trim())
        .map_err(|e| ShelldError::bad_request(format!("invalid hex in rawBytes input: {e}")))
}

/// Parse `\n \r \t \b \f \v \0`, caret notation (`^X` for X in `@`..`_`),
/// `\xNN`, `\NNN` (octal), `\uNNNN`, and `\\`. Anything else passes through.
pub fn decode_control_codes(input: &str) -> Result<Vec<u8>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '^' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next.is_ascii_uppercase() && ('@'..='_').contains(&next) {
                out.push((next as u8) - b'@');
                i += 2;
                continue;
            }
        }
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            match next {
                'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                'r' => {
                    out.push(b'\r');
                    i += 2;
                }
                't' => {
                    out.push(b'\t');
                    i += 2;
                }
                'b' => {
                    out.push(0x08);
                    i += 2;
                }
                'f' => {
                    out.push(0x0c);
                    i += 2;
                }
                'v' => {
                    out.push(0x0b);
                    i += 2;
                }
                '0' => {
                    out.push(0x00);
                    i += 2;
                }
                '\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                'x' => {
                    let (byte, consumed) = parse_fixed_radix(&chars[i + 2..], 2, 16)?;
                    out.push(byte as u8);
                    i += 2 + consumed;
                }
                'u' => {
                    let (code, consumed) = parse_fixed_radix(&chars[i + 2..], 4, 16)?;
                    let ch = char::from_u32(code)
                        .ok_or_else(|| ShelldError::bad_request("invalid \\u escape"))?;
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    i += 2 + consumed;
                }
                d if d.is_ascii_digit() => {
                    let (byte, consumed) = parse_fixed_radix(&chars[i + 1..], 3, 8)?;
                    out.push(byte as u8);
                    i += 1 + consumed;
                }
                _ => {
                    out.push(c as u8);
                    i += 1;
                }
            }
            continue;
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        i += 1;
    }

    Ok(out)
}

fn parse_fixed_radix(chars: &[char], max_digits: usize, radix: u32) -> Result<(u32, usize)> {
    let take = chars
        .iter()
        .take(max_digits)
        .take_while(|c| c.is_digit(radix))
        .count();
    if take == 0 {
        return Err(ShelldError::bad_request("malformed escape sequence"));
    }
    let s: String = chars[..take].iter().collect();
    let value = u32::from_str_radix(&s, radix)
        .map_err(|_| ShelldError::bad_request("malformed escape sequence"))?;
    Ok((value, take))
}

pub fn decode_plain(input: &str) -> Vec<u8> {
    input.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_bytes_decodes_hex() {
        assert_eq!(decode_raw_bytes("68656c6c6f").unwrap(), b"hello");
    }

    #[test]
    fn raw_bytes_rejects_invalid_hex() {
        assert!(decode_raw_bytes("zz").is_err());
    }

    #[test]
    fn control_codes_decodes_newline_and_caret() {
        let out = decode_control_codes("hi\\n^C").unwrap();
        assert_eq!(out, [b'h', b'i', b'\n', 0x03]);
    }

    #[test]
    fn control_codes_decodes_hex_and_octal_and_unicode() {
        assert_eq!(decode_control_codes("\\x41").unwrap(), b"A");
        assert_eq!(decode_control_codes("\\101").unwrap(), b"A");
        assert_eq!(decode_control_codes("\\u0041").unwrap(), b"A");
    }

    #[test]
    fn plain_passes_through_bytes() {
        assert_eq!(decode_plain("abc"), b"abc");
    }
}
