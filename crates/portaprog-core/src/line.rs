//! Line reader
//!
//! Pulls one line out of a [`ByteSource`] without ever waiting for more
//! bytes. Callers loop until the source is exhausted.

use crate::stream::ByteSource;

/// Read bytes from `source` into `buf` until a line feed, the size limit or
/// the end of the currently available data
///
/// - carriage returns are always dropped
/// - the line feed is kept as the last byte
/// - at most `buf.len() - 1` bytes are stored, leaving room for a terminator
///
/// With `decode_escapes` set, a backslash starts a two byte escape so text
/// only senders can inject control bytes: `\n` becomes a line feed, any
/// other escaped byte is stored as-is without the backslash.
///
/// Returns the number of bytes stored.
pub fn read_line<S: ByteSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
    decode_escapes: bool,
) -> usize {
    let limit = buf.len().saturating_sub(1);
    let mut len = 0;
    let mut escaped = false;

    while len < limit && source.available() > 0 {
        let Some(mut c) = source.read_byte() else {
            break;
        };
        log::trace!("{}", c as char);

        if decode_escapes {
            if escaped {
                if c == b'n' {
                    c = b'\n';
                }
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
                continue;
            }
        }

        if c == b'\r' {
            continue;
        }

        buf[len] = c;
        len += 1;
        if c == b'\n' {
            break;
        }
    }
    len
}

/// Drop one trailing line feed, returning the new length
pub fn strip_newline(buf: &[u8], len: usize) -> usize {
    if len > 0 && buf[len - 1] == b'\n' {
        len - 1
    } else {
        len
    }
}
