//! Command effects
//!
//! Each function runs one command against a connection once the dispatcher
//! has collected its arguments. Arguments arrive as a single space-joined
//! string; commands that need several values split it themselves.
//!
//! Every failure is reported to the client as text before the function
//! returns an error, so the dispatcher only has to count them.

mod files;

pub use files::{cat, del, dir, upload, UploadStats, MAX_CHUNK};

use alloc::string::String;

use crate::error::{Error, Result};
use crate::programmer::Programmer;
use crate::registry::Registry;
use crate::reply;
use crate::stream::Stream;

/// Longest parameter `INFO` accepts, longer ones are cut
pub const MAX_INFO_PARAM: usize = 10;

const HELP_LEGEND: &[&str] = &[
    "",
    "The system has five data centers:",
    "    the Monitor",
    "    the TCP stream",
    "    SPIFFS file system",
    "    a memory buffer",
    "    the chip flash",
    "",
    "Commands provide moving content between these locations.",
    "",
];

const HELP_EXAMPLES: &[&str] = &[
    "",
    "Examples:",
    "Store a file:",
    "(echo 'upload blink.hex'; cat blink.hex) | nc IP PORT",
    "",
    "Show a file:",
    "(echo 'cat blink.hex') | nc IP PORT > copy.hex",
    "",
    "Update config (linux):",
    "(echo 'upload .config'; cat config_file) | nc IP PORT",
    "",
];

/// Address details shown in the help usage line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpContext {
    /// Address clients connect to
    pub address: String,
    /// Port clients connect to
    pub port: u16,
}

impl Default for HelpContext {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0"),
            port: 23,
        }
    }
}

/// `HELP`: list the commands followed by usage notes
pub fn help<S: Stream + ?Sized>(client: &mut S, registry: &Registry, ctx: &HelpContext) {
    for cmd in registry.iter() {
        reply!(client, "{}\n", cmd);
    }
    for line in HELP_LEGEND.iter().chain(HELP_EXAMPLES) {
        reply!(client, "{}\n", line);
    }
    reply!(
        client,
        "Linux usage: (echo cmd; echo cmd; ...) | nc {} {}\n",
        ctx.address,
        ctx.port
    );
}

/// `INFO <a> <b>`: echo two parameters back in a strict format
pub fn info<S: Stream + ?Sized>(client: &mut S, args: &str) -> Result<()> {
    let params = scan_params(args);
    if let [p1, p2] = params[..] {
        log::debug!("INFO: p1=[{}], p2=[{}]", p1, p2);
        reply!(client, "INFO: p1=[{}], p2=[{}]\r\n", p1, p2);
        return Ok(());
    }

    reply!(client, "Error: unrecognized INFO parameters: [{}]\r\n", args);
    reply!(
        client,
        "       INFO needs 2 parameters, found [{}]\r\n",
        params.len()
    );
    reply!(
        client,
        "       INFO parameter uses a strict format: <num> <num>\n"
    );
    Err(Error::InvalidArgument)
}

/// `CHIP`: report the target attached to the programmer
pub fn chip<S: Stream + ?Sized>(mut client: &mut S, programmer: &mut Programmer) -> Result<()> {
    programmer.get_info(&mut client)
}

/// Pick the two `INFO` parameters out of `args`
///
/// Each parameter is at most [`MAX_INFO_PARAM`] bytes. A longer word is not
/// skipped: its remainder is scanned as the next parameter.
fn scan_params(args: &str) -> heapless::Vec<&str, 2> {
    let mut params = heapless::Vec::new();
    let mut rest = args;
    while !params.is_full() {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        if rest.is_empty() {
            break;
        }
        let word_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let param = truncate(&rest[..word_end], MAX_INFO_PARAM);
        rest = &rest[param.len()..];
        let _ = params.push(param);
    }
    params
}

/// Cut `s` to at most `max` bytes on a character boundary
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
