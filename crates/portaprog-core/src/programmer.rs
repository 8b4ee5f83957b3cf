//! Target programmer backends
//!
//! The device can drive a target over classic AVR SPI programming or over
//! the single-wire UPDI interface. Which one is active is decided once at
//! configuration time. Both expose the same small capability set:
//!
//! - `init` - bring the interface up
//! - `poll` - give the interface a slice of time from the main loop
//! - `is_connected` - check that a target answers
//! - `get_info` - describe the attached target to a client
//!
//! The physical link is abstracted by [`TargetProbe`]; [`SimulatedTarget`]
//! stands in for hardware in tests and on hosts without a programmer.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::reply;
use crate::stream::ByteSink;

/// Three byte device signature
pub type Signature = [u8; 3];

/// Atmel/Microchip vendor byte that starts every AVR signature
pub const AVR_VENDOR: u8 = 0x1E;

/// Known parts, signature to name
static KNOWN_PARTS: &[(Signature, &str)] = &[
    ([0x1E, 0x93, 0x0B], "ATtiny85"),
    ([0x1E, 0x95, 0x0F], "ATmega328P"),
    ([0x1E, 0x95, 0x14], "ATmega328"),
    ([0x1E, 0x98, 0x01], "ATmega2560"),
    ([0x1E, 0x94, 0x22], "ATtiny1614"),
    ([0x1E, 0x94, 0x23], "ATtiny1616"),
    ([0x1E, 0x96, 0x51], "ATmega4809"),
];

/// Look up the part name for a signature
pub fn part_name(signature: &Signature) -> Option<&'static str> {
    KNOWN_PARTS
        .iter()
        .find(|(sig, _)| sig == signature)
        .map(|(_, name)| *name)
}

/// Physical link to a target device
pub trait TargetProbe {
    /// Read the device signature; fails when nothing answers
    fn read_signature(&mut self) -> Result<Signature>;

    /// Housekeeping from the main loop
    fn poll(&mut self) {}
}

/// Target stand-in with a fixed signature
///
/// Clones share the poll counter, so a clone kept aside still sees the
/// polls of one handed to a [`Programmer`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedTarget {
    signature: Option<Signature>,
    polls: Arc<AtomicU32>,
}

impl SimulatedTarget {
    /// Target answering with `signature`
    pub fn new(signature: Signature) -> Self {
        Self {
            signature: Some(signature),
            polls: Arc::default(),
        }
    }

    /// Nothing attached
    pub fn absent() -> Self {
        Self::default()
    }

    /// How often the main loop polled this target
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl TargetProbe for SimulatedTarget {
    fn read_signature(&mut self) -> Result<Signature> {
        self.signature.ok_or(Error::TargetNotConnected)
    }

    fn poll(&mut self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Programming interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammerKind {
    /// Classic in-system programming over SPI
    Spi,
    /// Unified Program and Debug Interface
    Updi,
}

impl fmt::Display for ProgrammerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi => write!(f, "SPI"),
            Self::Updi => write!(f, "UPDI"),
        }
    }
}

impl FromStr for ProgrammerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("spi") {
            Ok(Self::Spi)
        } else if s.eq_ignore_ascii_case("updi") {
            Ok(Self::Updi)
        } else {
            Err(Error::InvalidArgument)
        }
    }
}

/// SPI programming backend
pub struct SpiBackend {
    target: Box<dyn TargetProbe>,
    signature: Option<Signature>,
}

impl SpiBackend {
    /// Backend talking to `target`
    pub fn new(target: Box<dyn TargetProbe>) -> Self {
        Self {
            target,
            signature: None,
        }
    }

    fn probe(&mut self) -> Result<Signature> {
        let sig = self.target.read_signature()?;
        // MISO floating high or held low: no programming-enable echo
        if sig == [0xFF; 3] || sig == [0x00; 3] {
            return Err(Error::TargetNotConnected);
        }
        Ok(sig)
    }
}

/// UPDI programming backend
pub struct UpdiBackend {
    target: Box<dyn TargetProbe>,
    signature: Option<Signature>,
}

impl UpdiBackend {
    /// Backend talking to `target`
    pub fn new(target: Box<dyn TargetProbe>) -> Self {
        Self {
            target,
            signature: None,
        }
    }

    fn probe(&mut self) -> Result<Signature> {
        let sig = self.target.read_signature()?;
        if sig[0] != AVR_VENDOR {
            log::debug!("UPDI: unexpected vendor byte {:02X}", sig[0]);
            return Err(Error::TargetError);
        }
        Ok(sig)
    }
}

/// The configured programming backend
#[derive(Default)]
pub enum Programmer {
    /// No backend configured
    #[default]
    Detached,
    /// SPI backend
    Spi(SpiBackend),
    /// UPDI backend
    Updi(UpdiBackend),
}

impl Programmer {
    /// Backend of the given kind over `target`
    pub fn new(kind: ProgrammerKind, target: Box<dyn TargetProbe>) -> Self {
        match kind {
            ProgrammerKind::Spi => Self::Spi(SpiBackend::new(target)),
            ProgrammerKind::Updi => Self::Updi(UpdiBackend::new(target)),
        }
    }

    /// Active interface, `None` when detached
    pub fn kind(&self) -> Option<ProgrammerKind> {
        match self {
            Self::Detached => None,
            Self::Spi(_) => Some(ProgrammerKind::Spi),
            Self::Updi(_) => Some(ProgrammerKind::Updi),
        }
    }

    /// Bring the interface up, forgetting any earlier target
    pub fn init(&mut self) -> Result<()> {
        match self {
            Self::Detached => Ok(()),
            Self::Spi(b) => {
                b.signature = None;
                log::info!("SPI programmer ready");
                Ok(())
            }
            Self::Updi(b) => {
                b.signature = None;
                log::info!("UPDI programmer ready");
                Ok(())
            }
        }
    }

    /// Give the backend a slice of time
    pub fn poll(&mut self) {
        match self {
            Self::Detached => {}
            Self::Spi(b) => b.target.poll(),
            Self::Updi(b) => b.target.poll(),
        }
    }

    /// Check that a target answers, reporting to `out` unless `silent`
    pub fn is_connected(&mut self, out: &mut dyn ByteSink, silent: bool) -> bool {
        let kind = match self.kind() {
            Some(kind) => kind,
            None => {
                if !silent {
                    reply!(out, "Error: no programmer configured\n");
                }
                return false;
            }
        };
        let (result, cached) = match self {
            Self::Detached => return false,
            Self::Spi(b) => (b.probe(), &mut b.signature),
            Self::Updi(b) => (b.probe(), &mut b.signature),
        };
        match result {
            Ok(sig) => {
                *cached = Some(sig);
                true
            }
            Err(e) => {
                *cached = None;
                log::debug!("{} probe failed: {}", kind, e);
                if !silent {
                    reply!(out, "Error: no {} target device found\n", kind);
                }
                false
            }
        }
    }

    /// Signature of the last target that answered
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Self::Detached => None,
            Self::Spi(b) => b.signature,
            Self::Updi(b) => b.signature,
        }
    }

    /// Describe the attached target
    pub fn get_info(&mut self, out: &mut dyn ByteSink) -> Result<()> {
        if !self.is_connected(out, false) {
            return Err(Error::TargetNotConnected);
        }
        let (kind, sig) = match (self.kind(), self.signature()) {
            (Some(kind), Some(sig)) => (kind, sig),
            _ => return Err(Error::TargetNotConnected),
        };
        reply!(
            out,
            "{} target: signature {:02X} {:02X} {:02X} ({})\n",
            kind,
            sig[0],
            sig[1],
            sig[2],
            part_name(&sig).unwrap_or("unknown part")
        );
        Ok(())
    }
}
