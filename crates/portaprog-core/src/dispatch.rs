//! Command dispatcher
//!
//! Turns the bytes of one connection into command invocations. Commands,
//! arguments and (for streaming commands) the payload all arrive over the
//! same unframed byte stream:
//!
//! - a line may carry several commands
//! - commands may be spread over several lines
//! - a streaming command must be the last one, since nothing marks where
//!   its payload ends
//!
//! ```text
//!            token matches, args > 0
//! Seeking ----------------------------> Accumulating
//!    ^  \                                   |
//!    |   \ args == 0                        | last arg collected
//!    |    v                                 v
//!    +--- run <-----------------------------+
//!          \ has_stream
//!           +--> Streaming (payload consumed, pass ends)
//! ```
//!
//! One call to [`Dispatcher::process`] is one pass: it handles whatever the
//! connection has available and returns when the connection reports nothing
//! more. State does not survive between passes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::commands::{self, HelpContext};
use crate::programmer::Programmer;
use crate::registry::{CommandDescriptor, CommandId, Registry, MAX_NETWORK_TEXT};
use crate::reply;
use crate::store::FileStore;
use crate::stream::Stream;

/// Room for the space-joined arguments of any command in the table
pub const MAX_ARGS_TEXT: usize = 2 * MAX_NETWORK_TEXT + 1;

/// State of the command state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// No active command; the next token names one
    Seeking,
    /// A command is waiting for more arguments
    Accumulating {
        /// Command being collected
        command: CommandId,
        /// Arguments collected so far
        collected: u8,
    },
    /// A command owns the raw connection
    Streaming(CommandId),
}

/// Summary of one pass over a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// State when the connection ran dry
    pub phase: DispatchPhase,
    /// Commands that ran, in order
    pub executed: Vec<CommandId>,
    /// Commands skipped because the pass was aborted
    pub skipped: Vec<CommandId>,
    /// Number of errors reported to the client
    pub errors: usize,
    /// The abort flag the pass ran under
    pub aborted: bool,
    /// Streaming command that ended the pass, if any
    pub streamed: Option<CommandId>,
    /// Bytes consumed from the connection, payload included
    pub bytes_read: usize,
}

impl PassOutcome {
    fn new(aborted: bool) -> Self {
        Self {
            phase: DispatchPhase::Seeking,
            executed: Vec::new(),
            skipped: Vec::new(),
            errors: 0,
            aborted,
            streamed: None,
            bytes_read: 0,
        }
    }

    /// True when the pass was not aborted and nothing failed
    pub fn ok(&self) -> bool {
        !self.aborted && self.errors == 0
    }
}

/// Per-pass mutable state
struct DispatchState {
    active: Option<&'static CommandDescriptor>,
    collected: u8,
    token: heapless::Vec<u8, MAX_NETWORK_TEXT>,
    args: heapless::Vec<u8, MAX_ARGS_TEXT>,
    aborted: bool,
}

impl DispatchState {
    fn new(aborted: bool) -> Self {
        Self {
            active: None,
            collected: 0,
            token: heapless::Vec::new(),
            args: heapless::Vec::new(),
            aborted,
        }
    }

    fn reset(&mut self) {
        self.active = None;
        self.collected = 0;
        self.args.clear();
    }

    fn phase(&self) -> DispatchPhase {
        match self.active {
            Some(cmd) => DispatchPhase::Accumulating {
                command: cmd.id,
                collected: self.collected,
            },
            None => DispatchPhase::Seeking,
        }
    }

    /// Append the current token to the argument text, space separated
    fn push_arg(&mut self) {
        if self.collected > 0 && self.args.push(b' ').is_err() {
            log::warn!("argument text full, dropping separator");
        }
        let room = MAX_ARGS_TEXT - self.args.len();
        let take = self.token.len().min(room);
        if take < self.token.len() {
            log::warn!("argument text full, truncating argument");
        }
        // cannot fail, length checked above
        let _ = self.args.extend_from_slice(&self.token[..take]);
        self.collected += 1;
    }
}

/// Read the next whitespace delimited token into `token`
///
/// Space and line feed delimit, carriage return is ignored and a NUL byte
/// ends the token. Leading delimiters are skipped. A token reaching
/// [`MAX_NETWORK_TEXT`] bytes is handed over as-is; the rest of it becomes
/// the next token. Returns the number of bytes consumed.
pub fn next_token<S: Stream + ?Sized>(
    client: &mut S,
    token: &mut heapless::Vec<u8, MAX_NETWORK_TEXT>,
) -> usize {
    token.clear();
    let mut consumed = 0;
    while client.available() > 0 {
        let Some(c) = client.read_byte() else {
            break;
        };
        consumed += 1;
        match c {
            0 => break,
            b'\r' => continue,
            b' ' | b'\n' => {
                if token.is_empty() {
                    continue;
                }
                break;
            }
            _ => {
                // capacity is MAX_NETWORK_TEXT, checked below before overflow
                let _ = token.push(c);
                if token.len() >= MAX_NETWORK_TEXT {
                    break;
                }
            }
        }
    }
    consumed
}

/// Command dispatcher
///
/// Owns the file store and programmer backend the commands act on; reads
/// command descriptors from a shared [`Registry`].
pub struct Dispatcher<'r, F: FileStore> {
    registry: &'r Registry,
    store: F,
    programmer: Programmer,
    help: HelpContext,
    show_hidden: bool,
}

impl<'r, F: FileStore> Dispatcher<'r, F> {
    /// Dispatcher over `store` with no programmer attached
    pub fn new(registry: &'r Registry, store: F) -> Self {
        Self {
            registry,
            store,
            programmer: Programmer::Detached,
            help: HelpContext::default(),
            show_hidden: true,
        }
    }

    /// Attach a programmer backend
    pub fn with_programmer(mut self, programmer: Programmer) -> Self {
        self.programmer = programmer;
        self
    }

    /// Set the address shown in the help usage line
    pub fn with_help(mut self, help: HelpContext) -> Self {
        self.help = help;
        self
    }

    /// Whether `DIR` lists dot-files
    pub fn with_hidden_files(mut self, show: bool) -> Self {
        self.show_hidden = show;
        self
    }

    /// The command table
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// The file store
    pub fn store(&self) -> &F {
        &self.store
    }

    /// The file store, mutably
    pub fn store_mut(&mut self) -> &mut F {
        &mut self.store
    }

    /// The programmer backend
    pub fn programmer_mut(&mut self) -> &mut Programmer {
        &mut self.programmer
    }

    /// Update the help usage line
    pub fn set_help(&mut self, help: HelpContext) {
        self.help = help;
    }

    /// Give the programmer backend its main loop slice
    pub fn poll(&mut self) {
        self.programmer.poll();
    }

    /// Process everything `client` currently has to offer
    ///
    /// `aborted` marks a pass following a failure: abortable commands are
    /// skipped (their stream payload discarded), the others still run.
    pub fn process<S: Stream + ?Sized>(&mut self, client: &mut S, aborted: bool) -> PassOutcome {
        log::debug!("process commands (aborted={})", aborted);
        let mut state = DispatchState::new(aborted);
        let mut outcome = PassOutcome::new(aborted);

        while client.available() > 0 {
            outcome.bytes_read += next_token(client, &mut state.token);
            if state.token.is_empty() {
                log::trace!("empty command");
                continue;
            }
            log::trace!("parsed [{}]", String::from_utf8_lossy(&state.token));

            let cmd = match state.active {
                Some(cmd) => {
                    state.push_arg();
                    if state.collected < cmd.args {
                        continue;
                    }
                    cmd
                }
                None => match self.registry.lookup(&state.token) {
                    Some(cmd) if cmd.args > 0 => {
                        state.active = Some(cmd);
                        state.collected = 0;
                        state.args.clear();
                        continue;
                    }
                    Some(cmd) => cmd,
                    None => {
                        reply!(
                            client,
                            "Error, unrecognized command: [{}]\n\n",
                            String::from_utf8_lossy(&state.token)
                        );
                        client.flush();
                        outcome.errors += 1;
                        continue;
                    }
                },
            };

            let streamed = self.dispatch(cmd, client, &mut state, &mut outcome);
            state.reset();
            if streamed {
                // no boundary between payload and any following command
                break;
            }
        }

        outcome.phase = state.phase();
        if let DispatchPhase::Accumulating { command, collected } = outcome.phase {
            log::debug!(
                "pass ended waiting for arguments: {:?} has {} of {}",
                command,
                collected,
                state.active.map_or(0, |c| c.args)
            );
        }
        log::debug!("done with commands");
        outcome
    }

    /// Run or skip one fully collected command
    ///
    /// Returns true when the command consumed the raw connection.
    fn dispatch<S: Stream + ?Sized>(
        &mut self,
        cmd: &'static CommandDescriptor,
        client: &mut S,
        state: &mut DispatchState,
        outcome: &mut PassOutcome,
    ) -> bool {
        let args = String::from_utf8_lossy(&state.args);

        if state.aborted {
            if cmd.abortable() {
                log::debug!("Aborting CMD: {} {}", cmd.name, args);
                outcome.skipped.push(cmd.id);
                if cmd.has_stream() {
                    let mut discarded = 0;
                    while client.available() > 0 && client.read_byte().is_some() {
                        discarded += 1;
                    }
                    log::debug!("discarded {} stream bytes", discarded);
                    outcome.streamed = Some(cmd.id);
                    outcome.bytes_read += discarded;
                    return true;
                }
                return false;
            }
            log::debug!("Non-Abortable CMD: {} {}", cmd.name, args);
        }

        log::debug!("checking command: {:?} {}", cmd.id, args);
        outcome.executed.push(cmd.id);

        let result = match cmd.id {
            CommandId::None => Ok(()),
            CommandId::Help => {
                commands::help(client, self.registry, &self.help);
                Ok(())
            }
            CommandId::Info => commands::info(client, &args),
            CommandId::Chip => commands::chip(client, &mut self.programmer),
            CommandId::Dir => {
                commands::dir(client, &mut self.store, self.show_hidden);
                Ok(())
            }
            CommandId::Del => commands::del(client, &mut self.store, &args),
            CommandId::Cat => commands::cat(client, &mut self.store, &args),
            CommandId::Upload => {
                log::debug!("{:?}", DispatchPhase::Streaming(cmd.id));
                outcome.streamed = Some(cmd.id);
                let (stats, result) = commands::upload(client, &mut self.store, &args);
                outcome.bytes_read += stats.consumed;
                result
            }
        };

        if let Err(e) = result {
            log::debug!("{} failed: {}", cmd.name, e);
            outcome.errors += 1;
        }
        cmd.has_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programmer::{ProgrammerKind, SimulatedTarget};
    use crate::ring::RingBuffer;
    use crate::store::MemFs;
    use crate::stream::{ByteSink, ByteSource};
    use alloc::boxed::Box;

    static REGISTRY: Registry = Registry::standard();

    /// Connection with scripted input and captured output
    struct Script {
        input: RingBuffer,
        output: Vec<u8>,
    }

    impl Script {
        fn new(text: &[u8]) -> Self {
            let mut input = RingBuffer::new(text.len().max(1));
            ByteSink::write(&mut input, text);
            Self {
                input,
                output: Vec::new(),
            }
        }

        fn output(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl ByteSource for Script {
        fn available(&mut self) -> usize {
            self.input.len()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.input.pop()
        }

        fn peek_byte(&mut self) -> Option<u8> {
            self.input.peek()
        }
    }

    impl ByteSink for Script {
        fn write(&mut self, data: &[u8]) -> usize {
            self.output.extend_from_slice(data);
            data.len()
        }
    }

    fn dispatcher() -> Dispatcher<'static, MemFs> {
        Dispatcher::new(&REGISTRY, MemFs::new())
    }

    #[test]
    fn test_tokenizer_chunks_long_tokens() {
        let mut text = Vec::new();
        text.resize(MAX_NETWORK_TEXT + 10, b'x');
        let mut script = Script::new(&text);
        let mut token = heapless::Vec::new();
        next_token(&mut script, &mut token);
        assert_eq!(token.len(), MAX_NETWORK_TEXT);
        next_token(&mut script, &mut token);
        assert_eq!(token.len(), 10);
    }

    #[test]
    fn test_tokenizer_skips_delimiters() {
        let mut script = Script::new(b"  \r\n DEL\r\n");
        let mut token = heapless::Vec::new();
        next_token(&mut script, &mut token);
        assert_eq!(&token[..], b"DEL");
        next_token(&mut script, &mut token);
        assert!(token.is_empty());
    }

    #[test]
    fn test_del_with_extra_whitespace() {
        let mut d = dispatcher();
        d.store_mut().insert("a.txt", b"data").unwrap();
        let mut script = Script::new(b"  DEL   a.txt  \n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.executed, [CommandId::Del]);
        assert_eq!(outcome.phase, DispatchPhase::Seeking);
        assert!(outcome.ok());
        assert_eq!(script.output(), "File a.txt deleted\n");
        assert!(!d.store_mut().exists("a.txt"));
    }

    #[test]
    fn test_unknown_command_then_valid() {
        let mut d = dispatcher();
        let mut script = Script::new(b"FROB\nINFO 1 2\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.executed, [CommandId::Info]);
        let out = script.output();
        assert!(out.starts_with("Error, unrecognized command: [FROB]\n\n"));
        assert!(out.ends_with("INFO: p1=[1], p2=[2]\r\n"));
        assert!(!outcome.ok());
    }

    #[test]
    fn test_arguments_joined_with_space() {
        let mut d = dispatcher();
        let mut script = Script::new(b"info\n  7\r\n\n 42\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.executed, [CommandId::Info]);
        assert_eq!(script.output(), "INFO: p1=[7], p2=[42]\r\n");
    }

    #[test]
    fn test_missing_argument_leaves_accumulating() {
        let mut d = dispatcher();
        let mut script = Script::new(b"INFO 1\n");
        let outcome = d.process(&mut script, false);
        assert!(outcome.executed.is_empty());
        assert_eq!(
            outcome.phase,
            DispatchPhase::Accumulating {
                command: CommandId::Info,
                collected: 1
            }
        );
        assert!(script.output().is_empty());
    }

    #[test]
    fn test_multiple_commands_per_line() {
        let mut d = dispatcher();
        d.store_mut().insert("a", b"1").unwrap();
        d.store_mut().insert("b", b"2").unwrap();
        let mut script = Script::new(b"del a del b dir\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(
            outcome.executed,
            [CommandId::Del, CommandId::Del, CommandId::Dir]
        );
        assert!(d.store().is_empty());
        assert!(script.output().ends_with("Contents:\n\n"));
    }

    #[test]
    fn test_abort_skips_abortable() {
        let mut d = dispatcher();
        d.store_mut().insert("a.txt", b"data").unwrap();
        let mut script = Script::new(b"DEL a.txt\nHELP\n");
        let outcome = d.process(&mut script, true);
        assert_eq!(outcome.skipped, [CommandId::Del]);
        assert_eq!(outcome.executed, [CommandId::Help]);
        assert!(d.store_mut().exists("a.txt"));
        assert!(script.output().starts_with("HELP"));
        assert!(!outcome.ok());
    }

    #[test]
    fn test_abort_discards_stream() {
        let mut d = dispatcher();
        let mut script = Script::new(b"UPLOAD f.txt\nhello world\nDIR\n");
        let outcome = d.process(&mut script, true);
        assert_eq!(outcome.skipped, [CommandId::Upload]);
        assert!(outcome.executed.is_empty());
        assert_eq!(script.available(), 0);
        assert!(!d.store_mut().exists("f.txt"));
        assert!(script.output().is_empty());
    }

    #[test]
    fn test_upload_takes_over_stream() {
        let mut d = dispatcher();
        let mut script = Script::new(b"UPLOAD f.txt\nhello world\nDIR\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.executed, [CommandId::Upload]);
        assert_eq!(outcome.phase, DispatchPhase::Seeking);
        assert_eq!(outcome.streamed, Some(CommandId::Upload));
        assert_eq!(
            d.store().contents("f.txt").unwrap(),
            b"hello world\nDIR\n"
        );
        assert!(!script.output().contains("Contents:"));
    }

    #[test]
    fn test_failed_upload_counts_consumed_bytes() {
        let mut d = dispatcher();
        d.store_mut().add_dir("logs").unwrap();
        let input = b"UPLOAD logs\npayload\n";
        let mut script = Script::new(input);
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.streamed, Some(CommandId::Upload));
        assert_eq!(script.available(), 0);
        assert_eq!(outcome.bytes_read, input.len());
        assert_eq!(script.output(), "Error: unable to write to file logs\n");
    }

    #[test]
    fn test_upload_suppresses_leading_whitespace() {
        let mut d = dispatcher();
        let mut script = Script::new(b"upload f.txt \n\n   hello world\n");
        d.process(&mut script, false);
        assert_eq!(d.store().contents("f.txt").unwrap(), b"hello world\n");
    }

    #[test]
    fn test_cat_missing_file_continues() {
        let mut d = dispatcher();
        d.store_mut().insert("b.txt", b"line one\r\nline two").unwrap();
        let mut script = Script::new(b"CAT a.txt CAT b.txt\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.executed, [CommandId::Cat, CommandId::Cat]);
        assert_eq!(
            script.output(),
            "\r\nread file to stream [a.txt]\r\nError: unable to open a.txt\n\
             \r\nread file to stream [b.txt]\r\nline one\nline two\n"
        );
    }

    #[test]
    fn test_chip_command() {
        let mut d = dispatcher().with_programmer(Programmer::new(
            ProgrammerKind::Updi,
            Box::new(SimulatedTarget::new([0x1E, 0x96, 0x51])),
        ));
        let mut script = Script::new(b"chip\n");
        let outcome = d.process(&mut script, false);
        assert!(outcome.ok());
        assert_eq!(
            script.output(),
            "UPDI target: signature 1E 96 51 (ATmega4809)\n"
        );
    }

    #[test]
    fn test_empty_input() {
        let mut d = dispatcher();
        let mut script = Script::new(b"");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.phase, DispatchPhase::Seeking);
        assert!(outcome.executed.is_empty());
        assert!(outcome.ok());
    }

    #[test]
    fn test_nul_bytes_are_ignored_between_commands() {
        let mut d = dispatcher();
        let mut script = Script::new(b"\0\0INFO\x001 2\n");
        let outcome = d.process(&mut script, false);
        assert_eq!(outcome.executed, [CommandId::Info]);
    }
}
