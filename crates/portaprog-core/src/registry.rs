//! Command registry
//!
//! A static, ordered table describing every command the channel accepts.
//! The order of the table is also the order of the `HELP` listing.

use bitflags::bitflags;
use core::fmt;

/// Longest token the tokenizer delivers in one piece
pub const MAX_NETWORK_TEXT: usize = 256;

/// Command identifiers
///
/// `None` is the reserved "no active command" value and never appears in
/// the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// No command
    None,
    /// Help text
    Help,
    /// Echo two parameters back
    Info,
    /// Report the attached target device
    Chip,
    /// List files
    Dir,
    /// Delete a file
    Del,
    /// Send a file back to the client
    Cat,
    /// Store the connection's raw stream into a file
    Upload,
}

bitflags! {
    /// Per-command behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u8 {
        /// The remainder of the connection is consumed as raw bytes
        const STREAM    = 1 << 0;
        /// Skipped instead of executed when the pass is aborted
        const ABORTABLE = 1 << 1;
    }
}

/// One row of the command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Unique identifier
    pub id: CommandId,
    /// Name matched case-insensitively against tokens
    pub name: &'static str,
    /// Parameter summary for help output
    pub params: &'static str,
    /// One line description for help output
    pub desc: &'static str,
    /// Number of tokens collected before the command runs
    pub args: u8,
    /// Stream and abort behavior
    pub flags: CommandFlags,
}

impl CommandDescriptor {
    /// Whether the command takes over the raw connection after its arguments
    pub fn has_stream(&self) -> bool {
        self.flags.contains(CommandFlags::STREAM)
    }

    /// Whether the command is skipped in an aborted pass
    pub fn abortable(&self) -> bool {
        self.flags.contains(CommandFlags::ABORTABLE)
    }

    /// Case-insensitive exact name match
    pub fn matches(&self, token: &[u8]) -> bool {
        self.name.as_bytes().eq_ignore_ascii_case(token)
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} {:<16} - {}", self.name, self.params, self.desc)
    }
}

/// The commands understood by the device, in help order
pub static COMMANDS: [CommandDescriptor; 7] = [
    CommandDescriptor {
        id: CommandId::Help,
        name: "HELP",
        params: "",
        desc: "return help text",
        args: 0,
        flags: CommandFlags::empty(),
    },
    CommandDescriptor {
        id: CommandId::Info,
        name: "INFO",
        params: "<num> <num>",
        desc: "echo two parameters (for testing)",
        args: 2,
        flags: CommandFlags::ABORTABLE,
    },
    CommandDescriptor {
        id: CommandId::Chip,
        name: "CHIP",
        params: "",
        desc: "return chip information",
        args: 0,
        flags: CommandFlags::ABORTABLE,
    },
    CommandDescriptor {
        id: CommandId::Del,
        name: "DEL",
        params: "<name>",
        desc: "delete file from SPIFFS",
        args: 1,
        flags: CommandFlags::ABORTABLE,
    },
    CommandDescriptor {
        id: CommandId::Cat,
        name: "CAT",
        params: "<name>",
        desc: "stream contents of file",
        args: 1,
        flags: CommandFlags::ABORTABLE,
    },
    CommandDescriptor {
        id: CommandId::Upload,
        name: "UPLOAD",
        params: "<name> (stream)",
        desc: "save any type of data stream to SPIFFS",
        args: 1,
        flags: CommandFlags::STREAM.union(CommandFlags::ABORTABLE),
    },
    CommandDescriptor {
        id: CommandId::Dir,
        name: "DIR",
        params: "",
        desc: "list files on SPIFFS",
        args: 0,
        flags: CommandFlags::ABORTABLE,
    },
];

/// Read-only view over a command table
///
/// Built once at startup and handed to every dispatcher by reference.
#[derive(Debug, Clone, Copy)]
pub struct Registry {
    commands: &'static [CommandDescriptor],
}

impl Registry {
    /// Registry over the device's standard command set
    pub const fn standard() -> Self {
        Self {
            commands: &COMMANDS,
        }
    }

    /// Find the command named by `token`
    pub fn lookup(&self, token: &[u8]) -> Option<&'static CommandDescriptor> {
        let commands: &'static [CommandDescriptor] = self.commands;
        commands.iter().find(|cmd| cmd.matches(token))
    }

    /// Find a command by id
    pub fn get(&self, id: CommandId) -> Option<&'static CommandDescriptor> {
        let commands: &'static [CommandDescriptor] = self.commands;
        commands.iter().find(|cmd| cmd.id == id)
    }

    /// Iterate in help order
    pub fn iter(&self) -> core::slice::Iter<'static, CommandDescriptor> {
        let commands: &'static [CommandDescriptor] = self.commands;
        commands.iter()
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True for an empty table
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_lookup_case_insensitive() {
        let reg = Registry::standard();
        assert_eq!(reg.lookup(b"del").map(|c| c.id), Some(CommandId::Del));
        assert_eq!(reg.lookup(b"Upload").map(|c| c.id), Some(CommandId::Upload));
        assert_eq!(reg.lookup(b"HELP").map(|c| c.id), Some(CommandId::Help));
    }

    #[test]
    fn test_lookup_exact_only() {
        let reg = Registry::standard();
        assert!(reg.lookup(b"DE").is_none());
        assert!(reg.lookup(b"DELETE").is_none());
        assert!(reg.lookup(b"").is_none());
    }

    #[test]
    fn test_ids_unique() {
        let reg = Registry::standard();
        for (i, a) in reg.iter().enumerate() {
            assert_ne!(a.id, CommandId::None);
            for b in reg.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn test_flags() {
        let reg = Registry::standard();
        let upload = reg.get(CommandId::Upload).unwrap();
        assert!(upload.has_stream());
        assert!(upload.abortable());
        let help = reg.get(CommandId::Help).unwrap();
        assert!(!help.has_stream());
        assert!(!help.abortable());
        assert_eq!(reg.iter().filter(|c| c.has_stream()).count(), 1);
    }

    #[test]
    fn test_help_line_format() {
        let del = Registry::standard().get(CommandId::Del).unwrap();
        assert_eq!(
            format!("{}", del),
            "DEL      <name>           - delete file from SPIFFS"
        );
    }
}
