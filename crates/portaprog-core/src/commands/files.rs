//! File commands: DIR, DEL, CAT and UPLOAD

use crate::error::{Error, Result};
use crate::line::{read_line, strip_newline};
use crate::registry::MAX_NETWORK_TEXT;
use crate::reply;
use crate::store::{FileStore, OpenMode};
use crate::stream::{ByteSink, Stream};

/// Largest block UPLOAD moves from the connection to a file at once
pub const MAX_CHUNK: usize = MAX_NETWORK_TEXT;

/// What an upload moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Bytes taken off the connection
    pub consumed: usize,
    /// Bytes stored in the file
    pub written: usize,
}

/// `DIR`: list the file store
pub fn dir<S, F>(client: &mut S, store: &mut F, show_hidden: bool)
where
    S: Stream + ?Sized,
    F: FileStore,
{
    reply!(client, "Contents:\n");
    let mut reset = true;
    while let Some(entry) = store.list(reset, show_hidden) {
        reset = false;
        reply!(client, "\t{}\n", entry);
    }
    reply!(client, "\n");
}

/// `DEL <name>`: remove a file
pub fn del<S, F>(client: &mut S, store: &mut F, name: &str) -> Result<()>
where
    S: Stream + ?Sized,
    F: FileStore,
{
    if !store.exists(name) {
        reply!(client, "Error: file {} does not exist\n", name);
        return Err(Error::FileNotFound);
    }
    match store.delete(name) {
        Ok(()) => {
            log::info!("deleted {}", name);
            reply!(client, "File {} deleted\n", name);
            Ok(())
        }
        Err(e) => {
            log::warn!("deleting {} failed: {}", name, e);
            reply!(client, "Error: unable to delete {}\n", name);
            Err(e)
        }
    }
}

/// `CAT <name>`: copy a file to the client line by line
pub fn cat<S, F>(client: &mut S, store: &mut F, name: &str) -> Result<()>
where
    S: Stream + ?Sized,
    F: FileStore,
{
    reply!(client, "\r\nread file to stream [{}]\r\n", name);

    let mut file = match store.open(name, OpenMode::Read) {
        Ok(file) => file,
        Err(e) => {
            reply!(client, "Error: unable to open {}\n", name);
            return Err(e);
        }
    };

    let mut line = [0u8; MAX_NETWORK_TEXT];
    loop {
        let len = read_line(&mut file, &mut line, false);
        if len == 0 {
            break;
        }
        let len = strip_newline(&line, len);
        client.write(&line[..len]);
        client.write(b"\n");
    }
    client.flush();
    store.close(file);
    Ok(())
}

/// `UPLOAD <name>`: take over the connection and store everything after
/// the command in a file
///
/// The remaining bytes are copied in chunks of at most [`MAX_CHUNK`]. At the
/// start of each chunk spaces and line feeds are skipped, carriage returns
/// are always dropped and a NUL byte ends the chunk. An empty chunk ends the
/// upload. When the file cannot be opened the bytes are still consumed.
///
/// The stats are returned even when the upload fails, so callers can account
/// for what was taken off the connection.
pub fn upload<S, F>(client: &mut S, store: &mut F, name: &str) -> (UploadStats, Result<()>)
where
    S: Stream + ?Sized,
    F: FileStore,
{
    let mut file = store.open(name, OpenMode::Write).ok();
    if file.is_none() {
        reply!(client, "Error: unable to write to file {}\n", name);
    }

    let mut stats = UploadStats::default();
    let mut short_write = false;
    let mut chunk: heapless::Vec<u8, MAX_CHUNK> = heapless::Vec::new();
    loop {
        chunk.clear();
        while !chunk.is_full() && client.available() > 0 {
            let Some(c) = client.read_byte() else {
                break;
            };
            stats.consumed += 1;
            match c {
                0 => break,
                b'\r' => {}
                b' ' | b'\n' if chunk.is_empty() => {}
                _ => {
                    let _ = chunk.push(c);
                }
            }
        }
        if chunk.is_empty() {
            break;
        }
        if let Some(f) = file.as_mut() {
            let n = f.write(&chunk);
            if n < chunk.len() {
                short_write = true;
            }
            stats.written += n;
        }
    }

    let Some(f) = file else {
        log::warn!("UPLOAD {}: discarded {} bytes", name, stats.consumed);
        return (stats, Err(Error::OpenFailed));
    };
    store.close(f);
    log::info!("UPLOAD {}: wrote {} bytes", name, stats.written);

    if short_write {
        reply!(client, "Error: unable to write to file {}\n", name);
        return (stats, Err(Error::WriteFailed));
    }
    (stats, Ok(()))
}
