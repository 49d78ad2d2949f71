//! Source engine: walks the shared tree and streams entries to the client.
//!
//! The client opens the exchange with one `0x00` ack; after that the engine
//! emits one record at a time and waits for the matching ack before the
//! next. File payloads are terminated by a single `0x00` and acked like a
//! record. Per-entry failures become `\x01`-prefixed reports and the walk
//! continues; a fatal ack or a transport failure ends the session.

use std::io;
use std::path::Path;

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use scpd_protocol::{ack, ClientStatus, ControlRecord, ProtocolError};

use crate::error::{EngineError, EngineResult};
use crate::exit_status::ExitStatus;
use crate::meta::{leaf_name, mode_bits, reason, times_record};
use crate::path_gate::{self, client_name};
use crate::request::TransferRequest;

/// Runs the source side of a transfer over `channel`.
///
/// Returns the exit status to report: failure when any matched entry could
/// not be sent, success otherwise. Targets that resolve to nothing are
/// reported to the client but do not fail the session.
pub async fn run_source<S>(
    channel: &mut S,
    root: &Path,
    request: &TransferRequest,
) -> EngineResult<ExitStatus>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut source = Source {
        channel: BufReader::new(channel),
        root,
        recursive: request.recursive,
        preserve_times: request.preserve_times,
        dirty: false,
    };
    source.run(&request.targets).await
}

struct Source<'a, S> {
    channel: BufReader<&'a mut S>,
    root: &'a Path,
    recursive: bool,
    preserve_times: bool,
    dirty: bool,
}

impl<S> Source<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, targets: &[String]) -> EngineResult<ExitStatus> {
        // The client invites transmission with the first ack.
        match ack::read_client_status(&mut self.channel).await? {
            ClientStatus::Ok => {}
            status => {
                tracing::warn!(?status, "client declined the transfer");
                return Ok(ExitStatus::Failure);
            }
        }

        for target in targets {
            self.send_target(target).await?;
        }

        Ok(if self.dirty {
            ExitStatus::Failure
        } else {
            ExitStatus::Success
        })
    }

    async fn send_target(&mut self, target: &str) -> EngineResult<()> {
        let resolved = match path_gate::resolve(self.root, target) {
            Ok(resolved) => resolved,
            Err(escape) => {
                tracing::info!(%escape, "refusing target outside the shared root");
                return self.not_found(target).await;
            }
        };

        let pattern = resolved.to_string_lossy().into_owned();
        let matches = match glob::glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(error) => {
                        tracing::debug!(%error, "skipping unreadable glob match");
                        None
                    }
                })
                .collect::<Vec<_>>(),
            Err(error) => {
                tracing::debug!(%error, target, "glob pattern rejected");
                return self.not_found(target).await;
            }
        };
        if matches.is_empty() {
            return self.not_found(target).await;
        }

        for path in matches {
            self.send_entry(&path).await?;
        }
        Ok(())
    }

    async fn send_entry(&mut self, path: &Path) -> EngineResult<()> {
        let name = client_name(self.root, path);

        // Canonicalising catches symbolic links that point outside the
        // shared root; those entries do not exist as far as the client is
        // concerned.
        let canonical = match fs::canonicalize(path).await {
            Ok(canonical) => canonical,
            Err(error) => return self.entry_error(&name, &reason(&error)).await,
        };
        if !canonical.starts_with(self.root) {
            tracing::info!(path = %path.display(), "entry resolves outside the shared root");
            return self
                .warn(&format!("scp: {name}: No such file or directory"))
                .await;
        }

        let metadata = match fs::metadata(&canonical).await {
            Ok(metadata) => metadata,
            Err(error) => return self.entry_error(&name, &reason(&error)).await,
        };

        if metadata.is_dir() {
            if !self.recursive {
                return self.entry_error(&name, "not a regular file").await;
            }
            self.send_directory(&canonical, &name, &metadata).await
        } else if metadata.is_file() {
            self.send_file(&canonical, &name).await
        } else {
            self.entry_error(&name, "not a regular file").await
        }
    }

    async fn send_directory(
        &mut self,
        path: &Path,
        name: &str,
        metadata: &std::fs::Metadata,
    ) -> EngineResult<()> {
        let header = ControlRecord::DirEnter {
            mode: mode_bits(metadata),
            name: leaf_name(path),
        };
        // Encode before emitting anything so a refused header cannot leave
        // a dangling times record on the wire.
        let header_bytes = match header.encode() {
            Ok(bytes) => bytes,
            Err(error) => return self.entry_error(name, &refusal_reason(&error)).await,
        };

        if self.preserve_times {
            self.send_record(&times_record(metadata)).await?;
        }
        self.send_bytes(&header_bytes).await?;

        let mut children = Vec::new();
        match fs::read_dir(path).await {
            Ok(mut entries) => loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => children.push(entry.file_name()),
                    Ok(None) => break,
                    Err(error) => {
                        self.entry_error(name, &reason(&error)).await?;
                        break;
                    }
                }
            },
            Err(error) => self.entry_error(name, &reason(&error)).await?,
        }
        children.sort();

        for child in children {
            let child_path = path.join(&child);
            match fs::symlink_metadata(&child_path).await {
                Ok(child_meta) if child_meta.file_type().is_symlink() => {
                    tracing::debug!(path = %child_path.display(), "skipping symbolic link during descent");
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    let child_name = client_name(self.root, &child_path);
                    self.entry_error(&child_name, &reason(&error)).await?;
                    continue;
                }
            }
            Box::pin(self.send_entry(&child_path)).await?;
        }

        self.send_record(&ControlRecord::DirLeave).await
    }

    async fn send_file(&mut self, path: &Path, name: &str) -> EngineResult<()> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(error) => return self.entry_error(name, &reason(&error)).await,
        };
        let metadata = match file.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => return self.entry_error(name, &reason(&error)).await,
        };

        let declared = metadata.len();
        let header = ControlRecord::FileHeader {
            mode: mode_bits(&metadata),
            size: declared,
            name: leaf_name(path),
        };
        let header_bytes = match header.encode() {
            Ok(bytes) => bytes,
            Err(error) => return self.entry_error(name, &refusal_reason(&error)).await,
        };

        if self.preserve_times {
            self.send_record(&times_record(&metadata)).await?;
        }
        self.send_bytes(&header_bytes).await?;

        let copied = {
            let mut limited = (&mut file).take(declared);
            tokio::io::copy(&mut limited, self.channel.get_mut()).await?
        };
        if copied != declared {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank during transfer", path.display()),
            )));
        }

        // A single zero byte closes the payload.
        ack::write_ok(self.channel.get_mut()).await?;
        self.expect_ok().await
    }

    async fn send_record(&mut self, record: &ControlRecord) -> EngineResult<()> {
        let bytes = record.encode()?;
        self.send_bytes(&bytes).await
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> EngineResult<()> {
        self.channel.get_mut().write_all(bytes).await?;
        self.channel.get_mut().flush().await?;
        self.expect_ok().await
    }

    async fn expect_ok(&mut self) -> EngineResult<()> {
        match ack::read_client_status(&mut self.channel).await? {
            ClientStatus::Ok => Ok(()),
            ClientStatus::Warning(message) => {
                tracing::warn!(%message, "client reported a recoverable error");
                self.dirty = true;
                Ok(())
            }
            ClientStatus::Fatal(message) => Err(EngineError::ClientAbort(message)),
        }
    }

    async fn warn(&mut self, message: &str) -> EngineResult<()> {
        ack::write_warning(self.channel.get_mut(), message).await?;
        Ok(())
    }

    async fn not_found(&mut self, target: &str) -> EngineResult<()> {
        self.warn(&format!("scp: {target}: No such file or directory"))
            .await
    }

    async fn entry_error(&mut self, name: &str, reason: &str) -> EngineResult<()> {
        self.dirty = true;
        self.warn(&format!("scp: {name}: {reason}")).await
    }
}

/// Reason text when the codec refuses to emit a header for a local entry.
fn refusal_reason(error: &ProtocolError) -> String {
    match error {
        ProtocolError::RecordTooLong => "File name too long".to_string(),
        ProtocolError::InvalidName => "invalid file name".to_string(),
        other => other.to_string(),
    }
}
