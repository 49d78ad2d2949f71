//! Sink engine: receives the client's record stream into the shared tree.
//!
//! The engine invites transmission with one `0x00` ack, then loops over
//! records, mirroring the client's traversal with a directory stack rooted
//! at the shared root (or at the target when the target names a directory).
//! Every destination is re-resolved against the live filesystem before it
//! is created or written, so a link planted under the root cannot redirect
//! an operation outside it. Protocol violations are answered with a fatal
//! status and end the session with exit status 1; a clean end of stream
//! ends it with 0.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use scpd_protocol::{ack, record, ControlRecord, MODE_MASK};

use crate::error::{EngineError, EngineResult};
use crate::exit_status::ExitStatus;
use crate::meta::reason;
use crate::path_gate::{self, client_name};
use crate::request::TransferRequest;

/// Message carried by the fatal status on a protocol violation.
const PROTOCOL_ERROR: &str = "scp: Protocol Error";

/// Runs the sink side of a transfer over `channel`.
///
/// The request's single target is resolved through the path gate; a
/// trailing `/`, the `-d` flag, or a recursive request all mark it as a
/// directory target.
pub async fn run_sink<S>(
    channel: &mut S,
    root: &Path,
    request: &TransferRequest,
) -> EngineResult<ExitStatus>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(target) = request.targets.first() else {
        return Err(EngineError::MissingTarget);
    };
    let target_is_directory =
        request.target_is_directory || request.recursive || target.ends_with('/');

    let resolved = match path_gate::resolve(root, target) {
        Ok(resolved) => resolved,
        Err(escape) => {
            tracing::info!(%escape, "refusing sink target outside the shared root");
            ack::write_warning(channel, &format!("scp: {target}: Not a directory")).await?;
            return Ok(ExitStatus::Failure);
        }
    };

    let stack = if target_is_directory {
        let confined = match confine(root, &resolved).await {
            Ok(confined) => confined,
            Err(error) => {
                ack::write_warning(channel, &format!("scp: {target}: {}", reason(&error))).await?;
                return Ok(ExitStatus::Failure);
            }
        };
        if let Err(error) = create_dir_if_missing(&confined).await {
            ack::write_warning(channel, &format!("scp: {target}: {}", reason(&error))).await?;
            return Ok(ExitStatus::Failure);
        }
        DirectoryStack::with_target(confined)
    } else {
        DirectoryStack::at_root(root.to_path_buf())
    };

    let mut sink = Sink {
        channel: BufReader::new(channel),
        root,
        target_is_directory,
        file_target: resolved,
        preserve_times: request.preserve_times,
        pending_times: None,
        stack,
    };
    sink.run().await
}

struct Sink<'a, S> {
    channel: BufReader<&'a mut S>,
    root: &'a Path,
    target_is_directory: bool,
    /// Destination for a file received into a non-directory target.
    file_target: PathBuf,
    preserve_times: bool,
    pending_times: Option<(i64, i64)>,
    stack: DirectoryStack,
}

impl<S> Sink<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self) -> EngineResult<ExitStatus> {
        // Invite the client to start sending.
        ack::write_ok(self.channel.get_mut()).await?;

        loop {
            let record = match record::read_record(&mut self.channel).await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(error) if error.is_violation() => {
                    tracing::warn!(%error, "protocol violation from client");
                    return self.protocol_error().await;
                }
                Err(error) => return Err(error.into()),
            };

            match record {
                ControlRecord::Times {
                    mtime_sec,
                    atime_sec,
                } => {
                    self.pending_times = Some((mtime_sec, atime_sec));
                    ack::write_ok(self.channel.get_mut()).await?;
                }
                ControlRecord::DirEnter { mode: _, name } => {
                    if !self.enter_directory(&name).await? {
                        return Ok(ExitStatus::Failure);
                    }
                }
                ControlRecord::DirLeave => {
                    if self.stack.leave().is_err() {
                        return self.protocol_error().await;
                    }
                    ack::write_ok(self.channel.get_mut()).await?;
                }
                ControlRecord::FileHeader { mode, size, name } => {
                    if !self.receive_file(mode, size, &name).await? {
                        return Ok(ExitStatus::Failure);
                    }
                }
            }
        }

        if self.stack.depth() != self.stack.floor() {
            tracing::debug!(
                depth = self.stack.depth(),
                "stream ended with an unbalanced directory stack"
            );
        }
        Ok(ExitStatus::Success)
    }

    /// Creates and enters a received directory. `Ok(false)` means the
    /// failure was reported and the session must end with status 1.
    async fn enter_directory(&mut self, name: &str) -> EngineResult<bool> {
        self.pending_times = None;
        if !valid_component(name) {
            self.protocol_error().await?;
            return Ok(false);
        }

        let dest = self.stack.dest(name);
        let shown = client_name(self.root, &dest);
        let confined = match confine(self.root, &dest).await {
            Ok(confined) => confined,
            Err(error) => return self.file_error(&shown, &error).await,
        };
        if let Err(error) = create_dir_if_missing(&confined).await {
            return self.file_error(&shown, &error).await;
        }

        self.stack.enter(name);
        ack::write_ok(self.channel.get_mut()).await?;
        Ok(true)
    }

    /// Receives one file payload. `Ok(false)` means the failure was
    /// reported and the session must end with status 1.
    async fn receive_file(&mut self, mode: u32, size: u64, name: &str) -> EngineResult<bool> {
        let times = self.pending_times.take();
        if !valid_component(name) {
            self.protocol_error().await?;
            return Ok(false);
        }

        let dest = if self.target_is_directory {
            self.stack.dest(name)
        } else {
            self.file_target.clone()
        };
        let shown = client_name(self.root, &dest);
        let confined = match confine(self.root, &dest).await {
            Ok(confined) => confined,
            Err(error) => return self.file_error(&shown, &error).await,
        };

        let mut file = match File::create(&confined).await {
            Ok(file) => file,
            Err(error) => return self.file_error(&shown, &error).await,
        };
        ack::write_ok(self.channel.get_mut()).await?;

        let copied = {
            let mut limited = (&mut self.channel).take(size);
            tokio::io::copy(&mut limited, &mut file).await?
        };
        if copied != size {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "payload ended before the declared size",
            )));
        }
        file.flush().await?;
        drop(file);

        let permissions = std::fs::Permissions::from_mode(mode & MODE_MASK);
        if let Err(error) = fs::set_permissions(&confined, permissions).await {
            return self.file_error(&shown, &error).await;
        }

        if self.preserve_times {
            if let Some((mtime_sec, atime_sec)) = times {
                let applied = filetime::set_file_times(
                    &confined,
                    FileTime::from_unix_time(atime_sec, 0),
                    FileTime::from_unix_time(mtime_sec, 0),
                );
                if let Err(error) = applied {
                    return self.file_error(&shown, &error).await;
                }
            }
        }

        // The client closes the payload with one status byte; its value
        // carries nothing the sink acts on.
        let mut terminator = [0u8; 1];
        self.channel.read_exact(&mut terminator).await?;
        ack::write_ok(self.channel.get_mut()).await?;
        Ok(true)
    }

    async fn protocol_error(&mut self) -> EngineResult<ExitStatus> {
        ack::write_fatal(self.channel.get_mut(), PROTOCOL_ERROR).await?;
        Ok(ExitStatus::Failure)
    }

    async fn file_error(&mut self, shown: &str, error: &io::Error) -> EngineResult<bool> {
        tracing::warn!(%shown, %error, "sink filesystem operation failed");
        ack::write_warning(
            self.channel.get_mut(),
            &format!("scp: {shown}: {}", reason(error)),
        )
        .await?;
        Ok(false)
    }
}

/// The running receive path, optionally rooted at the request target.
///
/// `current` stays canonical: the base is confined before it is adopted,
/// and every entered component is re-confined and created as a real
/// directory first.
#[derive(Debug)]
struct DirectoryStack {
    current: PathBuf,
    depth: usize,
    floor: usize,
}

/// Marker for a `DirLeave` with nothing left to pop.
#[derive(Debug, PartialEq, Eq)]
struct StackUnderflow;

impl DirectoryStack {
    /// Stack for a directory target: the target is its permanent base.
    fn with_target(target: PathBuf) -> Self {
        Self {
            current: target,
            depth: 1,
            floor: 1,
        }
    }

    /// Stack for a plain file target, based at the shared root.
    fn at_root(root: PathBuf) -> Self {
        Self {
            current: root,
            depth: 0,
            floor: 0,
        }
    }

    fn dest(&self, name: &str) -> PathBuf {
        self.current.join(name)
    }

    fn enter(&mut self, name: &str) {
        self.current.push(name);
        self.depth += 1;
    }

    fn leave(&mut self) -> Result<(), StackUnderflow> {
        if self.depth <= self.floor {
            return Err(StackUnderflow);
        }
        self.current.pop();
        self.depth -= 1;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn floor(&self) -> usize {
        self.floor
    }
}

/// Re-resolves `dest` against the live filesystem before it is touched:
/// the parent must canonicalise back under `root`, and an entry already
/// sitting at `dest` must not be a symbolic link. The lexical checks in
/// [`path_gate`] cannot catch links planted under the root by earlier
/// transfers.
async fn confine(root: &Path, dest: &Path) -> io::Result<PathBuf> {
    if dest == root {
        return Ok(dest.to_path_buf());
    }
    let (Some(parent), Some(leaf)) = (dest.parent(), dest.file_name()) else {
        return Err(escape_refusal());
    };
    let canonical_parent = fs::canonicalize(parent).await?;
    if !canonical_parent.starts_with(root) {
        return Err(escape_refusal());
    }
    let confined = canonical_parent.join(leaf);
    match fs::symlink_metadata(&confined).await {
        Ok(metadata) if metadata.file_type().is_symlink() => Err(escape_refusal()),
        _ => Ok(confined),
    }
}

/// Deliberately vague, like every other sink-side path rejection.
fn escape_refusal() -> io::Error {
    io::Error::new(io::ErrorKind::NotADirectory, "Not a directory")
}

async fn create_dir_if_missing(path: &Path) -> io::Result<()> {
    match fs::create_dir(path).await {
        Ok(()) => fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await,
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            // Whatever is already there must be a real directory; a link
            // would carry later writes outside the root.
            let metadata = fs::symlink_metadata(path).await?;
            if metadata.file_type().is_dir() {
                Ok(())
            } else {
                Err(escape_refusal())
            }
        }
        Err(error) => Err(error),
    }
}

/// Record names become single path components; anything that could walk
/// the tree on its own is a protocol violation.
fn valid_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_with_target_starts_at_depth_one() {
        let stack = DirectoryStack::with_target(PathBuf::from("/srv/share/dest"));
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.floor(), 1);
    }

    #[test]
    fn enter_pushes_exactly_one_component() {
        let mut stack = DirectoryStack::with_target(PathBuf::from("/srv/share/dest"));
        stack.enter("sub");
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.dest("f.txt"), PathBuf::from("/srv/share/dest/sub/f.txt"));
    }

    #[test]
    fn leave_returns_to_the_base() {
        let mut stack = DirectoryStack::with_target(PathBuf::from("/srv/share/dest"));
        stack.enter("sub");
        assert!(stack.leave().is_ok());
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.dest("f.txt"), PathBuf::from("/srv/share/dest/f.txt"));
    }

    #[test]
    fn leave_below_the_floor_underflows() {
        let mut stack = DirectoryStack::with_target(PathBuf::from("/srv/share/dest"));
        assert_eq!(stack.leave(), Err(StackUnderflow));

        let mut floating = DirectoryStack::at_root(PathBuf::from("/srv/share"));
        assert_eq!(floating.leave(), Err(StackUnderflow));
        floating.enter("sub");
        assert!(floating.leave().is_ok());
        assert_eq!(floating.leave(), Err(StackUnderflow));
    }

    #[test]
    fn component_validation_rejects_traversal_names() {
        assert!(valid_component("plain.txt"));
        assert!(!valid_component(""));
        assert!(!valid_component("."));
        assert!(!valid_component(".."));
        assert!(!valid_component("a/b"));
    }
}
