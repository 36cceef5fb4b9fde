//! Scoped redirection of process-level output descriptors.
//!
//! Redirection happens at the file-descriptor level, so everything that writes to the descriptor
//! is captured: Rust code, native libraries linked into the process and child processes that
//! inherit it. The original binding is restored exactly once when the scope ends, whether the
//! body returns normally, returns an error, or panics.
//!
//! # Example
//!
//! ```rust
//! use std::io::Write;
//! use rusty_fuse::redirect::with_redirected_output;
//!
//! let dir = std::env::temp_dir().join("rusty_fuse_doc");
//! std::fs::create_dir_all(&dir).unwrap();
//! let dump = dir.join("dump.txt");
//!
//! with_redirected_output(&dump, || {
//!     let mut stdout = std::io::stdout();
//!     stdout.write_all(b"captured\n").unwrap();
//!     stdout.flush().unwrap();
//! })
//! .unwrap();
//!
//! assert_eq!(std::fs::read_to_string(&dump).unwrap(), "captured\n");
//! ```
use std::cell::Cell;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd::{dup, dup2};

/// The sink used when output should simply be discarded.
pub const DEFAULT_SINK: &str = "/dev/null";

/// Serializes redirections across threads: the descriptors are process-wide state.
static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    /// Number of redirections currently active on this thread.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Error types for the redirect module.
#[derive(Debug, PartialEq)]
pub enum RedirectError {
    /// The descriptor to redirect is not bound to an open OS-level channel.
    DescriptorNotOpen { fd: RawFd },
    /// The redirection target could not be opened for writing.
    OpenTarget { path: PathBuf, reason: String },
    /// The original binding of the descriptor could not be duplicated or replaced.
    Duplicate { fd: RawFd, reason: String },
    /// Pending buffered output could not be flushed.
    Flush(String),
    /// The original binding could not be put back.
    Restore { fd: RawFd, reason: String },
}

impl fmt::Display for RedirectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RedirectError::DescriptorNotOpen { fd } => write!(
                f,
                "Descriptor {} is not bound to an open output channel",
                fd
            ),
            RedirectError::OpenTarget { path, reason } => {
                write!(f, "Cannot open {} for writing: {}", path.display(), reason)
            }
            RedirectError::Duplicate { fd, reason } => {
                write!(f, "Cannot redirect descriptor {}: {}", fd, reason)
            }
            RedirectError::Flush(e) => write!(f, "Cannot flush pending output: {}", e),
            RedirectError::Restore { fd, reason } => {
                write!(f, "Cannot restore descriptor {}: {}", fd, reason)
            }
        }
    }
}

impl std::error::Error for RedirectError {}

/// An active redirection of one descriptor into a file.
///
/// The guard owns the duplicate of the descriptor's original binding and puts it back when
/// [`OutputRedirect::restore`] is called or, failing that, when the guard is dropped.
/// Redirections nest: each guard restores the binding it saved, so inner guards must end
/// before outer ones (the closure forms guarantee it). The guard cannot leave its thread.
#[must_use = "the redirection ends as soon as the guard is dropped"]
pub struct OutputRedirect {
    fd: RawFd,
    saved: Option<OwnedFd>,
    target: Option<File>,
    _lock: Option<MutexGuard<'static, ()>>,
}

impl OutputRedirect {
    /// Redirects the process standard output into the file at `to`.
    pub fn stdout<P: AsRef<Path>>(to: P) -> Result<Self, RedirectError> {
        Self::descriptor(io::stdout().as_raw_fd(), to)
    }

    /// Redirects the descriptor `fd` into the file at `to`, creating or truncating it.
    /// The function returns an error, without touching the descriptor, if it is not open or if
    /// the target cannot be opened.
    pub fn descriptor<P: AsRef<Path>>(fd: RawFd, to: P) -> Result<Self, RedirectError> {
        let lock = match DEPTH.with(Cell::get) {
            0 => Some(REDIRECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner)),
            _ => None,
        };

        if fcntl(fd, FcntlArg::F_GETFD).is_err() {
            return Err(RedirectError::DescriptorNotOpen { fd });
        }

        let path = to.as_ref();
        let target = File::create(path).map_err(|e| RedirectError::OpenTarget {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        flush_std_streams()?;

        let saved = dup(fd).map_err(|e| RedirectError::Duplicate {
            fd,
            reason: e.to_string(),
        })?;
        // SAFETY: `dup` just returned this descriptor and nothing else owns it.
        let saved = unsafe { OwnedFd::from_raw_fd(saved) };

        dup2(target.as_raw_fd(), fd).map_err(|e| RedirectError::Duplicate {
            fd,
            reason: e.to_string(),
        })?;

        DEPTH.with(|depth| depth.set(depth.get() + 1));
        log::debug!("Descriptor {} redirected to {}", fd, path.display());

        Ok(OutputRedirect {
            fd,
            saved: Some(saved),
            target: Some(target),
            _lock: lock,
        })
    }

    /// Returns the redirected descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Ends the redirection. The original binding is put back in every case; the error only
    /// reports output that could not be flushed into the target.
    ///
    /// If the original binding cannot be put back, the descriptor is left in an unknown state
    /// and the process aborts.
    pub fn restore(mut self) -> Result<(), RedirectError> {
        self.restore_binding()
    }

    fn restore_binding(&mut self) -> Result<(), RedirectError> {
        let saved = match self.saved.take() {
            Some(saved) => saved,
            None => return Ok(()),
        };
        let flushed = flush_std_streams();

        if let Err(e) = dup2(saved.as_raw_fd(), self.fd) {
            let e = RedirectError::Restore {
                fd: self.fd,
                reason: e.to_string(),
            };
            log::error!("{}", e);
            std::process::abort();
        }
        drop(saved);
        drop(self.target.take());
        log::debug!("Descriptor {} restored", self.fd);

        flushed
    }
}

impl Drop for OutputRedirect {
    fn drop(&mut self) {
        if let Err(e) = self.restore_binding() {
            log::warn!("{}", e);
        }
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn flush_std_streams() -> Result<(), RedirectError> {
    io::stdout()
        .flush()
        .and_then(|_| io::stderr().flush())
        .map_err(|e| RedirectError::Flush(e.to_string()))
}

/// Runs `body` with the process standard output redirected into the file at `to`.
/// The value returned by `body`, including any error it carries, is handed back unchanged once
/// the original output is restored.
pub fn with_redirected_output<P, F, R>(to: P, body: F) -> Result<R, RedirectError>
where
    P: AsRef<Path>,
    F: FnOnce() -> R,
{
    with_redirected_descriptor(io::stdout().as_raw_fd(), to, body)
}

/// Runs `body` with the descriptor `fd` redirected into the file at `to`.
pub fn with_redirected_descriptor<P, F, R>(fd: RawFd, to: P, body: F) -> Result<R, RedirectError>
where
    P: AsRef<Path>,
    F: FnOnce() -> R,
{
    let redirect = OutputRedirect::descriptor(fd, to)?;
    let output = body();
    redirect.restore()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, PartialEq)]
    struct ValueError(&'static str);

    fn console(dir: &TempDir) -> (File, PathBuf) {
        let path = dir.path().join("console.txt");
        (File::create(&path).unwrap(), path)
    }

    #[test]
    fn test_capture_into_target() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let target = dir.path().join("dump.txt");

        console.write_all(b"before\n").unwrap();
        with_redirected_descriptor(console.as_raw_fd(), &target, || {
            console.write_all(b"hello\n").unwrap();
        })
        .unwrap();
        console.write_all(b"after\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "before\nafter\n");
    }

    #[test]
    fn test_target_is_truncated() {
        let dir = tempdir().unwrap();
        let (mut console, _) = console(&dir);
        let target = dir.path().join("dump.txt");
        fs::write(&target, "stale content from a previous run\n").unwrap();

        with_redirected_descriptor(console.as_raw_fd(), &target, || {
            console.write_all(b"fresh\n").unwrap();
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "fresh\n");
    }

    #[test]
    fn test_binding_identity_restored() {
        let dir = tempdir().unwrap();
        let (console, _) = console(&dir);
        let target = dir.path().join("dump.txt");
        let original = console.metadata().unwrap().ino();

        let redirect = OutputRedirect::descriptor(console.as_raw_fd(), &target).unwrap();
        assert_eq!(console.metadata().unwrap().ino(), fs::metadata(&target).unwrap().ino());
        redirect.restore().unwrap();

        assert_eq!(console.metadata().unwrap().ino(), original);
    }

    #[test]
    fn test_error_value_passes_through() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let target = dir.path().join("dump.txt");

        let result = with_redirected_descriptor(console.as_raw_fd(), &target, || {
            console.write_all(b"partial\n").unwrap();
            Err::<(), _>(ValueError("boom"))
        });
        console.write_all(b"restored\n").unwrap();

        assert_eq!(result, Ok(Err(ValueError("boom"))));
        assert_eq!(fs::read_to_string(&target).unwrap(), "partial\n");
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "restored\n");
    }

    #[test]
    fn test_panic_restores_and_resumes() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let target = dir.path().join("dump.txt");
        let fd = console.as_raw_fd();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            with_redirected_descriptor(fd, &target, || -> () {
                console.write_all(b"before panic\n").unwrap();
                panic!("boom");
            })
        }));
        console.write_all(b"restored\n").unwrap();

        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "before panic\n");
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "restored\n");
        assert_eq!(DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn test_closed_descriptor_rejected_before_target_is_created() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("dump.txt");

        let result = OutputRedirect::descriptor(1_000_000, &target);

        assert_eq!(result.err(), Some(RedirectError::DescriptorNotOpen { fd: 1_000_000 }));
        assert!(!target.exists());
    }

    #[test]
    fn test_missing_directory_leaves_descriptor_untouched() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let target = dir.path().join("missing").join("dump.txt");

        let result = with_redirected_descriptor(console.as_raw_fd(), &target, || ());
        console.write_all(b"still here\n").unwrap();

        assert!(matches!(result, Err(RedirectError::OpenTarget { .. })));
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "still here\n");
        assert_eq!(DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn test_nested_redirections() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let outer = dir.path().join("outer.txt");
        let inner = dir.path().join("inner.txt");
        let fd = console.as_raw_fd();

        with_redirected_descriptor(fd, &outer, || {
            console.write_all(b"outer 1\n").unwrap();
            with_redirected_descriptor(fd, &inner, || {
                console.write_all(b"inner\n").unwrap();
            })
            .unwrap();
            console.write_all(b"outer 2\n").unwrap();
        })
        .unwrap();
        console.write_all(b"console\n").unwrap();

        assert_eq!(fs::read_to_string(&inner).unwrap(), "inner\n");
        assert_eq!(fs::read_to_string(&outer).unwrap(), "outer 1\nouter 2\n");
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "console\n");
    }

    #[test]
    fn test_repeated_scopes() {
        let dir = tempdir().unwrap();
        let (mut console, console_path) = console(&dir);
        let target = dir.path().join("dump.txt");

        for k in 0..8 {
            let redirect = OutputRedirect::descriptor(console.as_raw_fd(), &target).unwrap();
            writeln!(console, "run {}", k).unwrap();
            redirect.restore().unwrap();
        }
        console.write_all(b"done\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "run 7\n");
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "done\n");
        assert_eq!(DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn test_concurrent_scopes_are_serialized() {
        let dir = tempdir().unwrap();
        let (console, console_path) = console(&dir);
        let fd = console.as_raw_fd();
        let targets: Vec<PathBuf> = (0..8)
            .map(|i| dir.path().join(format!("thread_{}.txt", i)))
            .collect();

        thread::scope(|s| {
            for (i, target) in targets.iter().enumerate() {
                let mut console: &File = &console;
                s.spawn(move || {
                    with_redirected_descriptor(fd, target, || {
                        writeln!(console, "thread {}", i).unwrap();
                        thread::sleep(Duration::from_millis(2));
                    })
                    .unwrap();
                });
            }
        });

        for (i, target) in targets.iter().enumerate() {
            assert_eq!(fs::read_to_string(target).unwrap(), format!("thread {}\n", i));
        }
        assert_eq!(fs::read_to_string(&console_path).unwrap(), "");
    }

    #[test]
    fn test_display() {
        let e = RedirectError::DescriptorNotOpen { fd: 1 };
        assert_eq!(e.to_string(), "Descriptor 1 is not bound to an open output channel");
    }
}
