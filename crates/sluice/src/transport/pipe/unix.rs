//! Unix domain sockets standing in for named pipes.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::path::PathBuf;

use tokio::net::UnixListener;
use tokio::net::UnixStream;

pub(crate) type ServerStream = UnixStream;
pub(crate) type ClientStream = UnixStream;

/// Absolute names are used as socket paths; anything else lands in the temp dir.
pub(crate) fn endpoint(name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::temp_dir().join(format!("sluice-{}.sock", name))
    }
}

pub(crate) struct PipeListener {
    listener: UnixListener,
    path: PathBuf,
    /// Inode of the socket file this listener created.
    inode: Option<u64>,
}

impl PipeListener {
    pub(crate) fn bind(name: &str) -> io::Result<Self> {
        let path = endpoint(name);
        // a socket file left behind by a crashed host would make bind fail
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(&path)?;
        let inode = std::fs::metadata(&path).ok().map(|m| m.ino());
        Ok(Self { listener, path, inode })
    }

    pub(crate) async fn accept(&mut self) -> io::Result<ServerStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        // a newer host may have rebound the same path already
        let ours = match (self.inode, std::fs::metadata(&self.path)) {
            (Some(inode), Ok(meta)) => meta.ino() == inode,
            _ => false,
        };
        if ours {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub(crate) async fn connect(name: &str) -> io::Result<ClientStream> {
    UnixStream::connect(endpoint(name)).await
}
