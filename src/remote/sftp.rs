//! SSH/SFTP remote session
//!
//! Implements [`RemoteFs`] on top of libssh2. All primitive calls on one
//! session are serialized through a mutex.

use super::{RemoteFile, RemoteFs, RemoteStat};
use crate::config::RemoteConfig;
use crate::error::{HostFilesError, Result};
use ssh2::{ErrorCode, FileStat, RenameFlags, Session, Sftp};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Rename flags: atomic, never replacing an existing destination
fn rename_flags() -> RenameFlags {
    RenameFlags::ATOMIC | RenameFlags::NATIVE
}

/// libssh2 `LIBSSH2_FX_NO_SUCH_FILE`
const FX_NO_SUCH_FILE: i32 = 2;
/// libssh2 `LIBSSH2_FX_NO_SUCH_PATH`
const FX_NO_SUCH_PATH: i32 = 10;

/// An authenticated SFTP session to one host
pub struct SftpSession {
    /// SSH session, kept alive for the lifetime of the SFTP channel
    _session: Session,
    /// SFTP channel
    sftp: Mutex<Sftp>,
    /// Remote configuration
    config: RemoteConfig,
}

impl SftpSession {
    /// Connect and authenticate to the remote host
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let addr = config
            .address()
            .to_socket_addrs()
            .map_err(|e| HostFilesError::connection(&config.host, e.to_string()))?
            .next()
            .ok_or_else(|| HostFilesError::connection(&config.host, "address did not resolve"))?;

        let tcp = if config.timeout_secs > 0 {
            TcpStream::connect_timeout(&addr, Duration::from_secs(config.timeout_secs))
        } else {
            TcpStream::connect(addr)
        }
        .map_err(|e| HostFilesError::connection(&config.host, e.to_string()))?;

        let mut session = Session::new()
            .map_err(|e| HostFilesError::connection(&config.host, e.to_string()))?;

        session.set_tcp_stream(tcp);
        if config.timeout_secs > 0 {
            session.set_timeout((config.timeout_secs * 1000).min(u32::MAX as u64) as u32);
        }
        session
            .handshake()
            .map_err(|e| HostFilesError::connection(&config.host, e.to_string()))?;

        Self::authenticate(&mut session, config)?;

        let sftp = session
            .sftp()
            .map_err(|e| HostFilesError::connection(&config.host, e.to_string()))?;

        tracing::info!("SFTP session established to {}@{}", config.user, config.address());

        Ok(Self {
            _session: session,
            sftp: Mutex::new(sftp),
            config: config.clone(),
        })
    }

    /// Authenticate with key file, password, or the SSH agent, in that order
    fn authenticate(session: &mut Session, config: &RemoteConfig) -> Result<()> {
        if let Some(key_path) = &config.key_path {
            session
                .userauth_pubkey_file(&config.user, None, key_path, config.password.as_deref())
                .map_err(|e| HostFilesError::auth(&config.user, &config.host, e.to_string()))?;
        } else if let Some(password) = &config.password {
            session
                .userauth_password(&config.user, password)
                .map_err(|e| HostFilesError::auth(&config.user, &config.host, e.to_string()))?;
        } else {
            let mut agent = session
                .agent()
                .map_err(|e| HostFilesError::auth(&config.user, &config.host, e.to_string()))?;

            agent
                .connect()
                .map_err(|e| HostFilesError::auth(&config.user, &config.host, e.to_string()))?;

            agent
                .list_identities()
                .map_err(|e| HostFilesError::auth(&config.user, &config.host, e.to_string()))?;

            let identities = agent.identities().unwrap_or_default();
            let authenticated = identities
                .iter()
                .any(|identity| agent.userauth(&config.user, identity).is_ok());

            if !authenticated {
                return Err(HostFilesError::auth(
                    &config.user,
                    &config.host,
                    "No valid SSH key found in agent",
                ));
            }
        }

        if !session.authenticated() {
            return Err(HostFilesError::auth(
                &config.user,
                &config.host,
                "Authentication failed",
            ));
        }

        Ok(())
    }

    /// Remote configuration this session was opened with
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn channel(&self) -> MutexGuard<'_, Sftp> {
        self.sftp.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Map a libssh2 error on `path` into the crate taxonomy
fn map_err(path: &str, err: ssh2::Error) -> HostFilesError {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) | ErrorCode::SFTP(FX_NO_SUCH_PATH) => {
            HostFilesError::NotFound(path.to_string())
        }
        _ => HostFilesError::remote(path, err.to_string()),
    }
}

impl From<FileStat> for RemoteStat {
    fn from(stat: FileStat) -> Self {
        Self {
            size: stat.size.unwrap_or(0),
            perm: stat.perm.unwrap_or(0),
            mtime: stat.mtime.unwrap_or(0),
        }
    }
}

/// Open SFTP file handle
struct SftpFile {
    path: String,
    file: ssh2::File,
}

impl Read for SftpFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl RemoteFile for SftpFile {
    fn stat(&mut self) -> Result<RemoteStat> {
        self.file
            .stat()
            .map(RemoteStat::from)
            .map_err(|e| map_err(&self.path, e))
    }
}

impl RemoteFs for SftpSession {
    fn open(&self, path: &str) -> Result<Box<dyn RemoteFile>> {
        let file = self
            .channel()
            .open(Path::new(path))
            .map_err(|e| map_err(path, e))?;
        Ok(Box::new(SftpFile {
            path: path.to_string(),
            file,
        }))
    }

    fn stat(&self, path: &str) -> Result<RemoteStat> {
        self.channel()
            .stat(Path::new(path))
            .map(RemoteStat::from)
            .map_err(|e| map_err(path, e))
    }

    fn lstat(&self, path: &str) -> Result<RemoteStat> {
        self.channel()
            .lstat(Path::new(path))
            .map(RemoteStat::from)
            .map_err(|e| map_err(path, e))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<(String, RemoteStat)>> {
        let entries = self
            .channel()
            .readdir(Path::new(path))
            .map_err(|e| map_err(path, e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some((name, RemoteStat::from(stat)))
            })
            .collect())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        self.channel()
            .mkdir(Path::new(path), 0o755)
            .map_err(|e| map_err(path, e))
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let file = self
            .channel()
            .create(Path::new(path))
            .map_err(|e| map_err(path, e))?;
        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.channel()
            .unlink(Path::new(path))
            .map_err(|e| map_err(path, e))
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        self.channel()
            .rmdir(Path::new(path))
            .map_err(|e| map_err(path, e))
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.channel()
            .rename(Path::new(old), Path::new(new), Some(rename_flags()))
            .map_err(|e| map_err(old, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require an SSH server to be available
    // They are marked as ignore by default

    #[test]
    #[ignore]
    fn test_sftp_connection() {
        let config = RemoteConfig::from_spec("test@localhost").unwrap();
        let session = SftpSession::connect(&config).unwrap();
        assert!(session.stat("/").unwrap().is_dir());
    }

    #[test]
    fn test_file_stat_conversion() {
        let stat = FileStat {
            size: Some(42),
            uid: None,
            gid: None,
            perm: Some(0o100644),
            atime: None,
            mtime: Some(1_700_000_000),
        };
        let remote = RemoteStat::from(stat);
        assert_eq!(remote.size, 42);
        assert!(remote.is_file());
        assert_eq!(remote.mtime, 1_700_000_000);
    }

    #[test]
    fn test_rename_never_overwrites() {
        assert!(!rename_flags().contains(RenameFlags::OVERWRITE));
        assert!(rename_flags().contains(RenameFlags::ATOMIC));
    }
}
