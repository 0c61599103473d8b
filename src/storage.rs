//! Key file storage backend.
//!
//! A [`KeyDir`] is a directory of encrypted key files, one per address. It
//! only moves opaque bytes; it never looks inside an envelope. There is no
//! locking here: concurrent writes to the same address race, and callers
//! that need ordering must serialize per address themselves.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::crypto::secure_random;
use crate::error::KeystoreError;
use crate::key::Address;

const KEY_FILE_EXT: &str = "json";

/// Directory holding one encrypted key file per address.
#[derive(Clone)]
pub struct KeyDir {
    root: PathBuf,
}

impl KeyDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the key file for `address`.
    pub fn path_for(&self, address: &Address) -> PathBuf {
        self.root.join(format!("{address}.{KEY_FILE_EXT}"))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.path_for(address).exists()
    }

    /// Load the envelope bytes stored for `address`.
    pub fn read(&self, address: &Address) -> Result<Vec<u8>, KeystoreError> {
        match fs::read(self.path_for(address)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(KeystoreError::KeyNotFound(*address))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the envelope for `address`, creating or replacing its file.
    ///
    /// Crash-safe: data goes to a randomly named temporary file which is
    /// synced and then atomically moved over the target, and the directory
    /// is synced afterwards. A crash leaves either the old file or the new
    /// one, never a partial write. Files are created owner-only on Unix.
    pub fn write(&self, address: &Address, data: &[u8]) -> Result<(), KeystoreError> {
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(address);
        let tmp_path = self.random_tmp_path(address)?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut tmp_file = options.open(&tmp_path)?;
        let written = write_and_sync(&mut tmp_file, data);
        drop(tmp_file);

        if let Err(e) = written.and_then(|_| atomic_replace(&tmp_path, &path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        // fsync the directory so the rename itself is durable
        let dir = File::open(&self.root)?;
        dir.sync_all()?;

        Ok(())
    }

    /// Remove the key file for `address`.
    pub fn delete(&self, address: &Address) -> Result<(), KeystoreError> {
        match fs::remove_file(self.path_for(address)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(KeystoreError::KeyNotFound(*address))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Addresses with a stored key file.
    ///
    /// Files whose names do not parse as `<hex-address>.json` are ignored.
    pub fn addresses(&self) -> Result<Vec<Address>, KeystoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut addresses = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(address) = stem.parse::<Address>() {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    /// Unique temporary path next to the key file for `address`.
    ///
    /// Random suffix so concurrent writers never collide on the temp name.
    fn random_tmp_path(&self, address: &Address) -> Result<PathBuf, KeystoreError> {
        let mut buf = [0u8; 8];
        secure_random(&mut buf)?;
        Ok(self.root.join(format!("{address}.tmp.{}", hex::encode(buf))))
    }
}

fn write_and_sync(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data)?;
    file.sync_all()
}

/// Atomically replace `target` with `tmp`.
///
/// Uses the Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` so
/// the replacement is persisted before the call returns.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp: &Path, target: &Path) -> io::Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{ReplaceFileW, REPLACEFILE_WRITE_THROUGH};

    // ReplaceFileW fails if the target does not exist yet
    if !target.exists() {
        return fs::rename(tmp, target);
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Atomically replace `target` with `tmp`.
///
/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp: &Path, target: &Path) -> io::Result<()> {
    fs::rename(tmp, target)
}
