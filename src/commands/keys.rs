//! VAPID key generation.

use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::notifications::{ApplicationKeys, VapidKeys};

/// Generate a fresh application server key pair.
///
/// With `output`, the `{"public", "private"}` JSON is written to a new file
/// readable only by the owner and just the public key is printed. Without
/// it, the JSON goes to stdout.
pub fn generate(output: Option<&Path>) -> Result<()> {
    let keys = VapidKeys::generate();
    let json = serde_json::to_string_pretty(&ApplicationKeys::from(keys.clone()))?;

    match output {
        Some(path) => {
            write_new_private_file(path, json.as_bytes())?;
            log::info!("Wrote VAPID key pair to {}", path.display());
            println!("Public key: {}", keys.public_key_base64url());
            println!("Key pair saved to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Load an application key pair written by [`generate`].
pub fn load(path: &Path) -> Result<VapidKeys> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid VAPID key file {}", path.display()))
}

fn write_new_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .with_context(|| format!("Refusing to overwrite or failed to create {}", path.display()))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_writes_loadable_key_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vapid.json");

        generate(Some(&path)).expect("generate");
        let keys = load(&path).expect("load");
        assert_eq!(keys.public_key_bytes()[0], 0x04);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vapid.json");
        fs::write(&path, "keep me").expect("seed");

        assert!(generate(Some(&path)).is_err());
        assert_eq!(fs::read_to_string(&path).expect("read"), "keep me");
    }

    #[test]
    fn test_load_rejects_mismatched_pair() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vapid.json");
        let a = VapidKeys::generate();
        let b = VapidKeys::generate();
        let mixed = ApplicationKeys {
            public: a.public_key_base64url(),
            private: b.private_key_base64url().to_string(),
        };
        fs::write(&path, serde_json::to_string(&mixed).expect("json")).expect("write");

        assert!(load(&path).is_err());
    }
}
