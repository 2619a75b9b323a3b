//! Local session token file and passphrase prompts

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::Path;

/// Read the saved session token, if any.
pub fn load(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => {
            let token = s.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading session file: {}", path.display())),
    }
}

/// Write the session token, readable by the owner only.
pub fn save(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("writing session file: {}", path.display()))?;
    // An existing file keeps its old mode under `open`; tighten it explicitly.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    writeln!(file, "{token}")?;
    Ok(())
}

/// Remove the session file. Returns whether one existed.
pub fn clear(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing session file: {}", path.display())),
    }
}

/// Passphrase from `env_var` when set, otherwise an interactive prompt.
pub fn read_passphrase(prompt: &str, env_var: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(SecretString::from(value));
    }
    let entered = rpassword::prompt_password(prompt).context("reading passphrase")?;
    Ok(SecretString::from(entered))
}

/// Prompt twice and insist both entries match. Skipped when `env_var` is set.
pub fn read_new_passphrase(prompt: &str, env_var: &str) -> Result<SecretString> {
    if std::env::var(env_var).is_ok() {
        return read_passphrase(prompt, env_var);
    }
    let first = read_passphrase(prompt, env_var)?;
    if first.expose_secret().is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    let second = rpassword::prompt_password("Repeat passphrase: ").context("reading passphrase")?;
    if first.expose_secret() != second {
        anyhow::bail!("passphrases do not match");
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session");

        assert_eq!(load(&path).unwrap(), None);
        save(&path, "tok-123").unwrap();
        assert_eq!(load(&path).unwrap().as_deref(), Some("tok-123"));

        save(&path, "tok-456").unwrap();
        assert_eq!(load(&path).unwrap().as_deref(), Some("tok-456"));

        assert!(clear(&path).unwrap());
        assert!(!clear(&path).unwrap());
        assert_eq!(load(&path).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        save(&path, "tok").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn empty_file_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(load(&path).unwrap(), None);
    }
}
