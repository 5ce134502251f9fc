//! Launch argument construction.
//!
//! Arguments for the spawned binaries are pure functions of the endpoint,
//! the identifying parameter (payout address), and an algorithm hint. They
//! are always built as an argument vector handed to the OS directly; nothing
//! here ever passes through a shell, so a crafted wallet string stays one
//! literal argument.

use std::path::Path;

use thiserror::Error;

/// Minimum length accepted for an identifying parameter. Real payout
/// addresses are far longer; this only rejects obvious typos.
pub const MIN_IDENTITY_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("identifying parameter is empty")]
    EmptyIdentity,

    #[error("identifying parameter too short: {len} characters (minimum {MIN_IDENTITY_LEN})")]
    IdentityTooShort { len: usize },
}

/// Minimal sanity check on the caller-supplied identifying parameter,
/// applied before any spawn attempt.
pub fn validate_identity(identity: &str) -> Result<(), LaunchError> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(LaunchError::EmptyIdentity);
    }
    if trimmed.len() < MIN_IDENTITY_LEN {
        return Err(LaunchError::IdentityTooShort {
            len: trimmed.len(),
        });
    }
    Ok(())
}

/// Argument vector for a mining session.
///
/// XMRig-compatible flags: pool endpoint, payout identity, optional
/// algorithm hint, and flags that keep output on stdout where the telemetry
/// extractor can read it.
pub fn miner_args(host: &str, port: u16, identity: &str, algo: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        format!("{host}:{port}"),
        "-u".to_string(),
        identity.to_string(),
        "--no-color".to_string(),
        "--print-time".to_string(),
        "10".to_string(),
    ];
    if let Some(algo) = algo {
        args.push("-a".to_string());
        args.push(algo.to_string());
    }
    args
}

/// Argument vector for a node process rooted at `data_dir`.
pub fn node_args(network: &str, env: &str, data_dir: &Path) -> Vec<String> {
    vec![
        "--datadir".to_string(),
        data_dir.display().to_string(),
        "--network".to_string(),
        network.to_string(),
        "--environment".to_string(),
        env.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn identity_validation() {
        assert_eq!(validate_identity(""), Err(LaunchError::EmptyIdentity));
        assert_eq!(validate_identity("   "), Err(LaunchError::EmptyIdentity));
        assert_eq!(
            validate_identity("abc"),
            Err(LaunchError::IdentityTooShort { len: 3 })
        );
        assert!(validate_identity("48edfHu7V9Z84YzzMa6fUueoELZ9ZRXq9V").is_ok());
    }

    #[test]
    fn miner_args_shape() {
        let args = miner_args("pool.example.org", 3333, "wallet-address-xyz", Some("rx/0"));
        assert_eq!(args[0], "-o");
        assert_eq!(args[1], "pool.example.org:3333");
        assert_eq!(args[2], "-u");
        assert_eq!(args[3], "wallet-address-xyz");
        assert!(args.contains(&"-a".to_string()));
        assert!(args.contains(&"rx/0".to_string()));
    }

    #[test]
    fn miner_args_without_algo_hint() {
        let args = miner_args("pool.example.org", 3333, "wallet-address-xyz", None);
        assert!(!args.contains(&"-a".to_string()));
    }

    #[test]
    fn crafted_identity_stays_one_literal_argument() {
        // A shell metacharacter payload must come out as exactly one argv
        // element, never spliced into a command line.
        let payload = "x; rm -rf /tmp/pwned";
        let args = miner_args("pool.example.org", 3333, payload, None);
        assert_eq!(args.iter().filter(|a| a.as_str() == payload).count(), 1);
        assert!(!args.iter().any(|a| a != payload && a.contains("rm -rf")));
    }

    #[test]
    fn node_args_use_data_dir_verbatim() {
        let dir = PathBuf::from("/var/cache/rigsup/sessions/node-quai@testnet/data");
        let args = node_args("quai", "testnet", &dir);
        assert_eq!(args[0], "--datadir");
        assert_eq!(args[1], dir.display().to_string());
        assert!(args.contains(&"quai".to_string()));
        assert!(args.contains(&"testnet".to_string()));
    }
}
