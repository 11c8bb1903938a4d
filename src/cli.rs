// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Admin CLI
//!
//! Command tree and exit-code mapping for `entitlement-admin`. Every
//! command runs with the admin capability against the store in
//! `--data-dir` and prints one JSON document on stdout. Errors go to
//! stderr as `{error, error_code}`.
//!
//! | Exit | Meaning |
//! |------|---------|
//! | 0 | ok |
//! | 2 | not found |
//! | 3 | precondition failed, conflict or unauthorized |
//! | 4 | storage, audit or timeout |
//! | 64 | usage (bad arguments or malformed input) |

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Duration;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::auth::Role;
use crate::config::{ServiceConfig, STORE_FILE_NAME};
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::models::EntitlementResponse;
use crate::service::EntitlementService;
use crate::storage::Store;

pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const NOT_FOUND: u8 = 2;
    pub const PRECONDITION_FAILED: u8 = 3;
    pub const STORAGE_ERROR: u8 = 4;
    pub const USAGE: u8 = 64;
}

/// entitlement-admin - AccessMate license and account administration
#[derive(Parser, Debug)]
#[command(name = "entitlement-admin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the store file
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mint a batch of license keys
    Issue {
        /// Number of keys
        count: usize,

        /// Batch tag used for resends
        #[arg(long)]
        tag: Option<String>,
    },

    /// Revoke a license key
    Revoke {
        /// License code (dashes optional)
        code: String,

        #[arg(long)]
        reason: String,
    },

    /// Show the state of a license key
    Status {
        /// License code (dashes optional)
        code: String,
    },

    /// List the devices registered to an account
    Devices { email: String },

    /// Show the entitlement of an account
    Entitlement { email: String },

    /// Print every key of a batch, for resending
    Batch { tag: String },

    /// Read audit records
    Audit {
        /// Only records touching this account
        #[arg(long)]
        email: Option<String>,

        /// Only records after this sequence number
        #[arg(long, default_value = "0")]
        after: u64,

        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,
    },

    /// Move old audit records to JSONL files
    Archive {
        /// Archive records older than this many days
        #[arg(long)]
        older_than_days: u32,

        /// Output directory for the archive files
        #[arg(long)]
        dir: PathBuf,
    },

    /// Disable an account
    Disable {
        email: String,

        #[arg(long)]
        reason: String,
    },
}

/// Map a service failure to the process exit code.
pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => exit_codes::NOT_FOUND,
        ErrorKind::PreconditionFailed | ErrorKind::Conflict | ErrorKind::Unauthorized => {
            exit_codes::PRECONDITION_FAILED
        }
        ErrorKind::StorageUnavailable
        | ErrorKind::AuditUnavailable
        | ErrorKind::Timeout
        | ErrorKind::RateLimited => exit_codes::STORAGE_ERROR,
        ErrorKind::InvalidInput => exit_codes::USAGE,
    }
}

/// Open the store under `data_dir` and run one command.
pub fn run(cli: Cli) -> ExitCode {
    let outcome = open_service(&cli.data_dir).and_then(|service| execute(&service, cli.command));
    match outcome {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::from(exit_codes::SUCCESS)
        }
        Err(err) => {
            let kind = err.kind();
            let body = json!({ "error": err.user_message(), "error_code": error_code(&err) });
            eprintln!("{body}");
            tracing::debug!(error = %err, "Command failed");
            ExitCode::from(exit_code_for(kind))
        }
    }
}

fn open_service(data_dir: &Path) -> ServiceResult<EntitlementService> {
    std::fs::create_dir_all(data_dir)
        .map_err(|err| ServiceError::StorageUnavailable(err.to_string()))?;
    let store = Store::open(&data_dir.join(STORE_FILE_NAME))?;
    EntitlementService::new(store, ServiceConfig::default())
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))
}

/// Run one command against an open service.
pub fn execute(service: &EntitlementService, command: Command) -> ServiceResult<Value> {
    let role = Role::Admin;
    let output = match command {
        Command::Issue { count, tag } => {
            let codes = service.issue_license_keys(role, count, tag.as_deref())?;
            json!({
                "batch_tag": tag.unwrap_or_else(|| crate::service::vault::DEFAULT_BATCH_TAG.to_string()),
                "codes": codes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        }
        Command::Revoke { code, reason } => {
            to_json(&service.revoke_license_key(role, &code, &reason)?)?
        }
        Command::Status { code } => to_json(&service.key_status(role, &code)?)?,
        Command::Devices { email } => {
            let account = service.get_by_email(&email)?;
            let devices = service.list_devices(&account.account_id)?;
            json!({
                "account_id": account.account_id,
                "email": account.email,
                "max_devices": service.config().max_devices,
                "devices": devices,
            })
        }
        Command::Entitlement { email } => {
            let account = service.get_by_email(&email)?;
            let entitlement = service.get_entitlement(&account.account_id)?;
            to_json(&EntitlementResponse::from(entitlement))?
        }
        Command::Batch { tag } => to_json(&service.list_batch(role, &tag)?)?,
        Command::Audit {
            email,
            after,
            limit,
        } => {
            let account_id = match email {
                Some(email) => Some(service.get_by_email(&email)?.account_id),
                None => None,
            };
            to_json(&service.audit_records(role, account_id.as_deref(), after, limit)?)?
        }
        Command::Archive {
            older_than_days,
            dir,
        } => {
            let before = service.now() - Duration::days(i64::from(older_than_days));
            to_json(&service.archive_audit(role, before, &dir)?)?
        }
        Command::Disable { email, reason } => {
            let account = service.get_by_email(&email)?;
            to_json(&service.disable_account(role, &account.account_id, &reason)?)?
        }
    };
    Ok(output)
}

fn to_json<T: serde::Serialize>(value: &T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|err| ServiceError::StorageUnavailable(err.to_string()))
}

fn error_code(err: &ServiceError) -> String {
    serde_json::to_value(err.kind())
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EntitlementService {
        EntitlementService::new(Store::open_in_memory().unwrap(), ServiceConfig::for_tests())
            .unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["entitlement-admin"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(exit_code_for(ErrorKind::NotFound), 2);
        assert_eq!(exit_code_for(ErrorKind::PreconditionFailed), 3);
        assert_eq!(exit_code_for(ErrorKind::Conflict), 3);
        assert_eq!(exit_code_for(ErrorKind::Unauthorized), 3);
        assert_eq!(exit_code_for(ErrorKind::StorageUnavailable), 4);
        assert_eq!(exit_code_for(ErrorKind::AuditUnavailable), 4);
        assert_eq!(exit_code_for(ErrorKind::Timeout), 4);
        assert_eq!(exit_code_for(ErrorKind::InvalidInput), 64);
    }

    #[test]
    fn parses_issue_with_tag() {
        let cli = parse(&["--data-dir", "/tmp/x", "issue", "5", "--tag", "retail"]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert!(matches!(
            cli.command,
            Command::Issue { count: 5, tag: Some(ref t) } if t == "retail"
        ));
    }

    #[test]
    fn revoke_requires_reason() {
        let argv = ["entitlement-admin", "revoke", "ABCD"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn issue_then_status_then_revoke() {
        let service = service();
        let issued = execute(
            &service,
            Command::Issue {
                count: 2,
                tag: Some("press".into()),
            },
        )
        .unwrap();
        assert_eq!(issued["batch_tag"], "press");
        let code = issued["codes"][0].as_str().unwrap().to_string();

        let status = execute(&service, Command::Status { code: code.clone() }).unwrap();
        assert_eq!(status["state"], "ISSUED");

        let revoked = execute(
            &service,
            Command::Revoke {
                code,
                reason: "leaked".into(),
            },
        )
        .unwrap();
        assert_eq!(revoked["state"], "REVOKED");

        let batch = execute(&service, Command::Batch { tag: "press".into() }).unwrap();
        assert_eq!(batch.as_array().unwrap().len(), 2);
    }

    #[test]
    fn unknown_email_maps_to_not_found() {
        let service = service();
        let err = execute(
            &service,
            Command::Devices {
                email: "ghost@x.com".into(),
            },
        )
        .unwrap_err();
        assert_eq!(exit_code_for(err.kind()), exit_codes::NOT_FOUND);
    }

    #[test]
    fn malformed_code_maps_to_usage() {
        let service = service();
        let err = execute(&service, Command::Status { code: "nope".into() }).unwrap_err();
        assert_eq!(exit_code_for(err.kind()), exit_codes::USAGE);
    }

    #[test]
    fn account_commands_resolve_email() {
        let service = service();
        let account = service
            .register_account("Owner@Example.com", "correct-horse-battery")
            .unwrap();
        service.add_device(&account.account_id, "d1", "Phone").unwrap();

        let devices = execute(
            &service,
            Command::Devices {
                email: "owner@example.com".into(),
            },
        )
        .unwrap();
        assert_eq!(devices["devices"].as_array().unwrap().len(), 1);
        assert_eq!(devices["max_devices"], 3);

        let entitlement = execute(
            &service,
            Command::Entitlement {
                email: "owner@example.com".into(),
            },
        )
        .unwrap();
        assert_eq!(entitlement["tier"], "TRIAL");
        assert_eq!(entitlement["gating"]["show_trial_countdown"], true);

        let audit = execute(
            &service,
            Command::Audit {
                email: Some("owner@example.com".into()),
                after: 0,
                limit: 10,
            },
        )
        .unwrap();
        assert!(!audit.as_array().unwrap().is_empty());
    }

    #[test]
    fn archive_inside_retention_is_usage_error() {
        let service = service();
        let dir = tempfile::tempdir().unwrap();
        let err = execute(
            &service,
            Command::Archive {
                older_than_days: 1,
                dir: dir.path().to_path_buf(),
            },
        )
        .unwrap_err();
        assert_eq!(exit_code_for(err.kind()), exit_codes::USAGE);
    }

    #[test]
    fn run_creates_store_in_fresh_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            data_dir: dir.path().join("store"),
            command: Command::Batch { tag: "none".into() },
        };
        let _ = run(cli);
        assert!(dir.path().join("store").join(STORE_FILE_NAME).exists());
    }
}
