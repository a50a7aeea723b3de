// 🔒 Run Lock - One pipeline run at a time
// The consolidation rewrites tables in place, so two concurrent runs
// would race on the backup/replace dance. A fresh lock blocks the new
// run; a stale one is assumed to be a crashed process and is broken.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STALE_MINUTES: i64 = 30;

// ============================================================================
// LOCK FILE CONTENTS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    iniciado_em: DateTime<Utc>,
    run_id: String,
}

// ============================================================================
// RUN LOCK
// ============================================================================

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    run_id: String,
}

impl RunLock {
    /// Acquire the lock with the default 30-minute staleness window.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with_staleness(path, Duration::minutes(DEFAULT_STALE_MINUTES))
    }

    /// Acquire the lock, breaking any holder older than `stale_after`.
    /// An unreadable lock file counts as stale.
    pub fn acquire_with_staleness(path: &Path, stale_after: Duration) -> Result<Self> {
        if path.exists() {
            match read_lock(path) {
                Some(info) => {
                    let idade = Utc::now() - info.iniciado_em;
                    if idade <= stale_after {
                        bail!(
                            "Outra execução em andamento (pid {}, iniciada há {} min). \
                             Lock: {}",
                            info.pid,
                            idade.num_minutes(),
                            path.display()
                        );
                    }
                    println!(
                        "⚠️ Lock obsoleto (pid {}, {} min), assumindo processo morto",
                        info.pid,
                        idade.num_minutes()
                    );
                }
                None => {
                    println!("⚠️ Lock ilegível em {}, descartando", path.display());
                }
            }
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let info = LockInfo {
            pid: std::process::id(),
            iniciado_em: Utc::now(),
            run_id: run_id.clone(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Falha ao criar diretório {}", parent.display()))?;
            }
        }
        let corpo = serde_json::to_string_pretty(&info)?;
        fs::write(path, corpo)
            .with_context(|| format!("Falha ao gravar lock em {}", path.display()))?;

        Ok(RunLock {
            path: path.to_path_buf(),
            run_id,
        })
    }

    /// Identifier of this run, carried into the reconciliation report.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let corpo = fs::read_to_string(path).ok()?;
    serde_json::from_str(&corpo).ok()
}

// ============================================================================
// TESTS
// ============================================================================
