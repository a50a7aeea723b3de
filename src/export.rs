// 📤 CSV Export - Timestamped snapshots for the operations team
// Every export gets its own file; nothing is ever overwritten. The
// spreadsheet crowd opens these directly, so the header row comes first
// and values are plain UTF-8 text.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::store::{AnalyticsStore, ConsolidatedFilter};

/// Filename timestamp, e.g. `20241103_091500`
fn timestamp_suffix() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Write `rows` to `<dir>/<entity>_<YYYYMMDD_HHMMSS>.csv` and return the
/// path. The directory is created on demand.
pub fn export_csv(
    dir: &Path,
    entity: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Falha ao criar diretório de exportação {}", dir.display()))?;

    let path = dir.join(format!("{}_{}.csv", entity, timestamp_suffix()));

    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("Falha ao criar arquivo {}", path.display()))?;

    wtr.write_record(header).context("Falha ao escrever cabeçalho do CSV")?;
    for row in rows {
        wtr.write_record(row).context("Falha ao escrever linha do CSV")?;
    }
    wtr.flush().context("Falha ao gravar CSV no disco")?;

    println!("✓ Exportado: {} ({} linhas)", path.display(), rows.len());
    Ok(path)
}

/// Export the consolidated table as the operations team sees it.
pub fn export_consolidated(store: &AnalyticsStore, dir: &Path) -> Result<PathBuf> {
    let (header, rows) = store.query_consolidated(&ConsolidatedFilter::default())?;
    export_csv(dir, "vendas_consolidadas", &header, &rows)
}

// ============================================================================
// TESTS
// ============================================================================
