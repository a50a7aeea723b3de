// 🚀 Pipeline - A rodada completa, do payload ao CSV
// Ordem fixa: fetch → snapshot cru → consolidação → replace com backup →
// correção de escala → conferência → exportação. A conferência nunca
// derruba a rodada; erro de contrato de colunas derruba antes de gravar.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use crate::brokers::{BrokerDirectory, CORRETORES_PAYLOAD};
use crate::config::Config;
use crate::consolidate::{consolidate, CONSOLIDATED_TABLE};
use crate::export::export_consolidated;
use crate::reconcile::{ReconcileEngine, ReconcileInput, ReconciliationReport};
use crate::scale::{ScaleCheck, ScaleOutcome};
use crate::sources::{FetchPolicy, SourceBatch, SourceFetcher, SourceTag};
use crate::store::AnalyticsStore;

/// Temp-table name the consolidated batch registers under.
pub const BATCH_NAME: &str = "batch_vendas";

// ============================================================================
// OPTIONS + SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip the final CSV export (dry runs, tests)
    pub skip_export: bool,

    /// Lock-file run UUID, stamped into the reconciliation report
    pub run_id: Option<String>,
}

/// Everything the operator sees in the final banner.
#[derive(Debug)]
pub struct RunSummary {
    pub report: ReconciliationReport,
    pub scale: ScaleOutcome,
    pub export_path: Option<PathBuf>,
    pub consolidated_rows: usize,
    pub missing_sources: Vec<SourceTag>,
}

impl RunSummary {
    pub fn print_summary(&self) {
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if self.report.is_clean() {
            println!("🎉 Rodada concluída: {} linhas consolidadas", self.consolidated_rows);
        } else {
            println!(
                "⚠️ Rodada concluída com pendências: {} linhas consolidadas",
                self.consolidated_rows
            );
            println!("   {}", self.report.summary());
        }
        if !self.missing_sources.is_empty() {
            let codigos: Vec<&str> = self.missing_sources.iter().map(|t| t.code()).collect();
            println!("   Fontes ausentes nesta rodada: {}", codigos.join(", "));
        }
        if self.scale.was_corrected() {
            println!("   Correção de escala aplicada (backup em *_pre_correcao)");
        }
        match &self.export_path {
            Some(path) => println!("   Exportação: {}", path.display()),
            None => println!("   Exportação: pulada"),
        }
    }
}

// ============================================================================
// RODADA COMPLETA
// ============================================================================

pub fn run_pipeline(
    config: &Config,
    store: &mut AnalyticsStore,
    fetchers: &[Box<dyn SourceFetcher>],
    options: &RunOptions,
) -> Result<RunSummary> {
    let carimbo_rodada = Utc::now().to_rfc3339();

    // 1. Fetch de cada fonte sob a política configurada
    println!("\n📥 Buscando {} fontes (política {})...", fetchers.len(), config.fetch_policy.name());
    let mut batches: Vec<SourceBatch> = Vec::new();
    let mut missing: Vec<SourceTag> = Vec::new();
    for fetcher in fetchers {
        let tag = fetcher.source();
        match fetcher.fetch() {
            Ok(records) => {
                println!("✓ {}: {} registros", tag.code(), records.len());
                batches.push(SourceBatch::new(tag, records));
            }
            Err(erro) => match config.fetch_policy {
                FetchPolicy::Abort => {
                    println!("❌ {}: {}", tag.code(), erro);
                    return Err(erro.context(format!(
                        "Fonte {} falhou e a política é ABORT",
                        tag.code()
                    )));
                }
                FetchPolicy::ContinuePartial => {
                    println!("⚠️ {}: {}, seguindo sem esta fonte", tag.code(), erro);
                    missing.push(tag);
                }
            },
        }
    }

    // 2. Snapshot cru de cada batch, antes de qualquer transformação
    println!("\n💾 Gravando snapshots crus...");
    for batch in &batches {
        store.snapshot_source(batch.tag, &batch.records, &carimbo_rodada)?;
    }

    // 3. Normalização + projeção + união sob o contrato de colunas
    println!("\n🔄 Consolidando...");
    let brokers = load_broker_directory(config)?;
    let consolidation = consolidate(&batches, &brokers, &carimbo_rodada)?;
    println!(
        "✓ {} linhas de {} fontes",
        consolidation.records.len(),
        consolidation.per_source.len()
    );

    // 4. Backup-e-substituição da tabela consolidada
    println!("\n📦 Substituindo tabela consolidada...");
    store.register_batch(BATCH_NAME, &consolidation.batch)?;
    store.replace_table(CONSOLIDATED_TABLE, BATCH_NAME)?;
    store.create_views()?;
    store.load_brokers(&brokers)?;

    // 5. Correção de escala, quando a instalação aponta uma fonte suspeita
    println!("\n📐 Verificando escala...");
    let scale = ScaleCheck {
        source: config.scale_check_source,
        mean_threshold: config.scale_mean_threshold,
    }
    .run(store)?;
    scale.print_trace();

    // 6. Conferência contra contagens independentes das tabelas cruas
    println!("\n⚖️ Conferindo...");
    let mut expected: Vec<(SourceTag, usize)> = Vec::new();
    for batch in &batches {
        expected.push((batch.tag, store.raw_count(batch.tag)? as usize));
    }
    let input = ReconcileInput::from_records(&consolidation.records);
    let mut report = ReconcileEngine::new().reconcile(&input, &expected, &missing);
    if let Some(run_id) = &options.run_id {
        report = report.with_run_id(run_id.clone());
    }
    report.print_trace();

    // 7. Exportação com carimbo de data/hora
    let export_path = if options.skip_export {
        None
    } else {
        println!("\n📤 Exportando...");
        Some(export_consolidated(store, &config.export_dir)?)
    };

    Ok(RunSummary {
        consolidated_rows: consolidation.records.len(),
        report,
        scale,
        export_path,
        missing_sources: missing,
    })
}

/// Corretores são opcionais: sem o payload, os joins ficam vazios mas a
/// rodada segue.
fn load_broker_directory(config: &Config) -> Result<BrokerDirectory> {
    let path = config.payload_dir.join(CORRETORES_PAYLOAD);
    if !path.exists() {
        println!("⚠️ Sem cadastro de corretores em {}, joins ficarão vazios", path.display());
        return Ok(BrokerDirectory::new());
    }
    let directory = BrokerDirectory::load(&path)?;
    println!("🤝 Corretores carregados: {}", directory.len());
    Ok(directory)
}

// ============================================================================
// MODO CHECK
// ============================================================================

/// Reconcile-only pass over whatever is currently stored. Expected counts
/// come from the raw snapshot tables of the last run; o tri-estado do
/// valor é achatado na gravação, então só as contagens entram aqui.
pub fn run_check(store: &AnalyticsStore) -> Result<ReconciliationReport> {
    let mut expected: Vec<(SourceTag, usize)> = Vec::new();
    for tag in SourceTag::all() {
        expected.push((tag, store.raw_count(tag)? as usize));
    }

    let source_counts: Vec<(String, usize)> = store
        .consolidated_counts_by_source()?
        .into_iter()
        .map(|(code, n)| (code, n as usize))
        .collect();

    let input = ReconcileInput {
        source_counts,
        duplicate_count: store.stored_duplicate_count()? as usize,
        absent_values: 0,
        unparseable_values: 0,
    };

    let report = ReconcileEngine::new().reconcile(&input, &expected, &[]);
    report.print_trace();
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
