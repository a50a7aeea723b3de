// Vendas Pipeline - Core Library
// Consolida vendas de cinco fontes (CV CRM, Sienge, planilha legado) em
// uma tabela única, com conferência e exportação. Exposes all modules
// for use in the CLI and tests.

pub mod brokers;
pub mod config;
pub mod consolidate;
pub mod dedup;
pub mod export;
pub mod lock;
pub mod money;
pub mod pipeline;
pub mod reconcile;
pub mod scale;
pub mod sources;
pub mod store;

// Re-export commonly used types
pub use brokers::{BrokerDirectory, BrokerInfo, CORRETORES_PAYLOAD};
pub use config::Config;
pub use consolidate::{
    consolidate, project, to_batch, union, Consolidation, ConsolidatedRecord, RecordBatch,
    CONSOLIDATED_COLUMNS, CONSOLIDATED_TABLE,
};
pub use dedup::{find_duplicate_groups, natural_key, DuplicateGroup};
pub use export::{export_consolidated, export_csv};
pub use lock::RunLock;
pub use money::{format_brl, normalize_valor, normalize_valor_str, NormalizedAmount};
pub use pipeline::{run_check, run_pipeline, RunOptions, RunSummary};
pub use reconcile::{
    CountVerdict, ReconcileEngine, ReconcileInput, ReconciliationReport, SourceCount,
};
pub use scale::{ScaleCheck, ScaleOutcome};
pub use sources::{
    default_fetchers, FetchPolicy, SourceBatch, SourceFetcher, SourceRecord, SourceTag,
};
pub use store::{AnalyticsStore, ConsolidatedFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
