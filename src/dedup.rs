// 🔍 Duplicate Detection - Natural keys over the consolidated rows
// Detection only: groups are reported to the reconciliation, rows are
// never dropped here. Removal is an operator decision taken elsewhere.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::consolidate::ConsolidatedRecord;

// ============================================================================
// NATURAL KEY
// ============================================================================

/// Natural key of a consolidated row: the source-scoped external id when
/// the source provides one (`CV_VENDAS:4821`), else a SHA-256 over the
/// projected fields. O timestamp da rodada fica fora do hash: the same
/// row re-consolidated later keeps the same key.
pub fn natural_key(record: &ConsolidatedRecord) -> String {
    if let Some(id) = record.id_externo.as_deref() {
        return format!("{}:{}", record.source.code(), id);
    }

    let data = format!(
        "{}|{}|{}|{}|{}|{}|{:.2}|{}|{}",
        record.source.code(),
        record.empreendimento.as_deref().unwrap_or(""),
        record.unidade.as_deref().unwrap_or(""),
        record.cliente.as_deref().unwrap_or(""),
        record.corretor.as_deref().unwrap_or(""),
        record.imobiliaria.as_deref().unwrap_or(""),
        record.valor(),
        record.data_contrato.as_deref().unwrap_or(""),
        record.situacao.as_deref().unwrap_or(""),
    );

    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("hash:{:x}", hasher.finalize())
}

// ============================================================================
// DUPLICATE GROUPS
// ============================================================================

/// One natural key seen more than once, with every row position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub indexes: Vec<usize>,
}

impl DuplicateGroup {
    /// Extra rows beyond the first occurrence
    pub fn extra_rows(&self) -> usize {
        self.indexes.len().saturating_sub(1)
    }
}

/// Group rows by natural key and keep only the keys seen more than once.
/// Groups come back ordered by first occurrence.
pub fn find_duplicate_groups(records: &[ConsolidatedRecord]) -> Vec<DuplicateGroup> {
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_key.entry(natural_key(record)).or_default().push(idx);
    }

    let mut groups: Vec<DuplicateGroup> = by_key
        .into_iter()
        .filter(|(_, indexes)| indexes.len() > 1)
        .map(|(key, indexes)| DuplicateGroup { key, indexes })
        .collect();

    groups.sort_by_key(|g| g.indexes[0]);
    groups
}

/// Total rows minus distinct keys.
pub fn duplicate_count(records: &[ConsolidatedRecord]) -> usize {
    let distinct: std::collections::HashSet<String> =
        records.iter().map(natural_key).collect();
    records.len() - distinct.len()
}

// ============================================================================
// TESTS
// ============================================================================
