// 🏗️ Source Consolidator - Five batches into one fixed-contract table
// Projects each typed record onto the 11-column superset, resolves
// brokers best-effort, validates every header against the contract and
// unions in input order. Nothing is written here; the store does that.

use anyhow::Result;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::brokers::BrokerDirectory;
use crate::money::{normalize_valor, normalize_valor_opt, NormalizedAmount};
use crate::sources::{SourceBatch, SourceRecord, SourceTag};

// ============================================================================
// COLUMN CONTRACT
// ============================================================================

/// The fixed column superset, in contract order. Every per-source batch
/// must project exactly these columns or the union refuses to run.
pub const CONSOLIDATED_COLUMNS: [&str; 11] = [
    "source",
    "id_externo",
    "empreendimento",
    "unidade",
    "cliente",
    "corretor",
    "imobiliaria",
    "valor_contrato",
    "data_contrato",
    "situacao",
    "consolidado_em",
];

/// Name of the consolidated table in the store.
pub const CONSOLIDATED_TABLE: &str = "vendas_consolidadas";

// ============================================================================
// CONSOLIDATED RECORD
// ============================================================================

/// One unified row. Semantic absences stay `None` all the way to the
/// store, where they become SQL NULL; empty strings never stand in for
/// "no data". The monetary field keeps its tri-state so the audit can
/// count absent vs unparseable before the value collapses to 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecord {
    pub source: SourceTag,
    pub id_externo: Option<String>,
    pub empreendimento: Option<String>,
    pub unidade: Option<String>,
    pub cliente: Option<String>,
    pub corretor: Option<String>,
    pub imobiliaria: Option<String>,
    pub valor_contrato: NormalizedAmount,
    pub data_contrato: Option<String>,
    pub situacao: Option<String>,
    pub consolidado_em: String,
}

impl ConsolidatedRecord {
    /// Collapsed monetary value (0.0 for absent/unparseable).
    pub fn valor(&self) -> f64 {
        self.valor_contrato.value()
    }
}

// ============================================================================
// PROJECTION
// ============================================================================

/// Empty or whitespace-only strings are absences, not values.
fn limpar(valor: Option<String>) -> Option<String> {
    match valor {
        Some(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        None => None,
    }
}

fn normalizar(valor: Option<&serde_json::Value>) -> NormalizedAmount {
    match valor {
        Some(v) => normalize_valor(v),
        None => NormalizedAmount::Absent,
    }
}

/// Project one typed record onto the consolidated contract. The batch tag
/// decides the `source` column (the Sienge contract is identical on both
/// endpoints, only the tag tells them apart).
pub fn project(
    tag: SourceTag,
    record: &SourceRecord,
    brokers: &BrokerDirectory,
    consolidado_em: &str,
) -> ConsolidatedRecord {
    match record {
        SourceRecord::CvVenda(venda) => ConsolidatedRecord {
            source: tag,
            id_externo: venda.id_proposta.map(|id| id.to_string()),
            empreendimento: limpar(venda.empreendimento.clone()),
            unidade: limpar(venda.unidade.clone()),
            // Listas aninhadas: só o primeiro elemento entra na consolidação
            cliente: limpar(venda.clientes.first().and_then(|c| c.nome.clone())),
            corretor: limpar(venda.corretores.first().and_then(|c| c.nome.clone())),
            imobiliaria: limpar(venda.imobiliaria.as_ref().and_then(|i| i.nome.clone())),
            valor_contrato: normalizar(venda.valor_contrato.as_ref()),
            data_contrato: limpar(venda.data_venda.clone()),
            situacao: limpar(venda.situacao.clone()),
            consolidado_em: consolidado_em.to_string(),
        },
        SourceRecord::CvLead(lead) => ConsolidatedRecord {
            source: tag,
            id_externo: lead.id_lead.map(|id| id.to_string()),
            empreendimento: limpar(lead.empreendimento.clone()),
            unidade: limpar(lead.unidade.clone()),
            cliente: limpar(lead.nome.clone()),
            corretor: limpar(lead.corretor.clone()),
            imobiliaria: limpar(lead.imobiliaria.clone()),
            valor_contrato: normalizar(lead.valor_negocio.as_ref()),
            data_contrato: limpar(lead.data_cad.clone()),
            situacao: limpar(lead.situacao.clone()),
            consolidado_em: consolidado_em.to_string(),
        },
        SourceRecord::SiengeRepasse(repasse) => {
            // Outer join: um corretor sem cadastro não derruba a linha
            let broker = repasse.broker_id.and_then(|id| brokers.resolve(id));
            let corretor = limpar(repasse.broker_name.clone())
                .or_else(|| broker.and_then(|b| limpar(b.nome.clone())));
            let imobiliaria = broker.and_then(|b| limpar(b.imobiliaria.clone()));

            ConsolidatedRecord {
                source: tag,
                id_externo: repasse.id.map(|id| id.to_string()),
                empreendimento: limpar(repasse.enterprise_name.clone()),
                unidade: limpar(repasse.unit_name.clone()),
                cliente: limpar(repasse.customer_name.clone()),
                corretor,
                imobiliaria,
                valor_contrato: normalizar(repasse.value.as_ref()),
                data_contrato: limpar(repasse.contract_date.clone()),
                situacao: limpar(repasse.situation.clone()),
                consolidado_em: consolidado_em.to_string(),
            }
        }
        SourceRecord::LegadoRow(row) => ConsolidatedRecord {
            source: tag,
            id_externo: limpar(row.id.clone()),
            empreendimento: limpar(row.empreendimento.clone()),
            unidade: limpar(row.unidade.clone()),
            cliente: limpar(row.cliente.clone()),
            corretor: limpar(row.corretor.clone()),
            imobiliaria: limpar(row.imobiliaria.clone()),
            valor_contrato: normalize_valor_opt(row.valor_contrato.as_deref()),
            data_contrato: limpar(row.data.clone()),
            situacao: limpar(row.situacao.clone()),
            consolidado_em: consolidado_em.to_string(),
        },
    }
}

// ============================================================================
// RECORD BATCH
// ============================================================================

/// Ordered header + rows of SQL values: the unit handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub header: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn text_or_null(valor: Option<&str>) -> SqlValue {
    match valor {
        Some(s) => SqlValue::Text(s.to_string()),
        None => SqlValue::Null,
    }
}

/// Lower consolidated records into a batch under the canonical header.
pub fn to_batch(records: &[ConsolidatedRecord]) -> RecordBatch {
    let header: Vec<String> = CONSOLIDATED_COLUMNS.iter().map(|c| c.to_string()).collect();

    let rows = records
        .iter()
        .map(|r| {
            vec![
                SqlValue::Text(r.source.code().to_string()),
                text_or_null(r.id_externo.as_deref()),
                text_or_null(r.empreendimento.as_deref()),
                text_or_null(r.unidade.as_deref()),
                text_or_null(r.cliente.as_deref()),
                text_or_null(r.corretor.as_deref()),
                text_or_null(r.imobiliaria.as_deref()),
                SqlValue::Real(r.valor()),
                text_or_null(r.data_contrato.as_deref()),
                text_or_null(r.situacao.as_deref()),
                SqlValue::Text(r.consolidado_em.clone()),
            ]
        })
        .collect();

    RecordBatch { header, rows }
}

/// Check one header against the contract: same columns, same count,
/// same order. Mismatch is fatal before anything is written.
pub fn validate_header(header: &[String]) -> Result<()> {
    if header.len() != CONSOLIDATED_COLUMNS.len() {
        return Err(anyhow::anyhow!(
            "Contrato de colunas violado: esperava {} colunas, batch tem {}",
            CONSOLIDATED_COLUMNS.len(),
            header.len()
        ));
    }

    for (pos, (got, expected)) in header.iter().zip(CONSOLIDATED_COLUMNS.iter()).enumerate() {
        if got != expected {
            return Err(anyhow::anyhow!(
                "Contrato de colunas violado na posição {}: esperava '{}', batch tem '{}'",
                pos,
                expected,
                got
            ));
        }
    }

    Ok(())
}

/// Union batches in input order. Every header is validated against the
/// contract first; one bad batch aborts the whole union.
pub fn union(batches: &[RecordBatch]) -> Result<RecordBatch> {
    for batch in batches {
        validate_header(&batch.header)?;
    }

    let header: Vec<String> = CONSOLIDATED_COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut rows = Vec::with_capacity(batches.iter().map(|b| b.rows.len()).sum());
    for batch in batches {
        rows.extend(batch.rows.iter().cloned());
    }

    Ok(RecordBatch { header, rows })
}

// ============================================================================
// CONSOLIDATION
// ============================================================================

/// Result of consolidating all fetched batches.
#[derive(Debug, Clone)]
pub struct Consolidation {
    /// Union of all projected records, input order preserved
    pub records: Vec<ConsolidatedRecord>,
    /// The same union, lowered for the store
    pub batch: RecordBatch,
    /// Row count contributed by each source, in input order
    pub per_source: Vec<(SourceTag, usize)>,
}

/// Consolidate the fetched batches: project, validate each per-source
/// batch against the contract, union in input order.
pub fn consolidate(
    batches: &[SourceBatch],
    brokers: &BrokerDirectory,
    consolidado_em: &str,
) -> Result<Consolidation> {
    let mut all_records = Vec::new();
    let mut per_source = Vec::new();
    let mut lowered = Vec::new();

    for batch in batches {
        let records: Vec<ConsolidatedRecord> = batch
            .records
            .iter()
            .map(|r| project(batch.tag, r, brokers, consolidado_em))
            .collect();

        per_source.push((batch.tag, records.len()));
        lowered.push(to_batch(&records));
        all_records.extend(records);
    }

    let unioned = union(&lowered)?;

    Ok(Consolidation {
        records: all_records,
        batch: unioned,
        per_source,
    })
}

// ============================================================================
// TESTS
// ============================================================================
