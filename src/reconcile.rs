// ⚖️ Reconciliation Check - Did every fetched row land in the table?
// Advisory by contract: the report is printed and persisted alongside the
// run, but it never mutates data and never fails the pipeline. Cleanup
// happens out of band after an operator reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consolidate::ConsolidatedRecord;
use crate::dedup;
use crate::sources::SourceTag;

// ============================================================================
// COUNT VERDICT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CountVerdict {
    /// Consolidated total equals the sum of the expected source counts
    Match { total: usize },

    /// Totals disagree; the per-source drill-down tells where
    Mismatch { expected: usize, actual: usize },
}

impl CountVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, CountVerdict::Match { .. })
    }

    /// actual − expected (0 when matched)
    pub fn difference(&self) -> i64 {
        match self {
            CountVerdict::Match { .. } => 0,
            CountVerdict::Mismatch { expected, actual } => *actual as i64 - *expected as i64,
        }
    }
}

// ============================================================================
// RECONCILE INPUT
// ============================================================================

/// Observed facts about the consolidated rows. Built from typed records
/// during a run, or from grouped store counts in `check` mode (where the
/// stored `source` column may carry strings no fetcher ever produced).
#[derive(Debug, Clone, Default)]
pub struct ReconcileInput {
    /// Row count per observed source code, first-seen order
    pub source_counts: Vec<(String, usize)>,
    pub duplicate_count: usize,
    pub absent_values: usize,
    pub unparseable_values: usize,
}

impl ReconcileInput {
    pub fn from_records(records: &[ConsolidatedRecord]) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for record in records {
            let code = record.source.code().to_string();
            if !counts.contains_key(&code) {
                order.push(code.clone());
            }
            *counts.entry(code).or_insert(0) += 1;
        }

        let source_counts = order
            .into_iter()
            .map(|code| {
                let n = counts.get(&code).copied().unwrap_or(0);
                (code, n)
            })
            .collect();

        ReconcileInput {
            source_counts,
            duplicate_count: dedup::duplicate_count(records),
            absent_values: records
                .iter()
                .filter(|r| r.valor_contrato.is_absent())
                .count(),
            unparseable_values: records
                .iter()
                .filter(|r| r.valor_contrato.is_unparseable())
                .count(),
        }
    }

    pub fn total_rows(&self) -> usize {
        self.source_counts.iter().map(|(_, n)| n).sum()
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// Actual vs expected for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    pub code: String,
    pub expected: usize,
    pub actual: usize,
}

impl SourceCount {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub verdict: CountVerdict,
    pub total_rows: usize,
    pub expected_total: usize,
    pub per_source: Vec<SourceCount>,
    /// Source codes observed in rows but absent from the expected set
    pub unexpected_tags: Vec<(String, usize)>,
    /// Sources that never delivered a batch this run
    pub missing_sources: Vec<String>,
    pub duplicate_count: usize,
    pub absent_values: usize,
    pub unparseable_values: usize,
    /// Too large a share of values collapsed to 0.0. Informational, does
    /// not dirty the verdict.
    pub zero_value_alert: bool,
    pub run_id: Option<String>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Clean means: totals match, every source matches, nothing
    /// unexpected, nothing missing, no duplicates.
    pub fn is_clean(&self) -> bool {
        self.verdict.is_match()
            && self.per_source.iter().all(|s| s.matches())
            && self.unexpected_tags.is_empty()
            && self.missing_sources.is_empty()
            && self.duplicate_count == 0
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn summary(&self) -> String {
        format!(
            "Conferência: {} linhas (esperado {}), {} duplicadas, {} fontes inesperadas, {} fontes ausentes",
            self.total_rows,
            self.expected_total,
            self.duplicate_count,
            self.unexpected_tags.len(),
            self.missing_sources.len()
        )
    }

    /// Operator-facing detail lines, one marker per check.
    pub fn print_trace(&self) {
        let marca = |ok: bool| if ok { "✓" } else { "⚠️" };

        println!("⚖️ Conferência da consolidação");
        println!(
            "   {} Total: {} linhas (esperado: {})",
            marca(self.verdict.is_match()),
            self.total_rows,
            self.expected_total
        );

        for source in &self.per_source {
            println!(
                "   {} {}: {} (esperado {})",
                marca(source.matches()),
                source.code,
                source.actual,
                source.expected
            );
        }

        if self.unexpected_tags.is_empty() {
            println!("   ✓ Fontes inesperadas: nenhuma");
        } else {
            for (code, count) in &self.unexpected_tags {
                println!("   ⚠️ Fonte inesperada '{}': {} linhas", code, count);
            }
        }

        for code in &self.missing_sources {
            println!("   ⚠️ Fonte sem batch nesta rodada: {}", code);
        }

        println!(
            "   {} Duplicadas: {}",
            marca(self.duplicate_count == 0),
            self.duplicate_count
        );
        println!(
            "   {} Valores ausentes: {} | não interpretáveis: {}",
            marca(!self.zero_value_alert),
            self.absent_values,
            self.unparseable_values
        );
    }
}

// ============================================================================
// RECONCILE ENGINE
// ============================================================================

pub struct ReconcileEngine {
    /// Fraction of rows with zero-collapsed values that raises the audit
    /// flag (default: 0.2)
    pub zero_alert_ratio: f64,
}

impl ReconcileEngine {
    pub fn new() -> Self {
        ReconcileEngine {
            zero_alert_ratio: 0.2,
        }
    }

    pub fn with_zero_alert_ratio(ratio: f64) -> Self {
        ReconcileEngine {
            zero_alert_ratio: ratio,
        }
    }

    /// Compare observed rows against the expected per-source counts
    /// (taken from the raw snapshot tables, never from the batches that
    /// produced the rows).
    pub fn reconcile(
        &self,
        input: &ReconcileInput,
        expected: &[(SourceTag, usize)],
        missing: &[SourceTag],
    ) -> ReconciliationReport {
        let expected_total: usize = expected.iter().map(|(_, n)| n).sum();
        let total_rows = input.total_rows();

        let per_source = expected
            .iter()
            .map(|(tag, expected_count)| {
                let actual = input
                    .source_counts
                    .iter()
                    .find(|(code, _)| code == tag.code())
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                SourceCount {
                    code: tag.code().to_string(),
                    expected: *expected_count,
                    actual,
                }
            })
            .collect();

        let expected_codes: Vec<&str> = expected.iter().map(|(tag, _)| tag.code()).collect();
        let unexpected_tags: Vec<(String, usize)> = input
            .source_counts
            .iter()
            .filter(|(code, _)| !expected_codes.contains(&code.as_str()))
            .cloned()
            .collect();

        let verdict = if total_rows == expected_total {
            CountVerdict::Match { total: total_rows }
        } else {
            CountVerdict::Mismatch {
                expected: expected_total,
                actual: total_rows,
            }
        };

        let zero_collapsed = input.absent_values + input.unparseable_values;
        let zero_value_alert =
            total_rows > 0 && (zero_collapsed as f64) > self.zero_alert_ratio * total_rows as f64;

        ReconciliationReport {
            verdict,
            total_rows,
            expected_total,
            per_source,
            unexpected_tags,
            missing_sources: missing.iter().map(|t| t.code().to_string()).collect(),
            duplicate_count: input.duplicate_count,
            absent_values: input.absent_values,
            unparseable_values: input.unparseable_values,
            zero_value_alert,
            run_id: None,
            reconciled_at: Utc::now(),
        }
    }
}

impl Default for ReconcileEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::NormalizedAmount;

    fn input_with_counts(counts: &[(&str, usize)]) -> ReconcileInput {
        ReconcileInput {
            source_counts: counts
                .iter()
                .map(|(code, n)| (code.to_string(), *n))
                .collect(),
            duplicate_count: 0,
            absent_values: 0,
            unparseable_values: 0,
        }
    }

    fn create_test_record(source: SourceTag, id: &str, valor: NormalizedAmount) -> ConsolidatedRecord {
        ConsolidatedRecord {
            source,
            id_externo: Some(id.to_string()),
            empreendimento: None,
            unidade: None,
            cliente: None,
            corretor: None,
            imobiliaria: None,
            valor_contrato: valor,
            data_contrato: None,
            situacao: None,
            consolidado_em: "2024-11-03T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_reconcile_clean_run() {
        let engine = ReconcileEngine::new();
        let input = input_with_counts(&[
            ("CV_VENDAS", 1058),
            ("SIENGE_REPASSES", 39),
            ("LEGADO", 53),
        ]);
        let expected = vec![
            (SourceTag::CvVendas, 1058),
            (SourceTag::SiengeRepasses, 39),
            (SourceTag::PlanilhaLegado, 53),
        ];

        let report = engine.reconcile(&input, &expected, &[]);

        assert_eq!(report.total_rows, 1150);
        assert_eq!(report.expected_total, 1150);
        assert!(report.verdict.is_match());
        assert!(report.is_clean());
        assert_eq!(report.per_source.len(), 3);
        assert!(report.per_source.iter().all(|s| s.matches()));

        println!("✅ Test passed: {}", report.summary());
    }

    #[test]
    fn test_reconcile_mismatch_keeps_drilldown() {
        let engine = ReconcileEngine::new();
        // CV delivered 1058 but only 1000 landed
        let input = input_with_counts(&[("CV_VENDAS", 1000), ("LEGADO", 53)]);
        let expected = vec![(SourceTag::CvVendas, 1058), (SourceTag::PlanilhaLegado, 53)];

        let report = engine.reconcile(&input, &expected, &[]);

        assert!(!report.verdict.is_match());
        assert_eq!(report.verdict.difference(), -58);
        assert!(!report.is_clean());

        let cv = &report.per_source[0];
        assert_eq!(cv.code, "CV_VENDAS");
        assert_eq!(cv.expected, 1058);
        assert_eq!(cv.actual, 1000);
        assert!(!cv.matches());
        assert!(report.per_source[1].matches());
    }

    #[test]
    fn test_unexpected_tag_listed_with_count() {
        let engine = ReconcileEngine::new();
        let input = input_with_counts(&[("CV_VENDAS", 10), ("PLANILHA_XYZ", 3)]);
        let expected = vec![(SourceTag::CvVendas, 10)];

        let report = engine.reconcile(&input, &expected, &[]);

        assert_eq!(
            report.unexpected_tags,
            vec![("PLANILHA_XYZ".to_string(), 3)]
        );
        assert!(!report.is_clean());
        // Unexpected rows still count toward the observed total
        assert_eq!(report.total_rows, 13);
    }

    #[test]
    fn test_missing_source_flagged() {
        let engine = ReconcileEngine::new();
        let input = input_with_counts(&[("CV_VENDAS", 10)]);
        let expected = vec![(SourceTag::CvVendas, 10)];
        let missing = vec![SourceTag::SiengeRepasses];

        let report = engine.reconcile(&input, &expected, &missing);

        assert_eq!(report.missing_sources, vec!["SIENGE_REPASSES".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_from_records_counts_value_states() {
        let records = vec![
            create_test_record(SourceTag::CvVendas, "1", NormalizedAmount::Parsed(100.0)),
            create_test_record(SourceTag::CvVendas, "2", NormalizedAmount::Absent),
            create_test_record(SourceTag::CvLeads, "3", NormalizedAmount::Unparseable),
            create_test_record(SourceTag::CvLeads, "3", NormalizedAmount::Unparseable),
        ];

        let input = ReconcileInput::from_records(&records);

        assert_eq!(
            input.source_counts,
            vec![("CV_VENDAS".to_string(), 2), ("CV_LEADS".to_string(), 2)]
        );
        assert_eq!(input.duplicate_count, 1);
        assert_eq!(input.absent_values, 1);
        assert_eq!(input.unparseable_values, 2);
        assert_eq!(input.total_rows(), 4);
    }

    #[test]
    fn test_zero_value_alert_threshold() {
        let engine = ReconcileEngine::new();
        let expected = vec![(SourceTag::CvVendas, 10)];

        let mut input = input_with_counts(&[("CV_VENDAS", 10)]);
        input.absent_values = 1;
        input.unparseable_values = 1;
        let report = engine.reconcile(&input, &expected, &[]);
        assert!(!report.zero_value_alert);

        input.absent_values = 2;
        input.unparseable_values = 1;
        let report = engine.reconcile(&input, &expected, &[]);
        assert!(report.zero_value_alert);
        // Alert alone does not dirty the verdict
        assert!(report.is_clean());
    }

    #[test]
    fn test_duplicates_dirty_the_report() {
        let engine = ReconcileEngine::new();
        let mut input = input_with_counts(&[("CV_VENDAS", 10)]);
        input.duplicate_count = 1;
        let expected = vec![(SourceTag::CvVendas, 10)];

        let report = engine.reconcile(&input, &expected, &[]);
        assert!(report.verdict.is_match());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_report_with_run_id() {
        let engine = ReconcileEngine::new();
        let input = input_with_counts(&[("CV_VENDAS", 1)]);
        let expected = vec![(SourceTag::CvVendas, 1)];

        let report = engine
            .reconcile(&input, &expected, &[])
            .with_run_id("0c6541d2-run");

        assert_eq!(report.run_id.as_deref(), Some("0c6541d2-run"));
        assert!(report.summary().contains("1 linhas"));
    }
}
