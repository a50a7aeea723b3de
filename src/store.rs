// 💾 Analytics Store - SQLite behind the consolidated table and views
// One exclusive connection per run, opened at start and released on drop
// whatever the outcome. Raw snapshot tables hold each source as fetched;
// the consolidated table is replaced through backup-then-rename so a bad
// run can be rolled back by hand.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::brokers::BrokerDirectory;
use crate::consolidate::{RecordBatch, CONSOLIDATED_TABLE};
use crate::sources::{SourceRecord, SourceTag};

/// View the dashboard reads.
pub const CONSOLIDATED_VIEW: &str = "vw_vendas_consolidadas";

/// Per-source count view for the dashboard cards.
pub const SOURCE_COUNT_VIEW: &str = "vw_contagem_por_fonte";

/// Raw snapshot table for one source.
pub fn raw_table_name(tag: SourceTag) -> String {
    format!("raw_{}", tag.code().to_lowercase())
}

/// Table and column names are spliced into DDL, so they only ever come
/// from code constants that pass this check.
fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Identificador SQL inválido: '{}'", name))
    }
}

pub struct AnalyticsStore {
    conn: Connection,
}

impl AnalyticsStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open analytics store: {}", path.display()))?;
        Ok(AnalyticsStore { conn })
    }

    /// In-memory store for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Ok(AnalyticsStore { conn })
    }

    /// Escape hatch for ad-hoc reads (tests, debugging sessions).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // SETUP
    // ========================================================================

    pub fn setup(&self) -> Result<()> {
        // WAL for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        // Raw snapshot tables, one per source. These hold what each
        // fetcher returned, before any projection, and feed the
        // independent counts of the reconciliation.
        for tag in SourceTag::all() {
            let table = raw_table_name(tag);
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id_externo TEXT,
                        payload TEXT NOT NULL,
                        capturado_em TEXT NOT NULL
                    )",
                    table
                ),
                [],
            )?;
            self.conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_id ON {}(id_externo)",
                    table, table
                ),
                [],
            )?;
        }

        // Lookup table: corretor → imobiliária, persisted for the dashboard
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS corretores (
                id_corretor INTEGER PRIMARY KEY,
                nome TEXT,
                imobiliaria TEXT
            )",
            [],
        )?;

        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        validate_identifier(name)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ========================================================================
    // RAW SNAPSHOTS
    // ========================================================================

    /// Replace the raw snapshot of one source with this run's records.
    pub fn snapshot_source(
        &self,
        tag: SourceTag,
        records: &[SourceRecord],
        capturado_em: &str,
    ) -> Result<usize> {
        let table = raw_table_name(tag);

        self.conn.execute(&format!("DELETE FROM {}", table), [])?;

        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO {} (id_externo, payload, capturado_em) VALUES (?1, ?2, ?3)",
            table
        ))?;

        for record in records {
            stmt.execute(params![
                record.external_id(),
                record.to_payload_json()?,
                capturado_em,
            ])?;
        }

        println!("✓ Snapshot {}: {} registros", tag.code(), records.len());
        Ok(records.len())
    }

    /// Independent count straight from the raw table, never from the
    /// batch that produced it.
    pub fn raw_count(&self, tag: SourceTag) -> Result<i64> {
        self.count_table(&raw_table_name(tag))
    }

    // ========================================================================
    // BATCH REGISTRATION + REPLACE
    // ========================================================================

    /// Register an in-memory batch as a queryable temp table. The temp
    /// schema keeps it away from the real tables and drops it with the
    /// connection.
    pub fn register_batch(&self, name: &str, batch: &RecordBatch) -> Result<()> {
        validate_identifier(name)?;
        if batch.header.is_empty() {
            return Err(anyhow::anyhow!("Batch '{}' sem colunas", name));
        }
        for column in &batch.header {
            validate_identifier(column)?;
        }

        self.conn
            .execute(&format!("DROP TABLE IF EXISTS temp.{}", name), [])?;
        self.conn.execute(
            &format!("CREATE TEMP TABLE {} ({})", name, batch.header.join(", ")),
            [],
        )?;

        let placeholders: Vec<String> = (1..=batch.header.len())
            .map(|i| format!("?{}", i))
            .collect();
        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO temp.{} VALUES ({})",
            name,
            placeholders.join(", ")
        ))?;

        for row in &batch.rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }

        Ok(())
    }

    /// Backup-then-replace: the current table is renamed to
    /// `<name>_backup` (dropping the previous backup), then the new table
    /// is created from the registered batch. All inside one transaction:
    /// a failure rolls everything back, current table and backup intact.
    pub fn replace_table(&mut self, name: &str, batch_name: &str) -> Result<()> {
        validate_identifier(name)?;
        validate_identifier(batch_name)?;
        let backup = format!("{}_backup", name);

        let tx = self.conn.transaction()?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", backup), [])?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        if exists > 0 {
            tx.execute(&format!("ALTER TABLE {} RENAME TO {}", name, backup), [])?;
        }

        tx.execute(
            &format!(
                "CREATE TABLE {} AS SELECT * FROM temp.{}",
                name, batch_name
            ),
            [],
        )?;

        let rows: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", name), [], |row| {
            row.get(0)
        })?;

        tx.commit()?;

        println!("✓ Tabela {} substituída ({} linhas)", name, rows);
        Ok(())
    }

    /// Copy `<name>` to `<name>_<suffix>`, replacing a previous copy.
    /// Used before in-place corrections.
    pub fn snapshot_table(&self, name: &str, suffix: &str) -> Result<()> {
        validate_identifier(name)?;
        validate_identifier(suffix)?;
        let copy = format!("{}_{}", name, suffix);

        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", copy), [])?;
        self.conn.execute(
            &format!("CREATE TABLE {} AS SELECT * FROM {}", copy, name),
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // VIEWS + INDEXES
    // ========================================================================

    /// Recreate the dashboard views and the consolidated-table indexes.
    /// CREATE TABLE AS SELECT não preserva índices, e o rename para
    /// _backup leva os antigos junto. Ambos voltam aqui pelo nome.
    pub fn create_views(&self) -> Result<()> {
        self.conn.execute(
            &format!("DROP INDEX IF EXISTS idx_{}_source", CONSOLIDATED_TABLE),
            [],
        )?;
        self.conn.execute(
            &format!(
                "CREATE INDEX idx_{}_source ON {}(source)",
                CONSOLIDATED_TABLE, CONSOLIDATED_TABLE
            ),
            [],
        )?;
        self.conn.execute(
            &format!("DROP INDEX IF EXISTS idx_{}_data", CONSOLIDATED_TABLE),
            [],
        )?;
        self.conn.execute(
            &format!(
                "CREATE INDEX idx_{}_data ON {}(data_contrato)",
                CONSOLIDATED_TABLE, CONSOLIDATED_TABLE
            ),
            [],
        )?;

        self.conn
            .execute(&format!("DROP VIEW IF EXISTS {}", CONSOLIDATED_VIEW), [])?;
        self.conn.execute(
            &format!(
                "CREATE VIEW {} AS SELECT * FROM {}",
                CONSOLIDATED_VIEW, CONSOLIDATED_TABLE
            ),
            [],
        )?;

        self.conn
            .execute(&format!("DROP VIEW IF EXISTS {}", SOURCE_COUNT_VIEW), [])?;
        self.conn.execute(
            &format!(
                "CREATE VIEW {} AS
                 SELECT source,
                        COUNT(*) AS total_linhas,
                        SUM(valor_contrato) AS valor_total,
                        AVG(valor_contrato) AS valor_medio
                 FROM {}
                 GROUP BY source",
                SOURCE_COUNT_VIEW, CONSOLIDATED_TABLE
            ),
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // COUNTS
    // ========================================================================

    pub fn count_table(&self, name: &str) -> Result<i64> {
        validate_identifier(name)?;
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", name), [], |row| {
                    row.get(0)
                })?;
        Ok(count)
    }

    pub fn count_consolidated(&self) -> Result<i64> {
        self.count_table(CONSOLIDATED_TABLE)
    }

    /// Rows per stored source code, in first-insertion order.
    pub fn consolidated_counts_by_source(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT source, COUNT(*) FROM {} GROUP BY source ORDER BY MIN(rowid)",
            CONSOLIDATED_TABLE
        ))?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    /// Duplicate count over the stored table. Mirrors the in-memory
    /// natural key: source-scoped external id when present, else the
    /// concatenated row fields.
    pub fn stored_duplicate_count(&self) -> Result<i64> {
        let distinct: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) - COUNT(DISTINCT
                    source || ':' || COALESCE(id_externo,
                        COALESCE(empreendimento, '') || '|' ||
                        COALESCE(unidade, '') || '|' ||
                        COALESCE(cliente, '') || '|' ||
                        COALESCE(corretor, '') || '|' ||
                        COALESCE(imobiliaria, '') || '|' ||
                        CAST(valor_contrato AS TEXT) || '|' ||
                        COALESCE(data_contrato, '') || '|' ||
                        COALESCE(situacao, '')))
                 FROM {}",
                CONSOLIDATED_TABLE
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(distinct)
    }

    /// Mean contract value of one source; None when the source has no
    /// rows. Drives the scaled-value check.
    pub fn avg_valor_by_source(&self, tag: SourceTag) -> Result<Option<f64>> {
        let avg: Option<f64> = self.conn.query_row(
            &format!(
                "SELECT AVG(valor_contrato) FROM {} WHERE source = ?1",
                CONSOLIDATED_TABLE
            ),
            params![tag.code()],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    /// Divide one source's contract values in place. Caller is expected
    /// to have copied the table first.
    pub fn scale_down_source(&self, tag: SourceTag, factor: f64) -> Result<usize> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET valor_contrato = valor_contrato / ?1 WHERE source = ?2",
                CONSOLIDATED_TABLE
            ),
            params![factor, tag.code()],
        )?;
        Ok(updated)
    }

    // ========================================================================
    // LOOKUP TABLE
    // ========================================================================

    pub fn load_brokers(&self, directory: &BrokerDirectory) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO corretores (id_corretor, nome, imobiliaria)
             VALUES (?1, ?2, ?3)",
        )?;

        let mut loaded = 0;
        for (id, info) in directory.iter() {
            stmt.execute(params![id, info.nome, info.imobiliaria])?;
            loaded += 1;
        }

        Ok(loaded)
    }

    // ========================================================================
    // EXPORT QUERIES
    // ========================================================================

    /// Consolidated rows as displayable strings (NULL → empty cell),
    /// under the optional filters, in storage order.
    pub fn query_consolidated(
        &self,
        filter: &ConsolidatedFilter,
    ) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut bound: Vec<String> = Vec::new();

        if let Some(source) = &filter.source {
            conditions.push("source = ?");
            bound.push(source.clone());
        }
        if let Some(empreendimento) = &filter.empreendimento {
            conditions.push("empreendimento = ?");
            bound.push(empreendimento.clone());
        }
        if let Some(situacao) = &filter.situacao {
            conditions.push("situacao = ?");
            bound.push(situacao.clone());
        }
        if let Some(inicio) = &filter.data_inicio {
            conditions.push("data_contrato >= ?");
            bound.push(inicio.clone());
        }
        if let Some(fim) = &filter.data_fim {
            conditions.push("data_contrato <= ?");
            bound.push(fim.clone());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM {}{} ORDER BY rowid",
            CONSOLIDATED_TABLE, where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let header: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        let width = header.len();

        let rows = stmt
            .query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    let value: rusqlite::types::Value = row.get(i)?;
                    cells.push(render_sql_value(value));
                }
                Ok(cells)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((header, rows))
    }
}

/// Optional filters over the consolidated table.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedFilter {
    pub source: Option<String>,
    pub empreendimento: Option<String>,
    pub situacao: Option<String>,
    /// Inclusive lower bound on data_contrato
    pub data_inicio: Option<String>,
    /// Inclusive upper bound on data_contrato
    pub data_fim: Option<String>,
}

fn render_sql_value(value: rusqlite::types::Value) -> String {
    use rusqlite::types::Value;
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => format!("{:.2}", f),
        Value::Text(s) => s,
        Value::Blob(_) => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::{to_batch, ConsolidatedRecord};
    use crate::money::NormalizedAmount;
    use crate::sources::CvVenda;

    fn create_test_record(
        source: SourceTag,
        id: &str,
        valor: f64,
        data: &str,
    ) -> ConsolidatedRecord {
        ConsolidatedRecord {
            source,
            id_externo: Some(id.to_string()),
            empreendimento: Some("Residencial Aurora".to_string()),
            unidade: Some("101".to_string()),
            cliente: Some("Maria Souza".to_string()),
            corretor: None,
            imobiliaria: None,
            valor_contrato: NormalizedAmount::Parsed(valor),
            data_contrato: Some(data.to_string()),
            situacao: Some("Vendida".to_string()),
            consolidado_em: "2024-11-03T09:00:00Z".to_string(),
        }
    }

    fn test_store() -> AnalyticsStore {
        let store = AnalyticsStore::in_memory().unwrap();
        store.setup().unwrap();
        store
    }

    fn replace_with(store: &mut AnalyticsStore, records: &[ConsolidatedRecord]) {
        let batch = to_batch(records);
        store.register_batch("batch_vendas", &batch).unwrap();
        store
            .replace_table(CONSOLIDATED_TABLE, "batch_vendas")
            .unwrap();
    }

    #[test]
    fn test_setup_creates_raw_tables() {
        let store = test_store();
        for tag in SourceTag::all() {
            assert_eq!(store.raw_count(tag).unwrap(), 0);
        }
        assert!(store.table_exists("corretores").unwrap());
    }

    #[test]
    fn test_snapshot_source_replaces_previous() {
        let store = test_store();

        let venda = |id: i64| {
            SourceRecord::CvVenda(CvVenda {
                id_proposta: Some(id),
                empreendimento: None,
                unidade: None,
                clientes: vec![],
                corretores: vec![],
                imobiliaria: None,
                valor_contrato: None,
                data_venda: None,
                situacao: None,
            })
        };

        store
            .snapshot_source(SourceTag::CvVendas, &[venda(1), venda(2)], "2024-11-03T09:00:00Z")
            .unwrap();
        assert_eq!(store.raw_count(SourceTag::CvVendas).unwrap(), 2);

        store
            .snapshot_source(SourceTag::CvVendas, &[venda(3)], "2024-11-04T09:00:00Z")
            .unwrap();
        assert_eq!(store.raw_count(SourceTag::CvVendas).unwrap(), 1);
    }

    #[test]
    fn test_register_batch_is_queryable() {
        let store = test_store();
        let records = vec![
            create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01"),
            create_test_record(SourceTag::CvVendas, "2", 200000.0, "2024-01-02"),
        ];

        store.register_batch("batch_teste", &to_batch(&records)).unwrap();
        assert_eq!(store.count_table("batch_teste").unwrap(), 2);
    }

    #[test]
    fn test_replace_table_creates_then_backs_up() {
        let mut store = test_store();

        let first = vec![
            create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01"),
            create_test_record(SourceTag::CvVendas, "2", 200000.0, "2024-01-02"),
            create_test_record(SourceTag::PlanilhaLegado, "L-1", 150000.0, "2023-05-10"),
        ];
        replace_with(&mut store, &first);

        assert_eq!(store.count_consolidated().unwrap(), 3);
        assert!(!store.table_exists("vendas_consolidadas_backup").unwrap());

        let second = vec![
            create_test_record(SourceTag::CvVendas, "3", 300000.0, "2024-02-01"),
        ];
        replace_with(&mut store, &second);

        assert_eq!(store.count_consolidated().unwrap(), 1);
        assert_eq!(store.count_table("vendas_consolidadas_backup").unwrap(), 3);
    }

    #[test]
    fn test_failed_replace_rolls_back_current_and_backup() {
        let mut store = test_store();

        replace_with(
            &mut store,
            &[create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01")],
        );
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "2", 200000.0, "2024-01-02"),
                create_test_record(SourceTag::CvVendas, "3", 300000.0, "2024-01-03"),
            ],
        );

        // Batch was never registered: fails mid-transaction, after the
        // rename. Everything must roll back.
        let result = store.replace_table(CONSOLIDATED_TABLE, "batch_inexistente");
        assert!(result.is_err());

        assert_eq!(store.count_consolidated().unwrap(), 2);
        assert_eq!(store.count_table("vendas_consolidadas_backup").unwrap(), 1);
    }

    #[test]
    fn test_replace_rejects_bad_identifier() {
        let mut store = test_store();
        let result = store.replace_table("vendas; DROP TABLE corretores", "batch_vendas");
        assert!(result.is_err());
    }

    #[test]
    fn test_counts_by_source_in_insertion_order() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::SiengeRepasses, "10", 100000.0, "2024-01-01"),
                create_test_record(SourceTag::SiengeRepasses, "11", 100000.0, "2024-01-02"),
                create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-03"),
            ],
        );

        let counts = store.consolidated_counts_by_source().unwrap();
        assert_eq!(
            counts,
            vec![
                ("SIENGE_REPASSES".to_string(), 2),
                ("CV_VENDAS".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_stored_duplicate_count() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01"),
                create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01"),
                create_test_record(SourceTag::CvVendas, "2", 200000.0, "2024-01-02"),
            ],
        );

        assert_eq!(store.stored_duplicate_count().unwrap(), 1);
    }

    #[test]
    fn test_create_views_expose_source_counts() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-01"),
                create_test_record(SourceTag::CvVendas, "2", 300000.0, "2024-01-02"),
            ],
        );
        store.create_views().unwrap();

        let (total, medio): (i64, f64) = store
            .connection()
            .query_row(
                &format!(
                    "SELECT total_linhas, valor_medio FROM {} WHERE source = 'CV_VENDAS'",
                    SOURCE_COUNT_VIEW
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(medio, 200000.0);
    }

    #[test]
    fn test_avg_valor_by_source() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "1", 100.0, "2024-01-01"),
                create_test_record(SourceTag::CvVendas, "2", 300.0, "2024-01-02"),
            ],
        );

        assert_eq!(
            store.avg_valor_by_source(SourceTag::CvVendas).unwrap(),
            Some(200.0)
        );
        assert_eq!(store.avg_valor_by_source(SourceTag::CvLeads).unwrap(), None);
    }

    #[test]
    fn test_scale_down_touches_only_one_source() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "1", 21000050.0, "2024-01-01"),
                create_test_record(SourceTag::PlanilhaLegado, "L-1", 185000.0, "2023-05-10"),
            ],
        );

        store.snapshot_table(CONSOLIDATED_TABLE, "pre_correcao").unwrap();
        let updated = store.scale_down_source(SourceTag::CvVendas, 100.0).unwrap();
        assert_eq!(updated, 1);

        assert_eq!(
            store.avg_valor_by_source(SourceTag::CvVendas).unwrap(),
            Some(210000.50)
        );
        // Other sources untouched, backup keeps the original value
        assert_eq!(
            store.avg_valor_by_source(SourceTag::PlanilhaLegado).unwrap(),
            Some(185000.0)
        );
        let original: f64 = store
            .connection()
            .query_row(
                "SELECT valor_contrato FROM vendas_consolidadas_pre_correcao
                 WHERE source = 'CV_VENDAS'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(original, 21000050.0);
    }

    #[test]
    fn test_load_brokers_roundtrip() {
        let store = test_store();
        let mut directory = BrokerDirectory::new();
        directory.insert(
            17,
            crate::brokers::BrokerInfo {
                nome: Some("Carlos Lima".to_string()),
                imobiliaria: Some("Imob Alfa".to_string()),
            },
        );

        assert_eq!(store.load_brokers(&directory).unwrap(), 1);
        assert_eq!(store.count_table("corretores").unwrap(), 1);

        let imob: String = store
            .connection()
            .query_row(
                "SELECT imobiliaria FROM corretores WHERE id_corretor = 17",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(imob, "Imob Alfa");
    }

    #[test]
    fn test_query_consolidated_filters() {
        let mut store = test_store();
        replace_with(
            &mut store,
            &[
                create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-15"),
                create_test_record(SourceTag::CvVendas, "2", 200000.0, "2024-03-20"),
                create_test_record(SourceTag::PlanilhaLegado, "L-1", 150000.0, "2024-02-10"),
            ],
        );

        let (header, all_rows) = store
            .query_consolidated(&ConsolidatedFilter::default())
            .unwrap();
        assert_eq!(header.len(), 11);
        assert_eq!(all_rows.len(), 3);

        let filter = ConsolidatedFilter {
            source: Some("CV_VENDAS".to_string()),
            data_inicio: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        let (_, rows) = store.query_consolidated(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "2"); // id_externo column

        let filter = ConsolidatedFilter {
            data_inicio: Some("2024-01-01".to_string()),
            data_fim: Some("2024-02-28".to_string()),
            ..Default::default()
        };
        let (_, rows) = store.query_consolidated(&filter).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_query_renders_null_as_empty_cell() {
        let mut store = test_store();
        let mut record = create_test_record(SourceTag::CvVendas, "1", 100000.0, "2024-01-15");
        record.corretor = None;
        replace_with(&mut store, &[record]);

        let (_, rows) = store
            .query_consolidated(&ConsolidatedFilter::default())
            .unwrap();
        assert_eq!(rows[0][5], ""); // corretor column
        assert_eq!(rows[0][7], "100000.00"); // valor formatted
    }
}
