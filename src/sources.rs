// 📥 Source Ingestion - Typed records from the five upstream batches
// CV CRM (vendas + leads), Sienge ERP (repasses realizados + cancelados),
// planilha legado. Fetchers parse the payload files the download scripts
// leave behind; the API clients themselves live outside this repo.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceTag - Identifica de qual sistema veio o registro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    CvVendas,
    CvLeads,
    SiengeRepasses,
    SiengeCancelados,
    PlanilhaLegado,
}

impl SourceTag {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceTag::CvVendas => "CV Vendas",
            SourceTag::CvLeads => "CV Leads",
            SourceTag::SiengeRepasses => "Sienge Repasses",
            SourceTag::SiengeCancelados => "Sienge Cancelados",
            SourceTag::PlanilhaLegado => "Planilha Legado",
        }
    }

    /// Code stored in the `source` column of the consolidated table
    pub fn code(&self) -> &str {
        match self {
            SourceTag::CvVendas => "CV_VENDAS",
            SourceTag::CvLeads => "CV_LEADS",
            SourceTag::SiengeRepasses => "SIENGE_REPASSES",
            SourceTag::SiengeCancelados => "SIENGE_CANCELADOS",
            SourceTag::PlanilhaLegado => "LEGADO",
        }
    }

    /// All five expected sources, in consolidation order
    pub fn all() -> [SourceTag; 5] {
        [
            SourceTag::CvVendas,
            SourceTag::CvLeads,
            SourceTag::SiengeRepasses,
            SourceTag::SiengeCancelados,
            SourceTag::PlanilhaLegado,
        ]
    }

    /// Reverse lookup from a stored code. Rows carrying any other string
    /// are flagged by the reconciliation as unexpected tags.
    pub fn from_code(code: &str) -> Option<SourceTag> {
        SourceTag::all().into_iter().find(|t| t.code() == code)
    }
}

// ============================================================================
// TYPED SOURCE RECORDS
// ============================================================================
// One struct per upstream contract, deserialized exactly once at ingestion.
// Everything the vendor may omit is Option; monetary fields stay as raw
// JSON values because the dialects mix numbers and formatted strings.

/// Venda do CV CRM (endpoint de vendas). Corretores e clientes chegam como
/// listas aninhadas; a consolidação usa apenas o primeiro elemento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvVenda {
    #[serde(rename = "idproposta")]
    pub id_proposta: Option<i64>,
    pub empreendimento: Option<String>,
    pub unidade: Option<String>,
    #[serde(default)]
    pub clientes: Vec<CvCliente>,
    #[serde(default)]
    pub corretores: Vec<CvCorretor>,
    pub imobiliaria: Option<CvImobiliaria>,
    pub valor_contrato: Option<Value>,
    pub data_venda: Option<String>,
    pub situacao: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvCliente {
    #[serde(rename = "idpessoa")]
    pub id_pessoa: Option<i64>,
    pub nome: Option<String>,
    pub documento: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvCorretor {
    #[serde(rename = "idcorretor")]
    pub id_corretor: Option<i64>,
    pub nome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvImobiliaria {
    #[serde(rename = "idimobiliaria")]
    pub id_imobiliaria: Option<i64>,
    pub nome: Option<String>,
}

/// Lead do CV CRM (endpoint de leads). Shape mais achatado que vendas:
/// o vendor devolve strings diretas, sem objetos aninhados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvLead {
    #[serde(rename = "idlead")]
    pub id_lead: Option<i64>,
    pub empreendimento: Option<String>,
    pub unidade: Option<String>,
    pub nome: Option<String>,
    pub corretor: Option<String>,
    pub imobiliaria: Option<String>,
    pub valor_negocio: Option<Value>,
    pub data_cad: Option<String>,
    pub situacao: Option<String>,
}

/// Contrato de repasse do Sienge. Same contract on both endpoints; the
/// fetcher's tag distinguishes realizados from cancelados. `broker_id`
/// resolves to an agency name through the lookup directory at
/// consolidation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiengeRepasse {
    pub id: Option<i64>,
    pub enterprise_name: Option<String>,
    pub unit_name: Option<String>,
    pub customer_name: Option<String>,
    pub broker_id: Option<i64>,
    pub broker_name: Option<String>,
    pub value: Option<Value>,
    pub contract_date: Option<String>,
    pub situation: Option<String>,
}

/// Linha da planilha legado, já no layout consolidado. Headers carry the
/// accents the original sheet uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegadoRow {
    #[serde(rename = "ID")]
    pub id: Option<String>,
    #[serde(rename = "Empreendimento")]
    pub empreendimento: Option<String>,
    #[serde(rename = "Unidade")]
    pub unidade: Option<String>,
    #[serde(rename = "Cliente")]
    pub cliente: Option<String>,
    #[serde(rename = "Corretor")]
    pub corretor: Option<String>,
    #[serde(rename = "Imobiliária")]
    pub imobiliaria: Option<String>,
    #[serde(rename = "Valor Contrato")]
    pub valor_contrato: Option<String>,
    #[serde(rename = "Data")]
    pub data: Option<String>,
    #[serde(rename = "Situação")]
    pub situacao: Option<String>,
}

/// SourceRecord - One record from any of the five sources, typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceRecord {
    CvVenda(CvVenda),
    CvLead(CvLead),
    SiengeRepasse(SiengeRepasse),
    LegadoRow(LegadoRow),
}

impl SourceRecord {
    /// External id exactly as the vendor sent it, when present.
    pub fn external_id(&self) -> Option<String> {
        match self {
            SourceRecord::CvVenda(v) => v.id_proposta.map(|id| id.to_string()),
            SourceRecord::CvLead(l) => l.id_lead.map(|id| id.to_string()),
            SourceRecord::SiengeRepasse(r) => r.id.map(|id| id.to_string()),
            SourceRecord::LegadoRow(row) => row.id.clone(),
        }
    }

    /// Inner record as JSON, for the raw snapshot tables.
    pub fn to_payload_json(&self) -> Result<String> {
        let json = match self {
            SourceRecord::CvVenda(v) => serde_json::to_string(v),
            SourceRecord::CvLead(l) => serde_json::to_string(l),
            SourceRecord::SiengeRepasse(r) => serde_json::to_string(r),
            SourceRecord::LegadoRow(row) => serde_json::to_string(row),
        };
        json.context("Failed to serialize record payload")
    }
}

/// SourceBatch - Everything one fetcher returned, still un-consolidated.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub tag: SourceTag,
    pub records: Vec<SourceRecord>,
}

impl SourceBatch {
    pub fn new(tag: SourceTag, records: Vec<SourceRecord>) -> Self {
        SourceBatch { tag, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// FetchPolicy - What the run does when one source fails to fetch.
/// Explicit per deployment (env `FETCH_POLICY`) and printed in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Any fetch failure kills the run before consolidation
    Abort,
    /// Failed sources are skipped and flagged in the reconciliation report
    ContinuePartial,
}

impl FetchPolicy {
    pub fn name(&self) -> &str {
        match self {
            FetchPolicy::Abort => "ABORT",
            FetchPolicy::ContinuePartial => "CONTINUE_PARTIAL",
        }
    }

    pub fn from_name(name: &str) -> Option<FetchPolicy> {
        match name.trim().to_uppercase().as_str() {
            "ABORT" => Some(FetchPolicy::Abort),
            "CONTINUE_PARTIAL" => Some(FetchPolicy::ContinuePartial),
            _ => None,
        }
    }
}

// ============================================================================
// FETCHER TRAIT
// ============================================================================

/// SourceFetcher - One upstream batch, however it is obtained.
///
/// Shipped implementations read the payload files the download scripts
/// drop into the payload directory. Tests plug in an in-memory fetcher.
pub trait SourceFetcher: Send + Sync {
    /// Fetch and type every record of this source
    fn fetch(&self) -> Result<Vec<SourceRecord>>;

    /// Which of the five sources this fetcher feeds
    fn source(&self) -> SourceTag;
}

// ============================================================================
// PAYLOAD-FILE FETCHERS
// ============================================================================

/// CV CRM payload fetcher. The download script saves one JSON object per
/// endpoint: `{"vendas": [...]}` or `{"leads": [...]}`.
pub struct CvPayloadFetcher {
    path: PathBuf,
    tag: SourceTag,
}

impl CvPayloadFetcher {
    pub fn vendas(path: impl Into<PathBuf>) -> Self {
        CvPayloadFetcher {
            path: path.into(),
            tag: SourceTag::CvVendas,
        }
    }

    pub fn leads(path: impl Into<PathBuf>) -> Self {
        CvPayloadFetcher {
            path: path.into(),
            tag: SourceTag::CvLeads,
        }
    }

    fn payload_array<'a>(&self, json: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
        json.get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "payload CV sem array '{}': {}",
                    key,
                    self.path.display()
                )
            })
    }
}

impl SourceFetcher for CvPayloadFetcher {
    fn fetch(&self) -> Result<Vec<SourceRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read CV payload: {}", self.path.display()))?;
        let json: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse CV payload JSON: {}", self.path.display()))?;

        let mut records = Vec::new();
        match self.tag {
            SourceTag::CvVendas => {
                for item in self.payload_array(&json, "vendas")? {
                    let venda: CvVenda = serde_json::from_value(item.clone())
                        .with_context(|| "Failed to type CV venda record".to_string())?;
                    records.push(SourceRecord::CvVenda(venda));
                }
            }
            SourceTag::CvLeads => {
                for item in self.payload_array(&json, "leads")? {
                    let lead: CvLead = serde_json::from_value(item.clone())
                        .with_context(|| "Failed to type CV lead record".to_string())?;
                    records.push(SourceRecord::CvLead(lead));
                }
            }
            // Constructors only build the two CV tags
            other => {
                return Err(anyhow::anyhow!(
                    "CvPayloadFetcher não cobre a fonte {}",
                    other.code()
                ))
            }
        }

        Ok(records)
    }

    fn source(&self) -> SourceTag {
        self.tag
    }
}

/// Sienge payload fetcher. Both repasse endpoints return the bulk-data
/// shape `{"results": [...]}` with camelCase fields.
pub struct SiengePayloadFetcher {
    path: PathBuf,
    tag: SourceTag,
}

impl SiengePayloadFetcher {
    pub fn repasses(path: impl Into<PathBuf>) -> Self {
        SiengePayloadFetcher {
            path: path.into(),
            tag: SourceTag::SiengeRepasses,
        }
    }

    pub fn cancelados(path: impl Into<PathBuf>) -> Self {
        SiengePayloadFetcher {
            path: path.into(),
            tag: SourceTag::SiengeCancelados,
        }
    }
}

impl SourceFetcher for SiengePayloadFetcher {
    fn fetch(&self) -> Result<Vec<SourceRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read Sienge payload: {}", self.path.display()))?;
        let json: Value = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse Sienge payload JSON: {}", self.path.display())
        })?;

        let results = json
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "payload Sienge sem array 'results': {}",
                    self.path.display()
                )
            })?;

        let mut records = Vec::new();
        for item in results {
            let repasse: SiengeRepasse = serde_json::from_value(item.clone())
                .with_context(|| "Failed to type Sienge repasse record".to_string())?;
            records.push(SourceRecord::SiengeRepasse(repasse));
        }

        Ok(records)
    }

    fn source(&self) -> SourceTag {
        self.tag
    }
}

/// Legacy spreadsheet fetcher: the consolidated sheet exported as CSV.
pub struct LegadoCsvFetcher {
    path: PathBuf,
}

impl LegadoCsvFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LegadoCsvFetcher { path: path.into() }
    }
}

impl SourceFetcher for LegadoCsvFetcher {
    fn fetch(&self) -> Result<Vec<SourceRecord>> {
        use csv::ReaderBuilder;
        use std::fs::File;

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open legacy CSV: {}", self.path.display()))?;

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut records = Vec::new();
        for (line_num, result) in reader.deserialize::<LegadoRow>().enumerate() {
            let row = result.with_context(|| {
                format!(
                    "Failed to parse legacy CSV line {} in {}",
                    line_num + 2,
                    self.path.display()
                )
            })?;
            records.push(SourceRecord::LegadoRow(row));
        }

        Ok(records)
    }

    fn source(&self) -> SourceTag {
        SourceTag::PlanilhaLegado
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Payload filenames the download scripts write into the payload directory.
pub const CV_VENDAS_PAYLOAD: &str = "cv_vendas.json";
pub const CV_LEADS_PAYLOAD: &str = "cv_leads.json";
pub const SIENGE_REPASSES_PAYLOAD: &str = "sienge_repasses.json";
pub const SIENGE_CANCELADOS_PAYLOAD: &str = "sienge_cancelados.json";
pub const LEGADO_PAYLOAD: &str = "planilha_legado.csv";

/// Build the standard five fetchers over a payload directory, in
/// consolidation order.
pub fn default_fetchers(payload_dir: &Path) -> Vec<Box<dyn SourceFetcher>> {
    vec![
        Box::new(CvPayloadFetcher::vendas(payload_dir.join(CV_VENDAS_PAYLOAD))),
        Box::new(CvPayloadFetcher::leads(payload_dir.join(CV_LEADS_PAYLOAD))),
        Box::new(SiengePayloadFetcher::repasses(
            payload_dir.join(SIENGE_REPASSES_PAYLOAD),
        )),
        Box::new(SiengePayloadFetcher::cancelados(
            payload_dir.join(SIENGE_CANCELADOS_PAYLOAD),
        )),
        Box::new(LegadoCsvFetcher::new(payload_dir.join(LEGADO_PAYLOAD))),
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_source_tag_names() {
        assert_eq!(SourceTag::CvVendas.name(), "CV Vendas");
        assert_eq!(SourceTag::CvLeads.name(), "CV Leads");
        assert_eq!(SourceTag::SiengeRepasses.name(), "Sienge Repasses");
        assert_eq!(SourceTag::SiengeCancelados.name(), "Sienge Cancelados");
        assert_eq!(SourceTag::PlanilhaLegado.name(), "Planilha Legado");
    }

    #[test]
    fn test_source_tag_codes() {
        assert_eq!(SourceTag::CvVendas.code(), "CV_VENDAS");
        assert_eq!(SourceTag::CvLeads.code(), "CV_LEADS");
        assert_eq!(SourceTag::SiengeRepasses.code(), "SIENGE_REPASSES");
        assert_eq!(SourceTag::SiengeCancelados.code(), "SIENGE_CANCELADOS");
        assert_eq!(SourceTag::PlanilhaLegado.code(), "LEGADO");
    }

    #[test]
    fn test_source_tag_from_code() {
        assert_eq!(SourceTag::from_code("CV_VENDAS"), Some(SourceTag::CvVendas));
        assert_eq!(SourceTag::from_code("LEGADO"), Some(SourceTag::PlanilhaLegado));
        assert_eq!(SourceTag::from_code("PLANILHA_XYZ"), None);
        assert_eq!(SourceTag::from_code(""), None);
    }

    #[test]
    fn test_cv_venda_deserializes_vendor_payload() {
        let payload = json!({
            "idproposta": 4821,
            "empreendimento": "Residencial Aurora",
            "unidade": "Torre B - 1203",
            "clientes": [
                {"idpessoa": 99, "nome": "Maria Souza", "documento": "123.456.789-00"}
            ],
            "corretores": [
                {"idcorretor": 17, "nome": "Carlos Lima"},
                {"idcorretor": 18, "nome": "Segundo Corretor"}
            ],
            "imobiliaria": {"idimobiliaria": 5, "nome": "Imob Alfa"},
            "valor_contrato": "210.000,50",
            "data_venda": "2024-11-03",
            "situacao": "Vendida"
        });

        let venda: CvVenda = serde_json::from_value(payload).unwrap();
        assert_eq!(venda.id_proposta, Some(4821));
        assert_eq!(venda.corretores.len(), 2);
        assert_eq!(venda.corretores[0].nome.as_deref(), Some("Carlos Lima"));
        assert_eq!(venda.clientes[0].nome.as_deref(), Some("Maria Souza"));
        assert_eq!(
            venda.imobiliaria.as_ref().and_then(|i| i.nome.as_deref()),
            Some("Imob Alfa")
        );
    }

    #[test]
    fn test_cv_venda_tolerates_missing_lists() {
        // Vendor omits empty lists entirely instead of sending []
        let payload = json!({
            "idproposta": 1,
            "valor_contrato": 85000.0
        });

        let venda: CvVenda = serde_json::from_value(payload).unwrap();
        assert!(venda.clientes.is_empty());
        assert!(venda.corretores.is_empty());
        assert!(venda.imobiliaria.is_none());
        assert!(venda.situacao.is_none());
    }

    #[test]
    fn test_sienge_repasse_camel_case_fields() {
        let payload = json!({
            "id": 7701,
            "enterpriseName": "Parque das Águas",
            "unitName": "Q03 L12",
            "customerName": "João Pereira",
            "brokerId": 42,
            "value": 315000.0,
            "contractDate": "2024-10-17",
            "situation": "Realizado"
        });

        let repasse: SiengeRepasse = serde_json::from_value(payload).unwrap();
        assert_eq!(repasse.id, Some(7701));
        assert_eq!(repasse.enterprise_name.as_deref(), Some("Parque das Águas"));
        assert_eq!(repasse.broker_id, Some(42));
        assert!(repasse.broker_name.is_none());
    }

    #[test]
    fn test_legado_row_from_accented_headers() {
        let csv_content = "\
ID,Empreendimento,Unidade,Cliente,Corretor,Imobiliária,Valor Contrato,Data,Situação
L-001,Residencial Aurora,101,Ana Dias,Pedro Rocha,Imob Beta,\"185.000,00\",2023-05-10,Vendida
L-002,Parque das Águas,202,,,,,2023-06-01,Distrato
";
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_content.as_bytes());

        let rows: Vec<LegadoRow> = reader
            .deserialize::<LegadoRow>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_deref(), Some("L-001"));
        assert_eq!(rows[0].imobiliaria.as_deref(), Some("Imob Beta"));
        assert_eq!(rows[0].valor_contrato.as_deref(), Some("185.000,00"));
        // Empty CSV cells come through as empty strings, not None
        assert_eq!(rows[1].cliente.as_deref(), Some(""));
    }

    #[test]
    fn test_cv_payload_fetcher_reads_vendas() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload = json!({
            "vendas": [
                {"idproposta": 1, "empreendimento": "A", "valor_contrato": "100.000,00"},
                {"idproposta": 2, "empreendimento": "B", "valor_contrato": 95000.0}
            ]
        });
        write!(file, "{}", payload).unwrap();

        let fetcher = CvPayloadFetcher::vendas(file.path());
        assert_eq!(fetcher.source(), SourceTag::CvVendas);

        let records = fetcher.fetch().unwrap();
        assert_eq!(records.len(), 2);
        match &records[0] {
            SourceRecord::CvVenda(v) => assert_eq!(v.id_proposta, Some(1)),
            other => panic!("expected CvVenda, got {:?}", other),
        }
    }

    #[test]
    fn test_cv_payload_fetcher_rejects_wrong_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({"leads": []})).unwrap();

        // Vendas fetcher pointed at a leads payload
        let fetcher = CvPayloadFetcher::vendas(file.path());
        let result = fetcher.fetch();
        assert!(result.is_err());
    }

    #[test]
    fn test_sienge_payload_fetcher_reads_results() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload = json!({
            "results": [
                {"id": 10, "enterpriseName": "C", "value": 200000.0, "situation": "Realizado"}
            ]
        });
        write!(file, "{}", payload).unwrap();

        let fetcher = SiengePayloadFetcher::cancelados(file.path());
        assert_eq!(fetcher.source(), SourceTag::SiengeCancelados);

        let records = fetcher.fetch().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_legado_csv_fetcher_missing_file_errors() {
        let fetcher = LegadoCsvFetcher::new("/nonexistent/planilha_legado.csv");
        assert!(fetcher.fetch().is_err());
    }

    #[test]
    fn test_default_fetchers_cover_all_sources() {
        let fetchers = default_fetchers(Path::new("/tmp/payloads"));
        let tags: Vec<SourceTag> = fetchers.iter().map(|f| f.source()).collect();
        assert_eq!(tags, SourceTag::all().to_vec());
    }
}
