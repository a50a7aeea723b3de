// 🤝 Broker Directory - corretor id → nome + imobiliária
// Best-effort lookup used during consolidation. Sienge rows only carry a
// numeric broker id; the CRM corretores endpoint is the system of record
// for who that is and which agency they sell for. A miss leaves the
// fields absent, it never drops the record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::sources::CvImobiliaria;

/// Filename the download script uses for the corretores payload.
pub const CORRETORES_PAYLOAD: &str = "corretores.json";

/// One resolved broker entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub nome: Option<String>,
    pub imobiliaria: Option<String>,
}

/// Registro cru do payload de corretores do CV.
#[derive(Debug, Clone, Deserialize)]
struct CorretorPayload {
    #[serde(rename = "idcorretor")]
    id_corretor: Option<i64>,
    nome: Option<String>,
    imobiliaria: Option<CvImobiliaria>,
}

/// In-memory lookup table, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct BrokerDirectory {
    entries: HashMap<i64, BrokerInfo>,
}

impl BrokerDirectory {
    /// Empty directory. Every lookup misses; consolidation still works,
    /// just without agency resolution.
    pub fn new() -> Self {
        BrokerDirectory {
            entries: HashMap::new(),
        }
    }

    /// Load from the corretores payload file (`{"corretores": [...]}`).
    /// Entries without an id cannot be joined and are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corretores payload: {}", path.display()))?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corretores JSON: {}", path.display()))?;

        let corretores = json
            .get("corretores")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                anyhow::anyhow!("payload sem array 'corretores': {}", path.display())
            })?;

        let mut directory = BrokerDirectory::new();
        for item in corretores {
            let corretor: CorretorPayload = serde_json::from_value(item.clone())
                .with_context(|| "Failed to type corretor record".to_string())?;

            if let Some(id) = corretor.id_corretor {
                directory.insert(
                    id,
                    BrokerInfo {
                        nome: corretor.nome,
                        imobiliaria: corretor.imobiliaria.and_then(|i| i.nome),
                    },
                );
            }
        }

        Ok(directory)
    }

    pub fn insert(&mut self, id: i64, info: BrokerInfo) {
        self.entries.insert(id, info);
    }

    /// Outer-join semantics: None on miss, caller keeps the row.
    pub fn resolve(&self, id: i64) -> Option<&BrokerInfo> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries for persisting the lookup table.
    pub fn iter(&self) -> impl Iterator<Item = (&i64, &BrokerInfo)> {
        self.entries.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample_directory() -> BrokerDirectory {
        let mut dir = BrokerDirectory::new();
        dir.insert(
            17,
            BrokerInfo {
                nome: Some("Carlos Lima".to_string()),
                imobiliaria: Some("Imob Alfa".to_string()),
            },
        );
        dir.insert(
            42,
            BrokerInfo {
                nome: Some("Paula Mendes".to_string()),
                imobiliaria: None,
            },
        );
        dir
    }

    #[test]
    fn test_resolve_hit() {
        let dir = sample_directory();
        let info = dir.resolve(17).unwrap();
        assert_eq!(info.nome.as_deref(), Some("Carlos Lima"));
        assert_eq!(info.imobiliaria.as_deref(), Some("Imob Alfa"));
    }

    #[test]
    fn test_resolve_miss_is_none() {
        let dir = sample_directory();
        assert!(dir.resolve(999).is_none());
    }

    #[test]
    fn test_load_from_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload = json!({
            "corretores": [
                {
                    "idcorretor": 17,
                    "nome": "Carlos Lima",
                    "imobiliaria": {"idimobiliaria": 5, "nome": "Imob Alfa"}
                },
                {"idcorretor": 99, "nome": "Sem Imobiliária"},
                {"nome": "Sem Id, não entra"}
            ]
        });
        write!(file, "{}", payload).unwrap();

        let dir = BrokerDirectory::load(file.path()).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(
            dir.resolve(17).and_then(|i| i.imobiliaria.as_deref()),
            Some("Imob Alfa")
        );
        assert!(dir.resolve(99).unwrap().imobiliaria.is_none());
    }

    #[test]
    fn test_load_missing_array_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({"vendas": []})).unwrap();
        assert!(BrokerDirectory::load(file.path()).is_err());
    }
}
