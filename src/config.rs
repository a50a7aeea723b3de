// ⚙️ Configuration - Environment-variable surface of the pipeline
// Everything the run needs comes from the environment (via .env in dev),
// read once at startup into a Config passed to each stage. A missing
// credential aborts before any file or database is touched. Os tokens
// pertencem aos coletores que baixam os payloads; a validação acontece
// aqui para a falha aparecer logo no início da rodada.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::lock::DEFAULT_STALE_MINUTES;
use crate::scale::DEFAULT_MEAN_THRESHOLD;
use crate::sources::{FetchPolicy, SourceTag};

// ===== VARIÁVEIS OBRIGATÓRIAS =====
pub const ENV_CV_TOKEN: &str = "CV_API_TOKEN";
pub const ENV_SIENGE_TOKEN: &str = "SIENGE_API_TOKEN";
pub const ENV_DB_PATH: &str = "VENDAS_DB_PATH";

// ===== VARIÁVEIS OPCIONAIS =====
pub const ENV_PAYLOAD_DIR: &str = "PAYLOAD_DIR";
pub const ENV_EXPORT_DIR: &str = "EXPORT_DIR";
pub const ENV_FETCH_POLICY: &str = "FETCH_POLICY";
pub const ENV_SCALE_SOURCE: &str = "SCALE_CHECK_SOURCE";
pub const ENV_SCALE_THRESHOLD: &str = "SCALE_MEAN_THRESHOLD";
pub const ENV_LOCK_PATH: &str = "LOCK_PATH";
pub const ENV_LOCK_STALE: &str = "LOCK_STALE_MINUTES";

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token of the CV CRM collector
    pub cv_api_token: String,

    /// Basic-auth token of the Sienge collector
    pub sienge_api_token: String,

    /// Analytical store (SQLite file standing in for the warehouse)
    pub db_path: PathBuf,

    /// Where the download scripts drop the vendor payloads
    pub payload_dir: PathBuf,

    /// Where timestamped CSV exports land
    pub export_dir: PathBuf,

    /// What a failed source does to the run
    pub fetch_policy: FetchPolicy,

    /// Source suspected of sending centavos, if any
    pub scale_check_source: Option<SourceTag>,

    /// Mean above which the scale correction fires
    pub scale_mean_threshold: f64,

    /// Run-lock file
    pub lock_path: PathBuf,

    /// Minutes until a lock counts as abandoned
    pub lock_stale_minutes: i64,
}

impl Config {
    /// Read the whole configuration surface. Fails on the first missing
    /// required variable, naming it.
    pub fn from_env() -> Result<Config> {
        let cv_api_token = require_env(ENV_CV_TOKEN)?;
        let sienge_api_token = require_env(ENV_SIENGE_TOKEN)?;
        let db_path = PathBuf::from(require_env(ENV_DB_PATH)?);

        let payload_dir = PathBuf::from(env_or(ENV_PAYLOAD_DIR, "payloads"));
        let export_dir = PathBuf::from(env_or(ENV_EXPORT_DIR, "exports"));
        let fetch_policy = parse_policy(&env_or(
            ENV_FETCH_POLICY,
            FetchPolicy::ContinuePartial.name(),
        ))?;
        let scale_check_source = match std::env::var(ENV_SCALE_SOURCE) {
            Ok(code) if !code.trim().is_empty() => Some(parse_source(&code)?),
            _ => None,
        };
        let scale_mean_threshold = parse_threshold(&env_or(
            ENV_SCALE_THRESHOLD,
            &DEFAULT_MEAN_THRESHOLD.to_string(),
        ))?;
        let lock_path = PathBuf::from(env_or(ENV_LOCK_PATH, "vendas.lock"));
        let lock_stale_minutes = parse_stale_minutes(&env_or(
            ENV_LOCK_STALE,
            &DEFAULT_STALE_MINUTES.to_string(),
        ))?;

        Ok(Config {
            cv_api_token,
            sienge_api_token,
            db_path,
            payload_dir,
            export_dir,
            fetch_policy,
            scale_check_source,
            scale_mean_threshold,
            lock_path,
            lock_stale_minutes,
        })
    }

    /// Effective configuration, one line per knob. Tokens never appear in
    /// the trace.
    pub fn print_trace(&self) {
        println!("⚙️ Configuração:");
        println!("   Banco analítico: {}", self.db_path.display());
        println!("   Diretório de payloads: {}", self.payload_dir.display());
        println!("   Diretório de exportação: {}", self.export_dir.display());
        println!("   Política de fetch: {}", self.fetch_policy.name());
        match self.scale_check_source {
            Some(tag) => println!(
                "   Correção de escala: {} (média > {})",
                tag.code(),
                self.scale_mean_threshold
            ),
            None => println!("   Correção de escala: desativada"),
        }
        println!(
            "   Lock: {} (janela de {} min)",
            self.lock_path.display(),
            self.lock_stale_minutes
        );
    }
}

// ============================================================================
// LEITURA E VALIDAÇÃO
// ============================================================================

/// Required variable. Empty counts as missing.
fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(valor) if !valor.trim().is_empty() => Ok(valor),
        _ => bail!(
            "Variável de ambiente obrigatória ausente: {}. \
             Configure o .env antes de rodar o pipeline.",
            name
        ),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_policy(raw: &str) -> Result<FetchPolicy> {
    match FetchPolicy::from_name(raw) {
        Some(policy) => Ok(policy),
        None => bail!(
            "Valor inválido em {}: {:?} (aceitos: ABORT, CONTINUE_PARTIAL)",
            ENV_FETCH_POLICY,
            raw
        ),
    }
}

fn parse_source(raw: &str) -> Result<SourceTag> {
    match SourceTag::from_code(raw.trim()) {
        Some(tag) => Ok(tag),
        None => {
            let tags = SourceTag::all();
            let codigos: Vec<&str> = tags.iter().map(|t| t.code()).collect();
            bail!(
                "Valor inválido em {}: {:?} (aceitos: {})",
                ENV_SCALE_SOURCE,
                raw,
                codigos.join(", ")
            )
        }
    }
}

fn parse_threshold(raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        anyhow::anyhow!("Valor inválido em {}: {:?} (esperado número)", ENV_SCALE_THRESHOLD, raw)
    })
}

fn parse_stale_minutes(raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| {
        anyhow::anyhow!("Valor inválido em {}: {:?} (esperado minutos)", ENV_LOCK_STALE, raw)
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_variable_names_it() {
        let erro = require_env("VENDAS_TESTE_VARIAVEL_INEXISTENTE").unwrap_err();
        assert!(erro.to_string().contains("VENDAS_TESTE_VARIAVEL_INEXISTENTE"));
        println!("✅ Test passed: missing required variable names it");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        std::env::set_var("VENDAS_TESTE_VAZIA", "   ");
        assert!(require_env("VENDAS_TESTE_VAZIA").is_err());
    }

    #[test]
    fn test_present_variable_read_back() {
        std::env::set_var("VENDAS_TESTE_PRESENTE", "token-abc");
        assert_eq!(require_env("VENDAS_TESTE_PRESENTE").unwrap(), "token-abc");
    }

    #[test]
    fn test_default_applies_when_unset() {
        assert_eq!(env_or("VENDAS_TESTE_SEM_VALOR", "payloads"), "payloads");
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(parse_policy("ABORT").unwrap(), FetchPolicy::Abort);
        assert_eq!(
            parse_policy("continue_partial").unwrap(),
            FetchPolicy::ContinuePartial
        );

        let erro = parse_policy("TALVEZ").unwrap_err();
        assert!(erro.to_string().contains("FETCH_POLICY"));
        assert!(erro.to_string().contains("CONTINUE_PARTIAL"));
    }

    #[test]
    fn test_scale_source_parsing() {
        assert_eq!(parse_source("CV_VENDAS").unwrap(), SourceTag::CvVendas);
        assert_eq!(parse_source(" LEGADO ").unwrap(), SourceTag::PlanilhaLegado);

        let erro = parse_source("CV_ALUGUEIS").unwrap_err();
        assert!(erro.to_string().contains("SCALE_CHECK_SOURCE"));
        assert!(erro.to_string().contains("SIENGE_REPASSES"));
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(parse_threshold("1000000").unwrap(), 1_000_000.0);
        assert_eq!(parse_threshold("2500000.5").unwrap(), 2_500_000.5);
        assert!(parse_threshold("um milhão").is_err());
    }

    #[test]
    fn test_stale_minutes_parsing() {
        assert_eq!(parse_stale_minutes("30").unwrap(), 30);
        assert!(parse_stale_minutes("meia hora").is_err());
    }
}
