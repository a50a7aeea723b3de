// Pipeline de Vendas - CLI
// Três comandos posicionais: run (padrão), check, export. Tudo que a
// rodada precisa vem do ambiente (.env em dev); credencial faltando
// derruba o processo antes de abrir o banco.

use anyhow::{bail, Result};
use chrono::Duration;
use std::env;

use vendas_pipeline::{
    default_fetchers, export_csv, run_check, run_pipeline, AnalyticsStore, Config,
    ConsolidatedFilter, RunLock, RunOptions, CONSOLIDATED_TABLE, VERSION,
};

fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let comando = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    let resultado = match comando {
        "run" => cmd_run(&args),
        "check" => cmd_check(),
        "export" => cmd_export(&args),
        outro => {
            eprintln!("❌ Comando desconhecido: {}", outro);
            eprintln!("   Comandos: run (padrão), check, export");
            std::process::exit(2);
        }
    };

    if let Err(erro) = resultado {
        eprintln!("\n❌ Falha: {:#}", erro);
        std::process::exit(1);
    }
}

// ============================================================================
// RUN
// ============================================================================

fn cmd_run(args: &[String]) -> Result<()> {
    println!("🏢 Pipeline de Vendas v{} - Consolidação", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Configuração antes de qualquer I/O
    let config = Config::from_env()?;
    config.print_trace();

    // 2. Lock de rodada
    let lock = RunLock::acquire_with_staleness(
        &config.lock_path,
        Duration::minutes(config.lock_stale_minutes),
    )?;
    println!("🔒 Lock adquirido (rodada {})", lock.run_id());

    // 3. Banco analítico
    let mut store = AnalyticsStore::open(&config.db_path)?;
    store.setup()?;

    // 4. Rodada completa
    let fetchers = default_fetchers(&config.payload_dir);
    let options = RunOptions {
        skip_export: args.iter().any(|a| a == "--skip-export"),
        run_id: Some(lock.run_id().to_string()),
    };
    let summary = run_pipeline(&config, &mut store, &fetchers, &options)?;
    summary.print_summary();

    Ok(())
}

// ============================================================================
// CHECK
// ============================================================================

fn cmd_check() -> Result<()> {
    println!("⚖️ Pipeline de Vendas v{} - Conferência", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env()?;
    let store = AnalyticsStore::open(&config.db_path)?;
    store.setup()?;

    if !store.table_exists(CONSOLIDATED_TABLE)? {
        eprintln!("❌ Nada consolidado em {}", config.db_path.display());
        eprintln!("   Rode: vendas-pipeline run");
        std::process::exit(1);
    }

    // A conferência é consultiva: relatório sujo não muda o exit status
    let report = run_check(&store)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());

    Ok(())
}

// ============================================================================
// EXPORT
// ============================================================================

fn cmd_export(args: &[String]) -> Result<()> {
    println!("📤 Pipeline de Vendas v{} - Exportação", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env()?;
    let store = AnalyticsStore::open(&config.db_path)?;
    store.setup()?;

    if !store.table_exists(CONSOLIDATED_TABLE)? {
        eprintln!("❌ Nada consolidado em {}", config.db_path.display());
        eprintln!("   Rode: vendas-pipeline run");
        std::process::exit(1);
    }

    let filter = parse_filter(args.get(2..).unwrap_or(&[]))?;
    let (header, rows) = store.query_consolidated(&filter)?;
    export_csv(&config.export_dir, "vendas_consolidadas", &header, &rows)?;

    Ok(())
}

/// Filtros posicionais chave=valor, o mesmo vocabulário do dashboard:
/// `export fonte=CV_VENDAS de=2024-01-01 ate=2024-12-31`
fn parse_filter(args: &[String]) -> Result<ConsolidatedFilter> {
    let mut filter = ConsolidatedFilter::default();
    for arg in args {
        match arg.split_once('=') {
            Some(("fonte", v)) => filter.source = Some(v.to_string()),
            Some(("empreendimento", v)) => filter.empreendimento = Some(v.to_string()),
            Some(("situacao", v)) => filter.situacao = Some(v.to_string()),
            Some(("de", v)) => filter.data_inicio = Some(v.to_string()),
            Some(("ate", v)) => filter.data_fim = Some(v.to_string()),
            _ => bail!(
                "Filtro desconhecido: {} (aceitos: fonte=, empreendimento=, situacao=, de=, ate=)",
                arg
            ),
        }
    }
    Ok(filter)
}
